//! Block device geometry answered from `sys/block/<dev>/` attribute files.

use std::path::Path;

use libc::{c_int, c_uint, c_ulong, c_void};

use crate::error::{FixtureError, Result};
use crate::root::FixtureRoot;
use crate::scalar::read_unsigned;

/// `_IOR(0x12, 114, size_t)`
pub const BLKGETSIZE64: c_ulong =
    nix::request_code_read!(0x12, 114, std::mem::size_of::<libc::size_t>()) as c_ulong;
/// `_IO(0x12, 123)`
pub const BLKPBSZGET: c_ulong = nix::request_code_none!(0x12, 123) as c_ulong;
/// `_IO(0x12, 104)`
pub const BLKSSZGET: c_ulong = nix::request_code_none!(0x12, 104) as c_ulong;

/// sysfs `size` is always in 512-byte units, whatever the device's block size.
const SYSFS_SECTOR_SIZE: u64 = 512;

/// The geometry requests the emulator knows how to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockQuery {
    Capacity,
    PhysicalBlockSize,
    LogicalBlockSize,
}

impl BlockQuery {
    pub fn from_request(request: c_ulong) -> Option<Self> {
        match request {
            BLKGETSIZE64 => Some(BlockQuery::Capacity),
            BLKPBSZGET => Some(BlockQuery::PhysicalBlockSize),
            BLKSSZGET => Some(BlockQuery::LogicalBlockSize),
            _ => None,
        }
    }

    /// Attribute file under `sys/block/<dev>/`.
    pub fn attribute(self) -> &'static str {
        match self {
            BlockQuery::Capacity => "size",
            BlockQuery::PhysicalBlockSize => "queue/physical_block_size",
            BlockQuery::LogicalBlockSize => "queue/logical_block_size",
        }
    }
}

/// A synthesized ioctl result, typed as the kernel would write it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAnswer {
    /// `BLKGETSIZE64`: `u64` bytes
    Bytes(u64),
    /// `BLKPBSZGET`: `unsigned int`
    PhysicalBlockSize(c_uint),
    /// `BLKSSZGET`: `int`
    LogicalBlockSize(c_int),
}

impl BlockAnswer {
    /// Store the answer through the ioctl argument pointer.
    ///
    /// # Safety
    /// `argp` must be valid for a write of the answer's C type.
    pub unsafe fn store(self, argp: *mut c_void) {
        match self {
            BlockAnswer::Bytes(v) => *(argp as *mut u64) = v,
            BlockAnswer::PhysicalBlockSize(v) => *(argp as *mut c_uint) = v,
            BlockAnswer::LogicalBlockSize(v) => *(argp as *mut c_int) = v,
        }
    }
}

/// Answer `request` for the device node at `device_path` (a fixture path).
pub fn synthesize(root: &FixtureRoot, device_path: &Path, request: c_ulong) -> Result<BlockAnswer> {
    let query = BlockQuery::from_request(request).ok_or_else(|| FixtureError::UnsupportedQuery {
        request: request as u64,
        path: device_path.to_path_buf(),
    })?;
    let device = device_path
        .file_name()
        .ok_or_else(|| FixtureError::NoDevice {
            path: device_path.to_path_buf(),
        })?;
    let attr_path = root.block_attr_path(device, query.attribute());
    let raw = read_unsigned(&attr_path)?;

    let answer = match query {
        BlockQuery::Capacity => BlockAnswer::Bytes(
            raw.checked_mul(SYSFS_SECTOR_SIZE)
                .ok_or(FixtureError::Overflow { path: attr_path })?,
        ),
        // Narrowed exactly as a C cast would.
        BlockQuery::PhysicalBlockSize => BlockAnswer::PhysicalBlockSize(raw as c_uint),
        BlockQuery::LogicalBlockSize => BlockAnswer::LogicalBlockSize(raw as c_int),
    };
    fixroot_config::log_synth_debug!(
        "synthesized block device answer",
        device = tracing::field::debug(device),
        answer = tracing::field::debug(answer),
    );
    Ok(answer)
}
