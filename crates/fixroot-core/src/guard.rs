//! Read-only policy for redirected resources.

use std::io;

use crate::path::MappedPath;

/// What an open call intends to do with the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Read,
    Write,
}

impl AccessIntent {
    /// Any of write-only, read-write, append, create or truncate is a write.
    pub fn from_open_flags(flags: libc::c_int) -> Self {
        const WRITE_FLAGS: libc::c_int =
            libc::O_WRONLY | libc::O_RDWR | libc::O_APPEND | libc::O_CREAT | libc::O_TRUNC;
        if flags & WRITE_FLAGS != 0 {
            AccessIntent::Write
        } else {
            AccessIntent::Read
        }
    }

    /// `w`/`a` modes and any `+` (update) mode are writes.
    pub fn from_fopen_mode(mode: &[u8]) -> Self {
        match mode.first() {
            Some(b'r') if !mode.contains(&b'+') => AccessIntent::Read,
            _ => AccessIntent::Write,
        }
    }
}

/// Refuse write intent against a fixture with `EROFS`.
pub fn check(mapped: &MappedPath, intent: AccessIntent) -> io::Result<()> {
    match intent {
        AccessIntent::Read => Ok(()),
        AccessIntent::Write => {
            fixroot_config::log_guard_info!(
                "denied write access to redirected path",
                path = tracing::field::debug(mapped.as_path()),
            );
            Err(io::Error::from_raw_os_error(libc::EROFS))
        }
    }
}
