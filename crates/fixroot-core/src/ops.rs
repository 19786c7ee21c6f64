//! The host operations the redirector delegates to.
//!
//! Everything the redirector does to the real filesystem goes through
//! [`SystemOps`], so a preloaded library can hand it un-interposed entry
//! points and tests can hand it a recorder.

use std::ffi::CStr;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use libc::{c_char, c_int, c_long};

use crate::identity::UtsName;

/// `glob(3)` error callback.
pub type GlobErrFn = Option<unsafe extern "C" fn(*const c_char, c_int) -> c_int>;

pub trait SystemOps: Send + Sync {
    /// Handle returned by `fopen`.
    type Stream;

    fn current_dir(&self) -> io::Result<PathBuf>;
    fn chdir(&self, path: &Path) -> io::Result<()>;
    fn stat(&self, path: &Path) -> io::Result<libc::stat>;
    fn lstat(&self, path: &Path) -> io::Result<libc::stat>;
    fn access(&self, path: &Path, mode: c_int) -> io::Result<()>;
    fn open(&self, path: &Path, flags: c_int, mode: libc::mode_t) -> io::Result<RawFd>;
    fn openat(
        &self,
        dirfd: RawFd,
        path: &Path,
        flags: c_int,
        mode: libc::mode_t,
    ) -> io::Result<RawFd>;
    fn fopen(&self, path: &Path, mode: &CStr) -> io::Result<Self::Stream>;
    /// Raw `glob(3)`: the return value is the glob status code.
    fn glob(
        &self,
        pattern: &Path,
        flags: c_int,
        errfunc: GlobErrFn,
        pglob: &mut libc::glob_t,
    ) -> c_int;
    fn readlink(&self, path: &Path) -> io::Result<PathBuf>;
    fn realpath(&self, path: &Path) -> io::Result<PathBuf>;
    fn sysconf(&self, name: c_int) -> c_long;
    fn uname(&self) -> io::Result<UtsName>;
}

/// Recovers the path an open descriptor refers to.
pub trait DescriptorLookup: Send + Sync {
    fn path_for_fd(&self, fd: RawFd) -> Option<PathBuf>;
}

/// Where a `getcwd(3)` result is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CwdBuffer {
    /// The caller's buffer.
    Caller,
    /// A fresh `malloc` allocation of this many bytes, freed by the caller.
    Allocate(usize),
}

/// Apply glibc's `getcwd(buf, size)` buffer rules to a result of `needed`
/// bytes (terminator included). A null `buf` with `size` 0 allocates exactly
/// what is needed; a null `buf` with a nonzero `size` allocates `size` bytes.
pub fn cwd_buffer(buf_is_null: bool, size: usize, needed: usize) -> io::Result<CwdBuffer> {
    match (buf_is_null, size) {
        (false, 0) => Err(io::Error::from_raw_os_error(libc::EINVAL)),
        (true, 0) => Ok(CwdBuffer::Allocate(needed)),
        _ if needed > size => Err(io::Error::from_raw_os_error(libc::ERANGE)),
        (true, _) => Ok(CwdBuffer::Allocate(size)),
        (false, _) => Ok(CwdBuffer::Caller),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cwd_buffer_rules() {
        assert_eq!(cwd_buffer(true, 0, 10).unwrap(), CwdBuffer::Allocate(10));
        assert_eq!(cwd_buffer(true, 4096, 10).unwrap(), CwdBuffer::Allocate(4096));
        assert_eq!(cwd_buffer(false, 10, 10).unwrap(), CwdBuffer::Caller);

        let err = cwd_buffer(false, 0, 10).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
        for buf_is_null in [true, false] {
            let err = cwd_buffer(buf_is_null, 9, 10).unwrap_err();
            assert_eq!(err.raw_os_error(), Some(libc::ERANGE));
        }
    }
}
