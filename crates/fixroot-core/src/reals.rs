//! Host operations that never re-enter interposed symbols.
//!
//! Path operations go straight to the kernel through `syscall(2)`. The few
//! that only exist in libc (`fopen`, `glob`, `realpath`, `sysconf`) are
//! looked up with `dlsym(RTLD_NEXT)` so a preloaded copy of this crate
//! reaches the next definition, not its own export.

use std::ffi::{CStr, CString, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

use libc::{c_char, c_int, c_long, c_void};

use crate::identity::UtsName;
use crate::ops::{DescriptorLookup, GlobErrFn, SystemOps};

/// Lazily resolved next definition of a libc symbol.
pub struct RealSymbol {
    ptr: AtomicPtr<c_void>,
    name: &'static str,
}

impl RealSymbol {
    /// `name` must be NUL-terminated.
    pub const fn new(name: &'static str) -> Self {
        Self {
            ptr: AtomicPtr::new(std::ptr::null_mut()),
            name,
        }
    }

    /// The symbol's address, or null if no later object defines it.
    pub fn get(&self) -> *mut c_void {
        let p = self.ptr.load(Ordering::Acquire);
        if !p.is_null() {
            return p;
        }
        let f = unsafe { libc::dlsym(libc::RTLD_NEXT, self.name.as_ptr() as *const c_char) };
        self.ptr.store(f, Ordering::Release);
        f
    }

    /// The symbol cast to a function pointer type.
    ///
    /// # Safety
    /// `F` must be the symbol's real signature.
    unsafe fn function<F: Copy>(&self) -> io::Result<F> {
        let p = self.get();
        if p.is_null() {
            return Err(io::Error::from_raw_os_error(libc::ENOSYS));
        }
        Ok(std::mem::transmute_copy::<*mut c_void, F>(&p))
    }
}

pub static REAL_FOPEN: RealSymbol = RealSymbol::new("fopen\0");
pub static REAL_GLOB: RealSymbol = RealSymbol::new("glob\0");
pub static REAL_REALPATH: RealSymbol = RealSymbol::new("realpath\0");
pub static REAL_SYSCONF: RealSymbol = RealSymbol::new("sysconf\0");

type FopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut libc::FILE;
type GlobFn =
    unsafe extern "C" fn(*const c_char, c_int, GlobErrFn, *mut libc::glob_t) -> c_int;
type RealpathFn = unsafe extern "C" fn(*const c_char, *mut c_char) -> *mut c_char;
type SysconfFn = unsafe extern "C" fn(c_int) -> c_long;

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}

fn check(ret: c_long) -> io::Result<c_long> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

unsafe fn raw_fstatat(path: &Path, flags: c_int) -> io::Result<libc::stat> {
    let cpath = c_path(path)?;
    let mut st: libc::stat = std::mem::zeroed();
    check(libc::syscall(
        libc::SYS_newfstatat,
        libc::AT_FDCWD,
        cpath.as_ptr(),
        &mut st as *mut libc::stat,
        flags,
    ))?;
    Ok(st)
}

unsafe fn raw_readlinkat(dirfd: c_int, path: &CStr) -> io::Result<PathBuf> {
    let mut buf = vec![0u8; libc::PATH_MAX as usize];
    let n = check(libc::syscall(
        libc::SYS_readlinkat,
        dirfd,
        path.as_ptr(),
        buf.as_mut_ptr() as *mut c_char,
        buf.len(),
    ))?;
    buf.truncate(n as usize);
    Ok(PathBuf::from(OsStr::from_bytes(&buf)))
}

/// [`SystemOps`] over the running kernel and the next libc in link order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcOps;

impl SystemOps for LibcOps {
    type Stream = NonNull<libc::FILE>;

    fn current_dir(&self) -> io::Result<PathBuf> {
        let mut buf = vec![0u8; libc::PATH_MAX as usize];
        // Returns the length including the terminator.
        let n = check(unsafe {
            libc::syscall(libc::SYS_getcwd, buf.as_mut_ptr() as *mut c_char, buf.len())
        })?;
        buf.truncate((n as usize).saturating_sub(1));
        Ok(PathBuf::from(OsStr::from_bytes(&buf)))
    }

    fn chdir(&self, path: &Path) -> io::Result<()> {
        let cpath = c_path(path)?;
        check(unsafe { libc::syscall(libc::SYS_chdir, cpath.as_ptr()) }).map(drop)
    }

    fn stat(&self, path: &Path) -> io::Result<libc::stat> {
        unsafe { raw_fstatat(path, 0) }
    }

    fn lstat(&self, path: &Path) -> io::Result<libc::stat> {
        unsafe { raw_fstatat(path, libc::AT_SYMLINK_NOFOLLOW) }
    }

    fn access(&self, path: &Path, mode: c_int) -> io::Result<()> {
        let cpath = c_path(path)?;
        check(unsafe {
            libc::syscall(libc::SYS_faccessat, libc::AT_FDCWD, cpath.as_ptr(), mode)
        })
        .map(drop)
    }

    fn open(&self, path: &Path, flags: c_int, mode: libc::mode_t) -> io::Result<RawFd> {
        self.openat(libc::AT_FDCWD, path, flags, mode)
    }

    fn openat(
        &self,
        dirfd: RawFd,
        path: &Path,
        flags: c_int,
        mode: libc::mode_t,
    ) -> io::Result<RawFd> {
        let cpath = c_path(path)?;
        let fd = check(unsafe {
            libc::syscall(libc::SYS_openat, dirfd, cpath.as_ptr(), flags, mode)
        })?;
        Ok(fd as RawFd)
    }

    fn fopen(&self, path: &Path, mode: &CStr) -> io::Result<Self::Stream> {
        let cpath = c_path(path)?;
        let real: FopenFn = unsafe { REAL_FOPEN.function()? };
        let file = unsafe { real(cpath.as_ptr(), mode.as_ptr()) };
        NonNull::new(file).ok_or_else(io::Error::last_os_error)
    }

    fn glob(
        &self,
        pattern: &Path,
        flags: c_int,
        errfunc: GlobErrFn,
        pglob: &mut libc::glob_t,
    ) -> c_int {
        let cpattern = match c_path(pattern) {
            Ok(c) => c,
            Err(_) => return libc::GLOB_NOMATCH,
        };
        match unsafe { REAL_GLOB.function::<GlobFn>() } {
            Ok(real) => unsafe { real(cpattern.as_ptr(), flags, errfunc, pglob) },
            Err(_) => libc::GLOB_ABORTED,
        }
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        let cpath = c_path(path)?;
        unsafe { raw_readlinkat(libc::AT_FDCWD, &cpath) }
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        let cpath = c_path(path)?;
        let real: RealpathFn = unsafe { REAL_REALPATH.function()? };
        let resolved = unsafe { real(cpath.as_ptr(), std::ptr::null_mut()) };
        if resolved.is_null() {
            return Err(io::Error::last_os_error());
        }
        let out = unsafe { PathBuf::from(OsStr::from_bytes(CStr::from_ptr(resolved).to_bytes())) };
        unsafe { libc::free(resolved as *mut c_void) };
        Ok(out)
    }

    fn sysconf(&self, name: c_int) -> c_long {
        match unsafe { REAL_SYSCONF.function::<SysconfFn>() } {
            Ok(real) => unsafe { real(name) },
            Err(_) => -1,
        }
    }

    fn uname(&self) -> io::Result<UtsName> {
        let mut raw: libc::utsname = unsafe { std::mem::zeroed() };
        check(unsafe { libc::syscall(libc::SYS_uname, &mut raw as *mut libc::utsname) })?;
        Ok(UtsName::from(&raw))
    }
}

/// Descriptor paths from the `/proc/self/fd` links.
///
/// A descriptor whose file has been unlinked reads back as
/// `"<path> (deleted)"`; under a fixture root its basename then names no
/// recorded device and the geometry read fails as a fixture fault.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcFdLookup;

impl DescriptorLookup for ProcFdLookup {
    fn path_for_fd(&self, fd: RawFd) -> Option<PathBuf> {
        let link = CString::new(format!("/proc/self/fd/{}", fd)).ok()?;
        let target = unsafe { raw_readlinkat(libc::AT_FDCWD, &link) }.ok()?;
        // Pipes, sockets and anonymous inodes read back as "type:[inode]".
        target.is_absolute().then_some(target)
    }
}
