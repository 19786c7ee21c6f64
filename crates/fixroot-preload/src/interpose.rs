// =============================================================================
// Linux LD_PRELOAD Symbol Exports
// =============================================================================
// Each export converts its C arguments, hands the call to the process
// redirector (or to the original operation when re-entered), and converts the
// result back: return value on success, failure value plus errno otherwise.

use std::io;
use std::path::Path;
use std::ptr;

use libc::{c_char, c_int, c_long, c_ulong, c_void, mode_t, size_t, ssize_t};

use fixroot_core::{cwd_buffer, CwdBuffer, GlobErrFn, SystemOps};

use crate::{c_path, c_status, dispatch, errno_of, set_errno};

fn fail<T>(err: &io::Error, value: T) -> T {
    set_errno(errno_of(err));
    value
}

/// Copy `path` out as a C string: into `buf` (of `capacity` bytes) when
/// given, else into a fresh `malloc` allocation the caller frees.
unsafe fn emit_path(path: &Path, buf: *mut c_char, capacity: usize) -> *mut c_char {
    use std::os::unix::ffi::OsStrExt;
    let bytes = path.as_os_str().as_bytes();
    let needed = bytes.len() + 1;
    let out = if buf.is_null() {
        let p = libc::malloc(needed) as *mut c_char;
        if p.is_null() {
            set_errno(libc::ENOMEM);
            return ptr::null_mut();
        }
        p
    } else if needed > capacity {
        set_errno(libc::ERANGE);
        return ptr::null_mut();
    } else {
        buf
    };
    ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, out, bytes.len());
    *out.add(bytes.len()) = 0;
    out
}

unsafe fn store_stat(result: io::Result<libc::stat>, buf: *mut libc::stat) -> c_int {
    match result {
        Ok(_) if buf.is_null() => fail(&io::Error::from_raw_os_error(libc::EFAULT), -1),
        Ok(st) => {
            *buf = st;
            0
        }
        Err(err) => fail(&err, -1),
    }
}

unsafe fn stat_impl(path: *const c_char, buf: *mut libc::stat) -> c_int {
    let result = c_path(path).and_then(|p| dispatch(|r| r.stat(p), |o| o.stat(p)));
    store_stat(result, buf)
}

unsafe fn lstat_impl(path: *const c_char, buf: *mut libc::stat) -> c_int {
    let result = c_path(path).and_then(|p| dispatch(|r| r.lstat(p), |o| o.lstat(p)));
    store_stat(result, buf)
}

unsafe fn open_impl(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    let result = c_path(path).and_then(|p| {
        dispatch(|r| r.open(p, flags, mode), |o| o.open(p, flags, mode))
    });
    result.unwrap_or_else(|err| fail(&err, -1))
}

unsafe fn openat_impl(dirfd: c_int, path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    let result = c_path(path).and_then(|p| {
        dispatch(
            |r| r.openat(dirfd, p, flags, mode),
            |o| o.openat(dirfd, p, flags, mode),
        )
    });
    result.unwrap_or_else(|err| fail(&err, -1))
}

unsafe fn fopen_impl(path: *const c_char, mode: *const c_char) -> *mut libc::FILE {
    if mode.is_null() {
        set_errno(libc::EINVAL);
        return ptr::null_mut();
    }
    let mode = std::ffi::CStr::from_ptr(mode);
    let result = c_path(path).and_then(|p| dispatch(|r| r.fopen(p, mode), |o| o.fopen(p, mode)));
    match result {
        Ok(stream) => stream.as_ptr(),
        Err(err) => fail(&err, ptr::null_mut()),
    }
}

unsafe fn realpath_impl(path: *const c_char, resolved: *mut c_char) -> *mut c_char {
    let result = c_path(path).and_then(|p| dispatch(|r| r.realpath(p), |o| o.realpath(p)));
    match result {
        Ok(out) => emit_path(&out, resolved, libc::PATH_MAX as usize),
        Err(err) => fail(&err, ptr::null_mut()),
    }
}

// --- Directory ---

#[no_mangle]
pub unsafe extern "C" fn chdir(path: *const c_char) -> c_int {
    c_status(c_path(path).and_then(|p| dispatch(|r| r.chdir(p), |o| o.chdir(p))))
}

#[no_mangle]
pub unsafe extern "C" fn getcwd(buf: *mut c_char, size: size_t) -> *mut c_char {
    use std::os::unix::ffi::OsStrExt;
    let cwd = match dispatch(|r| r.getcwd(), |o| o.current_dir()) {
        Ok(cwd) => cwd,
        Err(err) => return fail(&err, ptr::null_mut()),
    };
    let needed = cwd.as_os_str().as_bytes().len() + 1;
    match cwd_buffer(buf.is_null(), size, needed) {
        Ok(CwdBuffer::Caller) => emit_path(&cwd, buf, size),
        Ok(CwdBuffer::Allocate(len)) => {
            let out = libc::malloc(len) as *mut c_char;
            if out.is_null() {
                set_errno(libc::ENOMEM);
                return ptr::null_mut();
            }
            emit_path(&cwd, out, len)
        }
        Err(err) => fail(&err, ptr::null_mut()),
    }
}

// --- stat family ---

#[no_mangle]
pub unsafe extern "C" fn stat(path: *const c_char, buf: *mut libc::stat) -> c_int {
    stat_impl(path, buf)
}

#[no_mangle]
pub unsafe extern "C" fn lstat(path: *const c_char, buf: *mut libc::stat) -> c_int {
    lstat_impl(path, buf)
}

#[no_mangle]
pub unsafe extern "C" fn __xstat(_ver: c_int, path: *const c_char, buf: *mut libc::stat) -> c_int {
    stat_impl(path, buf)
}

#[no_mangle]
pub unsafe extern "C" fn __lxstat(_ver: c_int, path: *const c_char, buf: *mut libc::stat) -> c_int {
    lstat_impl(path, buf)
}

// On LP64 targets `struct stat64` and `struct stat` share one layout.
#[cfg(target_pointer_width = "64")]
#[no_mangle]
pub unsafe extern "C" fn stat64(path: *const c_char, buf: *mut libc::stat64) -> c_int {
    stat_impl(path, buf as *mut libc::stat)
}

#[cfg(target_pointer_width = "64")]
#[no_mangle]
pub unsafe extern "C" fn lstat64(path: *const c_char, buf: *mut libc::stat64) -> c_int {
    lstat_impl(path, buf as *mut libc::stat)
}

#[cfg(target_pointer_width = "64")]
#[no_mangle]
pub unsafe extern "C" fn __xstat64(
    _ver: c_int,
    path: *const c_char,
    buf: *mut libc::stat64,
) -> c_int {
    stat_impl(path, buf as *mut libc::stat)
}

#[cfg(target_pointer_width = "64")]
#[no_mangle]
pub unsafe extern "C" fn __lxstat64(
    _ver: c_int,
    path: *const c_char,
    buf: *mut libc::stat64,
) -> c_int {
    lstat_impl(path, buf as *mut libc::stat)
}

#[no_mangle]
pub unsafe extern "C" fn access(path: *const c_char, mode: c_int) -> c_int {
    c_status(c_path(path).and_then(|p| dispatch(|r| r.access(p, mode), |o| o.access(p, mode))))
}

// --- open family ---

#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open_impl(path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open_impl(path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    openat_impl(dirfd, path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn openat64(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    openat_impl(dirfd, path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn fopen(path: *const c_char, mode: *const c_char) -> *mut libc::FILE {
    fopen_impl(path, mode)
}

#[no_mangle]
pub unsafe extern "C" fn fopen64(path: *const c_char, mode: *const c_char) -> *mut libc::FILE {
    fopen_impl(path, mode)
}

// --- Path-returning calls ---

#[no_mangle]
pub unsafe extern "C" fn glob(
    pattern: *const c_char,
    flags: c_int,
    errfunc: GlobErrFn,
    pglob: *mut libc::glob_t,
) -> c_int {
    if pglob.is_null() {
        set_errno(libc::EFAULT);
        return libc::GLOB_ABORTED;
    }
    match c_path(pattern) {
        Ok(p) => dispatch(
            |r| r.glob(p, flags, errfunc, &mut *pglob),
            |o| o.glob(p, flags, errfunc, &mut *pglob),
        ),
        Err(err) => fail(&err, libc::GLOB_ABORTED),
    }
}

#[no_mangle]
pub unsafe extern "C" fn readlink(path: *const c_char, buf: *mut c_char, bufsiz: size_t) -> ssize_t {
    use std::os::unix::ffi::OsStrExt;
    if buf.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    match c_path(path).and_then(|p| dispatch(|r| r.readlink(p), |o| o.readlink(p))) {
        Ok(target) => {
            // Truncated silently and without a terminator, like readlink(2).
            let bytes = target.as_os_str().as_bytes();
            let n = bytes.len().min(bufsiz);
            ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, buf, n);
            n as ssize_t
        }
        Err(err) => fail(&err, -1),
    }
}

#[no_mangle]
pub unsafe extern "C" fn realpath(path: *const c_char, resolved: *mut c_char) -> *mut c_char {
    realpath_impl(path, resolved)
}

/// Fortified `realpath`: the caller's buffer must hold `PATH_MAX` bytes.
#[no_mangle]
pub unsafe extern "C" fn __realpath_chk(
    path: *const c_char,
    resolved: *mut c_char,
    resolvedlen: size_t,
) -> *mut c_char {
    if !resolved.is_null() && resolvedlen < libc::PATH_MAX as size_t {
        std::process::abort();
    }
    realpath_impl(path, resolved)
}

// --- Synthesized queries ---

#[no_mangle]
pub unsafe extern "C" fn ioctl(fd: c_int, request: c_ulong, argp: *mut c_void) -> c_int {
    match dispatch(|r| r.block_device_query(fd, request), |_| None) {
        Some(_) if argp.is_null() => {
            set_errno(libc::EFAULT);
            -1
        }
        Some(answer) => {
            answer.store(argp);
            0
        }
        None => libc::syscall(libc::SYS_ioctl, fd, request, argp) as c_int,
    }
}

#[no_mangle]
pub unsafe extern "C" fn sysconf(name: c_int) -> c_long {
    dispatch(|r| r.sysconf(name), |o| o.sysconf(name))
}

#[no_mangle]
pub unsafe extern "C" fn uname(buf: *mut libc::utsname) -> c_int {
    let Some(buf) = buf.as_mut() else {
        set_errno(libc::EFAULT);
        return -1;
    };
    match dispatch(|r| r.uname(), |o| o.uname()) {
        Ok(name) => {
            name.write_to(buf);
            0
        }
        Err(err) => fail(&err, -1),
    }
}
