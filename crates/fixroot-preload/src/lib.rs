//! fixroot preload library
//!
//! Loaded with `LD_PRELOAD`, it exports libc entry points that forward to a
//! process-wide [`Redirector`] configured from the environment
//! (`FIXROOT_TEST_DIR`, `FIXROOT_NAMESPACES`, `FIXROOT_VERBOSE`).
//!
//! Anything the library itself does while handling a call (reading fixture
//! files, logging) goes through the same exported symbols. A thread-local
//! guard sends those nested calls straight to the original operations.

use std::cell::Cell;
use std::ffi::{CStr, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::OnceLock;

use libc::{c_char, c_int};

use fixroot_config::{log_preload_debug, Config};
use fixroot_core::{LibcOps, Redirector};

#[cfg(target_os = "linux")]
mod interpose;

pub(crate) type Preloaded = Redirector<LibcOps, fixroot_core::ProcFdLookup>;

static REDIRECTOR: OnceLock<Preloaded> = OnceLock::new();

pub(crate) fn redirector() -> &'static Preloaded {
    REDIRECTOR.get_or_init(|| {
        let config = Config::from_env();
        if config.logging.verbose {
            fixroot_config::logging::init_verbose_logging();
        }
        log_preload_debug!(
            "preload initialized",
            root = tracing::field::debug(&config.fixture.root),
            pid = std::process::id(),
        );
        Redirector::from_config(&config)
    })
}

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside an interposed call.
pub(crate) struct HookGuard(());

impl HookGuard {
    /// `None` if the thread is already inside a hook, or its thread-locals
    /// are gone (thread teardown).
    pub(crate) fn enter() -> Option<Self> {
        IN_HOOK
            .try_with(|active| {
                if active.replace(true) {
                    None
                } else {
                    Some(HookGuard(()))
                }
            })
            .ok()
            .flatten()
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        let _ = IN_HOOK.try_with(|active| active.set(false));
    }
}

/// Run `redirected` against the process redirector, or `original` against
/// the un-interposed operations when called from inside a hook.
pub(crate) fn dispatch<T>(
    redirected: impl FnOnce(&Preloaded) -> T,
    original: impl FnOnce(&LibcOps) -> T,
) -> T {
    match HookGuard::enter() {
        Some(_guard) => redirected(redirector()),
        None => original(&LibcOps),
    }
}

pub(crate) fn set_errno(e: c_int) {
    unsafe { *libc::__errno_location() = e };
}

pub(crate) fn errno_of(err: &io::Error) -> c_int {
    err.raw_os_error().unwrap_or(libc::EIO)
}

/// Borrow a C path argument. Null yields `EFAULT`.
///
/// # Safety
/// `p` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn c_path<'a>(p: *const c_char) -> io::Result<&'a Path> {
    if p.is_null() {
        return Err(io::Error::from_raw_os_error(libc::EFAULT));
    }
    Ok(Path::new(OsStr::from_bytes(CStr::from_ptr(p).to_bytes())))
}

/// Convert a unit result to the C convention: `0`, or `-1` with errno set.
pub(crate) fn c_status(result: io::Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(err) => {
            set_errno(errno_of(&err));
            -1
        }
    }
}
