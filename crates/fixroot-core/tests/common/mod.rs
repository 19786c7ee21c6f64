//! Shared helpers for the fixroot-core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::CStr;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Mutex;

use libc::{c_int, c_long};

use fixroot_config::testing::FixtureTree;
use fixroot_core::{
    DescriptorLookup, FixtureError, GlobErrFn, LibcOps, Redirector, RedirectorBuilder, SystemOps,
    UtsName,
};

/// Value `sysconf` reports when the host is asked.
pub const HOST_SYSCONF: c_long = 31337;
pub const HOST_MACHINE: &str = "x86_64";

/// Fault handler that turns a fixture fault into a test panic.
pub fn panic_on_fault(err: &FixtureError) -> ! {
    panic!("fixture fault: {}", err)
}

/// [`SystemOps`] that records every path it is handed and otherwise
/// delegates to [`LibcOps`]. The working directory, `uname` and `sysconf`
/// are simulated so tests never touch process-wide state; relative paths
/// are resolved against the simulated working directory before delegating.
pub struct RecordingOps {
    real: LibcOps,
    cwd: Mutex<PathBuf>,
    calls: Mutex<Vec<(&'static str, PathBuf)>>,
}

impl RecordingOps {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            real: LibcOps,
            cwd: Mutex::new(cwd.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, op: &'static str, path: &Path) {
        self.calls.lock().unwrap().push((op, path.to_path_buf()));
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.lock().unwrap().join(path)
        }
    }

    pub fn calls(&self) -> Vec<(&'static str, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    /// Paths handed to `op`, in call order.
    pub fn paths_for(&self, op: &str) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter(|(name, _)| *name == op)
            .map(|(_, p)| p)
            .collect()
    }
}

impl SystemOps for RecordingOps {
    type Stream = NonNull<libc::FILE>;

    fn current_dir(&self) -> io::Result<PathBuf> {
        Ok(self.cwd.lock().unwrap().clone())
    }

    fn chdir(&self, path: &Path) -> io::Result<()> {
        self.record("chdir", path);
        let resolved = self.resolve(path);
        let st = self.real.stat(&resolved)?;
        if st.st_mode & libc::S_IFMT != libc::S_IFDIR {
            return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
        }
        *self.cwd.lock().unwrap() = resolved;
        Ok(())
    }

    fn stat(&self, path: &Path) -> io::Result<libc::stat> {
        self.record("stat", path);
        self.real.stat(&self.resolve(path))
    }

    fn lstat(&self, path: &Path) -> io::Result<libc::stat> {
        self.record("lstat", path);
        self.real.lstat(&self.resolve(path))
    }

    fn access(&self, path: &Path, mode: c_int) -> io::Result<()> {
        self.record("access", path);
        self.real.access(&self.resolve(path), mode)
    }

    fn open(&self, path: &Path, flags: c_int, mode: libc::mode_t) -> io::Result<RawFd> {
        self.record("open", path);
        self.real.open(&self.resolve(path), flags, mode)
    }

    fn openat(
        &self,
        dirfd: RawFd,
        path: &Path,
        flags: c_int,
        mode: libc::mode_t,
    ) -> io::Result<RawFd> {
        self.record("openat", path);
        if dirfd == libc::AT_FDCWD {
            self.real.openat(dirfd, &self.resolve(path), flags, mode)
        } else {
            self.real.openat(dirfd, path, flags, mode)
        }
    }

    fn fopen(&self, path: &Path, mode: &CStr) -> io::Result<Self::Stream> {
        self.record("fopen", path);
        self.real.fopen(&self.resolve(path), mode)
    }

    fn glob(
        &self,
        pattern: &Path,
        flags: c_int,
        errfunc: GlobErrFn,
        pglob: &mut libc::glob_t,
    ) -> c_int {
        self.record("glob", pattern);
        self.real.glob(&self.resolve(pattern), flags, errfunc, pglob)
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        self.record("readlink", path);
        self.real.readlink(&self.resolve(path))
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        self.record("realpath", path);
        self.real.realpath(&self.resolve(path))
    }

    fn sysconf(&self, _name: c_int) -> c_long {
        HOST_SYSCONF
    }

    fn uname(&self) -> io::Result<UtsName> {
        Ok(UtsName {
            sysname: "Linux".into(),
            nodename: "testhost".into(),
            release: "6.1.0-test".into(),
            version: "#1 SMP".into(),
            machine: HOST_MACHINE.into(),
            domainname: "(none)".into(),
        })
    }
}

/// Descriptor table with fixed bindings.
#[derive(Default)]
pub struct FakeFds(HashMap<RawFd, PathBuf>);

impl FakeFds {
    pub fn bind(mut self, fd: RawFd, path: impl Into<PathBuf>) -> Self {
        self.0.insert(fd, path.into());
        self
    }
}

impl DescriptorLookup for FakeFds {
    fn path_for_fd(&self, fd: RawFd) -> Option<PathBuf> {
        self.0.get(&fd).cloned()
    }
}

pub type TestRedirector = Redirector<RecordingOps, FakeFds>;

/// Redirector rooted at `tree`, with the working directory at `/`.
pub fn redirector(tree: &FixtureTree) -> TestRedirector {
    redirector_with_fds(tree, FakeFds::default())
}

pub fn redirector_with_fds(tree: &FixtureTree, fds: FakeFds) -> TestRedirector {
    RedirectorBuilder::new()
        .root(&tree.root)
        .on_fatal(panic_on_fault)
        .build(RecordingOps::new("/"), fds)
}

/// Redirector with no fixture root configured.
pub fn inactive() -> TestRedirector {
    RedirectorBuilder::new()
        .on_fatal(panic_on_fault)
        .build(RecordingOps::new("/"), FakeFds::default())
}

pub fn close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

pub fn read_fd(fd: RawFd) -> String {
    use std::io::Read;
    use std::os::unix::io::FromRawFd;
    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    let mut out = String::new();
    file.read_to_string(&mut out).unwrap();
    out
}
