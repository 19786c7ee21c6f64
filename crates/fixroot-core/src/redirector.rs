//! The redirection context.
//!
//! A [`Redirector`] owns everything a redirection decision depends on: the
//! configured root (resolved once, on first use), the namespace set, the
//! original operations, and the handler for fixture faults. Each operation
//! has the success and failure shape of the call it stands in for.

use std::borrow::Cow;
use std::ffi::CStr;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libc::{c_int, c_long, c_ulong};

use fixroot_config::{log_redirect_debug, Config};

use crate::device::{self, BlockAnswer};
use crate::error::FixtureError;
use crate::fatal::{abort_with_diagnostic, FatalHandler};
use crate::guard::{self, AccessIntent};
use crate::identity::UtsName;
use crate::namespace::NamespaceSet;
use crate::ops::{DescriptorLookup, GlobErrFn, SystemOps};
use crate::path::{self as mapping, MappedPath};
use crate::reals::{LibcOps, ProcFdLookup};
use crate::root::FixtureRoot;
use crate::scalar;

pub struct Redirector<O: SystemOps = LibcOps, L: DescriptorLookup = ProcFdLookup> {
    raw_root: Option<PathBuf>,
    namespaces: NamespaceSet,
    root: OnceLock<Option<FixtureRoot>>,
    ops: O,
    fds: L,
    on_fatal: FatalHandler,
}

/// Builder for [`Redirector`].
#[derive(Clone)]
pub struct RedirectorBuilder {
    root: Option<PathBuf>,
    namespaces: NamespaceSet,
    on_fatal: FatalHandler,
}

impl Default for RedirectorBuilder {
    fn default() -> Self {
        Self {
            root: None,
            namespaces: NamespaceSet::default(),
            on_fatal: abort_with_diagnostic,
        }
    }
}

impl RedirectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixture root as configured. Empty means inactive.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.root = (!root.as_os_str().is_empty()).then_some(root);
        self
    }

    pub fn namespaces(mut self, namespaces: NamespaceSet) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn on_fatal(mut self, handler: FatalHandler) -> Self {
        self.on_fatal = handler;
        self
    }

    pub fn build<O: SystemOps, L: DescriptorLookup>(self, ops: O, fds: L) -> Redirector<O, L> {
        Redirector {
            raw_root: self.root,
            namespaces: self.namespaces,
            root: OnceLock::new(),
            ops,
            fds,
            on_fatal: self.on_fatal,
        }
    }
}

impl Redirector<LibcOps, ProcFdLookup> {
    /// Redirector over the host, configured from `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut builder =
            RedirectorBuilder::new().namespaces(NamespaceSet::new(config.effective_namespaces()));
        if let Some(root) = &config.fixture.root {
            builder = builder.root(root.clone());
        }
        builder.build(LibcOps, ProcFdLookup)
    }
}

impl<O: SystemOps, L: DescriptorLookup> Redirector<O, L> {
    /// The original operations, for callers that must bypass redirection.
    pub fn ops(&self) -> &O {
        &self.ops
    }

    pub fn namespaces(&self) -> &NamespaceSet {
        &self.namespaces
    }

    /// The resolved root, or `None` when redirection is off.
    ///
    /// Resolution happens once. A configured root that cannot be resolved is
    /// a fixture fault.
    pub fn root(&self) -> Option<&FixtureRoot> {
        self.root
            .get_or_init(|| {
                let raw = self.raw_root.as_deref()?;
                match FixtureRoot::resolve_with(raw, |p| self.ops.realpath(p)) {
                    Ok(root) => {
                        log_redirect_debug!(
                            "fixture root resolved",
                            root = tracing::field::debug(root.as_path()),
                        );
                        Some(root)
                    }
                    Err(err) => self.fatal(err),
                }
            })
            .as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.raw_root.is_some()
    }

    fn fatal(&self, err: FixtureError) -> ! {
        (self.on_fatal)(&err)
    }

    /// Map `path` into the fixture tree if it falls in a virtual namespace.
    ///
    /// A working directory that cannot be read leaves relative paths alone.
    pub fn classify_and_map(&self, path: &Path) -> Option<MappedPath> {
        let root = self.root()?;
        let absolute = mapping::absolutize(path, || self.ops.current_dir()).ok()?;
        let mapped = mapping::classify_and_map(root, &self.namespaces, &absolute)?;
        log_redirect_debug!(
            "redirecting",
            from = tracing::field::debug(mapped.original()),
            to = tracing::field::debug(mapped.as_path()),
        );
        Some(mapped)
    }

    /// Strip the fixture root from a path on its way back to the caller.
    pub fn unmask<'p>(&self, path: &'p Path) -> Cow<'p, Path> {
        match self.root() {
            Some(root) => root.unmask(path),
            None => Cow::Borrowed(path),
        }
    }

    fn target<'p>(&self, path: &'p Path) -> Cow<'p, Path> {
        match self.classify_and_map(path) {
            Some(mapped) => Cow::Owned(mapped.as_path().to_path_buf()),
            None => Cow::Borrowed(path),
        }
    }

    fn guarded_target<'p>(&self, path: &'p Path, intent: AccessIntent) -> io::Result<Cow<'p, Path>> {
        match self.classify_and_map(path) {
            Some(mapped) => {
                guard::check(&mapped, intent)?;
                Ok(Cow::Owned(mapped.as_path().to_path_buf()))
            }
            None => Ok(Cow::Borrowed(path)),
        }
    }

    pub fn chdir(&self, path: &Path) -> io::Result<()> {
        self.ops.chdir(&self.target(path))
    }

    pub fn stat(&self, path: &Path) -> io::Result<libc::stat> {
        self.ops.stat(&self.target(path))
    }

    pub fn lstat(&self, path: &Path) -> io::Result<libc::stat> {
        self.ops.lstat(&self.target(path))
    }

    pub fn access(&self, path: &Path, mode: c_int) -> io::Result<()> {
        self.ops.access(&self.target(path), mode)
    }

    /// `open(2)`. Write intent on a mapped path fails with `EROFS`.
    pub fn open(&self, path: &Path, flags: c_int, mode: libc::mode_t) -> io::Result<RawFd> {
        let target = self.guarded_target(path, AccessIntent::from_open_flags(flags))?;
        self.ops.open(&target, flags, mode)
    }

    /// `openat(2)`. Only absolute paths and paths relative to the working
    /// directory are classified; other relative paths pass through.
    pub fn openat(
        &self,
        dirfd: RawFd,
        path: &Path,
        flags: c_int,
        mode: libc::mode_t,
    ) -> io::Result<RawFd> {
        if dirfd != libc::AT_FDCWD && !path.is_absolute() {
            return self.ops.openat(dirfd, path, flags, mode);
        }
        let target = self.guarded_target(path, AccessIntent::from_open_flags(flags))?;
        self.ops.openat(dirfd, &target, flags, mode)
    }

    pub fn fopen(&self, path: &Path, mode: &CStr) -> io::Result<O::Stream> {
        let target = self.guarded_target(path, AccessIntent::from_fopen_mode(mode.to_bytes()))?;
        self.ops.fopen(&target, mode)
    }

    /// `glob(3)` against the mapped pattern. When the pattern was mapped,
    /// every match is unmasked in place in `pglob`.
    pub fn glob(
        &self,
        pattern: &Path,
        flags: c_int,
        errfunc: GlobErrFn,
        pglob: &mut libc::glob_t,
    ) -> c_int {
        let Some(mapped) = self.classify_and_map(pattern) else {
            return self.ops.glob(pattern, flags, errfunc, pglob);
        };
        let ret = self.ops.glob(mapped.as_path(), flags, errfunc, pglob);
        if ret != 0 || pglob.gl_pathv.is_null() {
            return ret;
        }
        if let Some(root) = self.root() {
            let start = pglob.gl_offs;
            for i in start..start + pglob.gl_pathc {
                // SAFETY: glob filled gl_pathv[gl_offs..gl_offs + gl_pathc]
                // with writable, NUL-terminated strings.
                unsafe { root.unmask_c_str_in_place(*pglob.gl_pathv.add(i)) };
            }
        }
        ret
    }

    /// `readlink(2)`. Link contents are returned as stored, not unmasked.
    pub fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        self.ops.readlink(&self.target(path))
    }

    /// `realpath(3)`. A mapped path resolves inside the fixture and comes
    /// back unmasked; anything else is the original answer.
    pub fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        let Some(mapped) = self.classify_and_map(path) else {
            return self.ops.realpath(path);
        };
        let resolved = self.ops.realpath(mapped.as_path())?;
        Ok(self.unmask(&resolved).into_owned())
    }

    /// The working directory, unmasked after a redirected `chdir`.
    pub fn getcwd(&self) -> io::Result<PathBuf> {
        let cwd = self.ops.current_dir()?;
        Ok(self.unmask(&cwd).into_owned())
    }

    /// Answer a block device `ioctl` from the fixture tree.
    ///
    /// `None` means the descriptor is not a fixture device and the original
    /// `ioctl` should run. A fixture device with a missing or malformed
    /// attribute, or a request outside the supported set, is a fault.
    pub fn block_device_query(&self, fd: RawFd, request: c_ulong) -> Option<BlockAnswer> {
        if fd <= 0 {
            return None;
        }
        let root = self.root()?;
        let device_path = self.fds.path_for_fd(fd)?;
        if !root.contains(&device_path) {
            return None;
        }
        match device::synthesize(root, &device_path, request) {
            Ok(answer) => Some(answer),
            Err(err) => self.fatal(err),
        }
    }

    /// `sysconf(3)`, read from `sysconf/<name>` when redirection is on.
    pub fn sysconf(&self, name: c_int) -> c_long {
        let Some(root) = self.root() else {
            return self.ops.sysconf(name);
        };
        match scalar::read_signed(&root.sysconf_path(name)) {
            Ok(value) => {
                fixroot_config::log_synth_debug!("sysconf from fixture", id = name, value = value);
                value as c_long
            }
            Err(err) => self.fatal(err),
        }
    }

    /// `uname(2)` with `machine` replaced by the `arch` fixture, if present.
    pub fn uname(&self) -> io::Result<UtsName> {
        let mut name = self.ops.uname()?;
        let Some(root) = self.root() else {
            return Ok(name);
        };
        let arch_path = root.arch_path();
        if self.ops.access(&arch_path, libc::F_OK).is_err() {
            return Ok(name);
        }
        match scalar::read_token(&arch_path) {
            Ok(machine) => {
                name.machine.set(machine.as_bytes());
                fixroot_config::log_synth_debug!("machine from fixture", machine = machine.as_str());
                Ok(name)
            }
            Err(err) => self.fatal(err),
        }
    }
}

impl<O: SystemOps, L: DescriptorLookup> std::fmt::Debug for Redirector<O, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redirector")
            .field("raw_root", &self.raw_root)
            .field("namespaces", &self.namespaces)
            .field("root", &self.root.get())
            .finish_non_exhaustive()
    }
}
