//! The fixture root and the fixed file layout beneath it.

use std::borrow::Cow;
use std::ffi::{CStr, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::{FixtureError, Result};

/// Absolute, symlink-resolved fixture directory without a trailing separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureRoot {
    path: PathBuf,
}

impl FixtureRoot {
    /// Resolve a configured root through `realpath`.
    ///
    /// The resolver is injected so a preloaded process can use the original
    /// `realpath` rather than its own interposed one.
    pub fn resolve_with(
        raw: &Path,
        realpath: impl FnOnce(&Path) -> io::Result<PathBuf>,
    ) -> Result<Self> {
        let resolved = realpath(raw).map_err(|source| FixtureError::RootUnresolvable {
            root: raw.to_path_buf(),
            source,
        })?;
        let mut bytes = resolved.as_os_str().as_bytes();
        while let Some(stripped) = bytes.strip_suffix(b"/") {
            bytes = stripped;
        }
        if bytes.is_empty() {
            return Err(FixtureError::RootIsFilesystemRoot {
                root: raw.to_path_buf(),
            });
        }
        Ok(Self {
            path: PathBuf::from(OsStr::from_bytes(bytes)),
        })
    }

    /// Resolve with the standard library's canonicalization.
    pub fn resolve(raw: &Path) -> Result<Self> {
        Self::resolve_with(raw, |p| p.canonicalize())
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.path.as_os_str().as_bytes()
    }

    /// The remainder of `bytes` after the root, if the root is a
    /// component-wise prefix. The remainder is empty or starts with `/`.
    pub fn strip_prefix_bytes<'b>(&self, bytes: &'b [u8]) -> Option<&'b [u8]> {
        let rest = bytes.strip_prefix(self.as_bytes())?;
        if rest.is_empty() || rest[0] == b'/' {
            Some(rest)
        } else {
            None
        }
    }

    /// True if `path` is the root or lies beneath it.
    pub fn contains(&self, path: &Path) -> bool {
        self.strip_prefix_bytes(path.as_os_str().as_bytes())
            .is_some()
    }

    /// Root-prefixed form of an absolute path.
    pub fn join_absolute(&self, absolute: &[u8]) -> PathBuf {
        let mut joined = Vec::with_capacity(self.as_bytes().len() + absolute.len());
        joined.extend_from_slice(self.as_bytes());
        joined.extend_from_slice(absolute);
        PathBuf::from(OsStr::from_bytes(&joined))
    }

    /// Remove the root from a returned path so callers never see it.
    pub fn unmask<'p>(&self, path: &'p Path) -> Cow<'p, Path> {
        match self.strip_prefix_bytes(path.as_os_str().as_bytes()) {
            Some([]) => Cow::Owned(PathBuf::from("/")),
            Some(rest) => Cow::Borrowed(Path::new(OsStr::from_bytes(rest))),
            None => Cow::Borrowed(path),
        }
    }

    /// [`unmask`](Self::unmask) on a NUL-terminated buffer owned by C code.
    ///
    /// The string only ever shrinks, so the buffer capacity is never exceeded.
    ///
    /// # Safety
    /// `s` must point to a writable, NUL-terminated string.
    pub unsafe fn unmask_c_str_in_place(&self, s: *mut libc::c_char) {
        if s.is_null() {
            return;
        }
        let bytes = CStr::from_ptr(s).to_bytes();
        let rest_len = match self.strip_prefix_bytes(bytes) {
            Some(rest) => rest.len(),
            None => return,
        };
        if rest_len == 0 {
            *s = b'/' as libc::c_char;
            *s.add(1) = 0;
        } else {
            let root_len = self.as_bytes().len();
            // Overlapping move, terminator included.
            std::ptr::copy(s.add(root_len), s, rest_len + 1);
        }
    }

    /// `<root>/sysconf/<id>`
    pub fn sysconf_path(&self, id: libc::c_int) -> PathBuf {
        self.path.join("sysconf").join(id.to_string())
    }

    /// `<root>/arch`
    pub fn arch_path(&self) -> PathBuf {
        self.path.join("arch")
    }

    /// `<root>/sys/block/<device>/<attr>`, only the device basename is used.
    pub fn block_attr_path(&self, device: &OsStr, attr: &str) -> PathBuf {
        self.path.join("sys/block").join(device).join(attr)
    }
}
