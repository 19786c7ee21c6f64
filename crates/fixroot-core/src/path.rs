//! Classification of caller paths and their mapping into the fixture tree.

use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::namespace::NamespaceSet;
use crate::root::FixtureRoot;

/// A caller path that falls in a virtual namespace, rooted in the fixture tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedPath {
    original: PathBuf,
    fixture: PathBuf,
}

impl MappedPath {
    /// The on-disk fixture location operations are delegated to.
    pub fn as_path(&self) -> &Path {
        &self.fixture
    }

    /// The absolute path the caller asked for.
    pub fn original(&self) -> &Path {
        &self.original
    }
}

/// Absolute form of `path`: relative inputs are prefixed with `<cwd>/`.
///
/// No `.`/`..` normalization happens here; classification is literal.
pub fn absolutize(path: &Path, cwd: impl FnOnce() -> io::Result<PathBuf>) -> io::Result<Vec<u8>> {
    let bytes = path.as_os_str().as_bytes();
    if bytes.first() == Some(&b'/') {
        return Ok(bytes.to_vec());
    }
    let cwd = cwd()?;
    let cwd = cwd.as_os_str().as_bytes();
    let mut absolute = Vec::with_capacity(cwd.len() + 1 + bytes.len());
    absolute.extend_from_slice(cwd);
    absolute.push(b'/');
    absolute.extend_from_slice(bytes);
    Ok(absolute)
}

/// Map an absolute path into the fixture tree if a namespace claims it.
pub fn classify_and_map(
    root: &FixtureRoot,
    namespaces: &NamespaceSet,
    absolute: &[u8],
) -> Option<MappedPath> {
    if !namespaces.matches(absolute) {
        return None;
    }
    Some(MappedPath {
        original: PathBuf::from(OsStr::from_bytes(absolute)),
        fixture: root.join_absolute(absolute),
    })
}
