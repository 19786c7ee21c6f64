//! Path utilities shared by the CLI and test tooling.
//!
//! Paths handed to a preloaded child (the fixture root in particular) should be
//! resolved through these functions so the child sees an absolute location.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Resolve an existing directory to its canonical absolute form.
///
/// # Example
/// ```ignore
/// let root = resolve_existing_dir("fixtures/host1")?;
/// assert!(root.is_absolute());
/// ```
pub fn resolve_existing_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve directory: {}", path.display()))?;
    if !canonical.is_dir() {
        anyhow::bail!("Not a directory: {}", canonical.display());
    }
    Ok(canonical)
}

/// Check if a path is within a directory.
///
/// Both paths are canonicalized before comparison to handle symlinks and `..`.
/// Returns false if either path cannot be canonicalized.
pub fn is_within_directory(path: impl AsRef<Path>, dir: impl AsRef<Path>) -> bool {
    match (path.as_ref().canonicalize(), dir.as_ref().canonicalize()) {
        (Ok(canonical_path), Ok(canonical_dir)) => canonical_path.starts_with(&canonical_dir),
        _ => false,
    }
}

/// Location of an absolute host path inside a fixture tree.
///
/// `/proc/cpuinfo` under `/fx` becomes `/fx/proc/cpuinfo`. Relative inputs
/// are rejected since a fixture tree only mirrors absolute locations.
///
/// # Example
/// ```ignore
/// let p = mirror_path("/fx", "/sys/block/sda/size")?;
/// assert_eq!(p, PathBuf::from("/fx/sys/block/sda/size"));
/// ```
pub fn mirror_path(root: impl AsRef<Path>, host_path: impl AsRef<Path>) -> Result<PathBuf> {
    let host_path = host_path.as_ref();
    if !host_path.is_absolute() {
        anyhow::bail!("Host path must be absolute: {}", host_path.display());
    }
    let mut mirrored = root.as_ref().to_path_buf();
    for component in host_path.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => mirrored.push(part),
            Component::ParentDir | Component::Prefix(_) => {
                anyhow::bail!("Host path must not contain '..': {}", host_path.display())
            }
        }
    }
    Ok(mirrored)
}

/// Strip a prefix from a path safely.
///
/// Returns the relative portion after the prefix, or None if the path
/// doesn't start with the prefix.
pub fn strip_prefix_safe(path: impl AsRef<Path>, prefix: impl AsRef<Path>) -> Option<PathBuf> {
    path.as_ref()
        .strip_prefix(prefix.as_ref())
        .ok()
        .map(|p| p.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_existing_dir() {
        let temp = tempdir().unwrap();
        let resolved = resolve_existing_dir(temp.path()).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.is_dir());
    }

    #[test]
    fn test_resolve_existing_dir_rejects_files() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("arch");
        fs::write(&file, "x86_64").unwrap();
        let err = resolve_existing_dir(&file).unwrap_err();
        assert!(err.to_string().contains("Not a directory"));
    }

    #[test]
    fn test_is_within_directory() {
        let temp = tempdir().unwrap();
        let subdir = temp.path().join("sys/block");
        fs::create_dir_all(&subdir).unwrap();

        assert!(is_within_directory(&subdir, temp.path()));
        assert!(!is_within_directory(temp.path(), &subdir));
        assert!(!is_within_directory("/nonexistent/path", temp.path()));
    }

    #[test]
    fn test_mirror_path() {
        let mirrored = mirror_path("/fx", "/sys/block/sda/size").unwrap();
        assert_eq!(mirrored, PathBuf::from("/fx/sys/block/sda/size"));

        assert!(mirror_path("/fx", "proc/cpuinfo").is_err());
        assert!(mirror_path("/fx", "/proc/../etc/passwd").is_err());
    }

    #[test]
    fn test_strip_prefix_safe() {
        let path = Path::new("/fx/proc/cpuinfo");
        assert_eq!(
            strip_prefix_safe(path, "/fx"),
            Some(PathBuf::from("proc/cpuinfo"))
        );
        assert_eq!(strip_prefix_safe(path, "/other"), None);
    }
}
