//! Fixture tree builder for isolated testing.
//!
//! Provides `FixtureTree` to lay out:
//! - Namespace mirrors (`proc/`, `dev/`, `sys/`)
//! - `sysconf/<id>` answers
//! - the `arch` override
//! - per-device `sys/block/<dev>/...` attributes
//!
//! # Usage
//!
//! ```ignore
//! use fixroot_config::testing::FixtureTree;
//!
//! let tree = FixtureTree::new()?;
//! tree.sysconf(30, 4096)?;
//! tree.block_device("sda", 1_000_000, 4096, 512)?;
//! // tree.root is canonical and removed on drop
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Atomic counter for unique tree IDs
static TREE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated fixture tree rooted in a temporary directory
pub struct FixtureTree {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Canonical fixture root
    pub root: PathBuf,
    /// Unique tree ID
    pub tree_id: u32,
}

impl FixtureTree {
    /// Create a new, empty fixture tree
    pub fn new() -> anyhow::Result<Self> {
        let tree_id = TREE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("fixroot-tree-{}-", tree_id))
            .tempdir()?;
        // Canonical so tests compare against what the resolver will produce.
        let root = temp_dir.path().canonicalize()?;

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            tree_id,
        })
    }

    /// Write a file at a path relative to the root, creating parents.
    pub fn file(&self, relative_path: &str, content: impl AsRef<[u8]>) -> anyhow::Result<PathBuf> {
        let path = self.root.join(relative_path.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a directory relative to the root.
    pub fn dir(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.root.join(relative_path.trim_start_matches('/'));
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Mirror a host namespace file, e.g. `mirror("/proc/cpuinfo", ...)`.
    pub fn mirror(&self, host_path: &str, content: impl AsRef<[u8]>) -> anyhow::Result<PathBuf> {
        let target = crate::path::mirror_path(&self.root, Path::new(host_path))?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, content)?;
        Ok(target)
    }

    /// Record a sysconf answer.
    pub fn sysconf(&self, id: i32, value: i64) -> anyhow::Result<PathBuf> {
        self.file(&format!("sysconf/{}", id), value.to_string())
    }

    /// Record the machine architecture override.
    pub fn arch(&self, machine: &str) -> anyhow::Result<PathBuf> {
        self.file("arch", format!("{}\n", machine))
    }

    /// Record a single block device attribute (e.g. `queue/logical_block_size`).
    pub fn block_attr(&self, device: &str, attr: &str, value: &str) -> anyhow::Result<PathBuf> {
        self.file(&format!("sys/block/{}/{}", device, attr), format!("{}\n", value))
    }

    /// Record the full geometry of a block device plus its device node.
    pub fn block_device(
        &self,
        device: &str,
        sectors: u64,
        physical_block_size: u32,
        logical_block_size: u32,
    ) -> anyhow::Result<PathBuf> {
        self.block_attr(device, "size", &sectors.to_string())?;
        self.block_attr(
            device,
            "queue/physical_block_size",
            &physical_block_size.to_string(),
        )?;
        self.block_attr(
            device,
            "queue/logical_block_size",
            &logical_block_size.to_string(),
        )?;
        self.file(&format!("dev/{}", device), b"")
    }

    /// Path of a file relative to the root, whether or not it exists.
    pub fn path(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path.trim_start_matches('/'))
    }

    /// Environment a preloaded process needs to use this tree.
    pub fn preload_env(&self) -> Vec<(String, String)> {
        let mut cfg = crate::Config::default();
        cfg.fixture.root = Some(self.root.clone());
        cfg.preload_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_root_is_canonical() {
        let tree = FixtureTree::new().unwrap();
        assert!(tree.root.is_absolute());
        assert_eq!(tree.root, tree.root.canonicalize().unwrap());
    }

    #[test]
    fn test_trees_are_unique() {
        let t1 = FixtureTree::new().unwrap();
        let t2 = FixtureTree::new().unwrap();
        assert_ne!(t1.root, t2.root);
        assert_ne!(t1.tree_id, t2.tree_id);
    }

    #[test]
    fn test_block_device_layout() {
        let tree = FixtureTree::new().unwrap();
        tree.block_device("sda", 1_000_000, 4096, 512).unwrap();

        let size = std::fs::read_to_string(tree.path("sys/block/sda/size")).unwrap();
        assert_eq!(size.trim(), "1000000");
        assert!(tree.path("sys/block/sda/queue/physical_block_size").exists());
        assert!(tree.path("dev/sda").exists());
    }

    #[test]
    fn test_mirror_and_sysconf() {
        let tree = FixtureTree::new().unwrap();
        let cpuinfo = tree.mirror("/proc/cpuinfo", "processor\t: 0\n").unwrap();
        assert_eq!(cpuinfo, tree.root.join("proc/cpuinfo"));

        tree.sysconf(42, 4096).unwrap();
        assert_eq!(
            std::fs::read_to_string(tree.path("sysconf/42")).unwrap(),
            "4096"
        );
    }

    #[test]
    fn test_preload_env() {
        let tree = FixtureTree::new().unwrap();
        let vars = tree.preload_env();
        assert!(vars
            .iter()
            .any(|(k, v)| k == crate::ENV_TEST_DIR && *v == tree.root.to_string_lossy()));
    }
}
