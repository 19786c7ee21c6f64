//! Synthesized answers: sysconf, block device geometry, uname, and the
//! faults raised when the fixture cannot answer.

mod common;

use std::path::Path;

use common::*;
use fixroot_config::testing::FixtureTree;
use fixroot_core::{
    BlockAnswer, FixtureRoot, RedirectorBuilder, BLKGETSIZE64, BLKPBSZGET, BLKSSZGET,
};

// ========== Fixture root ==========

#[test]
fn test_root_resolution_is_cached() {
    let tree = FixtureTree::new().unwrap();
    let r = redirector(&tree);

    let first = r.root().unwrap() as *const _;
    for _ in 0..5 {
        assert_eq!(r.root().unwrap() as *const _, first);
        assert_eq!(r.root().unwrap().as_path(), tree.root);
    }
    r.classify_and_map(Path::new("/proc/cpuinfo"));
    assert_eq!(r.ops().paths_for("realpath").len(), 1);
}

#[test]
fn test_root_resolution_is_shared_across_threads() {
    let tree = FixtureTree::new().unwrap();
    let r = redirector(&tree);

    let roots: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| r.root().unwrap() as *const FixtureRoot as usize))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(roots.iter().all(|&p| p == roots[0]));
    assert_eq!(r.root().unwrap() as *const FixtureRoot as usize, roots[0]);
    assert_eq!(r.ops().paths_for("realpath").len(), 1);
}

#[test]
fn test_root_is_symlink_resolved_and_trimmed() {
    let tree = FixtureTree::new().unwrap();
    let links = tempfile::tempdir().unwrap();
    let link = links.path().join("current");
    std::os::unix::fs::symlink(&tree.root, &link).unwrap();

    let mut configured = link.into_os_string();
    configured.push("/");
    let r = RedirectorBuilder::new()
        .root(configured)
        .on_fatal(panic_on_fault)
        .build(RecordingOps::new("/"), FakeFds::default());
    assert_eq!(r.root().unwrap().as_path(), tree.root);
}

#[test]
fn test_empty_root_is_inactive() {
    let r = RedirectorBuilder::new()
        .root("")
        .on_fatal(panic_on_fault)
        .build(RecordingOps::new("/"), FakeFds::default());
    assert!(!r.is_active());
    assert!(r.root().is_none());
}

#[test]
#[should_panic(expected = "cannot be resolved")]
fn test_unresolvable_root_is_fatal() {
    let r = RedirectorBuilder::new()
        .root("/nonexistent/fixroot/fixture")
        .on_fatal(panic_on_fault)
        .build(RecordingOps::new("/"), FakeFds::default());
    r.root();
}

#[test]
#[should_panic(expected = "filesystem root")]
fn test_filesystem_root_is_fatal() {
    let r = RedirectorBuilder::new()
        .root("/")
        .on_fatal(panic_on_fault)
        .build(RecordingOps::new("/"), FakeFds::default());
    r.stat(Path::new("/proc/cpuinfo")).ok();
}

// ========== sysconf ==========

#[test]
fn test_sysconf_from_fixture() {
    let tree = FixtureTree::new().unwrap();
    tree.sysconf(42, 4096).unwrap();
    tree.sysconf(libc::_SC_NPROCESSORS_ONLN, 8).unwrap();
    tree.sysconf(libc::_SC_PHYS_PAGES, -1).unwrap();
    let r = redirector(&tree);

    assert_eq!(r.sysconf(42), 4096);
    assert_eq!(r.sysconf(libc::_SC_NPROCESSORS_ONLN), 8);
    assert_eq!(r.sysconf(libc::_SC_PHYS_PAGES), -1);
}

#[test]
fn test_sysconf_without_root_asks_host() {
    assert_eq!(inactive().sysconf(libc::_SC_PAGESIZE), HOST_SYSCONF);
}

#[test]
#[should_panic(expected = "failed to open")]
fn test_sysconf_missing_fixture_is_fatal() {
    let tree = FixtureTree::new().unwrap();
    redirector(&tree).sysconf(libc::_SC_PAGESIZE);
}

#[test]
#[should_panic(expected = "failed to read integer value")]
fn test_sysconf_malformed_fixture_is_fatal() {
    let tree = FixtureTree::new().unwrap();
    tree.file("sysconf/30", "four thousand").unwrap();
    redirector(&tree).sysconf(30);
}

// ========== Block devices ==========

const FD: i32 = 7;

fn sda_tree() -> FixtureTree {
    let tree = FixtureTree::new().unwrap();
    tree.block_device("sda", 1_000_000, 4096, 512).unwrap();
    tree
}

#[test]
fn test_block_device_geometry() {
    let tree = sda_tree();
    let r = redirector_with_fds(&tree, FakeFds::default().bind(FD, tree.path("dev/sda")));

    assert_eq!(
        r.block_device_query(FD, BLKGETSIZE64),
        Some(BlockAnswer::Bytes(512_000_000))
    );
    assert_eq!(
        r.block_device_query(FD, BLKPBSZGET),
        Some(BlockAnswer::PhysicalBlockSize(4096))
    );
    assert_eq!(
        r.block_device_query(FD, BLKSSZGET),
        Some(BlockAnswer::LogicalBlockSize(512))
    );
}

#[test]
fn test_partition_uses_basename() {
    let tree = sda_tree();
    tree.block_attr("sda1", "size", "2048").unwrap();
    let r = redirector_with_fds(&tree, FakeFds::default().bind(FD, tree.path("dev/sda1")));
    assert_eq!(
        r.block_device_query(FD, BLKGETSIZE64),
        Some(BlockAnswer::Bytes(1_048_576))
    );
}

#[test]
fn test_non_fixture_descriptors_pass_through() {
    let tree = sda_tree();
    let mut sibling = tree.root.clone().into_os_string();
    sibling.push("-other/dev/sda");
    let fds = FakeFds::default()
        .bind(0, tree.path("dev/sda"))
        .bind(3, "/dev/null")
        .bind(4, sibling);
    let r = redirector_with_fds(&tree, fds);

    assert_eq!(r.block_device_query(0, BLKGETSIZE64), None);
    assert_eq!(r.block_device_query(-1, BLKGETSIZE64), None);
    assert_eq!(r.block_device_query(3, BLKGETSIZE64), None);
    assert_eq!(r.block_device_query(4, BLKGETSIZE64), None);
    assert_eq!(r.block_device_query(99, BLKGETSIZE64), None);
}

#[test]
fn test_block_query_without_root_passes_through() {
    let r = RedirectorBuilder::new()
        .on_fatal(panic_on_fault)
        .build(RecordingOps::new("/"), FakeFds::default().bind(FD, "/dev/sda"));
    assert_eq!(r.block_device_query(FD, BLKGETSIZE64), None);
}

#[test]
#[should_panic(expected = "unimplemented ioctl()")]
fn test_unsupported_query_is_fatal() {
    let tree = sda_tree();
    let r = redirector_with_fds(&tree, FakeFds::default().bind(FD, tree.path("dev/sda")));
    // BLKROTATIONAL
    let request = nix::request_code_none!(0x12, 126) as libc::c_ulong;
    r.block_device_query(FD, request);
}

#[test]
#[should_panic(expected = "failed to open")]
fn test_missing_device_attribute_is_fatal() {
    let tree = sda_tree();
    tree.file("dev/sdz", b"").unwrap();
    let r = redirector_with_fds(&tree, FakeFds::default().bind(FD, tree.path("dev/sdz")));
    r.block_device_query(FD, BLKSSZGET);
}

// ========== uname ==========

#[test]
fn test_uname_machine_override() {
    let tree = FixtureTree::new().unwrap();
    tree.arch("aarch64").unwrap();
    let r = redirector(&tree);

    let name = r.uname().unwrap();
    assert_eq!(name.machine.as_str(), "aarch64");
    assert_eq!(name.nodename.as_str(), "testhost");
    assert_eq!(name.sysname.as_str(), "Linux");
    assert_eq!(name.release.as_str(), "6.1.0-test");
}

#[test]
fn test_uname_without_arch_fixture() {
    let tree = FixtureTree::new().unwrap();
    let r = redirector(&tree);
    assert_eq!(r.uname().unwrap().machine.as_str(), HOST_MACHINE);
    assert_eq!(inactive().uname().unwrap().machine.as_str(), HOST_MACHINE);
}

#[test]
fn test_uname_long_arch_is_truncated() {
    let tree = FixtureTree::new().unwrap();
    tree.arch(&"m".repeat(80)).unwrap();
    let r = redirector(&tree);
    assert_eq!(r.uname().unwrap().machine.as_str(), "m".repeat(64));
}

#[test]
#[should_panic(expected = "failed to read token")]
fn test_empty_arch_fixture_is_fatal() {
    let tree = FixtureTree::new().unwrap();
    tree.file("arch", "\n").unwrap();
    redirector(&tree).uname().ok();
}
