//! # fixroot capture
//!
//! Snapshot the running host into a fixture tree: every `sysconf` value the
//! host answers, the machine architecture, block device geometry, and
//! verbatim copies of selected namespace files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use fixroot_config::path::{is_within_directory, mirror_path, strip_prefix_safe};
use fixroot_config::{log_cli_debug, log_cli_info, log_cli_warn, Config};
use fixroot_core::{BlockQuery, SystemOps};
use libc::c_int;
use walkdir::WalkDir;

#[derive(clap::Args)]
pub struct CaptureArgs {
    /// Destination fixture root (created if missing)
    #[arg(value_name = "DEST")]
    dest: PathBuf,

    /// Block device to record, e.g. `sda` (repeatable; defaults from config)
    #[arg(short = 'b', long = "block-device", value_name = "DEV")]
    block_devices: Vec<String>,

    /// Namespace file or directory to copy (repeatable; defaults from config)
    #[arg(short = 'c', long = "copy", value_name = "PATH")]
    copy_paths: Vec<PathBuf>,

    /// Do not record sysconf values
    #[arg(long)]
    no_sysconf: bool,

    /// Do not record the machine architecture
    #[arg(long)]
    no_arch: bool,
}

macro_rules! sysconf_names {
    ($($name:ident),* $(,)?) => {
        &[$((stringify!($name), libc::$name)),*]
    };
}

/// Every `sysconf` name the host can be asked about.
pub const SYSCONF_NAMES: &[(&str, c_int)] = sysconf_names![
    _SC_ARG_MAX,
    _SC_CHILD_MAX,
    _SC_CLK_TCK,
    _SC_NGROUPS_MAX,
    _SC_OPEN_MAX,
    _SC_STREAM_MAX,
    _SC_TZNAME_MAX,
    _SC_JOB_CONTROL,
    _SC_SAVED_IDS,
    _SC_REALTIME_SIGNALS,
    _SC_PRIORITY_SCHEDULING,
    _SC_TIMERS,
    _SC_ASYNCHRONOUS_IO,
    _SC_PRIORITIZED_IO,
    _SC_SYNCHRONIZED_IO,
    _SC_FSYNC,
    _SC_MAPPED_FILES,
    _SC_MEMLOCK,
    _SC_MEMLOCK_RANGE,
    _SC_MEMORY_PROTECTION,
    _SC_MESSAGE_PASSING,
    _SC_SEMAPHORES,
    _SC_SHARED_MEMORY_OBJECTS,
    _SC_AIO_LISTIO_MAX,
    _SC_AIO_MAX,
    _SC_AIO_PRIO_DELTA_MAX,
    _SC_DELAYTIMER_MAX,
    _SC_MQ_OPEN_MAX,
    _SC_MQ_PRIO_MAX,
    _SC_VERSION,
    _SC_PAGESIZE,
    _SC_RTSIG_MAX,
    _SC_SEM_NSEMS_MAX,
    _SC_SEM_VALUE_MAX,
    _SC_SIGQUEUE_MAX,
    _SC_TIMER_MAX,
    _SC_BC_BASE_MAX,
    _SC_BC_DIM_MAX,
    _SC_BC_SCALE_MAX,
    _SC_BC_STRING_MAX,
    _SC_COLL_WEIGHTS_MAX,
    _SC_EXPR_NEST_MAX,
    _SC_LINE_MAX,
    _SC_RE_DUP_MAX,
    _SC_2_VERSION,
    _SC_2_C_BIND,
    _SC_2_C_DEV,
    _SC_2_FORT_DEV,
    _SC_2_FORT_RUN,
    _SC_2_SW_DEV,
    _SC_2_LOCALEDEF,
    _SC_THREADS,
    _SC_GETGR_R_SIZE_MAX,
    _SC_GETPW_R_SIZE_MAX,
    _SC_LOGIN_NAME_MAX,
    _SC_TTY_NAME_MAX,
    _SC_THREAD_KEYS_MAX,
    _SC_THREAD_STACK_MIN,
    _SC_THREAD_THREADS_MAX,
    _SC_NPROCESSORS_CONF,
    _SC_NPROCESSORS_ONLN,
    _SC_PHYS_PAGES,
    _SC_AVPHYS_PAGES,
    _SC_ATEXIT_MAX,
    _SC_PASS_MAX,
    _SC_XOPEN_VERSION,
    _SC_IOV_MAX,
    _SC_HOST_NAME_MAX,
    _SC_SYMLOOP_MAX,
    _SC_MONOTONIC_CLOCK,
];

const BLOCK_QUERIES: [BlockQuery; 3] = [
    BlockQuery::Capacity,
    BlockQuery::PhysicalBlockSize,
    BlockQuery::LogicalBlockSize,
];

#[derive(Debug, Default)]
pub struct CaptureSummary {
    pub sysconf_recorded: usize,
    pub sysconf_skipped: usize,
    pub arch: Option<String>,
    pub devices: usize,
    pub files: usize,
    pub unreadable: usize,
}

pub fn run(args: CaptureArgs, config: &Config) -> Result<()> {
    fs::create_dir_all(&args.dest)
        .with_context(|| format!("Failed to create {}", args.dest.display()))?;
    let dest = fixroot_config::path::resolve_existing_dir(&args.dest)?;
    ensure_outside_namespaces(&dest, &config.effective_namespaces())?;

    let block_devices = if args.block_devices.is_empty() {
        &config.capture.block_devices
    } else {
        &args.block_devices
    };
    let copy_paths = if args.copy_paths.is_empty() {
        &config.capture.copy_paths
    } else {
        &args.copy_paths
    };

    eprintln!();
    eprintln!("{} {}", style("Capturing into").bold().cyan(), dest.display());

    let mut summary = CaptureSummary::default();
    if !args.no_sysconf {
        capture_sysconf(&dest, &mut summary)?;
    }
    if !args.no_arch {
        capture_arch(&dest, &mut summary)?;
    }
    for device in block_devices {
        match capture_block_device(Path::new("/sys/class/block"), &dest, device) {
            Ok(()) => summary.devices += 1,
            Err(e) => log_cli_warn!(
                "skipping block device",
                device = device.as_str(),
                error = tracing::field::display(&e),
            ),
        }
    }
    for path in copy_paths {
        copy_namespace_path(path, &dest, &mut summary)?;
    }

    eprintln!(
        "  {} sysconf values ({} unsupported), {} block devices, {} files copied",
        style(summary.sysconf_recorded).green().bold(),
        summary.sysconf_skipped,
        style(summary.devices).green().bold(),
        style(summary.files).green().bold(),
    );
    if let Some(arch) = &summary.arch {
        eprintln!("  arch: {}", style(arch).green());
    }
    if summary.unreadable > 0 {
        eprintln!(
            "  {}",
            style(format!("{} unreadable files skipped", summary.unreadable)).yellow()
        );
    }
    eprintln!();
    Ok(())
}

/// A fixture root inside a redirected namespace would be looked up inside
/// itself.
fn ensure_outside_namespaces(dest: &Path, namespaces: &[String]) -> Result<()> {
    for prefix in namespaces {
        if is_within_directory(dest, prefix) {
            anyhow::bail!(
                "Fixture root {} lies inside the redirected namespace {}",
                dest.display(),
                prefix
            );
        }
    }
    Ok(())
}

/// Write `sysconf/<id>` for every name the host answers. A name the host
/// rejects (`-1` with errno set) is skipped; `-1` without errno is recorded.
pub fn capture_sysconf(dest: &Path, summary: &mut CaptureSummary) -> Result<()> {
    let dir = dest.join("sysconf");
    fs::create_dir_all(&dir)?;
    for &(name, id) in SYSCONF_NAMES {
        nix::errno::Errno::clear();
        let value = unsafe { libc::sysconf(id) };
        if value == -1 && nix::errno::Errno::last() != nix::errno::Errno::UnknownErrno {
            log_cli_debug!("sysconf not supported", sysconf = name);
            summary.sysconf_skipped += 1;
            continue;
        }
        fs::write(dir.join(id.to_string()), value.to_string())
            .with_context(|| format!("Failed to record {}", name))?;
        summary.sysconf_recorded += 1;
    }
    log_cli_info!(
        "sysconf captured",
        recorded = summary.sysconf_recorded,
        skipped = summary.sysconf_skipped,
    );
    Ok(())
}

pub fn capture_arch(dest: &Path, summary: &mut CaptureSummary) -> Result<()> {
    let name = fixroot_core::LibcOps.uname().context("uname failed")?;
    let machine = name.machine.as_str().to_string();
    fs::write(dest.join("arch"), format!("{}\n", machine))?;
    summary.arch = Some(machine);
    Ok(())
}

/// Record `sys/block/<dev>/...` from `sysfs/<dev>` and create a `dev/<dev>`
/// placeholder the tool under test can open.
///
/// Partitions have no `queue/` directory of their own; their parent disk's
/// is used.
pub fn capture_block_device(sysfs: &Path, dest: &Path, device: &str) -> Result<()> {
    if device.is_empty() || device.contains('/') {
        anyhow::bail!("Invalid block device name: {:?}", device);
    }
    let source = sysfs.join(device);
    if !source.exists() {
        anyhow::bail!("No such block device: {}", source.display());
    }
    let target = dest.join("sys/block").join(device);
    for query in BLOCK_QUERIES {
        let attr = query.attribute();
        let own = source.join(attr);
        let value = fs::read_to_string(&own)
            .or_else(|e| match query {
                BlockQuery::Capacity => Err(e),
                _ => fs::read_to_string(source.join("..").join(attr)),
            })
            .with_context(|| format!("Failed to read {}", own.display()))?;
        let out = target.join(attr);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out, value)?;
    }
    let node = dest.join("dev").join(device);
    fs::create_dir_all(dest.join("dev"))?;
    if !node.exists() {
        fs::write(&node, b"")?;
    }
    log_cli_info!("block device captured", device = device);
    Ok(())
}

/// Copy a host file or directory tree to its mirror location under `dest`.
///
/// Contents are read rather than `fs::copy`-ed: pseudo-files report a size of
/// zero. Symlinks are recreated, not followed.
pub fn copy_namespace_path(source: &Path, dest: &Path, summary: &mut CaptureSummary) -> Result<()> {
    let mirror = mirror_path(dest, source)?;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log_cli_warn!("unreadable entry", error = tracing::field::display(&e));
                summary.unreadable += 1;
                continue;
            }
        };
        let rel = strip_prefix_safe(entry.path(), source).unwrap_or_default();
        let target = if rel.as_os_str().is_empty() {
            mirror.clone()
        } else {
            mirror.join(&rel)
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            if fs::symlink_metadata(&target).is_err() {
                std::os::unix::fs::symlink(&link, &target)?;
            }
            continue;
        }
        match fs::read(entry.path()) {
            Ok(contents) => {
                fs::write(&target, contents)?;
                summary.files += 1;
            }
            Err(e) => {
                log_cli_debug!(
                    "skipping unreadable file",
                    path = tracing::field::debug(entry.path()),
                    error = tracing::field::display(&e),
                );
                summary.unreadable += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixroot_config::testing::FixtureTree;
    use tempfile::tempdir;

    #[test]
    fn test_sysconf_names_are_unique() {
        let mut ids: Vec<c_int> = SYSCONF_NAMES.iter().map(|&(_, id)| id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), SYSCONF_NAMES.len());
    }

    #[test]
    fn test_capture_sysconf_matches_host() {
        let dest = tempdir().unwrap();
        let mut summary = CaptureSummary::default();
        capture_sysconf(dest.path(), &mut summary).unwrap();

        assert!(summary.sysconf_recorded > 0);
        let page = fs::read_to_string(
            dest.path().join("sysconf").join(libc::_SC_PAGESIZE.to_string()),
        )
        .unwrap();
        let expected = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        assert_eq!(page, expected.to_string());
    }

    #[test]
    fn test_capture_arch() {
        let dest = tempdir().unwrap();
        let mut summary = CaptureSummary::default();
        capture_arch(dest.path(), &mut summary).unwrap();
        let arch = summary.arch.unwrap();
        assert!(!arch.is_empty());
        assert_eq!(
            fs::read_to_string(dest.path().join("arch")).unwrap(),
            format!("{}\n", arch)
        );
    }

    fn fake_sysfs() -> FixtureTree {
        let sysfs = FixtureTree::new().unwrap();
        sysfs.file("sda/size", "1000000\n").unwrap();
        sysfs.file("sda/queue/physical_block_size", "4096\n").unwrap();
        sysfs.file("sda/queue/logical_block_size", "512\n").unwrap();
        sysfs.file("sda/sda1/size", "2048\n").unwrap();
        sysfs
    }

    #[test]
    fn test_capture_block_device() {
        let sysfs = fake_sysfs();
        let dest = tempdir().unwrap();
        capture_block_device(&sysfs.root, dest.path(), "sda").unwrap();

        let block = dest.path().join("sys/block/sda");
        assert_eq!(fs::read_to_string(block.join("size")).unwrap(), "1000000\n");
        assert_eq!(
            fs::read_to_string(block.join("queue/physical_block_size")).unwrap(),
            "4096\n"
        );
        assert!(dest.path().join("dev/sda").exists());
    }

    #[test]
    fn test_capture_partition_uses_parent_queue() {
        let sysfs = fake_sysfs();
        let dest = tempdir().unwrap();
        capture_block_device(&sysfs.root.join("sda"), dest.path(), "sda1").unwrap();

        let block = dest.path().join("sys/block/sda1");
        assert_eq!(fs::read_to_string(block.join("size")).unwrap(), "2048\n");
        assert_eq!(
            fs::read_to_string(block.join("queue/logical_block_size")).unwrap(),
            "512\n"
        );
    }

    #[test]
    fn test_capture_rejects_bad_devices() {
        let sysfs = fake_sysfs();
        let dest = tempdir().unwrap();
        assert!(capture_block_device(&sysfs.root, dest.path(), "sdz").is_err());
        assert!(capture_block_device(&sysfs.root, dest.path(), "../sda").is_err());
        assert!(capture_block_device(&sysfs.root, dest.path(), "").is_err());
    }

    #[test]
    fn test_copy_namespace_tree() {
        let host = FixtureTree::new().unwrap();
        let source = host.file("net/eth0/address", "00:11:22:33:44:55\n").unwrap();
        host.file("net/eth0/mtu", "1500\n").unwrap();
        std::os::unix::fs::symlink("eth0", host.path("net/default")).unwrap();

        let dest = tempdir().unwrap();
        let mut summary = CaptureSummary::default();
        copy_namespace_path(&host.path("net"), dest.path(), &mut summary).unwrap();
        assert_eq!(summary.files, 2);

        let mirrored = mirror_path(dest.path(), &source).unwrap();
        assert_eq!(fs::read_to_string(mirrored).unwrap(), "00:11:22:33:44:55\n");
        let link = mirror_path(dest.path(), host.path("net/default")).unwrap();
        assert_eq!(fs::read_link(link).unwrap(), Path::new("eth0"));
    }

    #[test]
    fn test_dest_inside_namespace_rejected() {
        let defaults = Config::default().effective_namespaces();
        assert!(ensure_outside_namespaces(Path::new("/proc/self"), &defaults).is_err());

        let dest = tempdir().unwrap();
        assert!(ensure_outside_namespaces(dest.path(), &defaults).is_ok());
    }

    #[test]
    fn test_copy_single_pseudo_file() {
        let dest = tempdir().unwrap();
        let mut summary = CaptureSummary::default();
        copy_namespace_path(Path::new("/proc/self/status"), dest.path(), &mut summary).unwrap();
        assert_eq!(summary.files, 1);
        let copied = fs::read_to_string(dest.path().join("proc/self/status")).unwrap();
        assert!(copied.contains("Pid:"));
    }
}
