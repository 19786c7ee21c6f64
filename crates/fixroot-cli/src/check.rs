//! # fixroot check
//!
//! Validates a fixture tree with the same readers the preload library uses,
//! so a tree that passes here will not abort the tool under test.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use console::{style, Emoji};
use fixroot_config::Config;
use fixroot_core::scalar::{read_signed, read_token, read_unsigned};
use fixroot_core::{BlockQuery, FixtureRoot};
use serde::Serialize;

static CHECK: Emoji<'_, '_> = Emoji("✔ ", "[ok] ");
static CROSS: Emoji<'_, '_> = Emoji("✘ ", "[!!] ");
static WARN_ICON: Emoji<'_, '_> = Emoji("⚠ ", "[??] ");
static DOT: Emoji<'_, '_> = Emoji("● ", "[-] ");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Warn,
    Fail,
    Info,
}

#[derive(Debug, Serialize)]
pub struct Finding {
    pub status: Status,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct CheckReport {
    pub root: PathBuf,
    pub passed: u32,
    pub warned: u32,
    pub failed: u32,
    pub findings: Vec<Finding>,
}

impl CheckReport {
    fn record(&mut self, status: Status, message: String) {
        let (icon, styled) = match status {
            Status::Pass => {
                self.passed += 1;
                (&CHECK, style(&message).green())
            }
            Status::Warn => {
                self.warned += 1;
                (&WARN_ICON, style(&message).yellow())
            }
            Status::Fail => {
                self.failed += 1;
                (&CROSS, style(&message).red())
            }
            Status::Info => (&DOT, style(&message).dim()),
        };
        eprintln!("  {} {}", icon, styled);
        self.findings.push(Finding { status, message });
    }

    fn pass(&mut self, msg: impl Into<String>) {
        self.record(Status::Pass, msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.record(Status::Warn, msg.into());
    }

    fn fail(&mut self, msg: impl Into<String>) {
        self.record(Status::Fail, msg.into());
    }

    fn info(&mut self, msg: impl Into<String>) {
        self.record(Status::Info, msg.into());
    }
}

pub fn run(root: &Path, config: &Config) -> Result<CheckReport> {
    eprintln!();
    eprintln!("{}", style("fixroot check").bold().cyan());
    eprintln!("{}", style("─".repeat(40)).dim());

    let mut report = CheckReport {
        root: root.to_path_buf(),
        ..Default::default()
    };

    eprintln!();
    eprintln!("{}", style("Root").bold());
    let fixture = match FixtureRoot::resolve(root) {
        Ok(fixture) => {
            report.pass(format!("Fixture root: {}", fixture.as_path().display()));
            fixture
        }
        Err(e) => {
            report.fail(e.to_string());
            summarize(&report);
            return Ok(report);
        }
    };

    eprintln!();
    eprintln!("{}", style("Namespaces").bold());
    check_namespaces(&fixture, config, &mut report);

    eprintln!();
    eprintln!("{}", style("sysconf").bold());
    check_sysconf(&fixture, &mut report);

    eprintln!();
    eprintln!("{}", style("Architecture").bold());
    check_arch(&fixture, &mut report);

    eprintln!();
    eprintln!("{}", style("Block devices").bold());
    check_block_devices(&fixture, &mut report);

    summarize(&report);
    Ok(report)
}

fn summarize(report: &CheckReport) {
    eprintln!();
    eprintln!("{}", style("─".repeat(40)).dim());
    eprintln!(
        "  {} passed, {} warnings, {} errors",
        style(report.passed).green().bold(),
        style(report.warned).yellow().bold(),
        style(report.failed).red().bold(),
    );
    if report.failed > 0 {
        eprintln!(
            "{}",
            style("Tools reading the failing entries will abort under fixroot.").dim()
        );
    }
    eprintln!();
}

fn check_namespaces(fixture: &FixtureRoot, config: &Config, report: &mut CheckReport) {
    for prefix in config.effective_namespaces() {
        let mirror = fixture.as_path().join(prefix.trim_start_matches('/'));
        if mirror.exists() {
            report.pass(format!("{} mirrored", prefix));
        } else {
            report.info(format!("{} not mirrored (lookups fail with ENOENT)", prefix));
        }
    }
}

fn check_sysconf(fixture: &FixtureRoot, report: &mut CheckReport) {
    let dir = fixture.as_path().join("sysconf");
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => {
            report.warn("No sysconf/ directory: any sysconf() call will abort");
            return;
        }
    };

    let mut valid = 0usize;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.parse::<libc::c_int>().is_err() {
            report.warn(format!("sysconf/{} is not a numeric sysconf id", name));
            continue;
        }
        match read_signed(&entry.path()) {
            Ok(_) => valid += 1,
            Err(e) => report.fail(e.to_string()),
        }
    }
    if valid > 0 {
        report.pass(format!("{} sysconf values", valid));
    } else {
        report.warn("sysconf/ is empty: any sysconf() call will abort");
    }
}

fn check_arch(fixture: &FixtureRoot, report: &mut CheckReport) {
    let path = fixture.arch_path();
    if !path.exists() {
        report.info("No arch file: uname() reports the host machine");
        return;
    }
    match read_token(&path) {
        Ok(machine) => report.pass(format!("arch: {}", machine)),
        Err(e) => report.fail(e.to_string()),
    }
}

fn check_block_devices(fixture: &FixtureRoot, report: &mut CheckReport) {
    let dir = fixture.as_path().join("sys/block");
    let Ok(entries) = fs::read_dir(&dir) else {
        report.info("No sys/block/ directory");
        return;
    };

    let mut devices: Vec<_> = entries.flatten().map(|e| e.file_name()).collect();
    devices.sort();
    for device in devices {
        let label = device.to_string_lossy().into_owned();
        let mut ok = true;
        for query in [
            BlockQuery::Capacity,
            BlockQuery::PhysicalBlockSize,
            BlockQuery::LogicalBlockSize,
        ] {
            let path = fixture.block_attr_path(&device, query.attribute());
            match read_unsigned(&path) {
                Ok(sectors) if query == BlockQuery::Capacity && sectors.checked_mul(512).is_none() => {
                    report.fail(format!("{}: size {} overflows a byte count", label, sectors));
                    ok = false;
                }
                Ok(_) => {}
                Err(e) => {
                    report.fail(e.to_string());
                    ok = false;
                }
            }
        }
        if ok {
            report.pass(format!("{}: geometry complete", label));
        }
        if !fixture.as_path().join("dev").join(&device).exists() {
            report.warn(format!("{}: no dev/{} node to open", label, label));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixroot_config::testing::FixtureTree;

    fn statuses(report: &CheckReport, status: Status) -> Vec<&str> {
        report
            .findings
            .iter()
            .filter(|f| f.status == status)
            .map(|f| f.message.as_str())
            .collect()
    }

    #[test]
    fn test_complete_tree_passes() {
        let tree = FixtureTree::new().unwrap();
        tree.sysconf(libc::_SC_PAGESIZE, 4096).unwrap();
        tree.sysconf(libc::_SC_NPROCESSORS_ONLN, 4).unwrap();
        tree.arch("riscv64").unwrap();
        tree.block_device("vda", 1_000_000, 512, 512).unwrap();
        tree.mirror("/proc/cpuinfo", "processor\t: 0\n").unwrap();

        let report = run(&tree.root, &Config::default()).unwrap();
        assert_eq!(report.failed, 0, "{:?}", report.findings);
        assert_eq!(report.warned, 0, "{:?}", report.findings);
        assert!(statuses(&report, Status::Pass).contains(&"arch: riscv64"));
        assert!(statuses(&report, Status::Pass).contains(&"2 sysconf values"));
        assert!(statuses(&report, Status::Pass).contains(&"vda: geometry complete"));
    }

    #[test]
    fn test_malformed_entries_fail() {
        let tree = FixtureTree::new().unwrap();
        tree.file("sysconf/30", "lots").unwrap();
        tree.file("arch", "   ").unwrap();
        tree.block_attr("sdb", "size", "-5").unwrap();

        let report = run(&tree.root, &Config::default()).unwrap();
        // sysconf/30, arch, sdb size, sdb physical, sdb logical
        assert_eq!(report.failed, 5, "{:?}", report.findings);
        assert!(statuses(&report, Status::Warn).contains(&"sdb: no dev/sdb node to open"));
    }

    #[test]
    fn test_missing_root_fails() {
        let report = run(Path::new("/nonexistent/fixroot"), &Config::default()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.findings.len(), 1);
    }

    #[test]
    fn test_report_serializes() {
        let tree = FixtureTree::new().unwrap();
        let report = run(&tree.root, &Config::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed"], 0);
        assert!(json["findings"].as_array().unwrap().iter().any(|f| f["status"] == "warn"));
    }
}
