//! # fixroot CLI
//!
//! Records fixture trees from the running host, validates them, and runs
//! commands with the preload library pointed at one.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fixroot_config::logging::{init_logging, LogLevel};
use fixroot_config::{log_cli_debug, Config};

mod capture;
mod check;

/// Run hardware-inventory tools against recorded fixtures
#[derive(Parser)]
#[command(name = "fixroot")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the host's sysconf values, architecture and devices into a fixture tree
    Capture(capture::CaptureArgs),

    /// Validate a fixture tree
    Check {
        /// Fixture root to check
        #[arg(value_name = "ROOT")]
        root: PathBuf,

        /// Print the report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Execute a command with the fixture tree mounted over /proc, /dev and /sys
    Run {
        #[command(flatten)]
        fixture: FixtureArgs,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Print shell exports for `eval "$(fixroot env --root DIR)"`
    Env {
        #[command(flatten)]
        fixture: FixtureArgs,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file locations
    Path,
}

/// Fixture selection shared by `run` and `env`.
#[derive(clap::Args)]
struct FixtureArgs {
    /// Fixture root (overrides config and FIXROOT_TEST_DIR)
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Namespace prefix to redirect; repeat to replace the defaults
    #[arg(short = 'n', long = "namespace", value_name = "PREFIX")]
    namespaces: Vec<String>,

    /// Trace every redirection decision to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl FixtureArgs {
    /// Layer the command line over the loaded configuration.
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(root) = &self.root {
            config.fixture.root = Some(root.clone());
        }
        if !self.namespaces.is_empty() {
            config.fixture.namespaces = self.namespaces.clone();
        }
        if self.verbose {
            config.logging.verbose = true;
        }
        let root = config
            .fixture
            .root
            .as_ref()
            .context("No fixture root: pass --root or set FIXROOT_TEST_DIR")?;
        // The preloaded process resolves relative roots against its own cwd,
        // so hand it an absolute one.
        let absolute = fixroot_config::path::resolve_existing_dir(root)
            .with_context(|| format!("Fixture root {} is not a directory", root.display()))?;
        config.fixture.root = Some(absolute);
        Ok(())
    }
}

fn main() -> Result<()> {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;
    init_logging(LogLevel::parse(&config.logging.level).unwrap_or(LogLevel::Warn));

    match cli.command {
        Commands::Capture(args) => capture::run(args, &config),
        Commands::Check { root, json } => {
            let report = check::run(&root, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            if report.failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Run { fixture, command } => {
            let mut config = config;
            fixture.apply(&mut config)?;
            cmd_run(&command, &config)
        }
        Commands::Env { fixture } => {
            let mut config = config;
            fixture.apply(&mut config)?;
            let library = find_preload_library()?;
            for (key, value) in preload_environment(&config, &library) {
                println!("export {}={}", key, shell_quote(&value));
            }
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
            ConfigCommands::Path => {
                match Config::global_config_path() {
                    Some(path) => println!("Global:  {}", path.display()),
                    None => println!("Global:  (no home directory)"),
                }
                println!("Project: {}", Config::project_config_path().display());
                Ok(())
            }
        },
    }
}

/// Variables a child needs: the fixroot settings plus `LD_PRELOAD`, keeping
/// any libraries already preloaded.
fn preload_environment(config: &Config, library: &Path) -> Vec<(String, String)> {
    let mut vars = config.preload_env();
    let mut preload = library.to_string_lossy().into_owned();
    if let Ok(existing) = std::env::var("LD_PRELOAD") {
        if !existing.is_empty() {
            preload.push(':');
            preload.push_str(&existing);
        }
    }
    vars.push(("LD_PRELOAD".to_string(), preload));
    vars
}

fn cmd_run(command: &[String], config: &Config) -> Result<()> {
    let library = find_preload_library()?;
    let mut cmd = std::process::Command::new(&command[0]);
    cmd.args(&command[1..]);
    for (key, value) in preload_environment(config, &library) {
        log_cli_debug!("child environment", key = key.as_str(), value = value.as_str());
        cmd.env(key, value);
    }

    let status = cmd
        .status()
        .with_context(|| format!("Failed to execute: {}", command[0]))?;
    std::process::exit(status.code().unwrap_or(1));
}

const PRELOAD_LIBRARY: &str = "libfixroot_preload.so";

fn find_preload_library() -> Result<PathBuf> {
    let candidates = [
        // Development: next to the fixroot binary in the cargo target dir
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.join(PRELOAD_LIBRARY))),
        // ../lib/ relative to bin/
        std::env::current_exe().ok().and_then(|p| {
            p.parent()
                .and_then(Path::parent)
                .map(|p| p.join("lib").join(PRELOAD_LIBRARY))
        }),
        Some(PathBuf::from("target/release").join(PRELOAD_LIBRARY)),
        Some(PathBuf::from("target/debug").join(PRELOAD_LIBRARY)),
        Some(PathBuf::from("/usr/local/lib/fixroot").join(PRELOAD_LIBRARY)),
    ];

    for candidate in candidates.into_iter().flatten() {
        if candidate.exists() {
            return candidate
                .canonicalize()
                .with_context(|| format!("resolve {}", candidate.display()));
        }
    }

    anyhow::bail!(
        "Could not find {}.\n\
        Build with: cargo build -p fixroot-preload --release",
        PRELOAD_LIBRARY
    );
}

/// Single-quote `value` for POSIX shells.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
