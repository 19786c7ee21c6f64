//! Structured logging utilities for fixroot components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use fixroot_config::logging::*;
//!
//! log_redirect_debug!("open redirected", target = "/fixtures/proc/cpuinfo");
//! log_cli_info!("Capturing sysconf values", count = 42);
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const REDIRECT: &'static str = "REDIRECT";
    pub const SYNTH: &'static str = "SYNTH";
    pub const GUARD: &'static str = "GUARD";
    pub const PRELOAD: &'static str = "PRELOAD";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse a level name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

// === REDIRECT logging macros ===

#[macro_export]
macro_rules! log_redirect_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "REDIRECT", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_redirect_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "REDIRECT", $($key = $value,)* $msg)
    };
}

// === SYNTH logging macros ===

#[macro_export]
macro_rules! log_synth_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "SYNTH", $($key = $value,)* $msg)
    };
}

// === GUARD logging macros ===

#[macro_export]
macro_rules! log_guard_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "GUARD", $($key = $value,)* $msg)
    };
}

// === PRELOAD logging macros ===

#[macro_export]
macro_rules! log_preload_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "PRELOAD", $($key = $value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CLI", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "CLI", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "CLI", $($key = $value,)* $msg)
    };
}

/// Initialize logging for the CLI.
/// `FIXROOT_LOG` wins over `RUST_LOG`, which wins over `level`.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env(crate::ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Logging for a preloaded process.
///
/// Everything goes to stderr at debug level. Uses `try_init` because the host
/// program may already own the global subscriber, in which case our events
/// simply flow into it.
pub fn init_verbose_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
