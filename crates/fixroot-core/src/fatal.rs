//! Terminal handling of fixture-integrity faults.

use crate::error::FixtureError;

/// Called with a fault the emulator refuses to paper over. Never returns.
pub type FatalHandler = fn(&FixtureError) -> !;

/// Default handler: log, print a diagnostic naming the fixture, abort.
pub fn abort_with_diagnostic(err: &FixtureError) -> ! {
    fixroot_config::log_redirect_error!("fixture fault", error = tracing::field::display(err));
    eprintln!("fixroot: {}", err);
    std::process::abort()
}
