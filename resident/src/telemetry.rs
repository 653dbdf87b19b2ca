//! Process-wide `tracing` subscriber setup.

use std::io::{self, IsTerminal};
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::config::LOG_ENV;

/// Set once the global subscriber has been installed.
static INSTALLED: OnceLock<()> = OnceLock::new();

/// Installs a compact stderr logger.
///
/// The filter comes from [`LOG_ENV`] when set and valid, otherwise from
/// `default_filter` (e.g. `"info"`). Repeated calls are no-ops.
pub fn init(default_filter: &str) {
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_target(false)
            .compact()
            .try_init();
    });
}
