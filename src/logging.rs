//! Logging setup based on `tracing_subscriber`.

use std::{io::IsTerminal, sync::Once};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

static LOG_ENV_VAR: &str = "TESLA_CRON_LOG";

/// Initializes a tracing subscriber writing to stderr.
///
/// The filter is read from `TESLA_CRON_LOG` and defaults to `info`.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .with_env_var(LOG_ENV_VAR)
            .from_env_lossy();

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .init();
    });
}
