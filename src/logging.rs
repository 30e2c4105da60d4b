//! Structured logging setup.
//!
//! Logs go to **stderr** so stdout stays parseable for scripts. `RUST_LOG`
//! takes precedence over `[logging].level`.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder
            .with_ansi(atty::is(atty::Stream::Stderr))
            .try_init()
    };
}
