//! Utilities: logging setup (verbosity flags -> tracing filter) and timing.
//!
//! Key items:
//!   init_logging / derive_level
//!   elapsed_ms

use std::time::Instant;

/// Logging helpers.
///
/// Diagnostics go to stderr through `tracing`; stdout belongs to the
/// interactive console. `RUST_LOG` overrides the flag-derived level.
pub mod logging {
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::EnvFilter;

    pub fn derive_level(verbose: u8, quiet: bool) -> LevelFilter {
        if quiet {
            return LevelFilter::ERROR;
        }
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    pub fn init_logging(level: LevelFilter) {
        let filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();
        // A second init (tests) keeps the first subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

}

pub use logging::{derive_level, init_logging};

/// Milliseconds since `started`.
pub fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
