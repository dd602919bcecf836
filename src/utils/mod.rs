//! Utilities: logging setup (tracing subscriber on stderr, level from -v/-q or RUST_LOG).
//!
//! Key items:
//!   derive_level
//!   init_logging

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Map `-v` count / `-q` to a level: quiet -> ERROR, 0 -> INFO, 1 -> DEBUG, 2+ -> TRACE.
pub fn derive_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber. `RUST_LOG` directives win over `level`.
///
/// Logs go to stderr so stdout stays clean for child output and `--json`.
pub fn init_logging(level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    // A second init (tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
