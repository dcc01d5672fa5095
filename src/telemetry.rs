//! Structured logging setup.
//!
//! The core never installs a subscriber implicitly; embedding it in another
//! process (or a test binary) should not fight over the global dispatcher.
//! Callers that do want the default setup call [`init_tracing`] once.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing-subscriber` fmt layer driven by `RUST_LOG`
/// (`netwatch=info` if unset). Safe to call at most once per process;
/// a second call is a no-op whose error is discarded.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netwatch=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
