//! Structured logging setup.
//!
//! Library code never installs a subscriber on its own; `init()` is
//! meant to be called once by a binary or test harness that wants
//! `RUST_LOG`-filtered output on stderr.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

pub fn init() {
    INIT.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}
