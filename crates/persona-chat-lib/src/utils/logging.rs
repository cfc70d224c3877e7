//! Process-wide `tracing` subscriber setup.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the stderr subscriber once. `RUST_LOG` overrides the default `info` level.
/// Safe to call from every entry point; later calls are no-ops.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`] but with a caller-chosen fallback filter (e.g. `"debug"` for `--verbose`).
pub fn init_with_default(default_filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        // A test harness or embedding application may already own the global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
