use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TEST_INIT: Once = Once::new();

/// Installs a plain `fmt` subscriber driven by `RUST_LOG`.
///
/// Embedding hosts that run their own subscriber (or an exporter pipeline)
/// should skip this and compose the crate's spans themselves; calling it
/// twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Subscriber setup for unit tests: crate-level debug, everything else quiet.
pub fn init_test_telemetry() {
    TEST_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("causerie=debug,warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}
