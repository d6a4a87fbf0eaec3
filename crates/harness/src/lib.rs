mod app;

pub use app::{FieldBuilder, TestApp};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber once per process. Honours `RUST_LOG`; silent
/// when it is unset.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
