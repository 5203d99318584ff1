use std::sync::Arc;

use gemini_bt::engine::Bar;
use gemini_bt::utils::synthetic_bars;

/// Daily bars shared by the demos.
pub fn example_bars() -> Arc<[Bar]> {
    Arc::from_iter(synthetic_bars(3000, 42, 100.0))
}

/// Installs a `tracing` subscriber for the demos when `RUST_LOG` is set.
#[allow(dead_code)]
pub fn init_logs() {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }
}
