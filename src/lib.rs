pub mod api; // HTTP API: health, identify, remedy
pub mod config;
pub mod core_state; // Shared state for server and tools
pub mod db;
pub mod pipeline; // Vision + knowledge base + RAG
pub mod tfjs; // TF.js conversion tooling

use tracing_subscriber::EnvFilter;

/// Initialize tracing. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
