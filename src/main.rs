use std::process::ExitCode;
use std::sync::Arc;

use swasth_ai::api::serve_until_ctrl_c;
use swasth_ai::config::{AppConfig, APP_NAME, APP_VERSION};
use swasth_ai::core_state::CoreState;

fn main() -> ExitCode {
    swasth_ai::init_tracing();
    tracing::info!("{APP_NAME} starting v{APP_VERSION}");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let addr = config.bind_addr;

    // Model loading and the blocking HTTP client stay outside the runtime.
    let core = Arc::new(CoreState::load(config));
    tracing::info!(
        classifier_loaded = core.classifier_loaded(),
        remedy_loaded = core.remedy_loaded(),
        "Components loaded"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(serve_until_ctrl_c(core.clone(), addr));
    drop(runtime);
    drop(core);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
