//! Add a missing `batchInputShape` to InputLayers of a TF.js `model.json`.
//!
//! Usage: `fix-model-json [model.json]`

use std::path::PathBuf;
use std::process::ExitCode;

use swasth_ai::tfjs::fix_input_layer;

const DEFAULT_MODEL_JSON: &str = "public/models/simple_mobilenet_classifier/model.json";

fn main() -> ExitCode {
    swasth_ai::init_tracing();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_JSON));

    match fix_input_layer(&path) {
        Ok(outcome) if outcome.changed() => {
            for fix in &outcome.fixes {
                println!(
                    "Fixed InputLayer {}: batchInputShape = {}",
                    fix.name.as_deref().unwrap_or("<unnamed>"),
                    fix.batch_input_shape
                );
            }
            println!("Model JSON updated: {}", path.display());
            ExitCode::SUCCESS
        }
        Ok(_) => {
            println!("InputLayer configuration looks correct, no changes needed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            ExitCode::FAILURE
        }
    }
}
