//! Convert a Keras `.h5` model to TF.js Layers format.
//!
//! Usage: `convert-model <input.h5> [output-dir] [--saved-model <dir>] [--converter <path>]`

use std::path::PathBuf;
use std::process::ExitCode;

use swasth_ai::tfjs::{convert_h5_to_tfjs, ConvertOptions};

const USAGE: &str =
    "Usage: convert-model <input.h5> [output-dir] [--saved-model <dir>] [--converter <path>]";
const DEFAULT_OUTPUT_DIR: &str = "public/models/simple_mobilenet_classifier";

fn main() -> ExitCode {
    swasth_ai::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut positional = Vec::new();
    let mut saved_model = None;
    let mut converter = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            flag @ ("--saved-model" | "--converter") => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("Error: {flag} requires a path\n{USAGE}");
                    return ExitCode::FAILURE;
                };
                if flag == "--saved-model" {
                    saved_model = Some(PathBuf::from(value));
                } else {
                    converter = Some(PathBuf::from(value));
                }
                i += 1;
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            arg if !arg.starts_with('-') => positional.push(PathBuf::from(arg)),
            other => {
                eprintln!("Error: unknown option {other}\n{USAGE}");
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let Some(input) = positional.next() else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };
    let output_dir = positional
        .next()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    let mut options = ConvertOptions::new(input, output_dir);
    options.saved_model = saved_model;
    if let Some(converter) = converter {
        options.converter = converter;
    }

    match convert_h5_to_tfjs(&options) {
        Ok(report) => {
            println!("Conversion complete ({:?})", report.method);
            println!("  model.json: {}", report.model_json.display());
            println!("  format: {}", report.format.as_deref().unwrap_or("unknown"));
            if report.fix.changed() {
                println!("  fixed {} InputLayer(s)", report.fix.fixes.len());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error during conversion: {e}");
            ExitCode::FAILURE
        }
    }
}
