//! Keras `.h5` → TF.js conversion through `tensorflowjs_converter`.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use super::model_json::{fix_input_layer, FixOutcome};
use super::TfjsError;

pub const DEFAULT_CONVERTER: &str = "tensorflowjs_converter";

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Keras `.h5` file.
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// SavedModel directory tried when direct Keras conversion fails.
    pub saved_model: Option<PathBuf>,
    pub converter: PathBuf,
}

impl ConvertOptions {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            saved_model: None,
            converter: PathBuf::from(DEFAULT_CONVERTER),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMethod {
    Keras,
    SavedModel,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertReport {
    pub method: ConversionMethod,
    pub model_json: PathBuf,
    /// `format` field of the produced `model.json`, if present.
    pub format: Option<String>,
    pub fix: FixOutcome,
}

/// Convert a Keras model to TF.js, validate `model.json` and repair its
/// InputLayer metadata.
///
/// Blocking: runs the converter as a child process.
pub fn convert_h5_to_tfjs(options: &ConvertOptions) -> Result<ConvertReport, TfjsError> {
    if !options.input.exists() {
        return Err(TfjsError::InputNotFound(options.input.clone()));
    }
    std::fs::create_dir_all(&options.output_dir)?;

    tracing::info!(
        input = %options.input.display(),
        output = %options.output_dir.display(),
        "Converting Keras model to TF.js"
    );

    let method = match run_converter(
        &options.converter,
        "keras",
        &options.input,
        &options.output_dir,
    ) {
        Ok(()) => ConversionMethod::Keras,
        Err(TfjsError::ConversionFailed(reason)) => {
            let Some(saved_model) = &options.saved_model else {
                return Err(TfjsError::ConversionFailed(reason));
            };
            tracing::warn!(reason = %reason, "Direct conversion failed, trying SavedModel");
            if !saved_model.exists() {
                return Err(TfjsError::InputNotFound(saved_model.clone()));
            }
            run_converter(
                &options.converter,
                "tf_saved_model",
                saved_model,
                &options.output_dir,
            )?;
            ConversionMethod::SavedModel
        }
        Err(e) => return Err(e),
    };

    let model_json = options.output_dir.join("model.json");
    if !model_json.is_file() {
        return Err(TfjsError::ModelJsonMissing(model_json));
    }

    let format = read_format(&model_json)?;
    tracing::info!(
        method = ?method,
        format = format.as_deref().unwrap_or("unknown"),
        "Model JSON validated"
    );

    let fix = fix_input_layer(&model_json)?;

    Ok(ConvertReport {
        method,
        model_json,
        format,
        fix,
    })
}

fn run_converter(
    converter: &Path,
    input_format: &str,
    input: &Path,
    output_dir: &Path,
) -> Result<(), TfjsError> {
    let output = Command::new(converter)
        .arg(format!("--input_format={input_format}"))
        .arg(input)
        .arg(output_dir)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                TfjsError::ConverterNotFound(converter.display().to_string())
            }
            _ => TfjsError::Io(e),
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(str::trim)
        .unwrap_or("no error output");
    Err(TfjsError::ConversionFailed(format!(
        "{input_format} ({}): {detail}",
        output.status
    )))
}

fn read_format(model_json: &Path) -> Result<Option<String>, TfjsError> {
    let raw = std::fs::read(model_json)?;
    let model: serde_json::Value = serde_json::from_slice(&raw)?;
    Ok(model
        .get("format")
        .and_then(serde_json::Value::as_str)
        .map(String::from))
}
