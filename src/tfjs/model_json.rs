//! InputLayer repair for converted TF.js `model.json` files.
//!
//! The browser loader needs `batchInputShape` on every InputLayer. Newer
//! Keras exports write `inputShape` or `batch_shape` instead, or nothing.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::TfjsError;

/// Written when an InputLayer carries no shape at all (MobileNet input).
pub fn default_batch_input_shape() -> Value {
    json!([null, 224, 224, 3])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    /// `[null] + inputShape`
    FromInputShape,
    /// Copied from the Keras 3 `batch_shape` key.
    FromBatchShape,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputLayerFix {
    pub name: Option<String>,
    pub kind: FixKind,
    pub batch_input_shape: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FixOutcome {
    /// InputLayers found in the topology.
    pub input_layers: usize,
    pub fixes: Vec<InputLayerFix>,
}

impl FixOutcome {
    pub fn changed(&self) -> bool {
        !self.fixes.is_empty()
    }
}

/// Add a missing `batchInputShape` to every InputLayer of the model at
/// `path`. The file is rewritten only when something changed.
pub fn fix_input_layer(path: &Path) -> Result<FixOutcome, TfjsError> {
    let raw = std::fs::read(path)?;
    let mut model: Value = serde_json::from_slice(&raw)?;

    let outcome = fix_topology(&mut model)?;
    if outcome.changed() {
        write_atomically(path, &serde_json::to_vec(&model)?)?;
        tracing::info!(
            path = %path.display(),
            fixes = outcome.fixes.len(),
            "model.json updated"
        );
    } else {
        tracing::info!(
            input_layers = outcome.input_layers,
            "InputLayer configuration looks correct, no changes needed"
        );
    }

    Ok(outcome)
}

/// In-memory variant of [`fix_input_layer`].
///
/// Looks at `modelTopology.layers` and `modelTopology.model_config.config.layers`.
/// A model without `modelTopology` is left untouched.
pub fn fix_topology(model: &mut Value) -> Result<FixOutcome, TfjsError> {
    let root = model
        .as_object_mut()
        .ok_or_else(|| TfjsError::InvalidModelJson("top level is not a JSON object".into()))?;

    let mut outcome = FixOutcome::default();
    let Some(topology) = root.get_mut("modelTopology") else {
        return Ok(outcome);
    };

    if let Some(layers) = topology.get_mut("layers").and_then(Value::as_array_mut) {
        fix_layers(layers, &mut outcome);
    }
    if let Some(layers) = topology
        .pointer_mut("/model_config/config/layers")
        .and_then(Value::as_array_mut)
    {
        fix_layers(layers, &mut outcome);
    }

    Ok(outcome)
}

fn fix_layers(layers: &mut [Value], outcome: &mut FixOutcome) {
    for layer in layers.iter_mut() {
        if layer.get("class_name").and_then(Value::as_str) != Some("InputLayer") {
            continue;
        }
        outcome.input_layers += 1;

        let name = layer
            .get("name")
            .or_else(|| layer.get("config").and_then(|c| c.get("name")))
            .and_then(Value::as_str)
            .map(String::from);

        let Some(layer) = layer.as_object_mut() else {
            continue;
        };
        let Some(config) = layer
            .entry("config")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
        else {
            tracing::warn!(layer = ?name, "InputLayer config is not an object; skipped");
            continue;
        };

        if let Some((kind, batch_input_shape)) = fix_config(config) {
            tracing::info!(
                layer = ?name,
                kind = ?kind,
                batch_input_shape = %batch_input_shape,
                "Fixed InputLayer"
            );
            outcome.fixes.push(InputLayerFix {
                name,
                kind,
                batch_input_shape,
            });
        }
    }
}

fn fix_config(config: &mut Map<String, Value>) -> Option<(FixKind, Value)> {
    if config.contains_key("batchInputShape") || config.contains_key("batch_input_shape") {
        return None;
    }

    let (kind, shape) =
        if let Some(input_shape) = config.get("inputShape").or_else(|| config.get("input_shape")) {
            (FixKind::FromInputShape, with_batch_dim(input_shape))
        } else if let Some(batch_shape) = config.get("batch_shape").filter(|v| v.is_array()) {
            (FixKind::FromBatchShape, batch_shape.clone())
        } else {
            (FixKind::Default, default_batch_input_shape())
        };

    config.insert("batchInputShape".into(), shape.clone());
    Some((kind, shape))
}

fn with_batch_dim(input_shape: &Value) -> Value {
    let mut shape = vec![Value::Null];
    match input_shape {
        Value::Array(dims) => shape.extend(dims.iter().cloned()),
        scalar => shape.push(scalar.clone()),
    }
    Value::Array(shape)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), TfjsError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| TfjsError::Io(e.error))?;
    Ok(())
}
