use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::vision::InputNormalization;

/// Application-level constants
pub const APP_NAME: &str = "Swasth-AI";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default bind address (the frontend expects the backend on port 8000).
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Default CORS origin: the Next.js dev server.
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// OpenAI-compatible endpoint of the hosted chat model.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.perplexity.ai";
pub const DEFAULT_LLM_MODEL: &str = "sonar-pro";
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

/// Passages retrieved per symptom query.
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 10;

/// Default log filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "swasth_ai=info,tower_http=info"
}

/// Get the models directory (classifier, background removal, embeddings)
pub fn models_dir() -> PathBuf {
    PathBuf::from("models")
}

/// Get the embedding model directory (all-MiniLM-L6-v2)
pub fn embedding_model_dir() -> PathBuf {
    models_dir().join("all-MiniLM-L6-v2")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub cors_origin: String,
    pub classifier_model: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub background_model: PathBuf,
    pub embedding_model_dir: PathBuf,
    pub knowledge_db: PathBuf,
    pub llm: LlmConfig,
    pub retrieval_top_k: usize,
    pub input_normalization: InputNormalization,
    /// Rotate uploads by their EXIF orientation before preprocessing.
    pub exif_orientation: bool,
}

/// Hosted chat model settings.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

// The API key never reaches logs.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            classifier_model: models_dir().join("efficientnet_b0_final_nb.onnx"),
            labels_path: None,
            background_model: models_dir().join("u2net.onnx"),
            embedding_model_dir: embedding_model_dir(),
            knowledge_db: PathBuf::from("knowledge_base").join("knowledge.db"),
            llm: LlmConfig {
                api_key: None,
                base_url: DEFAULT_LLM_BASE_URL.to_string(),
                model: DEFAULT_LLM_MODEL.to_string(),
                temperature: DEFAULT_LLM_TEMPERATURE,
                max_tokens: DEFAULT_LLM_MAX_TOKENS,
                timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            },
            retrieval_top_k: DEFAULT_RETRIEVAL_TOP_K,
            input_normalization: InputNormalization::EfficientNet,
            exif_orientation: false,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "Failed to read .env, continuing without it"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("SWASTH_BIND_ADDR") {
            config.bind_addr = parse_value("SWASTH_BIND_ADDR", &v)?;
        }
        if let Some(v) = get("SWASTH_CORS_ORIGIN") {
            config.cors_origin = v;
        }
        if let Some(v) = get("SWASTH_CLASSIFIER_MODEL") {
            config.classifier_model = PathBuf::from(v);
        }
        config.labels_path = get("SWASTH_LABELS_PATH").map(PathBuf::from);
        if let Some(v) = get("SWASTH_BACKGROUND_MODEL") {
            config.background_model = PathBuf::from(v);
        }
        if let Some(v) = get("SWASTH_EMBEDDING_MODEL_DIR") {
            config.embedding_model_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SWASTH_KNOWLEDGE_DB") {
            config.knowledge_db = PathBuf::from(v);
        }

        config.llm.api_key = get("PERPLEXITY_API_KEY");
        if let Some(v) = get("SWASTH_LLM_BASE_URL") {
            config.llm.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("SWASTH_LLM_MODEL") {
            config.llm.model = v;
        }
        if let Some(v) = get("SWASTH_LLM_TEMPERATURE") {
            let t: f32 = parse_value("SWASTH_LLM_TEMPERATURE", &v)?;
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::InvalidValue {
                    key: "SWASTH_LLM_TEMPERATURE",
                    value: v,
                    reason: "must be between 0.0 and 2.0".into(),
                });
            }
            config.llm.temperature = t;
        }
        if let Some(v) = get("SWASTH_LLM_MAX_TOKENS") {
            config.llm.max_tokens = parse_value("SWASTH_LLM_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("SWASTH_LLM_TIMEOUT_SECS") {
            config.llm.timeout_secs = parse_value("SWASTH_LLM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("SWASTH_RETRIEVAL_TOP_K") {
            let k: usize = parse_value("SWASTH_RETRIEVAL_TOP_K", &v)?;
            if k == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "SWASTH_RETRIEVAL_TOP_K",
                    value: v,
                    reason: "must be at least 1".into(),
                });
            }
            config.retrieval_top_k = k;
        }
        if let Some(v) = get("SWASTH_INPUT_NORMALIZATION") {
            config.input_normalization =
                v.parse().map_err(|reason| ConfigError::InvalidValue {
                    key: "SWASTH_INPUT_NORMALIZATION",
                    value: v.clone(),
                    reason,
                })?;
        }

        if let Some(v) = get("SWASTH_EXIF_ORIENTATION") {
            config.exif_orientation = parse_value("SWASTH_EXIF_ORIENTATION", &v)?;
        }

        Ok(config)
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
