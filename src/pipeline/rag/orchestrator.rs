use super::llm::{ChatCompletion, OpenAiCompatibleClient};
use super::prompt::{build_remedy_messages, NO_CONTEXT_RESPONSE};
use super::retrieval;
use super::sanitize::{sanitize_query, strip_reference_markers};
use super::RagError;
use crate::config::AppConfig;
use crate::pipeline::storage::{self, EmbeddingModel, SqliteVectorStore, VectorSearch, VectorStore};

/// Sampling and retrieval parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_k: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: crate::config::DEFAULT_LLM_TEMPERATURE,
            max_tokens: crate::config::DEFAULT_LLM_MAX_TOKENS,
            top_k: crate::config::DEFAULT_RETRIEVAL_TOP_K,
        }
    }
}

/// Answer `query` from `context` with the chat model.
///
/// Blank context short-circuits to an empty answer without calling the API.
pub fn generate_answer(
    chat: &dyn ChatCompletion,
    query: &str,
    context: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String, RagError> {
    if context.trim().is_empty() {
        return Ok(String::new());
    }

    let messages = build_remedy_messages(query, context);
    let raw = chat.complete(&messages, temperature, max_tokens)?;
    Ok(strip_reference_markers(&raw))
}

/// Symptom Q&A pipeline: sanitize → retrieve → generate.
pub struct RemedyEngine {
    embedder: Box<dyn EmbeddingModel>,
    store: Box<dyn VectorSearch>,
    chat: Box<dyn ChatCompletion>,
    settings: GenerationSettings,
}

impl RemedyEngine {
    pub fn new(
        embedder: Box<dyn EmbeddingModel>,
        store: Box<dyn VectorSearch>,
        chat: Box<dyn ChatCompletion>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            chat,
            settings,
        }
    }

    /// Build the engine from configuration: API key, embedding model and
    /// knowledge base must all be available.
    pub fn from_config(config: &AppConfig) -> Result<Self, RagError> {
        let chat = OpenAiCompatibleClient::new(&config.llm)?;

        let embedder = storage::load_embedder(&config.embedding_model_dir)
            .map_err(|e| RagError::NotConfigured(format!("Embedding model: {e}")))?;

        let store = SqliteVectorStore::open(&config.knowledge_db)
            .map_err(|e| RagError::VectorSearch(e.to_string()))?;
        match store.count() {
            Ok(0) => tracing::warn!(
                path = %config.knowledge_db.display(),
                "Knowledge base is empty; run `ingest` to add reference texts"
            ),
            Ok(passages) => tracing::info!(passages, "Knowledge base ready"),
            Err(e) => return Err(RagError::VectorSearch(e.to_string())),
        }

        tracing::info!(model = %chat.model(), "Remedy assistant ready");

        Ok(Self::new(
            embedder,
            Box::new(store),
            Box::new(chat),
            GenerationSettings {
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
                top_k: config.retrieval_top_k,
            },
        ))
    }

    pub fn settings(&self) -> GenerationSettings {
        self.settings
    }

    /// Top-k passages for `query`, joined by newlines.
    pub fn get_relevant(&self, query: &str) -> Result<String, RagError> {
        retrieval::get_relevant(query, self.embedder.as_ref(), self.store.as_ref(), self.settings.top_k)
    }

    pub fn generate_answer(&self, query: &str, context: &str) -> Result<String, RagError> {
        generate_answer(
            self.chat.as_ref(),
            query,
            context,
            self.settings.temperature,
            self.settings.max_tokens,
        )
    }

    /// Full pipeline for one symptom query.
    pub fn answer(&self, raw_query: &str) -> Result<String, RagError> {
        let query = sanitize_query(raw_query)?;

        let context = self.get_relevant(&query)?;
        if context.trim().is_empty() {
            tracing::info!("No knowledge base context for query");
            return Ok(NO_CONTEXT_RESPONSE.to_string());
        }

        let answer = self.generate_answer(&query, &context)?;
        tracing::info!(
            context_chars = context.len(),
            answer_chars = answer.len(),
            "Remedy answer generated"
        );
        Ok(answer)
    }
}
