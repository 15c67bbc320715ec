//! Symptom Q&A: retrieve knowledge base passages, then ask the hosted chat
//! model to answer from them.

pub mod llm;
pub mod prompt;
pub mod retrieval;
pub mod sanitize;
pub mod orchestrator;

use thiserror::Error;

pub use llm::{ChatCompletion, ChatMessage, MockChatClient, OpenAiCompatibleClient, Role};
pub use orchestrator::{GenerationSettings, RemedyEngine};
pub use retrieval::get_relevant;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Remedy assistant not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("LLM API connection failed: {0}")]
    ApiConnection(String),

    #[error("LLM API returned {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Vector search failed: {0}")]
    VectorSearch(String),
}
