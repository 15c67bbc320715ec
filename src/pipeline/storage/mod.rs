//! Knowledge base storage: chunking, embedding and the SQLite vector store.

pub mod types;
pub mod chunker;
pub mod embedder;
pub mod vectordb;
pub mod ingest;

use std::path::PathBuf;

use thiserror::Error;

use crate::db::DatabaseError;

pub use chunker::PassageChunker;
pub use embedder::{load_embedder, MockEmbedder, EMBEDDING_DIM};
pub use ingest::{ingest_directory, IngestReport};
pub use types::{Chunker, EmbeddingModel, ScoredPassage, TextChunk, VectorSearch, VectorStore};
pub use vectordb::SqliteVectorStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Vector DB error: {0}")]
    VectorDb(String),

    #[error("Embedding model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Embedding model initialization: {0}")]
    ModelInit(String),

    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("ONNX Runtime support is not compiled in (enable the `onnx` feature)")]
    RuntimeUnavailable,
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(DatabaseError::Sqlite(e))
    }
}
