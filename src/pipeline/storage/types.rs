use uuid::Uuid;

use super::StorageError;

/// A passage of a knowledge base document
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub content: String,
    pub chunk_index: usize,
    pub section_title: Option<String>,
    pub char_offset: usize,
}

/// Chunking strategy trait
pub trait Chunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk>;
}

/// Embedding model abstraction
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError>;
    fn dimension(&self) -> usize;
}

/// Allow `Box<dyn EmbeddingModel>` to be used as `&impl EmbeddingModel`.
impl EmbeddingModel for Box<dyn EmbeddingModel> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

/// Write side of the knowledge base.
pub trait VectorStore: Send + Sync {
    /// Replace all passages of `source` with `chunks`. Returns the number stored.
    fn upsert_passages(
        &self,
        source: &str,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, StorageError>;

    /// Remove every passage of `source`. Returns the number removed.
    fn delete_source(&self, source: &str) -> Result<usize, StorageError>;

    fn count(&self) -> Result<usize, StorageError>;

    /// Distinct sources and their passage counts, ordered by source.
    fn sources(&self) -> Result<Vec<(String, usize)>, StorageError>;
}

/// A passage with its similarity to the query (from vector search)
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub id: Uuid,
    pub source: String,
    pub chunk_index: usize,
    pub section_title: Option<String>,
    pub content: String,
    pub score: f32,
}

/// Read side of the knowledge base.
pub trait VectorSearch: Send + Sync {
    fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, StorageError>;
}
