use super::RagError;
use crate::pipeline::storage::{EmbeddingModel, ScoredPassage, VectorSearch};

/// Embed the query and return the `top_k` most similar passages.
pub fn semantic_search(
    query_text: &str,
    embedder: &dyn EmbeddingModel,
    vector_store: &dyn VectorSearch,
    top_k: usize,
) -> Result<Vec<ScoredPassage>, RagError> {
    let query_embedding = embedder
        .embed(query_text)
        .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;

    vector_store
        .search(&query_embedding, top_k)
        .map_err(|e| RagError::VectorSearch(e.to_string()))
}

/// Passage contents joined by newlines, in similarity order.
pub fn join_passages(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Context string for `query`: the top `k` passages joined by newlines.
/// An empty knowledge base yields an empty string.
pub fn get_relevant(
    query: &str,
    embedder: &dyn EmbeddingModel,
    vector_store: &dyn VectorSearch,
    k: usize,
) -> Result<String, RagError> {
    let passages = semantic_search(query, embedder, vector_store, k)?;
    tracing::debug!(
        passages = passages.len(),
        best_score = passages.first().map(|p| p.score).unwrap_or(0.0),
        "Retrieved knowledge base context"
    );
    Ok(join_passages(&passages))
}
