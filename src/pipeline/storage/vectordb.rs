use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::types::{ScoredPassage, TextChunk, VectorSearch, VectorStore};
use super::StorageError;
use crate::db;

/// Knowledge base persisted in SQLite. Embeddings are little-endian f32
/// BLOBs; search is exhaustive cosine similarity.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = db::open_database(path)?;
        tracing::debug!(path = %path.display(), "Knowledge base opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: Mutex::new(db::open_memory_database()?),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::VectorDb("Connection lock poisoned".into()))
    }
}

/// Stable passage id: re-ingesting the same file reproduces the same ids.
pub fn passage_id(source: &str, chunk_index: usize) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{source}#{chunk_index}").as_bytes(),
    )
}

pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

impl VectorStore for SqliteVectorStore {
    fn upsert_passages(
        &self,
        source: &str,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, StorageError> {
        if chunks.len() != embeddings.len() {
            return Err(StorageError::VectorDb(
                "Chunk count does not match embedding count".into(),
            ));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();

        tx.execute("DELETE FROM passages WHERE source = ?1", params![source])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO passages
                 (id, source, chunk_index, section_title, content, embedding, dimension, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (chunk, embedding) in chunks.iter().zip(embeddings) {
                stmt.execute(params![
                    passage_id(source, chunk.chunk_index).to_string(),
                    source,
                    chunk.chunk_index as i64,
                    chunk.section_title,
                    chunk.content,
                    encode_embedding(embedding),
                    embedding.len() as i64,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        Ok(chunks.len())
    }

    fn delete_source(&self, source: &str) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM passages WHERE source = ?1", params![source])?;
        Ok(deleted)
    }

    fn count(&self) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn sources(&self) -> Result<Vec<(String, usize)>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*) FROM passages GROUP BY source ORDER BY source",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl VectorSearch for SqliteVectorStore {
    fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, StorageError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, source, chunk_index, section_title, content, embedding
             FROM passages WHERE dimension = ?1",
        )?;

        let mut scored = stmt
            .query_map(params![query_embedding.len() as i64], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(5)?;
                Ok((
                    id,
                    ScoredPassage {
                        id: Uuid::nil(),
                        source: row.get(1)?,
                        chunk_index: row.get::<_, i64>(2)? as usize,
                        section_title: row.get(3)?,
                        content: row.get(4)?,
                        score: cosine_similarity(query_embedding, &decode_embedding(&blob)),
                    },
                ))
            })?
            .map(|row| {
                let (id, mut passage) = row?;
                passage.id = Uuid::parse_str(&id)
                    .map_err(|e| StorageError::VectorDb(format!("Invalid passage id {id}: {e}")))?;
                Ok(passage)
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}
