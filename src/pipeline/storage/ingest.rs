//! Builds the knowledge base from a directory of `.txt` / `.md` files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::types::{Chunker, EmbeddingModel, VectorStore};
use super::StorageError;

/// Passages embedded per model call.
pub const EMBED_BATCH_SIZE: usize = 32;

const INGEST_EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Files that produced at least one passage.
    pub files: usize,
    pub passages: usize,
    /// Files that were unreadable, not UTF-8, or empty.
    pub skipped: usize,
    /// Stored sources whose file no longer exists under the directory.
    pub removed: usize,
}

/// Chunk, embed and store every `.txt` / `.md` file under `dir` (recursively).
///
/// Sources are recorded as paths relative to `dir` with `/` separators, so
/// re-running over the same directory replaces passages in place. A file that
/// became empty or unreadable loses its passages, and sources whose file is
/// gone are removed.
pub fn ingest_directory(
    dir: &Path,
    chunker: &dyn Chunker,
    embedder: &dyn EmbeddingModel,
    store: &dyn VectorStore,
) -> Result<IngestReport, StorageError> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let mut report = IngestReport::default();
    let mut present = HashSet::new();

    for path in &files {
        let source = source_name(dir, path);
        present.insert(source.clone());

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "Skipping unreadable file");
                store.delete_source(&source)?;
                report.skipped += 1;
                continue;
            }
        };

        let stored = ingest_text(&source, &text, chunker, embedder, store)?;
        if stored == 0 {
            tracing::warn!(source = %source, "Skipping file with no text");
            report.skipped += 1;
            continue;
        }

        report.files += 1;
        report.passages += stored;
    }

    for (source, _) in store.sources()? {
        if !present.contains(&source) {
            let deleted = store.delete_source(&source)?;
            tracing::info!(source = %source, passages = deleted, "Removed passages of deleted file");
            report.removed += 1;
        }
    }

    tracing::info!(
        files = report.files,
        passages = report.passages,
        skipped = report.skipped,
        removed = report.removed,
        "Knowledge base ingestion complete"
    );
    Ok(report)
}

/// Chunk, embed and store one document. Returns the number of passages stored.
pub fn ingest_text(
    source: &str,
    text: &str,
    chunker: &dyn Chunker,
    embedder: &dyn EmbeddingModel,
    store: &dyn VectorStore,
) -> Result<usize, StorageError> {
    let chunks = chunker.chunk(text);
    if chunks.is_empty() {
        store.delete_source(source)?;
        return Ok(0);
    }

    let mut embeddings = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
        embeddings.extend(embedder.embed_batch(&texts)?);
    }

    let stored = store.upsert_passages(source, &chunks, &embeddings)?;
    tracing::debug!(source = %source, passages = stored, "Ingested document");
    Ok(stored)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StorageError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        // Not followed through symlinks, so a linked directory cannot loop.
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_symlink() && path.is_dir() {
            tracing::debug!(path = %path.display(), "Skipping symlinked directory");
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| INGEST_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn source_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::{MockEmbedder, PassageChunker, SqliteVectorStore, VectorSearch};

    fn write(dir: &Path, name: &str, content: &[u8]) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn ingests_text_and_markdown_recursively() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "tulsi.md",
            b"## Tulsi\n\nBoil ten tulsi leaves in water and drink warm for cough.",
        );
        write(
            dir.path(),
            "herbs/neem.txt",
            b"Neem leaf paste applied twice a day soothes itchy skin.",
        );
        write(dir.path(), "notes.pdf", b"%PDF-1.4 ignored");

        let store = SqliteVectorStore::in_memory().unwrap();
        let report = ingest_directory(
            dir.path(),
            &PassageChunker::new(),
            &MockEmbedder::new(),
            &store,
        )
        .unwrap();

        assert_eq!(
            report,
            IngestReport {
                files: 2,
                passages: 2,
                skipped: 0,
                removed: 0
            }
        );
        let sources: Vec<String> = store.sources().unwrap().into_iter().map(|s| s.0).collect();
        assert_eq!(sources, vec!["herbs/neem.txt", "tulsi.md"]);
    }

    #[test]
    fn empty_and_non_utf8_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "empty.txt", b"   \n");
        write(dir.path(), "binary.txt", &[0xff, 0xfe, 0x00, 0x80]);
        write(dir.path(), "ok.txt", b"Ginger tea with honey eases a sore throat.");

        let store = SqliteVectorStore::in_memory().unwrap();
        let report = ingest_directory(
            dir.path(),
            &PassageChunker::new(),
            &MockEmbedder::new(),
            &store,
        )
        .unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn reingest_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "amla.md", b"Amla juice every morning supports immunity.");

        let store = SqliteVectorStore::in_memory().unwrap();
        let chunker = PassageChunker::new();
        let embedder = MockEmbedder::new();
        ingest_directory(dir.path(), &chunker, &embedder, &store).unwrap();
        ingest_directory(dir.path(), &chunker, &embedder, &store).unwrap();

        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn emptied_file_loses_its_passages() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", b"Turmeric milk at night helps a dry cough.");

        let store = SqliteVectorStore::in_memory().unwrap();
        let chunker = PassageChunker::new();
        let embedder = MockEmbedder::new();
        ingest_directory(dir.path(), &chunker, &embedder, &store).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        write(dir.path(), "a.md", b"  \n\n");
        let report = ingest_directory(dir.path(), &chunker, &embedder, &store).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn file_turned_non_utf8_loses_its_passages() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", b"Clove oil on the gum eases toothache.");

        let store = SqliteVectorStore::in_memory().unwrap();
        let chunker = PassageChunker::new();
        let embedder = MockEmbedder::new();
        ingest_directory(dir.path(), &chunker, &embedder, &store).unwrap();

        write(dir.path(), "a.txt", &[0xff, 0xfe, 0x00, 0x80]);
        ingest_directory(dir.path(), &chunker, &embedder, &store).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn deleted_files_are_removed_from_the_store() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.md", b"Ajwain water relieves indigestion after meals.");
        write(dir.path(), "gone.md", b"Aloe vera gel cools minor burns on the skin.");

        let store = SqliteVectorStore::in_memory().unwrap();
        let chunker = PassageChunker::new();
        let embedder = MockEmbedder::new();
        ingest_directory(dir.path(), &chunker, &embedder, &store).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        std::fs::remove_file(dir.path().join("gone.md")).unwrap();
        let report = ingest_directory(dir.path(), &chunker, &embedder, &store).unwrap();

        assert_eq!(report.removed, 1);
        let sources: Vec<String> = store.sources().unwrap().into_iter().map(|s| s.0).collect();
        assert_eq!(sources, vec!["keep.md"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_loop_is_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "docs/ginger.md", b"Ginger tea with honey soothes a sore throat.");
        std::os::unix::fs::symlink(dir.path(), dir.path().join("docs/loop")).unwrap();

        let store = SqliteVectorStore::in_memory().unwrap();
        let report = ingest_directory(
            dir.path(),
            &PassageChunker::new(),
            &MockEmbedder::new(),
            &store,
        )
        .unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn ingested_passages_are_searchable() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let embedder = MockEmbedder::new();
        let chunker = PassageChunker::new();
        ingest_text(
            "remedies.md",
            "## Cough\n\nTulsi and ginger tea relieves cough and cold.\n\n## Skin\n\nNeem paste soothes skin rashes and itching.",
            &chunker,
            &embedder,
            &store,
        )
        .unwrap();

        let query = embedder.embed("ginger tea for cough").unwrap();
        let hits = store.search(&query, 1).unwrap();
        assert_eq!(hits[0].section_title.as_deref(), Some("Cough"));
    }

    #[test]
    fn missing_directory_is_io_error() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let err = ingest_directory(
            Path::new("/nonexistent/knowledge"),
            &PassageChunker::new(),
            &MockEmbedder::new(),
            &store,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
