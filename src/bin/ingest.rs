//! Populate the knowledge base from a directory of `.txt` / `.md` files.
//!
//! Usage: `ingest <documents-dir> [--db <knowledge.db>]`

use std::path::PathBuf;
use std::process::ExitCode;

use swasth_ai::config::AppConfig;
use swasth_ai::pipeline::storage::{
    ingest_directory, load_embedder, PassageChunker, SqliteVectorStore, VectorStore,
};

const USAGE: &str = "Usage: ingest <documents-dir> [--db <knowledge.db>]";

fn main() -> ExitCode {
    swasth_ai::init_tracing();

    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut docs_dir = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--db" => match args.get(i + 1) {
                Some(path) => {
                    config.knowledge_db = PathBuf::from(path);
                    i += 1;
                }
                None => {
                    eprintln!("Error: --db requires a path\n{USAGE}");
                    return ExitCode::FAILURE;
                }
            },
            "-h" | "--help" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            arg if !arg.starts_with('-') => docs_dir = Some(PathBuf::from(arg)),
            other => {
                eprintln!("Error: unknown option {other}\n{USAGE}");
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    let Some(docs_dir) = docs_dir else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let embedder = match load_embedder(&config.embedding_model_dir) {
        Ok(embedder) => embedder,
        Err(e) => {
            eprintln!("Cannot load embedding model: {e}");
            return ExitCode::FAILURE;
        }
    };
    let store = match SqliteVectorStore::open(&config.knowledge_db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Cannot open knowledge base: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Documents: {}", docs_dir.display());
    println!("Knowledge base: {}", config.knowledge_db.display());

    match ingest_directory(&docs_dir, &PassageChunker::new(), embedder.as_ref(), &store) {
        Ok(report) => {
            println!(
                "Ingested {} passages from {} files ({} skipped)",
                report.passages, report.files, report.skipped
            );
            if let Ok(total) = store.count() {
                println!("Knowledge base now holds {total} passages");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Ingestion failed: {e}");
            ExitCode::FAILURE
        }
    }
}
