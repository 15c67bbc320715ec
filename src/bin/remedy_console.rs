//! Interactive symptom Q&A against the knowledge base.

use std::io::{BufRead, Write};
use std::process::ExitCode;

use swasth_ai::config::AppConfig;
use swasth_ai::core_state::load_remedy;
use swasth_ai::pipeline::rag::RagError;

fn main() -> ExitCode {
    swasth_ai::init_tracing();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = match load_remedy(&config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        println!("{}\n", "-".repeat(80));
        print!("Ask? (or type 'exit'): ");
        let _ = std::io::stdout().flush();

        let query = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("Failed to read input: {e}");
                break;
            }
            None => break,
        };
        if matches!(query.trim().to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        match engine.answer(&query) {
            Ok(answer) => println!("\n{answer}\n"),
            Err(RagError::InvalidQuery(reason)) => println!("\n{reason}\n"),
            Err(e) => eprintln!("\nError: {e}\n"),
        }
    }

    ExitCode::SUCCESS
}
