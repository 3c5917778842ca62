//! # docchat CLI
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat serve` | Start the HTTP API (`/chat`, `/passages`, `/health`) |
//! | `docchat ask "<question>" --passages notes.txt` | One-shot question against a passage file |
//!
//! Both commands call the Gemini API and require `GEMINI_API_KEY` to be set.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docchat::config::{load_config, Config};
use docchat::index::{MemoryIndex, Passage, VectorIndex};
use docchat::pipeline::Pipeline;
use docchat::server::run_server;

/// Session-scoped document QA over multi-query retrieval.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Answer questions against uploaded documents with multi-query retrieval and LLM re-ranking",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Serves `POST /chat` for conversational QA, `POST /passages` for
    /// handing pre-chunked passages to a session, and `GET /health`.
    Serve,

    /// Ask one question against a newline-delimited passage file.
    ///
    /// Each non-empty line of the file becomes one passage, labeled with
    /// the file name. Useful for trying the pipeline without the server.
    Ask {
        /// The question to answer.
        question: String,

        /// Passage file: one passage per non-empty line.
        #[arg(long)]
        passages: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docchat=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Serve => {
            let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new());
            let pipeline = Arc::new(Pipeline::from_config(&config, index.clone())?);
            run_server(&config, pipeline, index).await
        }
        Commands::Ask { question, passages } => ask(&config, &question, &passages).await,
    }
}

async fn ask(config: &Config, question: &str, passages_path: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(passages_path)
        .with_context(|| format!("Failed to read passage file: {}", passages_path.display()))?;
    let source = passages_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "passages".to_string());

    let passages: Vec<Passage> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| Passage::new(l, source.as_str()))
        .collect();

    if passages.is_empty() {
        anyhow::bail!("Passage file is empty: {}", passages_path.display());
    }

    let index = Arc::new(MemoryIndex::new());
    let session_id = "cli";
    index.add_passages(session_id, passages).await?;

    let pipeline = Pipeline::from_config(config, index)?;
    let turn = pipeline.handle_chat_turn(question, session_id, &[]).await?;

    println!("{}", turn.answer);
    if !turn.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, s) in turn.sources.iter().enumerate() {
            println!("  {}. {}", i + 1, s.replace('\n', " "));
        }
    }

    Ok(())
}
