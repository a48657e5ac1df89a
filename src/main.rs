//! # allure-rag CLI (`arag`)
//!
//! The `arag` binary runs the HTTP service and exposes the pipeline stages
//! as commands for local use.
//!
//! ## Usage
//!
//! ```bash
//! arag --config ./config/arag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `arag serve` | Start the HTTP service |
//! | `arag ingest <file>` | Ingest a saved report JSON file |
//! | `arag analyze <team>` | Analyse the retained reports of a team |
//! | `arag ask "<question>"` | Answer a question from the nearest chunks |
//! | `arag chunk <file> --out <path>` | Write the chunk file of a report without indexing |
//! | `arag index <path>` | Re-index chunk files (a `.jsonl` file or a directory of them) |
//! | `arag completions <shell>` | Print shell completions |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use allure_rag::allure::AllureClient;
use allure_rag::cache::EmbeddingCache;
use allure_rag::chunk_files::load_chunks;
use allure_rag::config::{self, Config};
use allure_rag::generation::OllamaGenerator;
use allure_rag::logging::init_tracing;
use allure_rag::pipeline::{Delivery, Pipeline};
use allure_rag::rag::QueryEngine;
use allure_rag::server::{self, AppState};
use allure_rag::sink::{HttpSink, LogSink, ResultSink};
use allure_rag_core::decompose::decompose;
use allure_rag_core::models::Report;

const DEFAULT_CONFIG: &str = "./config/arag.toml";

/// allure-rag: retrieval-augmented analysis of Allure test reports.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without it, `./config/arag.toml` is used when present, built-in
/// defaults otherwise.
#[derive(Parser)]
#[command(
    name = "arag",
    about = "allure-rag: retrieval-augmented analysis of Allure test reports",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service.
    ///
    /// Binds to `[server].bind` and serves `/uuid/analyze`,
    /// `/prompt/analyze`, `/ask` and `/health`.
    Serve,

    /// Ingest a report from a JSON file.
    ///
    /// Decomposes the report, writes its chunk file, embeds the chunks and
    /// uploads them, applying the per-team retention window in both tiers.
    Ingest {
        /// Path to the report JSON (Allure `test-cases/aggregate` output).
        file: PathBuf,

        /// Report id. Defaults to the report's root `uuid`.
        #[arg(long)]
        report_id: Option<String>,

        /// Also run the analysis and deliver it to the configured sink.
        #[arg(long)]
        analyze: bool,
    },

    /// Analyse the retained reports of a team and print the result.
    Analyze {
        /// Team name (the reports' `parentSuite`).
        team: String,

        /// Replace the whole instruction given to the model.
        #[arg(long)]
        prompt: Option<String>,

        /// Ask this question instead of the default analysis.
        #[arg(long, conflicts_with = "prompt")]
        question: Option<String>,
    },

    /// Answer a free-form question from the nearest indexed chunks.
    Ask {
        question: String,

        /// Number of chunks used as context.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Write the chunk file of a report without embedding or indexing.
    Chunk {
        /// Path to the report JSON.
        file: PathBuf,

        /// Output `.jsonl` path.
        #[arg(long)]
        out: PathBuf,

        /// Report id stored in every chunk. Defaults to the report's root `uuid`.
        #[arg(long)]
        report_id: Option<String>,
    },

    /// Embed and upload existing chunk files.
    ///
    /// Accepts one `.jsonl` file or a directory searched recursively, such as
    /// `[storage].chunks_dir`. Each report found is uploaded under its own
    /// team with the usual retention window.
    Index {
        /// Chunk file or directory of chunk files.
        path: PathBuf,
    },

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG)),
        None => Ok(Config::minimal()),
    }
}

fn read_report(path: &Path) -> anyhow::Result<Report> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Report is not valid JSON: {}", path.display()))?;
    Ok(Report::from_json(&value))
}

fn build_pipeline(cfg: &Config) -> anyhow::Result<Arc<Pipeline>> {
    let cache = Arc::new(EmbeddingCache::from_config(Arc::new(cfg.clone())));
    let model = Arc::new(OllamaGenerator::new(&cfg.generation)?);
    let engine = Arc::new(QueryEngine::new(cache, model, cfg.retrieval.scroll_limit));

    let sink: Arc<dyn ResultSink> = match &cfg.allure.analysis_url {
        Some(url) => Arc::new(HttpSink::new(url, cfg.allure.timeout_secs)?),
        None => Arc::new(LogSink),
    };

    Ok(Arc::new(Pipeline::new(cfg, engine, sink)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "arag", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(&cfg.logging);

    match cli.command {
        Commands::Serve => {
            let state = AppState {
                pipeline: build_pipeline(&cfg)?,
                source: Arc::new(AllureClient::new(&cfg.allure)?),
                default_top_k: cfg.retrieval.top_k,
            };
            server::run_server(&cfg.server.bind, state).await?;
        }
        Commands::Ingest {
            file,
            report_id,
            analyze,
        } => {
            let report = read_report(&file)?;
            let pipeline = build_pipeline(&cfg)?;
            let outcome = pipeline.ingest(&report, report_id.as_deref()).await?;

            println!("ingest {}", outcome.report_id);
            println!("  team: {}", outcome.team);
            println!("  chunks: {}", outcome.chunks);
            println!("  chunk file: {}", outcome.chunk_file.display());
            println!("  points upserted: {}", outcome.upload.inserted);
            if !outcome.upload.evicted_reports.is_empty() {
                println!("  evicted: {}", outcome.upload.evicted_reports.join(", "));
            }

            if analyze {
                match pipeline
                    .analyze_and_deliver(&outcome.team, &outcome.report_id, Some(&report), None, None)
                    .await
                {
                    Delivery::Delivered { analysis, .. } => println!("\n{}", analysis),
                    Delivery::Partial { error } => println!("\nanalysis failed: {}", error),
                }
            }
        }
        Commands::Analyze {
            team,
            prompt,
            question,
        } => {
            let pipeline = build_pipeline(&cfg)?;
            let result = pipeline
                .engine()
                .answer(&team, question.as_deref(), prompt.as_deref())
                .await?;
            if result.analysis.is_empty() {
                println!("No indexed reports for team {}.", result.team);
            } else {
                println!("{}", result.analysis);
            }
        }
        Commands::Ask { question, top_k } => {
            let pipeline = build_pipeline(&cfg)?;
            let answer = pipeline
                .engine()
                .ask(&question, top_k.unwrap_or(cfg.retrieval.top_k))
                .await?;
            if answer.is_empty() {
                println!("No indexed chunks to answer from.");
            } else {
                println!("{}", answer);
            }
        }
        Commands::Chunk {
            file,
            out,
            report_id,
        } => {
            let report = read_report(&file)?;
            let chunks = decompose(&report, report_id.as_deref());
            let mut lines = String::new();
            for chunk in &chunks {
                lines.push_str(&serde_json::to_string(chunk)?);
                lines.push('\n');
            }
            std::fs::write(&out, lines)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("{} chunks written to {}", chunks.len(), out.display());
        }
        Commands::Index { path } => {
            let chunks = load_chunks(&path)?;
            let pipeline = build_pipeline(&cfg)?;
            let indexed = pipeline.reindex(chunks).await?;
            for report in &indexed {
                println!(
                    "indexed {} ({}): {} points",
                    report.report_id, report.team, report.upload.inserted
                );
            }
            println!("{} reports indexed", indexed.len());
        }
        Commands::Completions { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}
