//! # Docket CLI (`docket`)
//!
//! Index PDFs and ask grounded questions about them.
//!
//! ## Usage
//!
//! ```bash
//! docket --config ./config/docket.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docket index <path>... [--skip-existing]` | Index PDFs (files or directories), each into its own collection |
//! | `docket ask <document> "<question>"` | Answer one question from an indexed document |
//! | `docket summarize <document>` | Summarize an indexed document |
//! | `docket chat <file.pdf>` | Index a PDF, then chat about it |
//! | `docket collections` | List indexed documents |
//! | `docket usage` | Token and cost totals from the usage log |
//! | `docket id <file name>` | Print the collection id for a file name |

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use docket::answer::{Answer, AnsweringEngine};
use docket::chunk::TextSplitter;
use docket::collection::derive_collection_id;
use docket::config::{self, Config};
use docket::embedding::{create_embedder, Embedder};
use docket::extract::PdfExtractor;
use docket::ingest::{collect_pdfs, BatchOutcome, Indexer};
use docket::llm::create_generator;
use docket::logging;
use docket::retrieve::Retriever;
use docket::session::Session;
use docket::store::{IndexStore, SqliteStore};
use docket::usage::{self, UsageLog};
use docket::DocketError;

/// Docket: grounded question answering over PDF documents.
///
/// Every command accepts `--config`; when the file does not exist the
/// built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "docket",
    about = "Docket: grounded question answering over PDF documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docket.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index PDFs. Re-indexing replaces a document's previous chunks.
    ///
    /// A directory argument indexes every PDF directly inside it.
    Index {
        /// PDF files or directories of PDFs.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Leave documents that are already indexed untouched.
        #[arg(long)]
        skip_existing: bool,
    },

    /// Answer a question from one indexed document.
    Ask {
        /// File name of the indexed document (e.g. `lease.pdf`).
        document: String,

        /// The question.
        question: String,

        /// Also print the retrieved passages.
        #[arg(long)]
        show_sources: bool,
    },

    /// Summarize an indexed document.
    Summarize {
        /// File name of the indexed document.
        document: String,
    },

    /// Index a PDF and start an interactive chat about it.
    ///
    /// Type a question per line. `/summary` summarizes the document,
    /// `/history` prints the conversation, `/save <path>` writes it as
    /// Markdown, `/quit` exits.
    Chat {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// List indexed documents.
    Collections,

    /// Show totals from the usage log.
    Usage,

    /// Print the collection id derived from a file name.
    Id {
        /// Document file name.
        file_name: String,
    },
}

/// Process-wide services, built once per invocation.
struct Services {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
}

impl Services {
    async fn open(cfg: &Config) -> anyhow::Result<Self> {
        let store = SqliteStore::connect(&cfg.store.path)
            .await
            .with_context(|| format!("Failed to open index at {}", cfg.store.path.display()))?;
        let embedder = create_embedder(&cfg.embedding)?;
        Ok(Self {
            store: Arc::new(store),
            embedder,
        })
    }

    fn indexer(&self, cfg: &Config) -> Indexer {
        Indexer::new(
            Arc::new(PdfExtractor::new()),
            self.embedder.clone(),
            self.store.clone(),
            TextSplitter::new(cfg.chunking.chunk_size, cfg.chunking.chunk_overlap),
        )
        .with_batch_size(cfg.embedding.batch_size)
    }

    fn engine(&self, cfg: &Config) -> anyhow::Result<AnsweringEngine> {
        let generator = create_generator(&cfg.llm)?;
        let retriever = Retriever::new(
            self.embedder.clone(),
            self.store.clone(),
            cfg.retrieval.top_k,
        );
        Ok(AnsweringEngine::new(retriever, generator)
            .with_usage_log(UsageLog::from_config(&cfg.usage))
            .with_max_context_chars(cfg.retrieval.max_context_chars)
            .with_summary_query(cfg.retrieval.summary_query.clone()))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Needs neither config nor services
    if let Commands::Id { file_name } = &cli.command {
        println!("{}", derive_collection_id(file_name));
        return ExitCode::SUCCESS;
    }

    let cfg = match config::load_or_default(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = match logging::init_logging(&cfg.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, &cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<DocketError>() {
                Some(docket_err) => {
                    debug!(error = %docket_err, "command failed");
                    eprintln!("{}", docket_err.user_message());
                }
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, cfg: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Id { .. } => {}

        Commands::Index {
            paths,
            skip_existing,
        } => {
            let files = collect_pdfs(&paths)?;
            if files.is_empty() {
                anyhow::bail!("No PDF files found");
            }
            let services = Services::open(cfg).await?;
            let outcomes = services.indexer(cfg).index_all(&files, skip_existing).await;

            let mut failed = 0;
            for outcome in &outcomes {
                match outcome {
                    BatchOutcome::Indexed(report) => {
                        println!("indexed {}", report.document);
                        println!("  collection: {}", report.collection);
                        println!("  pages: {}", report.pages);
                        println!("  chunks: {}", report.chunks);
                    }
                    BatchOutcome::Skipped {
                        document,
                        collection,
                    } => println!("skipped {} (already indexed as {})", document, collection),
                    BatchOutcome::Failed { error, .. } => {
                        failed += 1;
                        eprintln!("{}", error.user_message());
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} documents failed to index", failed, outcomes.len());
            }
        }

        Commands::Ask {
            document,
            question,
            show_sources,
        } => {
            let services = Services::open(cfg).await?;
            let engine = services.engine(cfg)?;
            let answer = engine.ask(&question, &document, &[]).await?;
            print_answer(&answer);
            if show_sources {
                print_sources(&answer);
            }
        }

        Commands::Summarize { document } => {
            let services = Services::open(cfg).await?;
            let engine = services.engine(cfg)?;
            let answer = engine.summarize(&document).await?;
            print_answer(&answer);
        }

        Commands::Chat { file } => {
            let services = Services::open(cfg).await?;
            let engine = services.engine(cfg)?;
            let mut session = Session::new(Arc::new(services.indexer(cfg)), Arc::new(engine));
            let report = session.upload(&file).await?;
            println!(
                "Indexed {} ({} chunks). Ask a question, or /summary, /history, /save <path>, /quit.",
                report.document, report.chunks
            );
            chat_loop(&mut session).await?;
        }

        Commands::Collections => {
            let services = Services::open(cfg).await?;
            let collections = services.store.list_collections().await?;
            if collections.is_empty() {
                println!("No documents indexed.");
            }
            for c in collections {
                println!(
                    "{:<40} {:>6} chunks  {} ({}d)  {}",
                    c.id, c.records, c.model, c.dims, c.source
                );
            }
        }

        Commands::Usage => {
            let summary = usage::summarize(&cfg.usage.path)?;
            println!("usage {}", cfg.usage.path.display());
            println!("  calls: {}", summary.calls);
            println!("  input tokens: {}", summary.input_tokens);
            println!("  output tokens: {}", summary.output_tokens);
            println!("  total tokens: {}", summary.total_tokens);
            println!("  cost: ${:.4}", summary.cost_usd);
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text.trim());
    if let Some(err) = &answer.usage_log_error {
        eprintln!("warning: usage not recorded: {}", err);
    }
}

fn print_sources(answer: &Answer) {
    println!();
    for (i, hit) in answer.sources.iter().enumerate() {
        println!(
            "[{}] page {} (distance {:.3}): {}",
            i + 1,
            hit.chunk.page,
            hit.distance,
            hit.chunk.text.chars().take(120).collect::<String>().replace('\n', " ")
        );
    }
}

async fn chat_loop(session: &mut Session) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "/quit" | "/exit" => break,
            "/history" => {
                if session.conversation().is_empty() {
                    println!("(no questions yet)");
                } else {
                    print!("{}", session.conversation().history());
                }
            }
            "/summary" => match session.summarize().await {
                Ok(summary) => print_answer(&summary),
                Err(e) => eprintln!("{}", e.user_message()),
            },
            _ if line.starts_with("/save") => {
                let path = line.trim_start_matches("/save").trim();
                if path.is_empty() {
                    eprintln!("usage: /save <path>");
                    continue;
                }
                match save_transcript(session, Path::new(path)) {
                    Ok(()) => println!("Saved transcript to {}", path),
                    Err(e) => eprintln!("Error: {:#}", e),
                }
            }
            _ => match session.ask(line).await {
                Ok(answer) => print_answer(&answer),
                Err(e) => eprintln!("{}", e.user_message()),
            },
        }
    }

    Ok(())
}

fn save_transcript(session: &Session, path: &Path) -> anyhow::Result<()> {
    let markdown = session.conversation().to_markdown(session.document());
    std::fs::write(path, markdown)
        .with_context(|| format!("Failed to write transcript: {}", path.display()))
}
