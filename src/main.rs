//! Dalil CLI: a thin driver over the procedure surface.

use clap::{Parser, Subcommand};
use dalil::{Config, DalilService, ImageMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dalil")]
#[command(version, about = "Arabic-first retrieval-augmented question answering", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask a question
    Query {
        /// Question text
        text: String,
        /// Session identifier for conversational context
        #[arg(short, long, default_value = "cli")]
        session: String,
        /// Skip retrieval and answer conversationally
        #[arg(long)]
        no_rag: bool,
        /// Print sources alongside the answer
        #[arg(long)]
        sources: bool,
    },
    /// Ingest files into the documents collection
    Ingest {
        /// Paths of files to ingest
        paths: Vec<String>,
        /// Image handling mode: text, description, or auto
        #[arg(long)]
        image_mode: Option<String>,
    },
    /// Print a session's conversation history
    History {
        /// Session identifier
        session: String,
        /// Maximum messages to show
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete a session's conversation history
    ClearHistory {
        /// Session identifier
        session: String,
    },
    /// Delete expired conversation messages across all sessions
    Sweep,
    /// Show collection statistics
    Info {
        /// Collection name
        collection: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let exit_code = match run(args).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error ({}): {err}", err.kind());
            err.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(args: Args) -> dalil::Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    let service = DalilService::connect(config).await?;

    match args.command {
        Command::Query {
            text,
            session,
            no_rag,
            sources,
        } => {
            let result = service.query(&text, &session, !no_rag).await?;
            println!("{}", result.answer);
            if sources && !result.sources.is_empty() {
                println!();
                for (i, source) in result.sources.iter().enumerate() {
                    let name = source
                        .metadata
                        .get("source_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("?");
                    println!("[{}] {} (score {:.3})", i + 1, name, source.score);
                }
            }
            eprintln!(
                "({} route, {} ms)",
                result.query_type.as_str(),
                result.processing_time_ms
            );
        }
        Command::Ingest { paths, image_mode } => {
            let image_mode = match image_mode.as_deref() {
                Some(raw) => Some(ImageMode::parse(raw).ok_or_else(|| {
                    dalil::DalilError::Validation(format!("unknown image mode: {raw}"))
                })?),
                None => None,
            };

            for path in paths {
                let bytes = std::fs::read(&path)?;
                let filename = std::path::Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone());

                let report = service
                    .ingest_file(&bytes, &filename, None, None, image_mode)
                    .await?;
                println!(
                    "{filename}: {} documents, {} chunks ({}, {} ms)",
                    report.documents, report.chunks, report.detected_format, report.time_ms
                );
            }
        }
        Command::History { session, limit } => {
            for message in service.history(&session, limit).await? {
                println!("{}: {}", message.role.as_str(), message.content);
            }
        }
        Command::ClearHistory { session } => {
            let deleted = service.clear_history(&session).await?;
            println!("deleted {deleted} messages");
        }
        Command::Sweep => {
            let deleted = service.sweep_expired().await?;
            println!("swept {deleted} expired messages");
        }
        Command::Info { collection } => {
            let info = service.collection_info(&collection).await?;
            println!(
                "{}: {} points, dimension {}, distance {}",
                info.name, info.points_count, info.dimension, info.distance
            );
        }
    }

    Ok(())
}
