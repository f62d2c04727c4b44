use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use kb_review::analysis::FindingsFileAnalyzer;
use kb_review::api;
use kb_review::config::{Config, StrategyKind};
use kb_review::error::PipelineError;
use kb_review::pipeline::{build_index, Pipeline, ReviewInput};
use kb_review::state::AppState;

#[derive(Parser)]
#[command(name = "kb-review", version, about = "Knowledge-base guided code review")]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct PathArgs {
    /// Directory of knowledge entry JSON files
    #[arg(long, global = true)]
    kb: Option<PathBuf>,

    /// Index location
    #[arg(long, global = true)]
    index: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Index the knowledge base and exit
    Index,
    /// Review one source file
    Review {
        file: PathBuf,
        /// Free-text question or intent
        #[arg(long)]
        query: Option<String>,
        /// JSON array of {issue, details} produced by an external analyzer
        #[arg(long)]
        findings: Option<PathBuf>,
        /// Feedback template file
        #[arg(long)]
        template: Option<PathBuf>,
        /// "template" or "backend"
        #[arg(long)]
        strategy: Option<StrategyKind>,
        /// Skip the raw-source knowledge scan
        #[arg(long)]
        no_scan: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(kb) = cli.paths.kb {
        config.kb_dir = kb;
    }
    if let Some(index) = cli.paths.index {
        config.index_dir = index;
    }

    match cli.command {
        Command::Index => {
            let (index, report) = build_index(&config).map_err(stopped)?;
            tracing::info!(
                "Index at {} holds {} documents",
                index.location().display(),
                index.num_docs()
            );
            println!(
                "Indexed {} entries ({} unchanged, {} skipped, {} pruned)",
                report.indexed,
                report.unchanged,
                report.skipped.len(),
                report.pruned
            );
            Ok(())
        }
        Command::Review {
            file,
            query,
            findings,
            template,
            strategy,
            no_scan,
            json,
        } => {
            if template.is_some() {
                config.generation.template_path = template;
            }
            if let Some(strategy) = strategy {
                config.generation.strategy = strategy;
            }
            if no_scan {
                config.scan_source = false;
            }

            let input = ReviewInput::from_file(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?
                .with_query(query);

            let mut pipeline = Pipeline::bootstrap(config).map_err(stopped)?;
            if let Some(path) = findings {
                pipeline = pipeline.with_analyzer(Box::new(FindingsFileAnalyzer::new(path)));
            }

            let report = pipeline.review(&input).map_err(stopped)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render());
            }
            Ok(())
        }
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            let bind_addr = config.bind_addr.clone();
            let pipeline = Arc::new(Pipeline::bootstrap(config).map_err(stopped)?);

            // The blocking LLM client must not be dropped inside the runtime,
            // so main keeps the last reference.
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            let served = runtime.block_on(serve(AppState::new(pipeline.clone()), &bind_addr));
            drop(runtime);
            drop(pipeline);
            served
        }
    }
}

/// Log where the run stopped before the error is reported and the process exits 1.
fn stopped(err: PipelineError) -> anyhow::Error {
    tracing::error!("Run stopped: {:?}", err.terminal_stage());
    err.into()
}

async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/api/review", post(api::review::review))
        .route("/api/search", post(api::review::search))
        .route("/api/topics", get(api::review::topics))
        .route("/api/status", get(api::review::status))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
