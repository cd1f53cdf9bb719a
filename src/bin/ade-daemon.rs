//! ADE Daemon - Long-running service for the adaptive question engine
//!
//! This daemon provides:
//! - REST API server for document ingestion, question generation, and
//!   adaptive question delivery
//! - SQLite-backed persistence for documents, embeddings, questions, and
//!   per-learner ability state
//!
//! Usage:
//!   ade-daemon [OPTIONS]
//!
//! Options:
//!   --config <PATH>      Path to configuration file (default: config.toml)
//!   --host <HOST>        API server host (default: 127.0.0.1)
//!   --port <PORT>        API server port (default: 8080)
//!   --daemon             Run as background daemon (Unix only)
//!   --pid-file <PATH>    PID file path for daemon mode
//!   --log-file <PATH>    Log file path for daemon mode

use measure_ade::ability::AbilityStore;
use measure_ade::api::{create_router, AppState};
use measure_ade::cache::LlmCache;
use measure_ade::config::EngineConfig;
use measure_ade::embedding::EmbeddingIndex;
use measure_ade::generation::{GenerationService, OllamaLlmClient};
use measure_ade::ingest::{DocumentStore, IngestService};
use measure_ade::job::GenerationJobStore;
use measure_ade::prompt::PromptComposer;
use measure_ade::question::QuestionStore;
use measure_ade::selector::QuestionSelector;
use sqlx::sqlite::SqlitePoolOptions;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug)]
struct DaemonConfig {
    config_path: PathBuf,
    host: String,
    port: u16,
    daemon_mode: bool,
    pid_file: Option<PathBuf>,
    log_file: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.toml"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            daemon_mode: false,
            pid_file: None,
            log_file: None,
        }
    }
}

fn parse_args() -> DaemonConfig {
    let mut config = DaemonConfig::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(path) = args.next() {
                    config.config_path = PathBuf::from(path);
                }
            }
            "--host" => {
                if let Some(host) = args.next() {
                    config.host = host;
                }
            }
            "--port" => {
                if let Some(port) = args.next() {
                    if let Ok(p) = port.parse() {
                        config.port = p;
                    }
                }
            }
            "--daemon" => {
                config.daemon_mode = true;
            }
            "--pid-file" => {
                if let Some(path) = args.next() {
                    config.pid_file = Some(PathBuf::from(path));
                }
            }
            "--log-file" => {
                if let Some(path) = args.next() {
                    config.log_file = Some(PathBuf::from(path));
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
    }

    config
}

fn print_help() {
    println!("ADE Daemon - Long-running service for the adaptive question engine");
    println!();
    println!("USAGE:");
    println!("    ade-daemon [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <PATH>      Path to configuration file (default: config.toml)");
    println!("    --host <HOST>        API server host (default: 127.0.0.1)");
    println!("    --port <PORT>        API server port (default: 8080)");
    println!("    --daemon             Run as background daemon (Unix only)");
    println!("    --pid-file <PATH>    PID file path for daemon mode");
    println!("    --log-file <PATH>    Log file path for daemon mode");
    println!("    --help, -h           Print this help message");
    println!();
    println!("EXAMPLES:");
    println!("    # Run in foreground");
    println!("    ade-daemon --config config.toml --port 8080");
    println!();
    println!("    # Run as daemon");
    println!("    ade-daemon --daemon --pid-file /var/run/ade.pid --log-file /var/log/ade.log");
}

fn setup_logging(log_file: Option<PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,measure_ade=debug"));

    if let Some(log_path) = log_file {
        let file = File::create(log_path)?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(file))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    Ok(())
}

#[cfg(unix)]
fn daemonize_process(pid_file: Option<PathBuf>) -> anyhow::Result<()> {
    use daemonize::Daemonize;

    let mut daemon = Daemonize::new();

    if let Some(pid_path) = pid_file {
        daemon = daemon.pid_file(pid_path);
    }

    daemon.start()?;
    Ok(())
}

#[cfg(not(unix))]
fn daemonize_process(_pid_file: Option<PathBuf>) -> anyhow::Result<()> {
    Err(anyhow::anyhow!(
        "Daemon mode is only supported on Unix systems"
    ))
}

async fn build_state(config: &EngineConfig) -> anyhow::Result<AppState> {
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let document_store = Arc::new(DocumentStore::new(pool.clone()).await?);
    let embedding_index = Arc::new(EmbeddingIndex::new(pool.clone(), &config.embedding).await?);
    let question_store = Arc::new(QuestionStore::new(pool.clone()).await?);
    let ability_store = Arc::new(AbilityStore::new(pool.clone()).await?);
    let jobs = Arc::new(GenerationJobStore::new(pool.clone()).await?);

    let ingest = Arc::new(IngestService::new(
        document_store.clone(),
        embedding_index.clone(),
        &config.ingest,
    ));

    let cache = if config.generation.cache.enabled {
        Some(Arc::new(LlmCache::new(config.generation.cache.clone()).await?))
    } else {
        None
    };
    let llm_client = Arc::new(OllamaLlmClient::new(&config.generation, cache));
    let generation = Arc::new(GenerationService::new(llm_client, &config.generation));

    let selector = Arc::new(QuestionSelector::new(
        ability_store.clone(),
        question_store.clone(),
        &config.adaptive,
    ));

    let prompt_composer = Arc::new(PromptComposer::new(config.generation.retrieval_context_chars));

    Ok(AppState {
        ingest,
        embedding_index,
        questions: question_store,
        ability: ability_store,
        selector,
        generation,
        jobs,
        prompt_composer,
        config: Arc::new(config.clone()),
    })
}

async fn run_server(config: DaemonConfig) -> anyhow::Result<()> {
    info!("Loading engine configuration from: {:?}", config.config_path);

    let engine_config = if config.config_path.exists() {
        EngineConfig::from_file(&config.config_path)?
    } else {
        info!("Config file not found, using default configuration");
        EngineConfig::default()
    };
    engine_config.validate()?;

    info!("Initializing stores, embedder, and generation backend...");
    let app_state = build_state(&engine_config).await?;
    let router = create_router(app_state);

    info!("ADE daemon starting...");
    info!("API server will listen on {}:{}", config.host, config.port);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;

    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        tx.send(()).ok();
    });

    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = &mut rx => {
            info!("Graceful shutdown initiated");
        }
    }

    info!("ADE daemon stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = parse_args();

    if config.daemon_mode {
        #[cfg(unix)]
        {
            daemonize_process(config.pid_file.clone())?;
        }
        #[cfg(not(unix))]
        {
            eprintln!("Daemon mode is only supported on Unix systems");
            return Err(anyhow::anyhow!(
                "Daemon mode not supported on this platform"
            ));
        }
    }

    // The global subscriber is installed exactly once, after daemonizing (if
    // requested), so it survives in the forked child rather than being torn
    // down and reinstalled.
    setup_logging(config.log_file.clone())?;

    info!("ADE Daemon v{}", measure_ade::VERSION);
    if config.daemon_mode {
        info!("Daemonized");
    }

    run_server(config).await
}
