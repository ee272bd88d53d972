//! Mediation engine command-line entry point
//!
//! `run` reads JSON-lines messages and prints one outcome summary per line;
//! SIGHUP reloads the configuration file in place.

use mediation_engine::audit::TracingAuditSink;
use mediation_engine::config::EngineConfig;
use mediation_engine::engine::{MediationEngine, SequenceGraph};
use mediation_engine::message::Message;
use mediation_engine::observability::{init_default_logging, metrics};
use mediation_engine::registry::MediatorRegistry;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATHS: &[&str] = &["mediation.toml", "config/mediation.toml"];

/// Configuration-driven message mediation engine
#[derive(Parser)]
#[command(name = "mediation-engine")]
#[command(about = "Configuration-driven message mediation engine")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "MEDIATION_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mediate JSON-lines messages from a file or stdin
    Run {
        /// Input file; reads stdin when omitted
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Build every sequence and report problems
    Validate,
    /// Inspect the parsed configuration
    Config {
        /// Print the configuration as TOML
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let (path, config) = match load_configuration(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { input } => run_engine(path, config, input).await,
        Commands::Validate => validate_configuration(&config),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<(PathBuf, EngineConfig), Box<dyn std::error::Error>> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .ok_or("No configuration file found. Provide one with -c/--config or create mediation.toml")?,
    };

    info!("Loading configuration from: {}", path.display());
    let config = EngineConfig::load_from_file(&path)?;
    Ok((path, config))
}

async fn run_engine(
    config_path: PathBuf,
    config: EngineConfig,
    input: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(MediationEngine::new(
        MediatorRegistry::builtin(),
        &config,
        Arc::new(TracingAuditSink),
    )?);
    info!(engine = %config.engine.name, "Mediation engine ready");

    let reload_task = tokio::spawn(reload_on_hangup(Arc::clone(&engine), config_path));

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut lines = reader.lines();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => mediate_line(&engine, &line).await?,
                None => break,
            },
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    reload_task.abort();

    let snapshot = metrics().get_metrics();
    info!(
        received = snapshot.messages.received,
        completed = snapshot.messages.completed,
        faulted = snapshot.messages.faulted,
        reinjections = snapshot.pipeline.reinjections,
        "Input drained"
    );
    Ok(())
}

async fn mediate_line(
    engine: &MediationEngine,
    line: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if line.trim().is_empty() {
        return Ok(());
    }

    let message: Message = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Skipping malformed input line");
            return Ok(());
        }
    };

    let outcome = engine.process_default(message).await;
    println!("{}", serde_json::to_string(&outcome.summary())?);
    Ok(())
}

/// Reload the configuration file on every SIGHUP; a bad file keeps the old one
async fn reload_on_hangup(engine: Arc<MediationEngine>, config_path: PathBuf) {
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            error!("Failed to install SIGHUP handler: {}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!(path = %config_path.display(), "Received SIGHUP, reloading configuration");
        match EngineConfig::load_from_file(&config_path) {
            Ok(config) => {
                if let Ok(generation) = engine.reload(&config) {
                    info!(generation, "Configuration active");
                }
            }
            Err(e) => {
                metrics().config_reload_failed();
                error!("Keeping previous configuration: {}", e);
            }
        }
    }
}

fn validate_configuration(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let graph = SequenceGraph::build(config, &MediatorRegistry::builtin())?;

    println!("Configuration '{}' is valid", config.engine.name);
    println!("  entry sequence: {}", graph.entry_name());
    if let Some(fault) = &config.engine.fault_sequence {
        println!("  fault sequence: {fault}");
    }
    println!("  max reinjections: {}", config.engine.max_reinjections);
    for name in graph.names() {
        if let Some(sequence) = graph.get(name) {
            let kinds: Vec<&str> = sequence.mediators().iter().map(|m| m.kind()).collect();
            println!("  sequence {name}: [{}]", kinds.join(", "));
        }
    }
    Ok(())
}

fn handle_config_command(config: &EngineConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    } else {
        println!("Configuration '{}' parsed successfully", config.engine.name);
        println!("  sequences: {}", config.sequences.len());
    }
    Ok(())
}
