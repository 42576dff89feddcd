use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use moot_core::config::{AppConfig, CheckpointBackend};
use moot_core::event::EventBus;
use moot_core::traits::{CheckpointStore, Generator};
use moot_core::types::InputKind;
use moot_engine::{
    input_spec, MemoryCheckpointStore, RunEngine, SessionRegistry, SqliteCheckpointStore,
    Topology,
};

#[derive(Parser)]
#[command(name = "moot", version, about = "Resumable courtroom simulation server")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "moot.toml", env = "MOOT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket gateway server (default)
    Serve,
    /// Print the trial steps, their kinds, successors and progress
    Topology,
    /// Show the effective configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("moot=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "moot", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(Commands::Topology) = &cli.command {
        print_topology(&Topology::courtroom()?);
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Serve) | None => serve(config).await?,
        Some(Commands::Topology) | Some(Commands::Completions { .. }) => {}
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        Ok(AppConfig::load(path)?)
    } else {
        warn!(
            path = %path.display(),
            "No config file found, using defaults (in-memory checkpoints)"
        );
        Ok(AppConfig::default())
    }
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    Ok(match config.checkpoint.backend {
        CheckpointBackend::Memory => Arc::new(MemoryCheckpointStore::new()),
        CheckpointBackend::Sqlite => {
            let path = config.checkpoint.resolved_path();
            info!(path = %path.display(), "Opening checkpoint store");
            Arc::new(SqliteCheckpointStore::open(&path)?)
        }
    })
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let generator: Arc<dyn Generator> = Arc::from(moot_llm::create_generator(&config));
    let engine = RunEngine::new(
        generator,
        store,
        Arc::new(SessionRegistry::new()),
        Arc::new(EventBus::default()),
        config.budgets.clone(),
    )?
    .with_retained_checkpoints(config.session.retain_checkpoints);

    info!(
        bind = %config.gateway.bind,
        model = %config.model.model_id,
        structured_model = %config.structured_model().model_id,
        backend = ?config.checkpoint.backend,
        "Starting WebSocket gateway"
    );
    let server = moot_gateway::GatewayServer::new(config.gateway.clone(), Arc::new(engine));
    let cancel = tokio_util::sync::CancellationToken::new();
    let cancel_clone = cancel.clone();

    // Graceful shutdown on Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down gateway...");
        cancel_clone.cancel();
    });

    server.run(cancel).await
}

fn print_topology(topology: &Topology) {
    println!("{:<28} {:<22} {:>4}  successors", "step", "kind", "%");
    for node in topology.nodes() {
        let kind = match node.input_kind() {
            Some(input) => {
                let shape = match input {
                    InputKind::Boolean => "boolean",
                    InputKind::Text => "text",
                    InputKind::Evidence => "evidence",
                };
                format!("{}({})", node.kind.label(), shape)
            }
            None => node.kind.label().to_string(),
        };
        let successors: Vec<String> = topology
            .edges_from(node.id)
            .map(|e| format!("{} [{}]", e.to, e.condition))
            .collect();
        let successors = if successors.is_empty() {
            "(terminal)".to_string()
        } else {
            successors.join(", ")
        };
        println!(
            "{:<28} {:<22} {:>4}  {}",
            node.id.as_str(),
            kind,
            node.progress,
            successors
        );
        if let Some(spec) = input_spec(node.id) {
            println!("{:<28} prompt: {}", "", spec.prompt);
        }
    }
    println!();
    println!("entry: {}", topology.entry());
}
