//! Scene Engine Server
//!
//! Loads `scenes.yaml`, seeds the in-memory store and runs the scene
//! engine until Ctrl-C. Capture commands are read from stdin as JSON lines:
//!
//! ```text
//! {"command": "save", "message": {"sceneId": "scene.evening", "isForTrue": true}}
//! ```

mod scene_runtime;

use anyhow::{Context, Result};
use chrono::Utc;
use scene_config::SceneConfig;
use scene_engine::SceneEngine;
use scene_event_bus::EventBus;
use scene_store::{MemoryStore, StoreSeed};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scene_runtime::{CommandRequest, SceneRuntime};

/// Configuration file used when none is given
const DEFAULT_CONFIG: &str = "scenes.yaml";

/// One line of command input
#[derive(Debug, Deserialize)]
struct CommandLine {
    command: String,
    #[serde(default)]
    message: Value,
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Read a seed file, JSON or YAML by extension
fn load_seed(path: &Path) -> Result<StoreSeed> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let seed: StoreSeed = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    Ok(seed)
}

/// Forward stdin command lines to the runtime and print the replies
async fn read_commands(commands: mpsc::Sender<CommandRequest>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let input: CommandLine = match serde_json::from_str(&line) {
            Ok(input) => input,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed command line");
                continue;
            }
        };

        let (request, reply) = CommandRequest::new(input.command, input.message);
        if commands.send(request).await.is_err() {
            break;
        }
        if let Ok(Some(reply)) = reply.await {
            println!("{}", reply);
        }
    }
    debug!("Command input closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = if config_path.exists() {
        SceneConfig::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        SceneConfig::default()
    };

    init_tracing(&config.logger.level)?;
    info!(
        config = %config_path.display(),
        namespace = %config.engine.namespace,
        "Starting scene engine"
    );

    let bus = Arc::new(EventBus::new());
    let store = Arc::new(MemoryStore::new(bus.clone()).with_writer(config.engine.authority()));
    if let Some(seed_file) = &config.store.seed_file {
        store.seed(load_seed(seed_file)?);
        info!(points = store.state_count(), seed = %seed_file.display(), "Store seeded");
    }

    let engine = SceneEngine::new(store.clone(), config.engine.clone(), Utc::now());
    let runtime = SceneRuntime::new(engine, &bus);

    let (commands_tx, commands_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let runtime_handle = tokio::spawn(runtime.run(commands_rx, shutdown_rx));
    tokio::spawn(async move {
        if let Err(e) = read_commands(commands_tx).await {
            warn!(error = %e, "Command input failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    let _ = shutdown_tx.send(());

    let engine = runtime_handle.await?;
    info!(pending = engine.pending_tasks(), "Scene engine stopped");
    Ok(())
}
