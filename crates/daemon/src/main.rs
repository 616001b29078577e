// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! chatkitd - runs the chatkit delivery engine against a chat server.
//!
//! Loads the engine config, opens the local store, connects, and logs every
//! consumer-facing event until interrupted.
//!
//! Usage:
//!   chatkitd [--config <path>] [--server <url>] [--db <path>] [--verbose] [--log-file <path>]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use ck_core::{Store, StoreLocation};
use ck_sync::{ChatCore, ChatEvent, ConfigError, EngineConfig, EventName, WebSocketTransport};
use clap::Parser;

mod env;

/// Config file name within the config directory.
const CONFIG_NAME: &str = "config.toml";
/// Directory name under the user config directory.
const APP_DIR: &str = "chatkit";

/// chatkitd: chat delivery engine daemon
#[derive(Parser, Debug)]
#[command(name = "chatkitd", version)]
#[command(about = "Runs the chatkit delivery engine and logs its events")]
struct Args {
    /// Config file (default: $CHATKIT_CONFIG, then ~/.config/chatkit/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the server URL
    #[arg(short, long)]
    server: Option<String>,

    /// Override the database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Where the config came from.
#[derive(Debug, PartialEq)]
enum ConfigSource {
    /// Named on the command line or in the environment; must exist.
    Explicit(PathBuf),
    /// The per-user default location; may be absent.
    Default(PathBuf),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(args.verbose, args.log_file.as_deref());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("chatkitd failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let source = config_source(args.config.clone(), env::config_file(), default_config_dir());
    let config = load_config(&source, args.server.clone(), args.db.clone())?;

    tracing::info!("chatkitd starting");
    tracing::info!("  Config: {:?}", source);
    tracing::info!("  Server: {}", config.server_url);
    tracing::info!("  Database: {}", config.database.display());

    let _lock = acquire_lock(&lock_path(&config.database))?;

    let store = Arc::new(Store::new(StoreLocation::File(config.database.clone())));
    let core = ChatCore::new(config, store, Box::new(WebSocketTransport::new()));
    for name in EventName::ALL {
        if name != EventName::SendMessage {
            core.on(name, |event| {
                log_event(event);
                Ok(())
            });
        }
    }
    core.init()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupted, shutting down");
    core.shutdown().await;
    tracing::info!("chatkitd stopped");
    Ok(())
}

fn default_config_dir() -> Option<PathBuf> {
    env::xdg_config_home()
        .or_else(dirs::config_dir)
        .map(|dir| dir.join(APP_DIR))
}

/// Picks the config file: `--config`, then `$CHATKIT_CONFIG`, then the
/// per-user default.
fn config_source(
    flag: Option<PathBuf>,
    env_path: Option<PathBuf>,
    default_dir: Option<PathBuf>,
) -> ConfigSource {
    if let Some(path) = flag.or(env_path) {
        return ConfigSource::Explicit(path);
    }
    let dir = default_dir.unwrap_or_else(|| PathBuf::from("."));
    ConfigSource::Default(dir.join(CONFIG_NAME))
}

/// Loads the config and applies command-line overrides.
///
/// A missing default config file yields the built-in defaults, with the
/// database placed next to where the file would be.
fn load_config(
    source: &ConfigSource,
    server: Option<String>,
    db: Option<PathBuf>,
) -> Result<EngineConfig, ConfigError> {
    let mut config = match source {
        ConfigSource::Explicit(path) => EngineConfig::load(path)?,
        ConfigSource::Default(path) if path.exists() => EngineConfig::load(path)?,
        ConfigSource::Default(path) => {
            let mut config = EngineConfig::default();
            if let Some(dir) = path.parent() {
                config.database = dir.join(&config.database);
            }
            config
        }
    };
    if let Some(server) = server {
        config.server_url = server;
    }
    if let Some(db) = db {
        config.database = db;
    }
    config.validate()?;
    Ok(config)
}

fn lock_path(database: &Path) -> PathBuf {
    database.with_extension("lock")
}

/// Takes an exclusive lock so only one daemon uses a database at a time.
fn acquire_lock(lock_path: &Path) -> std::io::Result<fs::File> {
    use fs2::FileExt;

    if let Some(parent) = lock_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(lock_path)?;
    file.try_lock_exclusive().map_err(|_| {
        std::io::Error::other(format!(
            "another chatkitd is already using {}",
            lock_path.display()
        ))
    })?;
    Ok(file)
}

fn setup_logging(verbose: bool, log_file: Option<&Path>) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = if env::has_log_filter() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    } else {
        EnvFilter::new(default_level)
    };

    // Try to open log file, fall back to stderr
    let file = log_file.and_then(|path| {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn log_event(event: &ChatEvent) {
    match event {
        ChatEvent::MessageSent { message_id } => {
            tracing::info!(message_id, "message sent")
        }
        ChatEvent::MessageDelivered { message_id } => {
            tracing::info!(message_id, "message delivered")
        }
        ChatEvent::MessageFailed { message_id } => {
            tracing::warn!(message_id, "message failed, will retry")
        }
        ChatEvent::IncomingMessage { message_id } => {
            tracing::info!(message_id, "incoming message")
        }
        ChatEvent::SyncCompleted { timestamp, stats } => tracing::info!(
            timestamp,
            inserted = stats.inserted,
            updated = stats.updated,
            "sync completed"
        ),
        ChatEvent::SyncFailed { error } => tracing::warn!(%error, "sync failed"),
        ChatEvent::SendMessage { message } => {
            tracing::debug!(message_id = message.id, "send message")
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
