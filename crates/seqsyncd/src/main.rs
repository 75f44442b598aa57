//! seqsync daemon (seqsyncd)
//!
//! Hosts one shared document and keeps every connected client in sync.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (WebSocket on 8080, TCP on 8081, snapshot in ./document.json)
//! seqsyncd
//!
//! # Custom ports
//! seqsyncd --ws-port 9000 --tcp-port 9001
//!
//! # Persist to SQLite instead of a JSON file
//! seqsyncd --db /var/lib/seqsync/document.db
//!
//! # With configuration file
//! seqsyncd --config /etc/seqsync/seqsync.toml
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use seqsync_core::SiteId;
use seqsync_storage::{FileStorage, MemoryStorage, SqliteStorage, Storage};
use seqsync_transport::{HubConfig, SyncHub, TcpServer, WebSocketServer};

use crate::config::{FileConfig, Settings, StorageChoice};

/// seqsync daemon - collaborative sequence synchronization
#[derive(Parser, Debug)]
#[command(name = "seqsyncd")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// WebSocket port to listen on [default: 8080]
    #[arg(long, env = "SEQSYNC_WS_PORT")]
    pub ws_port: Option<u16>,

    /// TCP port to listen on [default: 8081]
    #[arg(long, env = "SEQSYNC_TCP_PORT")]
    pub tcp_port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "SEQSYNC_BIND")]
    pub bind: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "SEQSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long, env = "SEQSYNC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Disable TCP server
    #[arg(long)]
    pub no_tcp: bool,

    /// Disable WebSocket server
    #[arg(long)]
    pub no_ws: bool,

    /// JSON snapshot file [default: document.json]
    #[arg(long, env = "SEQSYNC_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// SQLite database path; takes precedence over --snapshot
    #[arg(long, env = "SEQSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Keep the document in memory only; overrides --db and --snapshot
    #[arg(long)]
    pub in_memory: bool,

    /// Site id for elements the hub creates itself (random if unset)
    #[arg(long, env = "SEQSYNC_SITE")]
    pub site: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(&args, file)?;

    init_logging(&settings.log_level);

    print_banner();

    if settings.ws_addr.is_none() && settings.tcp_addr.is_none() {
        anyhow::bail!("At least one transport must be enabled");
    }

    let site = match &settings.site {
        Some(site) => SiteId::new(site.clone()).context("Invalid --site")?,
        None => SiteId::generate(),
    };

    let storage = open_storage(&settings.storage);
    let hub = Arc::new(SyncHub::open(HubConfig::new(site.clone()), storage).await);

    info!(
        site = %site,
        ws = ?settings.ws_addr,
        tcp = ?settings.tcp_addr,
        "Starting seqsync daemon"
    );

    // Bind up front so a taken port fails the process
    let mut handles = Vec::new();

    if let Some(addr) = settings.tcp_addr {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind TCP listener on {}", addr))?;
        info!(addr = %addr, "seqsync TCP server listening");

        let server = TcpServer::new(hub.clone(), addr);
        handles.push(tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                error!(error = %e, "TCP server error");
            }
        }));
    }

    if let Some(addr) = settings.ws_addr {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind WebSocket listener on {}", addr))?;
        info!(addr = %addr, "seqsync WebSocket server listening");

        let server = WebSocketServer::new(hub.clone(), addr);
        handles.push(tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                error!(error = %e, "WebSocket server error");
            }
        }));
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    for handle in handles {
        handle.abort();
    }

    let stats = hub.stats().await;
    info!(
        visible = stats.visible,
        tombstones = stats.tombstones,
        sessions = stats.sessions,
        "Final document state"
    );

    Ok(())
}

/// `RUST_LOG` wins over the configured level when set
fn init_logging(log_level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .init();
        return;
    }

    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn open_storage(choice: &StorageChoice) -> Arc<dyn Storage> {
    match choice {
        StorageChoice::Memory => {
            info!("Running in-memory only (--in-memory)");
            Arc::new(MemoryStorage::new())
        }
        StorageChoice::File(path) => {
            info!(path = %path.display(), "Using JSON snapshot persistence");
            Arc::new(FileStorage::new(path))
        }
        StorageChoice::Sqlite(path) => {
            info!(path = %path.display(), "Initializing SQLite persistence");
            match SqliteStorage::new(path) {
                Ok(storage) => Arc::new(storage),
                Err(e) => {
                    warn!(error = %e, "Failed to initialize SQLite, running in-memory only");
                    Arc::new(MemoryStorage::new())
                }
            }
        }
    }
}

fn print_banner() {
    println!(
        r#"
  ┌─┐┌─┐┌─┐ ┌─┐┬ ┬┌┐┌┌─┐
  └─┐├┤ │─┼┐└─┐└┬┘││││
  └─┘└─┘└─┘└└─┘ ┴ ┘└┘└─┘
  Collaborative sequence sync
  Version {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
