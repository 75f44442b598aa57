//! Daemon configuration: defaults, TOML file, then CLI/env overrides

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::Args;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_WS_PORT: u16 = 8080;
pub const DEFAULT_TCP_PORT: u16 = 8081;
pub const DEFAULT_SNAPSHOT: &str = "document.json";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Keys accepted in the TOML configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub bind: Option<String>,
    pub ws_port: Option<u16>,
    pub tcp_port: Option<u16>,
    pub websocket: Option<bool>,
    pub tcp: Option<bool>,
    pub snapshot: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub in_memory: Option<bool>,
    pub site: Option<String>,
    pub log_level: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Where the document snapshot lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageChoice {
    Memory,
    File(PathBuf),
    Sqlite(PathBuf),
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub ws_addr: Option<SocketAddr>,
    pub tcp_addr: Option<SocketAddr>,
    pub storage: StorageChoice,
    pub site: Option<String>,
    pub log_level: String,
}

impl Settings {
    /// Merge CLI/env arguments over the file configuration over defaults
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let bind = args
            .bind
            .clone()
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let ws_enabled = !args.no_ws && file.websocket.unwrap_or(true);
        let tcp_enabled = !args.no_tcp && file.tcp.unwrap_or(true);

        let ws_addr = if ws_enabled {
            let port = args.ws_port.or(file.ws_port).unwrap_or(DEFAULT_WS_PORT);
            Some(socket_addr(&bind, port)?)
        } else {
            None
        };

        let tcp_addr = if tcp_enabled {
            let port = args.tcp_port.or(file.tcp_port).unwrap_or(DEFAULT_TCP_PORT);
            Some(socket_addr(&bind, port)?)
        } else {
            None
        };

        let storage = if args.in_memory || file.in_memory.unwrap_or(false) {
            StorageChoice::Memory
        } else if let Some(db) = args.db.clone().or(file.db) {
            StorageChoice::Sqlite(db)
        } else {
            StorageChoice::File(
                args.snapshot
                    .clone()
                    .or(file.snapshot)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT)),
            )
        };

        Ok(Self {
            ws_addr,
            tcp_addr,
            storage,
            site: args.site.clone().or(file.site),
            log_level: args
                .log_level
                .clone()
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

fn socket_addr(bind: &str, port: u16) -> Result<SocketAddr> {
    format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["seqsyncd"];
        full.extend_from_slice(argv);
        Args::parse_from(full)
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&args(&[]), FileConfig::default()).unwrap();
        assert_eq!(settings.ws_addr, Some("0.0.0.0:8080".parse().unwrap()));
        assert_eq!(settings.tcp_addr, Some("0.0.0.0:8081".parse().unwrap()));
        assert_eq!(settings.storage, StorageChoice::File(PathBuf::from("document.json")));
        assert_eq!(settings.log_level, "info");
        assert!(settings.site.is_none());
    }

    #[test]
    fn test_file_values_apply() {
        let file = FileConfig::parse(
            r#"
            bind = "127.0.0.1"
            ws-port = 9000
            tcp = false
            snapshot = "/var/lib/seqsync/doc.json"
            site = "hub-1"
            "#,
        )
        .unwrap();

        let settings = Settings::resolve(&args(&[]), file).unwrap();
        assert_eq!(settings.ws_addr, Some("127.0.0.1:9000".parse().unwrap()));
        assert!(settings.tcp_addr.is_none());
        assert_eq!(
            settings.storage,
            StorageChoice::File(PathBuf::from("/var/lib/seqsync/doc.json"))
        );
        assert_eq!(settings.site.as_deref(), Some("hub-1"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig::parse("ws-port = 9000\ndb = \"file.db\"\n").unwrap();
        let settings = Settings::resolve(
            &args(&["--ws-port", "9100", "--in-memory", "--no-tcp"]),
            file,
        )
        .unwrap();

        assert_eq!(settings.ws_addr.unwrap().port(), 9100);
        assert!(settings.tcp_addr.is_none());
        assert_eq!(settings.storage, StorageChoice::Memory);
    }

    #[test]
    fn test_db_selects_sqlite() {
        let settings =
            Settings::resolve(&args(&["--db", "/tmp/seqsync.db"]), FileConfig::default()).unwrap();
        assert_eq!(settings.storage, StorageChoice::Sqlite(PathBuf::from("/tmp/seqsync.db")));
    }

    #[test]
    fn test_unknown_file_keys_rejected() {
        assert!(FileConfig::parse("password = \"secret\"\n").is_err());
    }

    #[test]
    fn test_invalid_bind_rejected() {
        assert!(Settings::resolve(&args(&["--bind", "not an ip"]), FileConfig::default()).is_err());
    }
}
