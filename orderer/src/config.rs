//! Configuration for the ordering service
//!
//! Layers, lowest precedence first: built-in defaults, a TOML file, `ORDERER_*`
//! environment variables, command line flags. Every section is
//! `#[serde(default)]`, so a file only needs the fields it changes.

use crate::{Error, Result};
use merkle_core::HashStrategy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Name of the configuration file searched for by [`Config::locate`]
pub const CONFIG_FILE_NAME: &str = "orderer.toml";

/// Orderer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// gRPC server configuration
    pub server: ServerConfig,

    /// Ledger configuration
    pub ledger: LedgerConfig,

    /// Batching configuration
    pub ordering: OrderingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// gRPC server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen_address: String,

    /// Connection timeout (seconds)
    pub conn_timeout_secs: u64,

    /// Largest message accepted from a client (bytes)
    pub max_recv_message_size: usize,

    /// Largest message sent to a client (bytes)
    pub max_send_message_size: usize,

    /// TLS configuration
    pub tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:9443".to_string(),
            conn_timeout_secs: 30,
            max_recv_message_size: 100 * 1024 * 1024, // 100 MiB
            max_send_message_size: 100 * 1024 * 1024, // 100 MiB
            tls: TlsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.listen_address.parse()?)
    }

    /// Connection timeout
    pub fn conn_timeout(&self) -> Duration {
        Duration::from_secs(self.conn_timeout_secs)
    }
}

/// TLS key pair; TLS is enabled when both files are set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM encoded server certificate (chain)
    pub cert_file: Option<PathBuf>,

    /// PEM encoded private key
    pub key_file: Option<PathBuf>,
}

impl TlsConfig {
    /// Check if TLS is enabled
    pub fn is_enabled(&self) -> bool {
        self.cert_file.is_some() && self.key_file.is_some()
    }
}

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Data directory
    pub data_dir: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Batching configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderingConfig {
    /// Maximum batch size (transactions)
    pub max_batch_size: usize,

    /// Batch timeout (milliseconds)
    pub batch_timeout_ms: u64,

    /// Hash algorithm for batch trees (`sha256`, `sha1`, `md5`)
    pub hash_algorithm: String,

    /// Sequencer mailbox capacity
    pub mailbox_capacity: usize,

    /// Ordered transactions buffered per deliver subscriber
    pub subscriber_buffer: usize,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            batch_timeout_ms: 200,
            hash_algorithm: "sha256".to_string(),
            mailbox_capacity: 1000,
            subscriber_buffer: 1024,
        }
    }
}

impl OrderingConfig {
    /// Batch timeout
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Hash strategy named by `hash_algorithm`
    pub fn hash_strategy(&self) -> Result<HashStrategy> {
        Ok(self.hash_algorithm.parse()?)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!("Unknown log format: {}", other))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load from file
    ///
    /// Relative paths in the file are resolved against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_relative_paths(base);

        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Defaults, then the explicit or discovered file, then the environment
    ///
    /// Returns the file that was loaded, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::locate(),
        };

        let mut config = match &path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;

        Ok((config, path))
    }

    /// Candidate configuration files, highest priority first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("orderer").join(CONFIG_FILE_NAME));
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("orderer").join(CONFIG_FILE_NAME);
            if !paths.contains(&xdg) {
                paths.push(xdg);
            }
        }
        paths
    }

    /// First existing file from [`Config::search_paths`]
    pub fn locate() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|path| path.is_file())
    }

    /// Resolve relative file system paths against `base`
    pub fn resolve_relative_paths(&mut self, base: &Path) {
        resolve(&mut self.ledger.data_dir, base);
        if let Some(cert) = self.server.tls.cert_file.as_mut() {
            resolve(cert, base);
        }
        if let Some(key) = self.server.tls.key_file.as_mut() {
            resolve(key, base);
        }
    }

    /// Apply `ORDERER_*` overrides from `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ORDERER_LISTEN_ADDRESS") {
            self.server.listen_address = addr;
        }

        if let Some(path) = lookup("ORDERER_TLS_CERT_FILE") {
            self.server.tls.cert_file = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("ORDERER_TLS_KEY_FILE") {
            self.server.tls.key_file = Some(PathBuf::from(path));
        }

        if let Some(data_dir) = lookup("ORDERER_DATA_DIR") {
            self.ledger.data_dir = PathBuf::from(data_dir);
        }

        if let Some(size) = lookup("ORDERER_MAX_BATCH_SIZE") {
            self.ordering.max_batch_size = parse_env("ORDERER_MAX_BATCH_SIZE", &size)?;
        }

        if let Some(timeout) = lookup("ORDERER_BATCH_TIMEOUT_MS") {
            self.ordering.batch_timeout_ms = parse_env("ORDERER_BATCH_TIMEOUT_MS", &timeout)?;
        }

        if let Some(algorithm) = lookup("ORDERER_HASH_ALGORITHM") {
            self.ordering.hash_algorithm = algorithm;
        }

        if let Some(level) = lookup("ORDERER_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("ORDERER_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;
        self.ordering.hash_strategy()?;

        if self.ordering.max_batch_size == 0 {
            return Err(Error::Config("max_batch_size must be positive".to_string()));
        }
        if self.ordering.batch_timeout_ms == 0 {
            return Err(Error::Config("batch_timeout_ms must be positive".to_string()));
        }
        if self.ordering.mailbox_capacity == 0 || self.ordering.subscriber_buffer == 0 {
            return Err(Error::Config(
                "mailbox_capacity and subscriber_buffer must be positive".to_string(),
            ));
        }
        if self.server.tls.cert_file.is_some() != self.server.tls.key_file.is_some() {
            return Err(Error::Config(
                "tls requires both cert_file and key_file".to_string(),
            ));
        }

        Ok(())
    }
}

fn resolve(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, value)))
}
