//! Command line interface for `orderer-server`

use crate::config::{Config, LogFormat};
use crate::Result;
use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

/// Command line flags; each one overrides the file and environment layers
#[derive(Parser, Debug, Default)]
#[command(name = "orderer-server", version)]
#[command(about = "Orders transactions and streams their ids to subscribers")]
pub struct Cli {
    /// Configuration file (defaults to the first orderer.toml found)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address the gRPC server listens on
    #[arg(long, value_name = "ADDR")]
    pub listen_address: Option<String>,

    /// PEM encoded server certificate
    #[arg(long, value_name = "FILE")]
    pub tls_cert_file: Option<PathBuf>,

    /// PEM encoded server private key
    #[arg(long, value_name = "FILE")]
    pub tls_private_key_file: Option<PathBuf>,

    /// Ledger data directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log filter directive, e.g. `info` or `orderer=debug`
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Apply flags on top of `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(addr) = &self.listen_address {
            config.server.listen_address = addr.clone();
        }
        if let Some(cert) = &self.tls_cert_file {
            config.server.tls.cert_file = Some(cert.clone());
        }
        if let Some(key) = &self.tls_private_key_file {
            config.server.tls.key_file = Some(key.clone());
        }
        if let Some(data_dir) = &self.data_dir {
            config.ledger.data_dir = data_dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }

    /// Resolve the full configuration: defaults, file, environment, flags
    ///
    /// Returns the configuration file that was loaded, if any.
    pub fn load_config(&self) -> Result<(Config, Option<PathBuf>)> {
        let (mut config, path) = Config::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok((config, path))
    }
}

/// Startup or shutdown stage of `orderer-server`, one exit code each
///
/// Codes 1 and 2 are left to the shell and to argument parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStage {
    /// Configuration could not be loaded or validated
    ConfigLoadFailed = 3,
    /// Tracing subscriber could not be installed
    LoggerCreateFailed = 4,
    /// Data directory, metrics, sequencer or router setup failed
    ServerCreateFailed = 6,
    /// Listener could not be bound or the server stopped with an error
    ServerStartFailed = 7,
    /// Draining the sequencer failed
    AppShutdownFailed = 9,
}

impl ExitStage {
    /// Process exit code
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ExitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            ExitStage::ConfigLoadFailed => "failed to load configuration",
            ExitStage::LoggerCreateFailed => "failed to create logger",
            ExitStage::ServerCreateFailed => "failed to create server",
            ExitStage::ServerStartFailed => "failed to start server",
            ExitStage::AppShutdownFailed => "failed to shut down",
        };
        f.write_str(stage)
    }
}

impl From<ExitStage> for ExitCode {
    fn from(stage: ExitStage) -> Self {
        ExitCode::from(stage.code())
    }
}

/// Error tagged with the stage it aborted
#[derive(Debug, thiserror::Error)]
#[error("{stage}: {cause:#}")]
pub struct StageError {
    /// Failed stage
    pub stage: ExitStage,
    /// Underlying cause
    pub cause: anyhow::Error,
}

/// Tag a fallible step with its [`ExitStage`]
pub trait StageExt<T> {
    /// Attach `stage` to the error, if any
    fn stage(self, stage: ExitStage) -> std::result::Result<T, StageError>;
}

impl<T, E> StageExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn stage(self, stage: ExitStage) -> std::result::Result<T, StageError> {
        self.map_err(|e| StageError {
            stage,
            cause: e.into(),
        })
    }
}
