use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config as RConfig, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_LOG_LEVEL, DEFAULT_VIEWER, ENV_PREFIX, IDENTITY_CAPACITY, LOG_STORE_FILE,
    MAX_COMMAND_LEN, MAX_USER_LEN, POLL_INTERVAL_MS,
};
use crate::types::identity::FieldLimits;

/// Fault signals the daemon may be told to ignore instead of dying on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum FaultSignal {
    #[serde(rename = "SIGILL")]
    IllegalInstruction,
    #[serde(rename = "SIGFPE")]
    FloatingPoint,
    #[serde(rename = "SIGSEGV")]
    SegmentationViolation,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub log_store_path: PathBuf,
    pub poll_interval_ms: u64,
    pub identity_capacity: usize,
    pub max_command_len: usize,
    pub max_user_len: usize,
    /// SIGSEGV stays fatal unless listed here explicitly.
    pub ignored_fault_signals: Vec<FaultSignal>,
    pub viewer: String,
    pub log_level: String,

    pub config_sources: Vec<String>,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn field_limits(&self) -> FieldLimits {
        FieldLimits {
            command: self.max_command_len,
            user: self.max_user_len,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.identity_capacity == 0 {
            bail!("identity_capacity must be greater than zero");
        }
        if self.max_command_len == 0 || self.max_user_len == 0 {
            bail!("max_command_len and max_user_len must be greater than zero");
        }
        if self.viewer.split_whitespace().next().is_none() {
            bail!("viewer must name a program");
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_default_config() -> Result<Config> {
        Self::load_config(None)
    }

    /// Defaults, then the optional TOML file at `path`, then `PROCLOG_*` variables.
    pub fn load_config(path: Option<&Path>) -> Result<Config> {
        let mut builder = RConfig::builder();

        // set defaults
        builder = builder
            .set_default("log_store_path", LOG_STORE_FILE)?
            .set_default("poll_interval_ms", POLL_INTERVAL_MS)?
            .set_default("identity_capacity", IDENTITY_CAPACITY as u64)?
            .set_default("max_command_len", MAX_COMMAND_LEN as u64)?
            .set_default("max_user_len", MAX_USER_LEN as u64)?
            .set_default::<&str, Vec<&str>>("ignored_fault_signals", vec!["SIGILL", "SIGFPE"])?
            .set_default("viewer", DEFAULT_VIEWER)?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?;

        let mut sources = vec![];
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            sources.push(path.display().to_string());
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ignored_fault_signals"),
        );

        // set overrides
        builder = builder.set_override("config_sources", sources)?;

        let config: Config = builder
            .build()?
            .try_deserialize()
            .context("failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }
}
