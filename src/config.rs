use anyhow::{Context, Result};
use rm550_lib::{
    command::Opcodes,
    protocol::{self as proto, Address},
    response::ResponseTokens,
    table::ResolvePolicy,
    tokio_common::{SessionConfig, DEFAULT_DELAY, DEFAULT_TIMEOUT},
};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bench settings read from a YAML file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    /// Serial port of the module, asked for interactively when missing.
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub baud_rate: proto::BaudRate,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_delay", with = "humantime_serde")]
    pub delay: Duration,
    /// Serial numbers addressed when none is given on the command line.
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub policy: ResolvePolicy,
    #[serde(default)]
    pub opcodes: Opcodes,
    #[serde(default)]
    pub tokens: ResponseTokens,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_delay() -> Duration {
    DEFAULT_DELAY
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            device: None,
            baud_rate: proto::BaudRate::default(),
            timeout: default_timeout(),
            delay: default_delay(),
            addresses: Vec::new(),
            policy: ResolvePolicy::default(),
            opcodes: Opcodes::default(),
            tokens: ResponseTokens::default(),
        }
    }
}

impl BenchConfig {
    pub const DEFAULT_CONFIG_FILE: &'static str = "rm550.yml";

    /// Reads `path`, or `rm550.yml` in the working directory if it exists.
    /// Without either the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default_file = PathBuf::from(Self::DEFAULT_CONFIG_FILE);
                if !default_file.exists() {
                    log::debug!("No {default_file:?} found, using default settings");
                    return Ok(Self::default());
                }
                default_file
            }
        };
        log::debug!("Loading config file from {path:?}");
        let file =
            File::open(&path).with_context(|| format!("Cannot open config file {path:?}"))?;
        serde_yaml::from_reader(file).with_context(|| format!("Cannot parse config file {path:?}"))
    }

    pub fn session_config(&self, timeout: Option<Duration>, delay: Option<Duration>) -> SessionConfig {
        SessionConfig {
            timeout: timeout.unwrap_or(self.timeout),
            delay: delay.unwrap_or(self.delay),
            opcodes: self.opcodes.clone(),
            tokens: self.tokens.clone(),
        }
    }
}
