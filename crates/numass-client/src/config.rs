//! Client config loader (strict parsing).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use numass_core::error::{NumassError, Result};
use numass_core::protocol::{Dialect, MetaType};

/// What a timed-out socket read means for the request in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPolicy {
    /// Keep reading until a full envelope arrives or a hard I/O error occurs.
    #[default]
    Retry,
    /// The first timed-out read fails the request.
    FailFast,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default)]
    pub read_policy: ReadPolicy,

    #[serde(default)]
    pub dialect: Dialect,

    #[serde(default)]
    pub meta_type: MetaType,

    /// Where temporary archives are created; system temp dir when unset.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            address: default_address(),
            port: default_port(),
            read_timeout_ms: default_read_timeout_ms(),
            read_policy: ReadPolicy::default(),
            dialect: Dialect::default(),
            meta_type: MetaType::default(),
            archive_dir: None,
        }
    }
}

impl ClientConfig {
    /// Config pointing at `address:port` with everything else defaulted.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(NumassError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        if self.address.trim().is_empty() {
            return Err(NumassError::Config("address must not be empty".into()));
        }
        if self.port == 0 {
            return Err(NumassError::Config("port must not be 0".into()));
        }
        if !(1..=60000).contains(&self.read_timeout_ms) {
            return Err(NumassError::Config(
                "read_timeout_ms must be between 1 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

fn default_version() -> u32 {
    1
}
fn default_address() -> String {
    "192.168.111.1".into()
}
fn default_port() -> u16 {
    8335
}
fn default_read_timeout_ms() -> u64 {
    300
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)
        .map_err(|e| NumassError::Config(format!("read {} failed: {e}", path.display())))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ClientConfig> {
    let cfg: ClientConfig = serde_yaml::from_str(s)
        .map_err(|e| NumassError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
