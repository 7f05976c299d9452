use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

use numass_core::error::{NumassError, Result};
use numass_core::protocol::{Dialect, MetaType};

const MIN_ENVELOPE_BYTES: u32 = 1024;
const MAX_ENVELOPE_BYTES: u32 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,
}

impl ServerConfig {
    /// Version-1 config with default server settings.
    pub fn new(server: ServerSection) -> Self {
        Self { version: 1, server }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(NumassError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.server.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Dialect of every envelope the server writes.
    #[serde(default)]
    pub dialect: Dialect,

    /// Meta codec for replies that answer no decodable request.
    #[serde(default)]
    pub meta_type: MetaType,

    /// Largest declared meta or data section accepted.
    #[serde(default = "default_max_envelope_bytes")]
    pub max_envelope_bytes: u32,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            storage_root: default_storage_root(),
            dialect: Dialect::default(),
            meta_type: MetaType::default(),
            max_envelope_bytes: default_max_envelope_bytes(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if self.storage_root.as_os_str().is_empty() {
            return Err(NumassError::Config(
                "server.storage_root must not be empty".into(),
            ));
        }
        if !(MIN_ENVELOPE_BYTES..=MAX_ENVELOPE_BYTES).contains(&self.max_envelope_bytes) {
            return Err(NumassError::Config(format!(
                "server.max_envelope_bytes must be between {MIN_ENVELOPE_BYTES} and {MAX_ENVELOPE_BYTES}"
            )));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            NumassError::Config(format!("server.listen must be a socket address: {e}"))
        })
    }
}

fn default_listen() -> String {
    "0.0.0.0:8335".into()
}
fn default_storage_root() -> PathBuf {
    PathBuf::from("./numass-storage")
}
fn default_max_envelope_bytes() -> u32 {
    256 * 1024 * 1024
}
