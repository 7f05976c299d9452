//! Shared error type across numass crates.

use std::path::PathBuf;

use thiserror::Error;

/// Error classes reported in `error.class` of failed responses (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or unrecognized envelope header.
    Framing,
    /// Stream ended before the declared envelope length.
    IncompleteEnvelope,
    /// Metadata block failed to parse.
    MetaDecode,
    /// Metadata document cannot be represented by the chosen codec.
    MetaEncode,
    /// Metadata codec code not known to this reader.
    UnknownMetaType,
    /// Socket I/O failure.
    Transport,
    /// Local source cannot be pushed (not a directory, not an archive).
    UnsupportedSource,
    /// Request `type`/`action` is not served.
    UnknownAction,
    /// The remote side reported a failure.
    Remote,
    /// Server-side persistence failure.
    Storage,
    /// Configuration rejected.
    Config,
}

impl ErrorClass {
    /// String representation used in response metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Framing => "FRAMING",
            ErrorClass::IncompleteEnvelope => "INCOMPLETE_ENVELOPE",
            ErrorClass::MetaDecode => "META_DECODE",
            ErrorClass::MetaEncode => "META_ENCODE",
            ErrorClass::UnknownMetaType => "UNKNOWN_META_TYPE",
            ErrorClass::Transport => "TRANSPORT",
            ErrorClass::UnsupportedSource => "UNSUPPORTED_SOURCE",
            ErrorClass::UnknownAction => "UNKNOWN_ACTION",
            ErrorClass::Remote => "REMOTE",
            ErrorClass::Storage => "STORAGE",
            ErrorClass::Config => "CONFIG",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, NumassError>;

/// Unified error type used by core, client and server.
#[derive(Debug, Error)]
pub enum NumassError {
    #[error("framing error: {0}")]
    Framing(String),
    #[error("incomplete envelope: needed {needed} bytes, got {available}")]
    IncompleteEnvelope { needed: usize, available: usize },
    #[error("meta decode error: {0}")]
    MetaDecode(String),
    #[error("meta encode error: {0}")]
    MetaEncode(String),
    #[error("unknown meta type code {0:#06x}")]
    UnknownMetaType(i16),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("unsupported source: {}", .0.display())]
    UnsupportedSource(PathBuf),
    #[error("unknown action '{action}' for '{ty}'")]
    UnknownAction { ty: String, action: String },
    #[error("remote failure ({class}): {message}")]
    Remote { class: String, message: String },
    #[error("storage: {0}")]
    Storage(String),
    #[error("config: {0}")]
    Config(String),
}

impl NumassError {
    /// Map the error to its stable class.
    pub fn class(&self) -> ErrorClass {
        match self {
            NumassError::Framing(_) => ErrorClass::Framing,
            NumassError::IncompleteEnvelope { .. } => ErrorClass::IncompleteEnvelope,
            NumassError::MetaDecode(_) => ErrorClass::MetaDecode,
            NumassError::MetaEncode(_) => ErrorClass::MetaEncode,
            NumassError::UnknownMetaType(_) => ErrorClass::UnknownMetaType,
            NumassError::Transport(_) => ErrorClass::Transport,
            NumassError::UnsupportedSource(_) => ErrorClass::UnsupportedSource,
            NumassError::UnknownAction { .. } => ErrorClass::UnknownAction,
            NumassError::Remote { .. } => ErrorClass::Remote,
            NumassError::Storage(_) => ErrorClass::Storage,
            NumassError::Config(_) => ErrorClass::Config,
        }
    }

    /// Class string as written into `error.class`.
    ///
    /// A `Remote` error keeps the class the remote side reported.
    pub fn class_name(&self) -> String {
        match self {
            NumassError::Remote { class, .. } => class.clone(),
            other => other.class().as_str().to_string(),
        }
    }

    /// Shorthand for a transport failure that did not originate in `std::io`.
    pub fn transport(msg: impl Into<String>) -> Self {
        NumassError::Transport(std::io::Error::new(std::io::ErrorKind::Other, msg.into()))
    }
}
