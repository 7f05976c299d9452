//! Metadata codec registry keyed by the tag's meta-type code.

use serde::{Deserialize, Serialize};

use crate::error::{NumassError, Result};
use crate::meta::{self, Meta};

/// Known metadata codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaType {
    #[default]
    Json,
    Binary,
}

impl MetaType {
    /// "JS"
    pub const JSON_CODE: i16 = 0x4A53;
    /// "BI"
    pub const BINARY_CODE: i16 = 0x4249;

    pub fn code(self) -> i16 {
        match self {
            MetaType::Json => Self::JSON_CODE,
            MetaType::Binary => Self::BINARY_CODE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MetaType::Json => "json",
            MetaType::Binary => "binary",
        }
    }

    /// Resolve a wire code to a codec.
    pub fn resolve(code: i16) -> Result<MetaType> {
        match code {
            Self::JSON_CODE => Ok(MetaType::Json),
            Self::BINARY_CODE => Ok(MetaType::Binary),
            other => Err(NumassError::UnknownMetaType(other)),
        }
    }

    /// Resolve a wire code, falling back to the default codec with a warning.
    pub fn resolve_or_default(code: i16) -> MetaType {
        Self::resolve(code).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not resolve meta type, using default");
            MetaType::default()
        })
    }

    /// Serialize a document. An empty document is written as zero bytes.
    pub fn encode(self, meta: &Meta) -> Result<Vec<u8>> {
        if meta.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            MetaType::Json => meta::json::encode(meta),
            MetaType::Binary => meta::binary::encode(meta),
        }
    }

    /// Parse a document. Zero bytes decode to an empty document.
    pub fn decode(self, bytes: &[u8]) -> Result<Meta> {
        if bytes.is_empty() {
            return Ok(Meta::new());
        }
        match self {
            MetaType::Json => meta::json::decode(bytes),
            MetaType::Binary => meta::binary::decode(bytes),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn codes_resolve() {
        for mt in [MetaType::Json, MetaType::Binary] {
            assert_eq!(MetaType::resolve(mt.code()).unwrap(), mt);
        }
        // "XM" (xml meta) has no codec here
        assert!(matches!(
            MetaType::resolve(0x584d),
            Err(NumassError::UnknownMetaType(0x584d))
        ));
        assert_eq!(MetaType::resolve_or_default(0x584d), MetaType::Json);
    }

    #[test]
    fn empty_documents_take_no_bytes() {
        assert!(MetaType::Binary.encode(&Meta::new()).unwrap().is_empty());
        assert_eq!(MetaType::Json.decode(&[]).unwrap(), Meta::new());
    }
}
