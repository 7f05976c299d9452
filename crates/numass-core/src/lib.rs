//! numass core: transport-agnostic envelope primitives, metadata model and errors.
//!
//! This crate defines the wire-level contracts shared by the client, the
//! server and storage tooling: the dual-dialect binary tag, the envelope
//! (tag + metadata + payload) and the canonical request/response shapes.
//! It carries no socket or runtime dependencies so the same codec drives
//! blocking readers, async listeners and files on disk.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed bytes surface as `NumassError`/`Result`, never as a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod meta;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorClass, NumassError, Result};
pub use meta::{Meta, Value};
pub use protocol::envelope::Envelope;

/// Extension of archived numass data, as pushed by clients and stored by
/// the server.
pub const NUMASS_ZIP_EXTENSION: &str = ".nm.zip";
