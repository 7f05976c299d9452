//! Envelope wire protocol.
//!
//! An envelope is a binary tag followed by a metadata block and an opaque
//! payload. Two tag dialects coexist and are told apart by their 2-byte start
//! marker:
//! - Legacy: fixed 30-byte tag (`#!` ... `!#\r\n`) kept bit-exact for old files.
//! - Modern: self-delimited varint tag (`#~` ... `~#\r\n`).
//!
//! All parsers are panic-free: malformed input is reported as `NumassError`
//! and incomplete input as "need more bytes", so one codec serves files,
//! blocking sockets and async listeners alike.

pub mod envelope;
pub mod message;
pub mod meta_type;
pub mod tag;

pub use envelope::{Envelope, EnvelopeBuilder, EnvelopeCodec, Frame};
pub use meta_type::MetaType;
pub use tag::{Dialect, Tag, TagFields};
