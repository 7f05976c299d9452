//! Transport layer (TCP).
//!
//! Exposes the accept loop and the per-connection envelope session.

pub mod listener;

pub use listener::serve;
