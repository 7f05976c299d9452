//! Dispatcher module exports.
//!
//! Re-exports the dispatcher and service trait so services and the listener
//! can depend on this module directly.

pub mod dispatcher;

pub use dispatcher::{action_of, unknown_action, Dispatcher, EnvelopeService};
