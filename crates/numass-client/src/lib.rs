//! numass-client
//!
//! Blocking client for the numass envelope protocol:
//! - [`transport::NumassClient`]: single-owner socket, one request in flight,
//!   failures folded into `success=false` responses
//! - [`actions`]: run control, state sync, data push, notes
//! - [`archive`]: directory bundling for data push
//! - [`config`]: strict YAML client configuration

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod actions;
pub mod archive;
pub mod config;
pub mod transport;

pub use config::{ClientConfig, ReadPolicy};
pub use transport::NumassClient;
