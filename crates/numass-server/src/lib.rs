//! numass-server library entry.
//!
//! This crate wires the TCP transport, dispatcher, run store and built-in
//! services into the instrument-control server. It is intended to be
//! consumed by the binary (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod services;
pub mod storage;
pub mod transport;
