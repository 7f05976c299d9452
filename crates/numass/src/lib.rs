//! Top-level facade crate for numass.
//!
//! Re-exports the protocol core, the blocking client and the server library
//! so users can depend on a single crate.

pub mod core {
    pub use numass_core::*;
}

pub mod client {
    pub use numass_client::*;
}

pub mod server {
    pub use numass_server::*;
}

pub use numass_core::{Envelope, Meta, NumassError, Result};
