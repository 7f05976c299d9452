//! Shared application state for the numass server.
//!
//! Wires the run store and dispatcher and registers the built-in services.

use std::sync::Arc;

use numass_core::error::Result;
use numass_core::protocol::EnvelopeCodec;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::services::{DataService, NotesService, RunService, StateService};
use crate::storage::RunStore;

#[derive(Clone)]
pub struct AppState {
    cfg: Arc<ServerConfig>,
    store: Arc<RunStore>,
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can report a rejected config instead of panicking.
    pub fn new(cfg: ServerConfig) -> Result<Self> {
        cfg.validate()?;

        let store = Arc::new(RunStore::new(cfg.server.storage_root.clone()));
        let dispatcher = Dispatcher::new();

        dispatcher.register(Arc::new(RunService::new(Arc::clone(&store))));
        dispatcher.register(Arc::new(StateService::new(Arc::clone(&store))));
        dispatcher.register(Arc::new(NotesService::new(Arc::clone(&store))));
        dispatcher.register(Arc::new(DataService::new(Arc::clone(&store))));

        tracing::debug!(services = ?dispatcher.registered_types(), "services registered");

        Ok(Self {
            cfg: Arc::new(cfg),
            store,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn cfg(&self) -> &ServerConfig {
        &self.cfg
    }

    /// Codec for one connection: configured reply dialect and section cap.
    pub fn codec(&self) -> EnvelopeCodec {
        EnvelopeCodec::new(self.cfg.server.dialect)
            .with_max_section_len(self.cfg.server.max_envelope_bytes)
    }

    pub fn store(&self) -> Arc<RunStore> {
        Arc::clone(&self.store)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }
}
