use std::sync::Arc;

use async_trait::async_trait;

use numass_core::error::Result;
use numass_core::meta::Meta;
use numass_core::protocol::message::ok_response;
use numass_core::protocol::Envelope;

use crate::dispatch::{action_of, unknown_action, EnvelopeService};
use crate::storage::{RunStore, DEFAULT_RUN};

/// `numass.run`: current run lifecycle.
pub struct RunService {
    store: Arc<RunStore>,
}

impl RunService {
    pub fn new(store: Arc<RunStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EnvelopeService for RunService {
    fn ty(&self) -> &'static str {
        "numass.run"
    }

    async fn handle(&self, request: &Envelope) -> Result<Envelope> {
        let run = match action_of(request).as_str() {
            "get" => self.store.current_run().await,
            "start" => {
                let path = request
                    .meta
                    .get_string("path")
                    .unwrap_or_else(|| DEFAULT_RUN.to_string());
                self.store.start_run(&path).await?
            }
            "reset" => self.store.reset_run().await,
            _ => return Err(unknown_action(request)),
        };

        Ok(ok_response(request)
            .set_meta_value("path", run.as_str())
            .put_meta_node("run", Meta::new().with_value("path", run))
            .build())
    }
}
