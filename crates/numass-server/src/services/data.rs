use std::sync::Arc;

use async_trait::async_trait;

use numass_core::error::{NumassError, Result};
use numass_core::protocol::message::ok_response;
use numass_core::protocol::Envelope;

use crate::dispatch::{action_of, unknown_action, EnvelopeService};
use crate::storage::RunStore;

/// `numass.data`: archive upload into the current run.
pub struct DataService {
    store: Arc<RunStore>,
}

impl DataService {
    pub fn new(store: Arc<RunStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EnvelopeService for DataService {
    fn ty(&self) -> &'static str {
        "numass.data"
    }

    async fn handle(&self, request: &Envelope) -> Result<Envelope> {
        if action_of(request) != "push" {
            return Err(unknown_action(request));
        }
        let name = request
            .meta
            .get_string("name")
            .ok_or_else(|| NumassError::MetaDecode("numass.data push requires name".into()))?;
        if !request.has_data() {
            return Err(NumassError::Storage("empty payload".into()));
        }
        let path = request.meta.get_string("path").unwrap_or_default();

        let file = self.store.write_archive(&path, &name, &request.data).await?;
        let rel = file
            .strip_prefix(self.store.root())
            .unwrap_or(file.as_path())
            .to_string_lossy()
            .into_owned();
        Ok(ok_response(request)
            .set_meta_value("file", rel)
            .set_meta_value("size", request.data_length() as i64)
            .build())
    }
}
