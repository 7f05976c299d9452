use std::sync::Arc;

use async_trait::async_trait;

use numass_core::error::{NumassError, Result};
use numass_core::meta::{Meta, Value};
use numass_core::protocol::message::ok_response;
use numass_core::protocol::Envelope;

use crate::dispatch::{action_of, unknown_action, EnvelopeService};
use crate::storage::RunStore;

/// `numass.state`: device state get/set.
pub struct StateService {
    store: Arc<RunStore>,
}

impl StateService {
    pub fn new(store: Arc<RunStore>) -> Self {
        Self { store }
    }

    fn get(&self, request: &Envelope) -> Vec<(String, Value)> {
        let names: Vec<String> = request
            .meta
            .get_value("name")
            .map(|v| v.items().into_iter().filter_map(Value::as_string).collect())
            .unwrap_or_default();

        if names.is_empty() {
            return self.store.states();
        }
        names
            .into_iter()
            .filter_map(|name| {
                let value = self.store.state(&name)?;
                Some((name, value))
            })
            .collect()
    }

    fn set(&self, request: &Envelope) -> Result<Vec<(String, Value)>> {
        let mut updated = Vec::new();
        for node in request.meta.get_nodes("state") {
            let name = node
                .get_string("name")
                .ok_or_else(|| NumassError::MetaDecode("state entry without name".into()))?;
            let value = node.get_value("value").cloned().unwrap_or(Value::Null);
            updated.push((name, value));
        }
        // Validate every entry before applying any.
        for (name, value) in &updated {
            self.store.set_state(name, value.clone());
        }
        Ok(updated)
    }
}

#[async_trait]
impl EnvelopeService for StateService {
    fn ty(&self) -> &'static str {
        "numass.state"
    }

    async fn handle(&self, request: &Envelope) -> Result<Envelope> {
        let states = match action_of(request).as_str() {
            "get" => self.get(request),
            "set" => self.set(request)?,
            _ => return Err(unknown_action(request)),
        };

        let mut reply = ok_response(request);
        for (name, value) in states {
            reply = reply.put_meta_node(
                "state",
                Meta::new().with_value("name", name).with_value("value", value),
            );
        }
        Ok(reply.build())
    }
}
