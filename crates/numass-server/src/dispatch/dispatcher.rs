use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use numass_core::error::{NumassError, Result};
use numass_core::protocol::message::{self, ACTION_KEY};
use numass_core::protocol::Envelope;

/// A handler for one request domain (`meta.type`).
#[async_trait]
pub trait EnvelopeService: Send + Sync {
    fn ty(&self) -> &'static str;
    async fn handle(&self, request: &Envelope) -> Result<Envelope>;
}

/// Registry of services keyed by request type.
#[derive(Default)]
pub struct Dispatcher {
    services: DashMap<&'static str, Arc<dyn EnvelopeService>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    pub fn register(&self, svc: Arc<dyn EnvelopeService>) {
        self.services.insert(svc.ty(), svc);
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.services.iter().map(|e| *e.key()).collect();
        types.sort_unstable();
        types
    }

    /// Route a request and always produce a reply; failures become
    /// `success=false` responses answering `request`.
    pub async fn dispatch(&self, request: &Envelope) -> Envelope {
        let ty = request.ty().unwrap_or_default();
        let handler = self.services.get(ty.as_str()).map(|e| e.value().clone());

        let result = match handler {
            Some(svc) => svc.handle(request).await,
            None => Err(unknown_action(request)),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(%ty, action = %action_of(request), error = %e, "request failed");
                message::error_response_base(request, &e).build()
            }
        }
    }
}

/// `meta.action` of a request, empty when absent.
pub fn action_of(request: &Envelope) -> String {
    request.meta.get_string(ACTION_KEY).unwrap_or_default()
}

pub fn unknown_action(request: &Envelope) -> NumassError {
    NumassError::UnknownAction {
        ty: request.ty().unwrap_or_default(),
        action: action_of(request),
    }
}
