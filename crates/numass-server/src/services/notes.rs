use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use numass_core::error::{NumassError, Result};
use numass_core::meta::Meta;
use numass_core::protocol::message::ok_response;
use numass_core::protocol::Envelope;

use crate::dispatch::{action_of, unknown_action, EnvelopeService};
use crate::storage::{Note, RunStore};

/// `numass.notes`: free-text annotations of the current run.
pub struct NotesService {
    store: Arc<RunStore>,
}

impl NotesService {
    pub fn new(store: Arc<RunStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EnvelopeService for NotesService {
    fn ty(&self) -> &'static str {
        "numass.notes"
    }

    async fn handle(&self, request: &Envelope) -> Result<Envelope> {
        match action_of(request).as_str() {
            "push" => {
                let notes = request
                    .meta
                    .get_nodes("note")
                    .iter()
                    .map(parse_note)
                    .collect::<Result<Vec<_>>>()?;
                if notes.is_empty() {
                    return Err(NumassError::MetaDecode("note push without a note".into()));
                }
                let count = notes.len();
                for note in notes {
                    self.store.push_note(note).await;
                }
                Ok(ok_response(request).set_meta_value("count", count as i64).build())
            }
            "pull" => {
                let limit = request
                    .meta
                    .get_int("limit")
                    .filter(|l| *l > 0)
                    .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
                    .unwrap_or(0);

                let mut reply = ok_response(request);
                for note in self.store.notes(limit).await {
                    reply = reply.put_meta_node("note", note_meta(&note));
                }
                Ok(reply.build())
            }
            _ => Err(unknown_action(request)),
        }
    }
}

fn parse_note(meta: &Meta) -> Result<Note> {
    let text = meta
        .get_string("text")
        .ok_or_else(|| NumassError::MetaDecode("note without text".into()))?;
    let time = match meta.get_string("time") {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| NumassError::MetaDecode(format!("note.time '{raw}': {e}")))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    Ok(Note { text, time })
}

fn note_meta(note: &Note) -> Meta {
    Meta::new()
        .with_value("text", note.text.as_str())
        .with_value("time", note.time.to_rfc3339_opts(SecondsFormat::Millis, true))
}
