//! Typed remote actions.
//!
//! Each call builds a request, runs it through [`NumassClient::respond`] and
//! hands back the response meta. Failed exchanges come back as
//! `success=false` metas, never as errors, except for helpers that decode a
//! typed result.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use numass_core::error::{NumassError, Result};
use numass_core::meta::{Meta, Value};
use numass_core::protocol::message::{self, error_meta, remote_error};
use numass_core::protocol::EnvelopeBuilder;

use crate::archive::{self, archive_stem, is_numass_archive};
use crate::transport::NumassClient;

pub const RUN_TYPE: &str = "numass.run";
pub const STATE_TYPE: &str = "numass.state";
pub const DATA_TYPE: &str = "numass.data";
pub const NOTES_TYPE: &str = "numass.notes";

impl NumassClient {
    fn request(&self, ty: &str, action: &str) -> EnvelopeBuilder {
        message::request_action(ty, action).meta_type(self.config().meta_type)
    }

    fn call(&mut self, request: EnvelopeBuilder) -> Meta {
        self.respond(&request.build()).meta
    }

    pub fn get_current_run(&mut self) -> Meta {
        let req = self.request(RUN_TYPE, "get");
        self.call(req)
    }

    pub fn start_run(&mut self, name: &str) -> Meta {
        let req = self.request(RUN_TYPE, "start").set_meta_value("path", name);
        self.call(req)
    }

    pub fn reset_run(&mut self) -> Meta {
        let req = self.request(RUN_TYPE, "reset");
        self.call(req)
    }

    /// Fetch named states; an empty `names` asks for all of them.
    pub fn get_states(&mut self, names: &[&str]) -> Result<BTreeMap<String, Value>> {
        let mut req = self.request(STATE_TYPE, "get");
        if !names.is_empty() {
            req = req.set_meta_value("name", names.iter().map(|n| n.to_string()).collect::<Vec<_>>());
        }

        let response = self.call(req);
        if let Some(err) = remote_error(&response) {
            return Err(err);
        }
        Ok(response
            .get_nodes("state")
            .iter()
            .filter_map(|s| {
                let name = s.get_string("name")?;
                let value = s.get_value("value").cloned().unwrap_or(Value::Null);
                Some((name, value))
            })
            .collect())
    }

    pub fn set_state(&mut self, name: &str, value: impl Into<Value>) -> Meta {
        let req = self
            .request(STATE_TYPE, "set")
            .put_meta_node("state", state_node(name, value.into()));
        self.call(req)
    }

    pub fn set_states(&mut self, states: &BTreeMap<String, Value>) -> Meta {
        let mut req = self.request(STATE_TYPE, "set");
        for (name, value) in states {
            req = req.put_meta_node("state", state_node(name, value.clone()));
        }
        self.call(req)
    }

    /// Push a `.nm.zip` archive or a directory (archived on the fly) under
    /// the remote `path`.
    ///
    /// Anything else fails locally with an `UNSUPPORTED_SOURCE` meta and the
    /// server is never contacted.
    pub fn send_data(&mut self, path: &str, source: &Path) -> Meta {
        match self.prepare_data(path, source) {
            Ok(req) => self.call(req),
            Err(e) => {
                tracing::warn!(source = %source.display(), error = %e, "data push rejected locally");
                error_meta(&e).with_value(message::TYPE_KEY, DATA_TYPE)
            }
        }
    }

    fn prepare_data(&self, path: &str, source: &Path) -> Result<EnvelopeBuilder> {
        let (name, bytes) = if source.is_dir() {
            let tmp = archive::pack_directory(source, self.config().archive_dir.as_deref())?;
            let bytes = fs::read(tmp.path())
                .map_err(|e| NumassError::Storage(format!("read temporary archive: {e}")))?;
            // `tmp` is dropped here and the archive removed.
            (archive_stem(source), bytes)
        } else if source.is_file() && is_numass_archive(source) {
            let bytes = fs::read(source).map_err(|e| {
                NumassError::Storage(format!("read {}: {e}", source.display()))
            })?;
            (archive_stem(source), bytes)
        } else {
            return Err(NumassError::UnsupportedSource(source.to_path_buf()));
        };
        let name = name.ok_or_else(|| NumassError::UnsupportedSource(source.to_path_buf()))?;

        tracing::debug!(%path, %name, len = bytes.len(), "pushing data");
        Ok(self
            .request(DATA_TYPE, "push")
            .set_meta_value("path", path)
            .set_meta_value("name", name)
            .data(bytes))
    }

    /// Attach a note; without `time` the server stamps it.
    pub fn add_note(&mut self, text: &str, time: Option<DateTime<Utc>>) -> Meta {
        let mut req = self.request(NOTES_TYPE, "push").set_meta_value("note.text", text);
        if let Some(time) = time {
            req = req.set_meta_value(
                "note.time",
                time.to_rfc3339_opts(SecondsFormat::Millis, true),
            );
        }
        self.call(req)
    }

    /// Fetch notes; `limit` of 0 means no limit.
    pub fn get_notes(&mut self, limit: u32) -> Meta {
        let mut req = self.request(NOTES_TYPE, "pull");
        if limit > 0 {
            req = req.set_meta_value("limit", limit);
        }
        self.call(req)
    }
}

fn state_node(name: &str, value: Value) -> Meta {
    Meta::new().with_value("name", name).with_value("value", value)
}
