//! Run-scoped server state: current run, device states, notes and the data
//! directory tree under the storage root.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use numass_core::error::{NumassError, Result};
use numass_core::meta::Value;
use numass_core::NUMASS_ZIP_EXTENSION;

/// Run selected when none was started.
pub const DEFAULT_RUN: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub text: String,
    pub time: DateTime<Utc>,
}

pub struct RunStore {
    root: PathBuf,
    current: RwLock<String>,
    states: DashMap<String, Value>,
    notes: DashMap<String, Vec<Note>>,
}

impl RunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: RwLock::new(DEFAULT_RUN.to_string()),
            states: DashMap::new(),
            notes: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn current_run(&self) -> String {
        self.current.read().await.clone()
    }

    /// Switch the current run, creating its directory.
    pub async fn start_run(&self, path: &str) -> Result<String> {
        let rel = safe_relative(path)?;
        let dir = self.root.join(&rel);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| NumassError::Storage(format!("create {}: {e}", dir.display())))?;

        let run = normalized(&rel);
        *self.current.write().await = run.clone();
        tracing::info!(run = %run, "run started");
        Ok(run)
    }

    pub async fn reset_run(&self) -> String {
        *self.current.write().await = DEFAULT_RUN.to_string();
        tracing::info!("run reset");
        DEFAULT_RUN.to_string()
    }

    pub fn state(&self, name: &str) -> Option<Value> {
        self.states.get(name).map(|v| v.value().clone())
    }

    /// All states, sorted by name.
    pub fn states(&self) -> Vec<(String, Value)> {
        let mut all: Vec<_> = self
            .states
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn set_state(&self, name: &str, value: Value) {
        tracing::debug!(%name, %value, "state set");
        self.states.insert(name.to_string(), value);
    }

    pub async fn push_note(&self, note: Note) {
        let run = self.current_run().await;
        self.notes.entry(run).or_default().push(note);
    }

    /// Notes of the current run, newest first; `limit` 0 returns all.
    pub async fn notes(&self, limit: usize) -> Vec<Note> {
        let run = self.current_run().await;
        let mut notes = self
            .notes
            .get(&run)
            .map(|n| n.value().clone())
            .unwrap_or_default();
        notes.sort_by(|a, b| b.time.cmp(&a.time));
        if limit > 0 {
            notes.truncate(limit);
        }
        notes
    }

    /// Store an archive as `<root>/<run>/<path>/<name>.nm.zip`.
    pub async fn write_archive(&self, path: &str, name: &str, data: &[u8]) -> Result<PathBuf> {
        let run = self.current_run().await;
        let name = name.strip_suffix(NUMASS_ZIP_EXTENSION).unwrap_or(name);
        let file_name = safe_relative(name)?;
        if file_name.components().count() != 1 {
            return Err(NumassError::Storage(format!("invalid archive name '{name}'")));
        }

        let dir = self.root.join(&run).join(safe_relative_or_empty(path)?);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| NumassError::Storage(format!("create {}: {e}", dir.display())))?;

        let mut target = dir.join(&file_name);
        target.as_mut_os_string().push(NUMASS_ZIP_EXTENSION);
        tokio::fs::write(&target, data)
            .await
            .map_err(|e| NumassError::Storage(format!("write {}: {e}", target.display())))?;
        tracing::info!(file = %target.display(), len = data.len(), "archive stored");
        Ok(target)
    }
}

/// Relative path made only of normal components.
fn safe_relative(path: &str) -> Result<PathBuf> {
    let rel = safe_relative_or_empty(path)?;
    if rel.as_os_str().is_empty() {
        return Err(NumassError::Storage("empty path".into()));
    }
    Ok(rel)
}

fn safe_relative_or_empty(path: &str) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for part in path.split(['/', '\\']).filter(|p| !p.is_empty()) {
        match Path::new(part).components().next() {
            Some(Component::Normal(c)) if c == OsStr::new(part) => out.push(c),
            _ => {
                return Err(NumassError::Storage(format!(
                    "path '{path}' escapes the storage root"
                )))
            }
        }
    }
    Ok(out)
}

fn normalized(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn traversal_rejected() {
        for bad in ["..", "a/../b", "./x", "a/."] {
            assert!(safe_relative(bad).is_err(), "{bad}");
        }
        assert!(safe_relative("").is_err());
        assert_eq!(safe_relative("/abs/run").unwrap(), PathBuf::from("abs/run"));
        assert_eq!(safe_relative("a//b/").unwrap(), PathBuf::from("a/b"));
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        assert_eq!(store.current_run().await, DEFAULT_RUN);

        assert_eq!(store.start_run("2024/run-42").await.unwrap(), "2024/run-42");
        assert!(dir.path().join("2024/run-42").is_dir());
        assert_eq!(store.current_run().await, "2024/run-42");

        assert!(store.start_run("../escape").await.is_err());
        assert_eq!(store.current_run().await, "2024/run-42");

        store.reset_run().await;
        assert_eq!(store.current_run().await, DEFAULT_RUN);
    }

    #[tokio::test]
    async fn notes_are_per_run_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            let time = Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap();
            store.push_note(Note { text: text.to_string(), time }).await;
        }

        let texts: Vec<_> = store.notes(2).await.into_iter().map(|n| n.text).collect();
        assert_eq!(texts, vec!["c", "b"]);
        assert_eq!(store.notes(0).await.len(), 3);

        store.start_run("other").await.unwrap();
        assert!(store.notes(0).await.is_empty());
    }

    #[tokio::test]
    async fn archive_written_under_current_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        store.start_run("run-1").await.unwrap();

        let path = store.write_archive("raw/set", "set_1.nm.zip", b"PK").await.unwrap();
        assert_eq!(path, dir.path().join("run-1/raw/set/set_1.nm.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK");
        assert!(numass_client::archive::is_numass_archive(&path));

        assert!(store.write_archive("../..", "x", b"PK").await.is_err());
        assert!(store.write_archive("raw", "a/b", b"PK").await.is_err());
    }

    #[tokio::test]
    async fn absolute_archive_name_stays_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        store.start_run("run-1").await.unwrap();

        let path = store.write_archive("raw", "/escape", b"PK").await.unwrap();
        assert_eq!(path, dir.path().join("run-1/raw/escape.nm.zip"));
        assert!(path.starts_with(dir.path()));

        let path = store.write_archive("/abs", "\\set_2", b"PK").await.unwrap();
        assert_eq!(path, dir.path().join("run-1/abs/set_2.nm.zip"));
    }
}
