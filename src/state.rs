//! Run state persistence: checkpoints for resume, scoped by filter.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed state file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("No checkpoint found for scope '{0}'")]
    NoCheckpoint(String),
}

/// Filter parameters that scope a run; checkpoints and fingerprints are
/// only ever compared within one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterScope {
    pub make_filter: Option<String>,
    pub year_filter: Option<String>,
}

impl FilterScope {
    /// Make names match case-insensitively, so the make filter is stored
    /// lowercased; blank filters mean "no filter".
    pub fn new(make_filter: Option<String>, year_filter: Option<String>) -> Self {
        Self {
            make_filter: normalize(make_filter).map(|make| make.to_lowercase()),
            year_filter: normalize(year_filter),
        }
    }

    /// Filesystem-safe key, e.g. `make-honda_year-2025` or `make-all_year-all`
    pub fn key(&self) -> String {
        format!(
            "make-{}_year-{}",
            slug(self.make_filter.as_deref()),
            slug(self.year_filter.as_deref())
        )
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn slug(value: Option<&str>) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => "all".to_string(),
        Some(v) => v
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect(),
    }
}

/// Checkpoint document; field names are the on-disk JSON contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub timestamp: String,
    pub make_filter: Option<String>,
    pub year_filter: Option<String>,
    pub processed_application_ids: BTreeSet<u32>,
    pub parts_seen: usize,
    pub vehicles_seen: usize,
    #[serde(default)]
    pub nodes_total: usize,
    #[serde(default)]
    pub completed: bool,
    /// Skus still waiting for detail-page enrichment, in discovery order
    #[serde(default)]
    pub pending_enrichment: Vec<String>,
}

impl RunState {
    pub fn new(scope: &FilterScope) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            make_filter: scope.make_filter.clone(),
            year_filter: scope.year_filter.clone(),
            processed_application_ids: BTreeSet::new(),
            parts_seen: 0,
            vehicles_seen: 0,
            nodes_total: 0,
            completed: false,
            pending_enrichment: Vec::new(),
        }
    }

    pub fn scope(&self) -> FilterScope {
        FilterScope::new(self.make_filter.clone(), self.year_filter.clone())
    }

    pub fn is_processed(&self, application_id: u32) -> bool {
        self.processed_application_ids.contains(&application_id)
    }
}

/// Write via a sibling temp file and rename, so readers never see a
/// half-written file even if the process dies mid-write.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Directory of timestamped checkpoint files
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn prefix(scope: &FilterScope) -> String {
        format!("checkpoint_{}_", scope.key())
    }

    /// Persist `state` under a fresh timestamped name and prune older
    /// checkpoints of the same scope; returns the file path
    pub fn save(&self, state: &RunState) -> Result<PathBuf, StateError> {
        let scope = state.scope();
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let path = self
            .dir
            .join(format!("{}{}.json", Self::prefix(&scope), stamp));
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&path, &json)?;
        debug!(
            path = %path.display(),
            processed = state.processed_application_ids.len(),
            "Checkpoint saved"
        );
        self.prune(&scope)?;
        Ok(path)
    }

    /// Checkpoint file names of one scope, oldest first
    fn list(&self, scope: &FilterScope) -> Result<Vec<String>, StateError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let prefix = Self::prefix(scope);
        let mut names = Vec::new();
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && name.ends_with(".json") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn prune(&self, scope: &FilterScope) -> Result<(), StateError> {
        let names = self.list(scope)?;
        let excess = names.len().saturating_sub(Config::CHECKPOINTS_KEPT);
        for name in &names[..excess] {
            let path = self.dir.join(name);
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to prune checkpoint");
            }
        }
        Ok(())
    }

    /// Lexicographically latest checkpoint for the scope, if any
    pub fn latest(&self, scope: &FilterScope) -> Result<Option<(PathBuf, RunState)>, StateError> {
        let Some(name) = self.list(scope)?.pop() else {
            return Ok(None);
        };
        let path = self.dir.join(name);
        let state = Self::read(&path)?;
        if state.scope() != *scope {
            return Err(StateError::Malformed {
                path,
                reason: format!(
                    "filter scope {:?} does not match requested {:?}",
                    state.scope(),
                    scope
                ),
            });
        }
        Ok(Some((path, state)))
    }

    /// Checkpoint to resume from; a missing one is an error on explicit resume
    pub fn load_for_resume(&self, scope: &FilterScope) -> Result<RunState, StateError> {
        self.latest(scope)?
            .map(|(_, state)| state)
            .ok_or_else(|| StateError::NoCheckpoint(scope.key()))
    }

    fn read(path: &Path) -> Result<RunState, StateError> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| StateError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn honda_2025() -> FilterScope {
        FilterScope::new(Some("Honda".to_string()), Some("2025".to_string()))
    }

    #[test]
    fn test_scope_key() {
        assert_eq!(honda_2025().key(), "make-honda_year-2025");
        assert_eq!(FilterScope::default().key(), "make-all_year-all");
        assert_eq!(
            FilterScope::new(Some("Land Rover".to_string()), None).key(),
            "make-land-rover_year-all"
        );
    }

    #[test]
    fn test_checkpoint_json_field_names() {
        let mut state = RunState::new(&honda_2025());
        state.processed_application_ids.insert(8430);
        let json: serde_json::Value = serde_json::to_value(&state).unwrap();
        assert_eq!(json["makeFilter"], "honda");
        assert_eq!(json["yearFilter"], "2025");
        assert_eq!(json["processedApplicationIds"], serde_json::json!([8430]));
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_save_and_resume_latest() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let scope = honda_2025();

        let mut state = RunState::new(&scope);
        state.processed_application_ids.insert(1);
        store.save(&state).unwrap();

        state.processed_application_ids.insert(2);
        store.save(&state).unwrap();

        let resumed = store.load_for_resume(&scope).unwrap();
        assert_eq!(resumed.processed_application_ids, BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_make_filter_case_does_not_change_scope() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(&RunState::new(&honda_2025())).unwrap();

        let lower = FilterScope::new(Some(" honda ".to_string()), Some("2025".to_string()));
        assert_eq!(lower, honda_2025());
        assert!(store.load_for_resume(&lower).is_ok());
        assert_eq!(FilterScope::new(Some("  ".to_string()), None), FilterScope::default());
    }

    #[test]
    fn test_old_checkpoints_are_pruned() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let scope = honda_2025();
        store.save(&RunState::new(&FilterScope::default())).unwrap();

        let mut state = RunState::new(&scope);
        for id in 1..=6 {
            state.processed_application_ids.insert(id);
            store.save(&state).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        assert_eq!(store.list(&scope).unwrap().len(), Config::CHECKPOINTS_KEPT);
        // Other scopes are untouched
        assert_eq!(store.list(&FilterScope::default()).unwrap().len(), 1);
        let resumed = store.load_for_resume(&scope).unwrap();
        assert_eq!(resumed.processed_application_ids.len(), 6);
    }

    #[test]
    fn test_scopes_do_not_mix() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());

        let mut state = RunState::new(&honda_2025());
        state.processed_application_ids.insert(1);
        store.save(&state).unwrap();

        assert!(store.latest(&FilterScope::default()).unwrap().is_none());
        let err = store.load_for_resume(&FilterScope::default()).unwrap_err();
        assert!(matches!(err, StateError::NoCheckpoint(_)));
    }

    #[test]
    fn test_missing_directory_has_no_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("never-created"));
        assert!(store.latest(&honda_2025()).unwrap().is_none());
    }

    #[test]
    fn test_malformed_checkpoint_is_state_error() {
        let dir = TempDir::new().unwrap();
        let scope = honda_2025();
        let path = dir
            .path()
            .join(format!("checkpoint_{}_20990101T000000.000000Z.json", scope.key()));
        fs::write(&path, b"{ not json").unwrap();

        let store = CheckpointStore::new(dir.path());
        let err = store.load_for_resume(&scope).unwrap_err();
        assert!(matches!(err, StateError::Malformed { .. }));
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        assert!(!path.with_extension("tmp").exists());
    }
}
