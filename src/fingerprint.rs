//! Catalog fingerprint: a digest of the enumerated navigation tree, used to
//! skip a run when nothing changed since the last completed one.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::CatalogNode;
use crate::state::{FilterScope, StateError, write_atomic};

/// SHA-256 over the canonical serialization of `nodes`.
///
/// Nodes are sorted first so server ordering does not affect the digest.
pub fn compute(nodes: &[CatalogNode]) -> String {
    let mut lines: Vec<String> = nodes
        .iter()
        .map(|n| {
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}",
                n.make_id, n.make_name, n.year_id, n.year_label, n.application_id, n.model_label
            )
        })
        .collect();
    lines.sort();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// One fingerprint file per filter scope
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    dir: PathBuf,
}

impl FingerprintStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, scope: &FilterScope) -> PathBuf {
        self.dir.join(format!("fingerprint_{}.txt", scope.key()))
    }

    pub fn load(&self, scope: &FilterScope) -> Result<Option<String>, StateError> {
        match fs::read_to_string(self.path(scope)) {
            Ok(digest) => Ok(Some(digest.trim().to_string()).filter(|d| !d.is_empty())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, scope: &FilterScope, digest: &str) -> Result<(), StateError> {
        write_atomic(&self.path(scope), digest.as_bytes())
    }

    /// Forget the scope's fingerprint; a missing file is not an error
    pub fn clear(&self, scope: &FilterScope) -> Result<(), StateError> {
        match fs::remove_file(self.path(scope)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn node(application_id: u32, model: &str) -> CatalogNode {
        CatalogNode {
            make_id: 12,
            make_name: "Honda".to_string(),
            year_id: 192,
            year_label: "2025".to_string(),
            application_id,
            model_label: model.to_string(),
        }
    }

    #[test]
    fn test_order_does_not_matter() {
        let a = vec![node(8430, "Accord"), node(8431, "Civic")];
        let b = vec![node(8431, "Civic"), node(8430, "Accord")];
        assert_eq!(compute(&a), compute(&b));
        assert_eq!(compute(&a).len(), 64);
    }

    #[test]
    fn test_any_change_alters_digest() {
        let base = vec![node(8430, "Accord"), node(8431, "Civic")];
        let renamed = vec![node(8430, "Accord"), node(8431, "Civic Si")];
        let added = vec![node(8430, "Accord"), node(8431, "Civic"), node(8432, "CR-V")];
        assert_ne!(compute(&base), compute(&renamed));
        assert_ne!(compute(&base), compute(&added));
    }

    #[test]
    fn test_store_is_scoped() {
        let dir = TempDir::new().unwrap();
        let store = FingerprintStore::new(dir.path());
        let honda = FilterScope::new(Some("Honda".to_string()), None);

        assert_eq!(store.load(&honda).unwrap(), None);
        store.save(&honda, "abc123").unwrap();
        assert_eq!(store.load(&honda).unwrap().as_deref(), Some("abc123"));
        assert_eq!(store.load(&FilterScope::default()).unwrap(), None);

        store.clear(&honda).unwrap();
        assert_eq!(store.load(&honda).unwrap(), None);
        store.clear(&honda).unwrap();
    }
}
