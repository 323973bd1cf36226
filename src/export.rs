use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{PartRecord, VehicleRef};
use crate::state::{StateError, write_atomic};
use crate::store::PartStore;

pub const PARTS_FILE: &str = "parts.json";
pub const COMPATIBILITY_FILE: &str = "compatibility.json";

/// One line of the JSONL compatibility listing
#[derive(Debug, Clone, Serialize)]
pub struct CompatibilityLine<'a> {
    pub sku: &'a str,
    pub vehicles: &'a [VehicleRef],
}

/// Paths written by [`write_results`]
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub parts: PathBuf,
    pub compatibility: PathBuf,
}

/// Write the part table (array sorted by sku) and the compatibility map
/// into `dir`, each file replaced atomically.
pub fn write_results(dir: &Path, store: &PartStore) -> Result<ExportPaths, StateError> {
    let parts: Vec<&PartRecord> = store.parts().values().collect();
    let paths = ExportPaths {
        parts: dir.join(PARTS_FILE),
        compatibility: dir.join(COMPATIBILITY_FILE),
    };

    write_atomic(&paths.parts, &serde_json::to_vec_pretty(&parts)?)?;
    write_atomic(
        &paths.compatibility,
        &serde_json::to_vec_pretty(store.compatibility())?,
    )?;

    info!(
        parts = store.part_count(),
        dir = %dir.display(),
        "Results written"
    );
    Ok(paths)
}

/// Load a previously written snapshot; `None` when no snapshot exists
pub fn load_results(dir: &Path) -> Result<Option<PartStore>, StateError> {
    let parts_path = dir.join(PARTS_FILE);
    let compat_path = dir.join(COMPATIBILITY_FILE);
    if !parts_path.exists() {
        return Ok(None);
    }

    let parts: Vec<PartRecord> = read_json(&parts_path)?;
    let compatibility: BTreeMap<String, Vec<VehicleRef>> = if compat_path.exists() {
        read_json(&compat_path)?
    } else {
        BTreeMap::new()
    };
    Ok(Some(PartStore::from_snapshot(parts, compatibility)))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StateError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| StateError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Export the compatibility map as JSONL, one sku per line
pub fn export_compatibility_jsonl<W: Write>(
    store: &PartStore,
    writer: &mut W,
) -> Result<(), StateError> {
    for (sku, vehicles) in store.compatibility() {
        serde_json::to_writer(&mut *writer, &CompatibilityLine { sku, vehicles })?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogNode;
    use tempfile::TempDir;

    fn sample_store() -> PartStore {
        let mut store = PartStore::new();
        let accord = CatalogNode {
            make_id: 12,
            make_name: "Honda".to_string(),
            year_id: 192,
            year_label: "2025".to_string(),
            application_id: 8430,
            model_label: "Accord".to_string(),
        };
        let civic = CatalogNode {
            application_id: 8431,
            model_label: "Civic".to_string(),
            ..accord.clone()
        };
        let mut radiator = PartRecord::new("CSF-3951".to_string(), "Radiator".to_string());
        radiator.category = Some("Radiators".to_string());
        store.fold_page(&accord, vec![radiator.clone()]);
        store.fold_page(
            &civic,
            vec![
                radiator,
                PartRecord::new("CSF-2671".to_string(), "Condenser".to_string()),
            ],
        );
        store
    }

    #[test]
    fn test_write_then_load_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = sample_store();
        let paths = write_results(dir.path(), &store).unwrap();
        assert!(paths.parts.exists());
        assert!(paths.compatibility.exists());

        let loaded = load_results(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn test_parts_file_is_sorted_array() {
        let dir = TempDir::new().unwrap();
        write_results(dir.path(), &sample_store()).unwrap();

        let bytes = fs::read(dir.path().join(PARTS_FILE)).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let skus: Vec<&str> = parsed
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["sku"].as_str().unwrap())
            .collect();
        assert_eq!(skus, vec!["CSF-2671", "CSF-3951"]);
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_results(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_malformed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PARTS_FILE), b"[{").unwrap();
        let err = load_results(dir.path()).unwrap_err();
        assert!(matches!(err, StateError::Malformed { .. }));
    }

    #[test]
    fn test_compatibility_jsonl() {
        let mut buffer = Vec::new();
        export_compatibility_jsonl(&sample_store(), &mut buffer).unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(output.ends_with('\n'));

        let radiator: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(radiator["sku"], "CSF-3951");
        assert_eq!(radiator["vehicles"].as_array().unwrap().len(), 2);
        assert_eq!(radiator["vehicles"][1]["model"], "Civic");
    }
}
