//! In-memory part table and compatibility graph owned by the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{CatalogNode, DetailRecord, PartRecord, VehicleRef};

/// Part table keyed by sku plus the sku -> vehicles compatibility map.
///
/// Writes are a fold over list pages in traversal order, so the final value
/// of any field that differs between pages is the one from the page
/// processed last. Folding the same page twice is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartStore {
    parts: BTreeMap<String, PartRecord>,
    compatibility: BTreeMap<String, Vec<VehicleRef>>,
}

impl PartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a previously exported snapshot
    pub fn from_snapshot(
        parts: Vec<PartRecord>,
        compatibility: BTreeMap<String, Vec<VehicleRef>>,
    ) -> Self {
        let parts = parts
            .into_iter()
            .map(|part| (part.sku.clone(), part))
            .collect();
        Self {
            parts,
            compatibility,
        }
    }

    /// Upsert one list-page record and link it to `vehicle`.
    /// Returns true when the sku was not in the table before.
    fn absorb_listing(&mut self, vehicle: &VehicleRef, record: PartRecord) -> bool {
        let sku = record.sku.clone();
        let inserted = match self.parts.get_mut(&sku) {
            Some(existing) => {
                existing.absorb_listing(record);
                false
            }
            None => {
                self.parts.insert(sku.clone(), record);
                true
            }
        };
        self.add_vehicle(&sku, vehicle.clone());
        inserted
    }

    /// Add a vehicle to a sku's compatibility set unless structurally present
    pub fn add_vehicle(&mut self, sku: &str, vehicle: VehicleRef) -> bool {
        let vehicles = self.compatibility.entry(sku.to_string()).or_default();
        if vehicles.contains(&vehicle) {
            false
        } else {
            vehicles.push(vehicle);
            true
        }
    }

    /// Fold every record of one list page in order.
    /// Returns each record's sku with whether it was new to the table.
    pub fn fold_page(&mut self, node: &CatalogNode, records: Vec<PartRecord>) -> Vec<(String, bool)> {
        let vehicle = node.vehicle();
        records
            .into_iter()
            .map(|record| {
                let sku = record.sku.clone();
                let inserted = self.absorb_listing(&vehicle, record);
                (sku, inserted)
            })
            .collect()
    }

    /// Merge detail-page data into an existing record; false if the sku is unknown
    pub fn merge_detail(&mut self, sku: &str, detail: DetailRecord) -> bool {
        match self.parts.get_mut(sku) {
            Some(part) => {
                part.merge_detail(detail);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, sku: &str) -> Option<&PartRecord> {
        self.parts.get(sku)
    }

    pub fn parts(&self) -> &BTreeMap<String, PartRecord> {
        &self.parts
    }

    pub fn compatibility(&self) -> &BTreeMap<String, Vec<VehicleRef>> {
        &self.compatibility
    }

    pub fn vehicles_for(&self, sku: &str) -> &[VehicleRef] {
        self.compatibility
            .get(sku)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Distinct vehicles across every compatibility set
    pub fn vehicle_count(&self) -> usize {
        self.compatibility
            .values()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn skus(&self) -> impl Iterator<Item = &String> {
        self.parts.keys()
    }
}
