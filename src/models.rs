use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One make/year/model combination discovered while enumerating the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogNode {
    pub make_id: u32,
    pub make_name: String,
    pub year_id: u32,
    pub year_label: String,
    /// Unique per make/year/model; the resume key.
    pub application_id: u32,
    pub model_label: String,
}

impl CatalogNode {
    /// Vehicle configuration this node lists parts for
    pub fn vehicle(&self) -> VehicleRef {
        VehicleRef {
            make: self.make_name.clone(),
            model: self.model_label.clone(),
            year: self.year_label.clone(),
        }
    }

    /// Path of the client-rendered list page for this node
    pub fn list_path(&self) -> String {
        format!("/applications/{}", self.application_id)
    }
}

impl std::fmt::Display for CatalogNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} (application {})",
            self.year_label, self.make_name, self.model_label, self.application_id
        )
    }
}

/// Vehicle configuration. Equality is structural over make, model and year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleRef {
    pub make: String,
    pub model: String,
    pub year: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartImage {
    pub url: String,
    pub alt: Option<String>,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceNumber {
    pub number: String,
    pub name: String,
}

/// Canonical record for one catalog item, keyed by `sku` for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub specifications: BTreeMap<String, String>,
    pub images: Vec<PartImage>,
    pub description: Option<String>,
    pub tech_notes: Option<String>,
    pub in_stock: bool,
    pub reference_numbers: Vec<ReferenceNumber>,
}

impl PartRecord {
    /// Create a bare record with only identity fields populated
    pub fn new(sku: String, name: String) -> Self {
        Self {
            sku,
            name,
            category: None,
            specifications: BTreeMap::new(),
            images: Vec::new(),
            description: None,
            tech_notes: None,
            in_stock: false,
            reference_numbers: Vec::new(),
        }
    }

    /// Fold a later list-page sighting of the same sku into this record.
    ///
    /// List-page fields are last-write-wins. Specification values from the
    /// newer sighting overwrite older ones, keys it lacks are kept.
    pub fn absorb_listing(&mut self, newer: PartRecord) {
        debug_assert_eq!(self.sku, newer.sku);
        self.name = newer.name;
        if newer.category.is_some() {
            self.category = newer.category;
        }
        if !newer.images.is_empty() {
            self.images = newer.images;
        }
        self.in_stock = newer.in_stock;
        self.specifications.extend(newer.specifications);
    }

    /// Merge detail-page data into this record.
    ///
    /// Detail pages never carry list-only fields (images, category, stock),
    /// so those are left untouched. Specification maps are unioned with the
    /// detail values preferred.
    pub fn merge_detail(&mut self, detail: DetailRecord) {
        if detail.description.is_some() {
            self.description = detail.description;
        }
        if detail.tech_notes.is_some() {
            self.tech_notes = detail.tech_notes;
        }
        if !detail.reference_numbers.is_empty() {
            self.reference_numbers = detail.reference_numbers;
        }
        self.specifications.extend(detail.specifications);
    }
}

/// Fields extracted from one detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailRecord {
    pub specifications: BTreeMap<String, String>,
    pub description: Option<String>,
    pub tech_notes: Option<String>,
    pub reference_numbers: Vec<ReferenceNumber>,
}

/// A make the crawl should enumerate, as configured by the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeSpec {
    pub id: u32,
    pub name: String,
}

impl std::str::FromStr for MakeSpec {
    type Err = String;

    /// Parses `ID:NAME`, e.g. `12:Honda`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, name) = s
            .split_once(':')
            .ok_or_else(|| format!("expected ID:NAME, got '{}'", s))?;
        let id = id
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid make id '{}': {}", id, e))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("make name missing in '{}'", s));
        }
        Ok(Self {
            id,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed() -> PartRecord {
        let mut part = PartRecord::new("CSF-3951".to_string(), "Radiator".to_string());
        part.category = Some("Radiators".to_string());
        part.images.push(PartImage {
            url: "https://cdn.test.local/3951.jpg".to_string(),
            alt: Some("3951".to_string()),
            primary: true,
        });
        part.in_stock = true;
        part.specifications
            .insert("Core Material".to_string(), "Aluminum".to_string());
        part.specifications
            .insert("Rows".to_string(), "1".to_string());
        part
    }

    #[test]
    fn test_merge_detail_keeps_list_only_fields() {
        let mut part = listed();
        let mut detail = DetailRecord {
            description: Some("All-aluminum radiator".to_string()),
            tech_notes: Some("Requires adapter".to_string()),
            ..Default::default()
        };
        detail
            .specifications
            .insert("Core Material".to_string(), "Aluminum / Plastic".to_string());
        detail
            .specifications
            .insert("Inlet".to_string(), "1.25 in".to_string());

        part.merge_detail(detail);

        assert_eq!(part.category.as_deref(), Some("Radiators"));
        assert_eq!(part.images.len(), 1);
        assert!(part.in_stock);
        assert_eq!(part.description.as_deref(), Some("All-aluminum radiator"));
        assert_eq!(part.tech_notes.as_deref(), Some("Requires adapter"));
        assert_eq!(part.specifications["Core Material"], "Aluminum / Plastic");
        assert_eq!(part.specifications["Inlet"], "1.25 in");
        assert_eq!(part.specifications["Rows"], "1");
    }

    #[test]
    fn test_merge_detail_without_description_keeps_previous() {
        let mut part = listed();
        part.description = Some("Earlier text".to_string());
        part.merge_detail(DetailRecord::default());
        assert_eq!(part.description.as_deref(), Some("Earlier text"));
    }

    #[test]
    fn test_absorb_listing_is_last_write_wins() {
        let mut part = listed();
        let mut newer = PartRecord::new("CSF-3951".to_string(), "Radiator 2-Row".to_string());
        newer
            .specifications
            .insert("Rows".to_string(), "2".to_string());

        part.absorb_listing(newer);

        assert_eq!(part.name, "Radiator 2-Row");
        assert_eq!(part.specifications["Rows"], "2");
        assert_eq!(part.specifications["Core Material"], "Aluminum");
        // Absent category and images on the newer sighting do not erase data
        assert_eq!(part.category.as_deref(), Some("Radiators"));
        assert_eq!(part.images.len(), 1);
        assert!(!part.in_stock);
    }

    #[test]
    fn test_vehicle_ref_structural_equality() {
        let a = VehicleRef {
            make: "Honda".to_string(),
            model: "Accord".to_string(),
            year: "2025".to_string(),
        };
        let b = a.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn test_make_spec_parse() {
        let make: MakeSpec = "12:Honda".parse().unwrap();
        assert_eq!(make.id, 12);
        assert_eq!(make.name, "Honda");
        assert!("Honda".parse::<MakeSpec>().is_err());
        assert!("x:Honda".parse::<MakeSpec>().is_err());
        assert!("12:".parse::<MakeSpec>().is_err());
    }
}
