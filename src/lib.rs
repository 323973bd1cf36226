pub mod backoff;
pub mod browser;
pub mod catalog_crawler;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod export;
pub mod fingerprint;
pub mod html_utils;
pub mod logging;
pub mod models;
pub mod network;
pub mod normalizer;
pub mod orchestration;
pub mod source;
pub mod state;
pub mod store;

// Re-export main types for library usage
pub use catalog_crawler::{
    CatalogCrawler, CatalogCrawlerConfig, CatalogCrawlerResult, CrawlError, EnrichmentMode,
    Phase, RunStatistics,
};
pub use decoder::{DecodeError, decode_partial, try_decode_partial};
pub use models::{CatalogNode, DetailRecord, MakeSpec, PartImage, PartRecord, ReferenceNumber, VehicleRef};
pub use network::{FetchError, FetchResult, HttpClient, PacingGate, PacingPolicy};
pub use normalizer::{ExtractionError, Normalizer};
pub use source::{CatalogSource, SiteSource};
pub use state::{CheckpointStore, FilterScope, RunState, StateError};
pub use store::PartStore;
