use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::decoder::{self, DecodeError};
use crate::export;
use crate::fingerprint::{self, FingerprintStore};
use crate::models::{CatalogNode, MakeSpec, PartRecord};
use crate::network::FetchError;
use crate::normalizer::{self, Normalizer};
use crate::source::CatalogSource;
use crate::state::{CheckpointStore, FilterScope, RunState, StateError};
use crate::store::PartStore;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("No makes configured")]
    NoMakes,

    #[error("Make filter '{0}' matches none of the configured makes")]
    UnknownMake(String),
}

/// Which skus the detail-page pass visits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentMode {
    /// Skip detail pages entirely
    None,
    /// Only skus first seen during this run
    #[default]
    New,
    /// Every sku in the part table
    All,
}

/// Run phases, in the order a run moves through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Start,
    DriftCheck,
    Enumerate,
    FetchListPages,
    FetchDetailPages,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::DriftCheck => "drift-check",
            Phase::Enumerate => "enumerate",
            Phase::FetchListPages => "list-pages",
            Phase::FetchDetailPages => "detail-pages",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CatalogCrawlerConfig {
    pub base_url: String,
    pub makes: Vec<MakeSpec>,
    pub make_filter: Option<String>,
    pub year_filter: Option<String>,
    pub resume: bool,
    pub check_changes: bool,
    pub enrichment: EnrichmentMode,
    /// Nodes between checkpoints; 0 checkpoints only at the end
    pub checkpoint_interval: usize,
    pub incremental_export: bool,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub sku_prefix: String,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for CatalogCrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            makes: Vec::new(),
            make_filter: None,
            year_filter: None,
            resume: false,
            check_changes: false,
            enrichment: EnrichmentMode::default(),
            checkpoint_interval: Config::CHECKPOINT_INTERVAL,
            incremental_export: false,
            user_agent: Config::DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: Config::REQUEST_TIMEOUT_SECS,
            navigation_timeout_secs: Config::NAVIGATION_TIMEOUT_SECS,
            sku_prefix: Config::DEFAULT_SKU_PREFIX.to_string(),
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl CatalogCrawlerConfig {
    pub fn scope(&self) -> FilterScope {
        FilterScope::new(self.make_filter.clone(), self.year_filter.clone())
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.data_dir.join(Config::CHECKPOINT_DIR)
    }

    pub fn fingerprint_dir(&self) -> PathBuf {
        self.data_dir.join(Config::FINGERPRINT_DIR)
    }
}

/// Counters exposed to the reporting layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub unique_parts: usize,
    pub parts_scraped_this_run: usize,
    pub vehicles_tracked: usize,
}

impl std::fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parts: {} unique, {} scraped this run | Vehicles: {}",
            self.unique_parts, self.parts_scraped_this_run, self.vehicles_tracked
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogCrawlerResult {
    pub catalog_changed: bool,
    pub nodes_total: usize,
    /// Already processed according to the resumed checkpoint
    pub nodes_skipped: usize,
    pub nodes_processed: usize,
    pub nodes_failed: usize,
    pub items_failed: usize,
    /// Skus that were not in the part table before this run
    pub new_parts: usize,
    pub enriched: usize,
    pub enrichment_failures: usize,
    pub duration_secs: u64,
    pub interrupted: bool,
    pub stats: RunStatistics,
}

/// Everything the run mutates; one lock, never held across an await
struct RunData {
    store: PartStore,
    state: RunState,
    seen_this_run: HashSet<String>,
    pending: HashSet<String>,
    phase: Phase,
}

impl RunData {
    fn fresh(scope: &FilterScope) -> Self {
        Self {
            store: PartStore::new(),
            state: RunState::new(scope),
            seen_this_run: HashSet::new(),
            pending: HashSet::new(),
            phase: Phase::Start,
        }
    }
}

struct Enumeration {
    nodes: Vec<CatalogNode>,
    /// False when any index could not be fetched or decoded
    complete: bool,
}

/// Sequential catalog traversal with checkpoint/resume
#[derive(Clone)]
pub struct CatalogCrawler {
    config: CatalogCrawlerConfig,
    source: Arc<dyn CatalogSource>,
    normalizer: Normalizer,
    checkpoints: CheckpointStore,
    fingerprints: FingerprintStore,
    data: Arc<Mutex<RunData>>,
    running: Arc<Mutex<bool>>,
}

impl CatalogCrawler {
    pub fn new(config: CatalogCrawlerConfig, source: Arc<dyn CatalogSource>) -> Self {
        let scope = config.scope();
        Self {
            normalizer: Normalizer::new(config.sku_prefix.clone()),
            checkpoints: CheckpointStore::new(config.checkpoint_dir()),
            fingerprints: FingerprintStore::new(config.fingerprint_dir()),
            data: Arc::new(Mutex::new(RunData::fresh(&scope))),
            running: Arc::new(Mutex::new(false)),
            config,
            source,
        }
    }

    pub fn config(&self) -> &CatalogCrawlerConfig {
        &self.config
    }

    /// Run every phase, then release the transports whatever the outcome
    pub async fn run(&self) -> Result<CatalogCrawlerResult, CrawlError> {
        let result = self.run_phases().await;
        self.source.shutdown().await;
        result
    }

    async fn run_phases(&self) -> Result<CatalogCrawlerResult, CrawlError> {
        let started = Instant::now();
        *self.running.lock() = true;

        let scope = self.config.scope();
        let makes = self.select_makes()?;
        self.restore(&scope)?;

        let mut result = CatalogCrawlerResult {
            catalog_changed: true,
            ..Default::default()
        };

        // DRIFT_CHECK / ENUMERATE share one enumeration
        let enumeration = if self.config.check_changes {
            self.enter(Phase::DriftCheck);
            let enumeration = self.enumerate(&makes).await;
            let digest = fingerprint::compute(&enumeration.nodes);
            let previous = self.fingerprints.load(&scope)?;
            if enumeration.complete && previous.as_deref() == Some(digest.as_str()) {
                info!(
                    scope = %scope.key(),
                    nodes = enumeration.nodes.len(),
                    "Catalog unchanged since last completed run"
                );
                self.enter(Phase::Done);
                result.catalog_changed = false;
                result.nodes_total = enumeration.nodes.len();
                result.duration_secs = started.elapsed().as_secs();
                result.stats = self.run_statistics();
                self.stop().await;
                return Ok(result);
            }
            enumeration
        } else {
            self.enter(Phase::Enumerate);
            self.enumerate(&makes).await
        };

        result.nodes_total = enumeration.nodes.len();
        let remaining: Vec<CatalogNode> = {
            let mut data = self.data.lock();
            data.state.nodes_total = enumeration.nodes.len();
            enumeration
                .nodes
                .iter()
                .filter(|node| !data.state.is_processed(node.application_id))
                .cloned()
                .collect()
        };
        result.nodes_skipped = result.nodes_total - remaining.len();
        if result.nodes_skipped > 0 {
            info!(
                skipped = result.nodes_skipped,
                remaining = remaining.len(),
                "Resuming past already processed nodes"
            );
        }

        self.enter(Phase::FetchListPages);
        // A stored fingerprint always describes completed outputs
        self.fingerprints.clear(&scope)?;
        self.fetch_list_pages(&remaining, &mut result).await?;

        if self.is_running() {
            self.enter(Phase::FetchDetailPages);
            self.fetch_detail_pages(&mut result).await?;
        }

        result.interrupted = !self.is_running();
        {
            let mut data = self.data.lock();
            data.state.completed = !result.interrupted;
        }
        self.save_checkpoint()?;
        self.write_results()?;

        if !result.interrupted && enumeration.complete {
            self.fingerprints
                .save(&scope, &fingerprint::compute(&enumeration.nodes))?;
        }

        self.enter(Phase::Done);
        result.duration_secs = started.elapsed().as_secs();
        result.stats = self.run_statistics();
        info!(
            interrupted = result.interrupted,
            processed = result.nodes_processed,
            failed = result.nodes_failed,
            enriched = result.enriched,
            "Run finished: {}",
            result.stats
        );

        self.stop().await;
        Ok(result)
    }

    /// Configured makes, narrowed to the make filter and sorted when one is given
    fn select_makes(&self) -> Result<Vec<MakeSpec>, CrawlError> {
        if self.config.makes.is_empty() {
            return Err(CrawlError::NoMakes);
        }
        let Some(filter) = self.config.make_filter.as_deref() else {
            return Ok(self.config.makes.clone());
        };

        let mut selected: Vec<MakeSpec> = self
            .config
            .makes
            .iter()
            .filter(|make| make.name.eq_ignore_ascii_case(filter.trim()))
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(CrawlError::UnknownMake(filter.to_string()));
        }
        selected.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(selected)
    }

    fn year_selected(&self, label: &str) -> bool {
        match self.config.year_filter.as_deref() {
            Some(filter) => filter.trim() == label.trim(),
            None => true,
        }
    }

    /// Load the checkpoint and results snapshot when resuming
    fn restore(&self, scope: &FilterScope) -> Result<(), CrawlError> {
        let mut fresh = RunData::fresh(scope);
        if self.config.resume {
            let state = self.checkpoints.load_for_resume(scope)?;
            info!(
                processed = state.processed_application_ids.len(),
                pending = state.pending_enrichment.len(),
                checkpoint_time = %state.timestamp,
                "Loaded checkpoint"
            );
            if let Some(store) = export::load_results(&self.config.output_dir)? {
                info!(parts = store.part_count(), "Loaded results snapshot");
                fresh.store = store;
            }
            fresh.pending = state.pending_enrichment.iter().cloned().collect();
            fresh.state = state;
            fresh.state.completed = false;
        }
        *self.data.lock() = fresh;
        Ok(())
    }

    /// Expand make x year x model into nodes, in index order.
    /// A failing index is logged and skipped; the enumeration is then incomplete.
    async fn enumerate(&self, makes: &[MakeSpec]) -> Enumeration {
        let mut nodes = Vec::new();
        let mut complete = true;

        for make in makes {
            if !self.is_running() {
                return Enumeration {
                    nodes,
                    complete: false,
                };
            }
            let years = match self
                .fetch_index(&format!("/get_year_by_make/{}", make.id))
                .await
            {
                Ok(fragment) => decoder::parse_year_index(&fragment),
                Err(e) => {
                    warn!(make = %make.name, make_id = make.id, error = %e, "Year index failed");
                    complete = false;
                    continue;
                }
            };

            for (year_id, year_label) in years {
                if !self.year_selected(&year_label) {
                    continue;
                }
                if !self.is_running() {
                    return Enumeration {
                        nodes,
                        complete: false,
                    };
                }
                let models = match self
                    .fetch_index(&format!("/get_model_by_make_year/{}", year_id))
                    .await
                {
                    Ok(fragment) => decoder::parse_model_index(&fragment),
                    Err(e) => {
                        warn!(
                            make = %make.name,
                            year = %year_label,
                            year_id,
                            error = %e,
                            "Model index failed"
                        );
                        complete = false;
                        continue;
                    }
                };

                nodes.extend(models.into_iter().map(|(application_id, model_label)| {
                    CatalogNode {
                        make_id: make.id,
                        make_name: make.name.clone(),
                        year_id,
                        year_label: year_label.clone(),
                        application_id,
                        model_label,
                    }
                }));
            }
            debug!(make = %make.name, nodes = nodes.len(), "Make enumerated");
        }

        info!(nodes = nodes.len(), complete, "Hierarchy enumerated");
        Enumeration { nodes, complete }
    }

    async fn fetch_index(&self, path: &str) -> Result<String, CrawlError> {
        let body = self.source.fetch_partial(path).await?;
        Ok(decoder::decode_partial(&body)?)
    }

    async fn fetch_list_pages(
        &self,
        nodes: &[CatalogNode],
        result: &mut CatalogCrawlerResult,
    ) -> Result<(), CrawlError> {
        let interval = self.config.checkpoint_interval;

        for (index, node) in nodes.iter().enumerate() {
            if !self.is_running() {
                info!(
                    processed = result.nodes_processed,
                    remaining = nodes.len() - index,
                    "Stop requested; leaving list pages"
                );
                break;
            }

            match self.process_node(node).await {
                Ok(outcome) => {
                    result.new_parts += outcome.new_parts;
                    result.items_failed += outcome.items_failed;
                }
                Err(e) => {
                    result.nodes_failed += 1;
                    warn!(
                        application_id = node.application_id,
                        make = %node.make_name,
                        year = %node.year_label,
                        model = %node.model_label,
                        error = %e,
                        "List page failed"
                    );
                }
            }
            result.nodes_processed += 1;

            if interval > 0 && result.nodes_processed % interval == 0 {
                self.save_checkpoint()?;
                if self.config.incremental_export {
                    self.write_results()?;
                }
            }
            if result.nodes_processed % Config::PROGRESS_INTERVAL == 0 {
                info!(
                    "Progress: {}/{} nodes | {}",
                    result.nodes_processed,
                    nodes.len(),
                    self.run_statistics()
                );
            }
        }
        Ok(())
    }

    /// Fetch, extract and fold one list page. A failed fetch leaves the
    /// node unprocessed so a resume retries it.
    async fn process_node(&self, node: &CatalogNode) -> Result<NodeOutcome, CrawlError> {
        let html = self.source.fetch_rendered(&node.list_path()).await?;

        let mut records: Vec<PartRecord> = Vec::new();
        let mut items_failed = 0;
        for item in self.normalizer.extract_list_page(&html) {
            match item {
                Ok(record) => records.push(record),
                Err(e) => {
                    items_failed += 1;
                    warn!(
                        application_id = node.application_id,
                        make = %node.make_name,
                        year = %node.year_label,
                        model = %node.model_label,
                        error = %e,
                        "List item skipped"
                    );
                }
            }
        }

        let count = records.len();
        let new_parts = self.fold_records(node, records);
        debug!(
            application_id = node.application_id,
            items = count,
            new_parts,
            "Node processed"
        );
        Ok(NodeOutcome {
            new_parts,
            items_failed,
        })
    }

    /// Fold a list page into the store and mark its node processed.
    /// Returns how many skus were new to the part table.
    fn fold_records(&self, node: &CatalogNode, records: Vec<PartRecord>) -> usize {
        let mut data = self.data.lock();
        let folded = data.store.fold_page(node, records);
        let mut new_parts = 0;
        for (sku, inserted) in folded {
            if inserted {
                new_parts += 1;
            }
            if data.seen_this_run.insert(sku.clone()) && data.pending.insert(sku.clone()) {
                data.state.pending_enrichment.push(sku);
            }
        }
        data.state.processed_application_ids.insert(node.application_id);
        new_parts
    }

    async fn fetch_detail_pages(&self, result: &mut CatalogCrawlerResult) -> Result<(), CrawlError> {
        let targets: Vec<String> = {
            let data = self.data.lock();
            match self.config.enrichment {
                EnrichmentMode::None => Vec::new(),
                EnrichmentMode::New => data.state.pending_enrichment.clone(),
                EnrichmentMode::All => data.store.skus().cloned().collect(),
            }
        };
        if targets.is_empty() {
            return Ok(());
        }
        info!(skus = targets.len(), mode = ?self.config.enrichment, "Enriching from detail pages");

        let interval = self.config.checkpoint_interval;
        for (index, sku) in targets.iter().enumerate() {
            if !self.is_running() {
                info!(remaining = targets.len() - index, "Stop requested; leaving detail pages");
                break;
            }

            match self.enrich(sku).await {
                Ok(()) => result.enriched += 1,
                Err(e) => {
                    result.enrichment_failures += 1;
                    warn!(sku = %sku, error = %e, "Detail page failed");
                }
            }

            if interval > 0 && (index + 1) % interval == 0 {
                self.save_checkpoint()?;
                if self.config.incremental_export {
                    self.write_results()?;
                }
            }
        }
        Ok(())
    }

    async fn enrich(&self, sku: &str) -> Result<(), CrawlError> {
        let html = self.source.fetch_rendered(&format!("/items/{}", sku)).await?;
        let detail = normalizer::extract_detail(&html);

        let mut data = self.data.lock();
        if !data.store.merge_detail(sku, detail) {
            debug!(sku, "Detail page for a sku not in the part table");
        }
        data.pending.remove(sku);
        data.state.pending_enrichment.retain(|pending| pending != sku);
        Ok(())
    }

    fn enter(&self, phase: Phase) {
        self.data.lock().phase = phase;
        info!(phase = %phase, "Entering phase");
    }

    pub fn current_phase(&self) -> Phase {
        self.data.lock().phase
    }

    /// Persist the current run state; safe to call from a signal handler
    pub fn save_checkpoint(&self) -> Result<PathBuf, StateError> {
        let state = {
            let mut data = self.data.lock();
            data.state.timestamp = Utc::now().to_rfc3339();
            data.state.parts_seen = data.store.part_count();
            data.state.vehicles_seen = data.store.vehicle_count();
            data.state.clone()
        };
        self.checkpoints.save(&state)
    }

    /// Write the results snapshot to the output directory
    pub fn write_results(&self) -> Result<(), StateError> {
        let store = self.data.lock().store.clone();
        export::write_results(&self.config.output_dir, &store)?;
        Ok(())
    }

    pub fn run_statistics(&self) -> RunStatistics {
        let data = self.data.lock();
        RunStatistics {
            unique_parts: data.store.part_count(),
            parts_scraped_this_run: data.seen_this_run.len(),
            vehicles_tracked: data.store.vehicle_count(),
        }
    }

    /// Snapshot of the part table and compatibility map
    pub fn store(&self) -> PartStore {
        self.data.lock().store.clone()
    }

    pub fn processed_application_ids(&self) -> Vec<u32> {
        self.data
            .lock()
            .state
            .processed_application_ids
            .iter()
            .copied()
            .collect()
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }

    pub async fn stop(&self) {
        let mut running = self.running.lock();
        *running = false;
    }
}

struct NodeOutcome {
    new_parts: usize,
    items_failed: usize,
}
