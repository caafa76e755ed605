//! Dex public API façade (in-process).
//!
//! This crate defines the stable trait and view types frontends (the CLI)
//! depend on, plus the [`Browser`] that switches between paged and search mode.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use dex_core::{CatalogError, CatalogRecord, FilterState, Generation, IndexEntry, SortOrder};
use dex_persist::{ResponseCache, Storage};
use dex_remote::{CatalogClient, HttpCatalogClient, RemoteConfig};
use dex_search::{SearchConfig, SearchEngine, SearchOutcome, SearchSnapshot};
use dex_store::{spawn_pager, IndexCache, PageLoader, PagerConfig, PagerHandle, PagerSnapshot, SessionKey};
use serde::{Deserialize, Serialize};
use tracing::info;

mod browse;

pub use browse::{BrowseMode, BrowseView, Browser};

/// API errors, serializable for JSON output.
#[derive(Debug, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DexError {
    #[error("network: {0}")]
    Network(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("malformed: {0}")]
    Malformed(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<CatalogError> for DexError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Network { status: Some(404), message } => DexError::NotFound(message),
            CatalogError::Network { .. } => DexError::Network(e.to_string()),
            CatalogError::MalformedResponse(m) => DexError::Malformed(m),
            CatalogError::Storage(s) => DexError::Storage(s.to_string()),
        }
    }
}

pub type DexResult<T> = Result<T, DexError>;

/// Pager-side parameters of a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationParams {
    pub generation: Generation,
    pub sort: SortOrder,
    pub types: BTreeSet<String>,
}

impl From<&FilterState> for GenerationParams {
    fn from(f: &FilterState) -> Self {
        Self { generation: f.generation, sort: f.sort, types: f.types.clone() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationView {
    pub generation: Generation,
    pub sort: SortOrder,
    /// Type-filtered and ordered.
    pub records: Vec<CatalogRecord>,
    pub loading: bool,
    pub has_more: bool,
    pub loaded_count: u32,
    pub limit: u32,
}

impl GenerationView {
    pub fn from_snapshot(snap: &PagerSnapshot, types: &BTreeSet<String>) -> Self {
        Self {
            generation: snap.session.generation,
            sort: snap.session.sort,
            records: snap.view(types, snap.session.sort),
            loading: snap.loading,
            has_more: snap.has_more,
            loaded_count: snap.loaded_count,
            limit: snap.limit,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchView {
    pub query: String,
    pub records: Vec<CatalogRecord>,
    pub loading: bool,
}

impl From<&SearchSnapshot> for SearchView {
    fn from(s: &SearchSnapshot) -> Self {
        Self { query: s.query.clone(), records: s.records.clone(), loading: s.loading }
    }
}

/// Caller-facing catalog surface.
#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    /// Switch to the generation/sort session in `params` (resetting when
    /// either changed), make sure its first slice is loaded, and return the
    /// filtered view.
    async fn load_generation(&self, params: GenerationParams) -> DexResult<GenerationView>;

    /// Ask the pager for one more slice of the current session. No-op while
    /// a load is running or the generation is exhausted.
    fn request_next_page(&self);

    /// Load one more slice and return the settled view.
    async fn next_page(&self, types: &BTreeSet<String>) -> DexResult<GenerationView>;

    /// Load every remaining slice of the current session.
    async fn load_all(&self, types: &BTreeSet<String>) -> DexResult<GenerationView>;

    /// Global search; bypasses pagination and leaves pager state untouched.
    async fn search_catalog(&self, query: &str) -> DexResult<SearchView>;

    /// One record by name or id.
    async fn detail(&self, name_or_id: &str) -> DexResult<CatalogRecord>;

    /// Lightweight `(name, id)` index of the whole catalog.
    async fn index(&self) -> DexResult<Arc<[IndexEntry]>>;

    fn cache_len(&self) -> usize;

    fn clear_cache(&self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiConfig {
    pub pager: PagerConfig,
    pub search: SearchConfig,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self { pager: PagerConfig::from_env(), search: SearchConfig::from_env() }
    }
}

// ----------------- In-process implementation -----------------

/// In-process implementation wiring client, caches, pager, and search.
/// Must be constructed inside a tokio runtime (the pager is a task).
pub struct InProcApi {
    loader: Arc<PageLoader>,
    index: Arc<IndexCache>,
    pager: PagerHandle,
    search: SearchEngine,
    cfg: ApiConfig,
}

impl InProcApi {
    pub fn new(client: Arc<dyn CatalogClient>, cache: Arc<ResponseCache>, cfg: ApiConfig) -> Self {
        let loader = Arc::new(PageLoader::new(Arc::clone(&client), cache));
        let index = Arc::new(IndexCache::new(client));
        let pager = spawn_pager(Arc::clone(&loader), cfg.pager, SessionKey::default());
        let search = SearchEngine::new(Arc::clone(&index), Arc::clone(&loader), cfg.search.limit);
        Self { loader, index, pager, search, cfg }
    }

    /// HTTP client against `remote`, response cache over `storage`.
    pub fn connect(remote: &RemoteConfig, storage: Arc<dyn Storage>, cfg: ApiConfig) -> DexResult<Self> {
        let client = HttpCatalogClient::new(remote)?;
        info!(base_url = %client.base_url(), page_size = cfg.pager.page_size, "api: connected");
        Ok(Self::new(Arc::new(client), Arc::new(ResponseCache::new(storage)), cfg))
    }

    pub fn config(&self) -> ApiConfig {
        self.cfg
    }

    pub fn pager(&self) -> &PagerHandle {
        &self.pager
    }

    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    /// Current view without waiting or resetting.
    pub fn generation_view(&self, types: &BTreeSet<String>) -> GenerationView {
        GenerationView::from_snapshot(&self.pager.current(), types)
    }
}

#[async_trait::async_trait]
impl CatalogApi for InProcApi {
    async fn load_generation(&self, params: GenerationParams) -> DexResult<GenerationView> {
        let t0 = Instant::now();
        let reset = self.pager.set_session(params.generation, params.sort);
        info!(generation = %params.generation, sort = %params.sort, reset, "api: load_generation start");
        let mut snap = self.pager.settle().await;
        if snap.loaded_count == 0 && snap.has_more {
            snap = self.pager.next_page().await;
        }
        info!(records = snap.records.len(), has_more = snap.has_more, took_ms = %t0.elapsed().as_millis(), "api: load_generation ok");
        Ok(GenerationView::from_snapshot(&snap, &params.types))
    }

    fn request_next_page(&self) {
        self.pager.request_next_page();
    }

    async fn next_page(&self, types: &BTreeSet<String>) -> DexResult<GenerationView> {
        let snap = self.pager.next_page().await;
        Ok(GenerationView::from_snapshot(&snap, types))
    }

    async fn load_all(&self, types: &BTreeSet<String>) -> DexResult<GenerationView> {
        let t0 = Instant::now();
        let snap = self.pager.drain().await;
        info!(records = snap.records.len(), has_more = snap.has_more, took_ms = %t0.elapsed().as_millis(), "api: load_all done");
        Ok(GenerationView::from_snapshot(&snap, types))
    }

    async fn search_catalog(&self, query: &str) -> DexResult<SearchView> {
        match self.search.search(query).await? {
            SearchOutcome::Cleared => Ok(SearchView::default()),
            SearchOutcome::Applied(snap) => Ok(SearchView::from(&*snap)),
            SearchOutcome::Superseded => Ok(SearchView::from(&*self.search.current())),
        }
    }

    async fn detail(&self, name_or_id: &str) -> DexResult<CatalogRecord> {
        Ok(self.loader.detail(name_or_id).await?)
    }

    async fn index(&self) -> DexResult<Arc<[IndexEntry]>> {
        Ok(self.index.get_index().await?)
    }

    fn cache_len(&self) -> usize {
        self.loader.cache().len()
    }

    fn clear_cache(&self) {
        self.loader.cache().clear();
    }
}
