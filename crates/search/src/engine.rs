use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use dex_core::{CatalogRecord, CatalogResult, IndexEntry};
use dex_store::{IndexCache, PageLoader};
use metrics::{counter, histogram};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSnapshot {
    pub query: String,
    /// Matches in index order.
    pub records: Vec<CatalogRecord>,
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Empty query; results were cleared.
    Cleared,
    Applied(Arc<SearchSnapshot>),
    /// A newer query started before this one resolved.
    Superseded,
}

/// Trimmed, lowercased query text.
pub fn normalize_query(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// First `limit` entries (index order) whose name or decimal id contains `query`.
pub fn match_entries<'a>(entries: &'a [IndexEntry], query: &str, limit: usize) -> Vec<&'a IndexEntry> {
    entries
        .iter()
        .filter(|e| e.name.contains(query) || e.id.to_string().contains(query))
        .take(limit)
        .collect()
}

/// Global search over the full catalog index, independent of pager state.
///
/// Each call takes a fresh token; results are published only while that
/// token is still the latest, so a superseded query never overwrites newer
/// results.
pub struct SearchEngine {
    index: Arc<IndexCache>,
    loader: Arc<PageLoader>,
    limit: usize,
    latest: Mutex<u64>,
    state: ArcSwap<SearchSnapshot>,
}

impl SearchEngine {
    pub fn new(index: Arc<IndexCache>, loader: Arc<PageLoader>, limit: usize) -> Self {
        Self { index, loader, limit: limit.max(1), latest: Mutex::new(0), state: ArcSwap::from_pointee(SearchSnapshot::default()) }
    }

    pub fn current(&self) -> Arc<SearchSnapshot> {
        self.state.load_full()
    }

    /// Supersede any running query and clear results.
    pub fn cancel(&self) {
        let mut latest = self.lock_latest();
        *latest += 1;
        self.state.store(Arc::new(SearchSnapshot::default()));
    }

    pub async fn search(&self, raw: &str) -> CatalogResult<SearchOutcome> {
        let query = normalize_query(raw);
        if query.is_empty() {
            self.cancel();
            return Ok(SearchOutcome::Cleared);
        }
        let t0 = Instant::now();
        let token = self.begin(&query);
        debug!(query = %query, token, "search: start");

        let index = match self.index.get_index().await {
            Ok(index) => index,
            Err(e) => {
                let empty = SearchSnapshot { query: query.clone(), records: Vec::new(), loading: false };
                if self.publish_if_current(token, Arc::new(empty)) {
                    warn!(query = %query, error = %e, "search: index unavailable");
                }
                return Err(e);
            }
        };
        if !self.is_current(token) {
            debug!(query = %query, token, "search: superseded before matching");
            return Ok(SearchOutcome::Superseded);
        }

        let matches = match_entries(&index, &query, self.limit);
        let resolved = self.loader.resolve_many(matches.iter().map(|e| e.name.as_str())).await;
        let records: Vec<CatalogRecord> = resolved
            .into_iter()
            .zip(&matches)
            .filter_map(|(res, entry)| match res {
                Ok(rec) => Some(rec),
                Err(e) => {
                    debug!(name = %entry.name, error = %e, "search: match dropped");
                    counter!("search_dropped_matches_total", 1u64);
                    None
                }
            })
            .collect();

        let snap = Arc::new(SearchSnapshot { query: query.clone(), records, loading: false });
        if !self.publish_if_current(token, Arc::clone(&snap)) {
            debug!(query = %query, token, "search: superseded before publish");
            return Ok(SearchOutcome::Superseded);
        }
        histogram!("search_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(query = %query, matches = matches.len(), resolved = snap.records.len(), took_ms = %t0.elapsed().as_millis(), "search: ok");
        Ok(SearchOutcome::Applied(snap))
    }

    fn lock_latest(&self) -> std::sync::MutexGuard<'_, u64> {
        self.latest.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn begin(&self, query: &str) -> u64 {
        let mut latest = self.lock_latest();
        *latest += 1;
        let prev = self.state.load();
        self.state.store(Arc::new(SearchSnapshot { query: query.to_string(), records: prev.records.clone(), loading: true }));
        *latest
    }

    fn is_current(&self, token: u64) -> bool {
        *self.lock_latest() == token
    }

    fn publish_if_current(&self, token: u64, snap: Arc<SearchSnapshot>) -> bool {
        let latest = self.lock_latest();
        if *latest != token {
            return false;
        }
        self.state.store(snap);
        true
    }
}
