#![forbid(unsafe_code)]

use std::sync::Arc;

use dex_core::{CatalogRecord, FilterState};
use dex_search::{normalize_query, Debouncer};
use serde::{Deserialize, Serialize};

use crate::{CatalogApi, DexResult, InProcApi};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BrowseMode {
    /// Generation pager output, type-filtered and sorted.
    Paged,
    /// Global search output; pagination is inert.
    Search,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrowseView {
    pub mode: BrowseMode,
    pub records: Vec<CatalogRecord>,
    pub loading: bool,
    pub has_more: bool,
}

/// Reconciles a caller [`FilterState`] into one list.
///
/// Search text is debounced; once the settled text is non-empty the browser
/// renders search results and ignores next-page requests. The pager always
/// sees an empty search string.
pub struct Browser {
    api: Arc<InProcApi>,
    filter: FilterState,
    debouncer: Debouncer<String>,
}

impl Browser {
    pub fn new(api: Arc<InProcApi>) -> Self {
        let delay = api.config().search.debounce;
        let filter = FilterState { generation: api.pager().session().generation, sort: api.pager().session().sort, ..Default::default() };
        Self { api, filter, debouncer: Debouncer::spawn(String::new(), delay) }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Apply the caller's latest filter. Generation or sort changes reset the pager.
    pub fn set_filter(&mut self, filter: FilterState) {
        if filter.search != self.filter.search {
            self.debouncer.push(normalize_query(&filter.search));
        }
        self.api.pager().set_session(filter.generation, filter.sort);
        self.filter = filter;
    }

    pub fn settled_search(&self) -> String {
        self.debouncer.settled()
    }

    pub fn mode(&self) -> BrowseMode {
        if self.settled_search().is_empty() {
            BrowseMode::Paged
        } else {
            BrowseMode::Search
        }
    }

    /// Forward a next-page trigger to the pager. Returns `false` (and does
    /// nothing) in search mode.
    pub fn request_next_page(&self) -> bool {
        match self.mode() {
            BrowseMode::Search => false,
            BrowseMode::Paged => {
                self.api.request_next_page();
                true
            }
        }
    }

    /// Wait for the next settled search text and act on it. `None` once the
    /// debouncer is gone.
    pub async fn next_settled(&mut self) -> Option<DexResult<BrowseView>> {
        let query = self.debouncer.changed().await?;
        if query.is_empty() {
            self.api.search_engine().cancel();
            return Some(Ok(self.view()));
        }
        Some(self.api.search_catalog(&query).await.map(|_| self.view()))
    }

    /// Re-run the search for the settled text when its results are missing,
    /// e.g. after an interrupted [`next_settled`](Self::next_settled).
    pub async fn refresh(&self) -> DexResult<BrowseView> {
        let settled = self.settled_search();
        let snap = self.api.search_engine().current();
        if !settled.is_empty() && (snap.query != settled || snap.loading) {
            self.api.search_catalog(&settled).await?;
        }
        Ok(self.view())
    }

    pub fn view(&self) -> BrowseView {
        match self.mode() {
            BrowseMode::Search => {
                let settled = self.settled_search();
                let snap = self.api.search_engine().current();
                let pending = snap.query != settled;
                BrowseView {
                    mode: BrowseMode::Search,
                    records: if pending { Vec::new() } else { snap.records.clone() },
                    loading: pending || snap.loading,
                    has_more: false,
                }
            }
            BrowseMode::Paged => {
                let snap = self.api.pager().current();
                let pager_filter = FilterState { search: String::new(), ..self.filter.clone() };
                BrowseView {
                    mode: BrowseMode::Paged,
                    records: snap.filtered(&pager_filter),
                    loading: snap.loading,
                    has_more: snap.has_more,
                }
            }
        }
    }
}
