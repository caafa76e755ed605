//! Generation-scoped pagination as an explicit state machine.
//!
//! The machine does no I/O: `begin_load` hands out a [`PageTicket`] naming
//! the slice to fetch and `complete` applies the outcome. Tickets carry the
//! session they were issued for; a completion whose session is gone is
//! dropped without touching state.

use std::collections::BTreeSet;
use std::sync::Arc;

use dex_core::view::{apply_filter, apply_view};
use dex_core::{CatalogRecord, CatalogResult, FilterState, Generation, GenerationWindow, RecordId, SortOrder};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Parameters whose change starts a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionKey {
    pub generation: Generation,
    pub sort: SortOrder,
}

impl SessionKey {
    pub fn new(generation: Generation, sort: SortOrder) -> Self {
        Self { generation, sort }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    pub epoch: u64,
    pub session: SessionKey,
    /// Absolute offset into the catalog list.
    pub offset: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied { added: usize },
    /// Ticket belongs to a previous session; nothing changed.
    Stale,
    Failed,
}

pub struct PagerState {
    session: SessionKey,
    epoch: u64,
    page_size: u32,
    accumulated: FxHashMap<RecordId, CatalogRecord>,
    loaded_count: u32,
    loading: bool,
    has_more: bool,
    stale_discarded: u64,
}

impl PagerState {
    pub fn new(session: SessionKey, page_size: u32) -> Self {
        Self {
            session,
            epoch: 0,
            page_size: page_size.max(1),
            accumulated: FxHashMap::default(),
            loaded_count: 0,
            loading: false,
            has_more: true,
            stale_discarded: 0,
        }
    }

    pub fn session(&self) -> SessionKey { self.session }
    pub fn epoch(&self) -> u64 { self.epoch }
    pub fn loaded_count(&self) -> u32 { self.loaded_count }
    pub fn is_loading(&self) -> bool { self.loading }
    pub fn has_more(&self) -> bool { self.has_more }
    pub fn len(&self) -> usize { self.accumulated.len() }
    pub fn is_empty(&self) -> bool { self.accumulated.is_empty() }

    fn window(&self) -> GenerationWindow {
        self.session.generation.window()
    }

    /// Start a new session. In-flight tickets of the old one become stale.
    pub fn reset(&mut self, session: SessionKey) {
        debug!(from = ?self.session, to = ?session, epoch = self.epoch + 1, "pager: reset");
        self.session = session;
        self.epoch += 1;
        self.accumulated.clear();
        self.loaded_count = 0;
        self.loading = false;
        self.has_more = true;
    }

    /// Enter Loading and describe the next slice, or `None` when a load is
    /// already running or the window is exhausted.
    pub fn begin_load(&mut self) -> Option<PageTicket> {
        if self.loading || !self.has_more {
            return None;
        }
        let w = self.window();
        let remaining = w.limit.saturating_sub(self.loaded_count);
        let page_size = self.page_size.min(remaining);
        if page_size == 0 {
            self.has_more = false;
            return None;
        }
        let offset = if self.session.sort.fetches_from_tail() {
            w.offset + w.limit - self.loaded_count - page_size
        } else {
            w.offset + self.loaded_count
        };
        self.loading = true;
        Some(PageTicket { epoch: self.epoch, session: self.session, offset, limit: page_size })
    }

    pub fn complete(&mut self, ticket: PageTicket, result: CatalogResult<Vec<CatalogRecord>>) -> Completion {
        if ticket.epoch != self.epoch || ticket.session != self.session || !self.loading {
            self.stale_discarded += 1;
            debug!(ticket_epoch = ticket.epoch, epoch = self.epoch, "pager: stale completion dropped");
            return Completion::Stale;
        }
        self.loading = false;
        match result {
            Ok(records) => {
                let w = self.window();
                let before = self.accumulated.len();
                for r in records {
                    if !w.contains_id(r.id) {
                        debug!(id = r.id, generation = %self.session.generation, "pager: record outside window");
                    }
                    self.accumulated.insert(r.id, r);
                }
                self.loaded_count += ticket.limit;
                if self.loaded_count >= w.limit {
                    self.has_more = false;
                }
                Completion::Applied { added: self.accumulated.len() - before }
            }
            Err(e) => {
                warn!(error = %e, offset = ticket.offset, limit = ticket.limit, "pager: page load failed");
                Completion::Failed
            }
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &CatalogRecord> {
        self.accumulated.values()
    }

    pub fn snapshot(&self) -> PagerSnapshot {
        let mut records: Vec<CatalogRecord> = self.accumulated.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        PagerSnapshot {
            epoch: self.epoch,
            session: self.session,
            records: records.into(),
            loaded_count: self.loaded_count,
            limit: self.window().limit,
            loading: self.loading,
            has_more: self.has_more,
            stale_discarded: self.stale_discarded,
        }
    }
}

/// Immutable published view of a [`PagerState`]. Records are ordered by id.
#[derive(Debug, Clone)]
pub struct PagerSnapshot {
    pub epoch: u64,
    pub session: SessionKey,
    pub records: Arc<[CatalogRecord]>,
    pub loaded_count: u32,
    pub limit: u32,
    pub loading: bool,
    pub has_more: bool,
    pub stale_discarded: u64,
}

impl PagerSnapshot {
    /// Type-filtered, ordered records.
    pub fn view(&self, types: &BTreeSet<String>, sort: SortOrder) -> Vec<CatalogRecord> {
        apply_view(self.records.iter(), types, sort)
    }

    /// Records after the caller's full filter (text, types, order).
    pub fn filtered(&self, filter: &FilterState) -> Vec<CatalogRecord> {
        apply_filter(self.records.iter(), filter)
    }
}
