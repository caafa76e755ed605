//! Dex store: index cache, page loader, and the generation pager actor.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use dex_core::{CatalogRecord, CatalogResult, Generation, SortOrder};
use metrics::{counter, histogram};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

mod index;
mod loader;
pub mod pager;

pub use index::IndexCache;
pub use loader::PageLoader;
pub use pager::{Completion, PageTicket, PagerSnapshot, PagerState, SessionKey, DEFAULT_PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerConfig {
    pub page_size: u32,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_PAGE_SIZE }
    }
}

impl PagerConfig {
    /// Defaults overridden by `DEX_PAGE_SIZE`.
    pub fn from_env() -> Self {
        let page_size = std::env::var("DEX_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Self { page_size }
    }
}

enum Command {
    Reset(SessionKey),
    NextPage,
    Loaded { ticket: PageTicket, result: CatalogResult<Vec<CatalogRecord>> },
    /// Acknowledged once every earlier command has been processed.
    Barrier(oneshot::Sender<()>),
}

/// Handle for driving the pager and reading its published snapshots.
pub struct PagerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    snap: Arc<ArcSwap<PagerSnapshot>>,
    rev_rx: watch::Receiver<u64>,
    requested: Mutex<SessionKey>,
}

impl PagerHandle {
    pub fn current(&self) -> Arc<PagerSnapshot> {
        self.snap.load_full()
    }

    /// Revision counter bumped after every published change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.rev_rx.clone()
    }

    /// Unconditionally start a new session.
    pub fn reset(&self, generation: Generation, sort: SortOrder) {
        let key = SessionKey::new(generation, sort);
        *self.requested.lock().unwrap_or_else(|p| p.into_inner()) = key;
        let _ = self.cmd_tx.send(Command::Reset(key));
    }

    /// Reset only when generation or sort differ from the last requested
    /// session. Returns whether a reset was issued.
    pub fn set_session(&self, generation: Generation, sort: SortOrder) -> bool {
        let key = SessionKey::new(generation, sort);
        let mut requested = self.requested.lock().unwrap_or_else(|p| p.into_inner());
        if *requested == key {
            return false;
        }
        *requested = key;
        let _ = self.cmd_tx.send(Command::Reset(key));
        true
    }

    pub fn session(&self) -> SessionKey {
        *self.requested.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Ask for the next slice. No-op while loading or when exhausted.
    pub fn request_next_page(&self) {
        let _ = self.cmd_tx.send(Command::NextPage);
    }

    /// Wait until all queued commands are processed and no load is running.
    ///
    /// A request that never answers keeps this pending; the core imposes no timeout.
    pub async fn settle(&self) -> Arc<PagerSnapshot> {
        let mut rx = self.rev_rx.clone();
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Barrier(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        loop {
            let cur = self.snap.load_full();
            if !cur.loading {
                return cur;
            }
            if rx.changed().await.is_err() {
                return self.snap.load_full();
            }
        }
    }

    /// Request one slice and wait for it to land (or fail).
    pub async fn next_page(&self) -> Arc<PagerSnapshot> {
        self.request_next_page();
        self.settle().await
    }

    /// Load slices until the window is exhausted, a load fails, or the session changes.
    pub async fn drain(&self) -> Arc<PagerSnapshot> {
        loop {
            let before = self.settle().await;
            if !before.has_more {
                return before;
            }
            let after = self.next_page().await;
            if after.epoch != before.epoch || after.loaded_count == before.loaded_count {
                return after;
            }
        }
    }

    /// Current records, type-filtered and ordered.
    pub fn view(&self, types: &BTreeSet<String>, sort: SortOrder) -> Vec<CatalogRecord> {
        self.current().view(types, sort)
    }
}

/// Spawn the pager actor. One task owns the [`PagerState`]; loads run in
/// their own tasks and post results back through the same queue, so every
/// mutation happens in queue order.
pub fn spawn_pager(loader: Arc<PageLoader>, cfg: PagerConfig, initial: SessionKey) -> PagerHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let state = PagerState::new(initial, cfg.page_size);
    let snap = Arc::new(ArcSwap::from_pointee(state.snapshot()));
    let (rev_tx, rev_rx) = watch::channel(0u64);
    let snap_clone = Arc::clone(&snap);
    let weak_tx = cmd_tx.downgrade();

    tokio::spawn(async move {
        let mut state = state;
        let mut rev = 0u64;
        while let Some(cmd) = cmd_rx.recv().await {
            let changed = match cmd {
                Command::Reset(key) => {
                    state.reset(key);
                    true
                }
                Command::NextPage => match state.begin_load() {
                    Some(ticket) => {
                        spawn_load(Arc::clone(&loader), ticket, weak_tx.clone());
                        true
                    }
                    None => {
                        debug!(loading = state.is_loading(), has_more = state.has_more(), "pager: next page ignored");
                        !state.has_more()
                    }
                },
                Command::Loaded { ticket, result } => match state.complete(ticket, result) {
                    Completion::Applied { added } => {
                        counter!("pager_records_added_total", added as u64);
                        true
                    }
                    Completion::Stale => {
                        counter!("pager_stale_completions_total", 1u64);
                        true
                    }
                    Completion::Failed => {
                        counter!("pager_failed_loads_total", 1u64);
                        true
                    }
                },
                Command::Barrier(ack) => {
                    let _ = ack.send(());
                    false
                }
            };
            if changed {
                snap_clone.store(Arc::new(state.snapshot()));
                rev = rev.wrapping_add(1);
                let _ = rev_tx.send(rev);
            }
        }
        info!("pager loop stopped");
    });

    PagerHandle { cmd_tx, snap, rev_rx, requested: Mutex::new(initial) }
}

fn spawn_load(loader: Arc<PageLoader>, ticket: PageTicket, tx: mpsc::WeakUnboundedSender<Command>) {
    tokio::spawn(async move {
        let t0 = Instant::now();
        debug!(offset = ticket.offset, limit = ticket.limit, epoch = ticket.epoch, "pager: load start");
        let result = loader.load(ticket.offset, ticket.limit).await;
        histogram!("pager_page_load_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match tx.upgrade() {
            Some(tx) => {
                let _ = tx.send(Command::Loaded { ticket, result });
            }
            None => debug!("pager: handle dropped; discarding load"),
        }
    });
}
