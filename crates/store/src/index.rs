//! Process-lifetime cache of the full `(name, id)` catalog index.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dex_core::normalize::index_entry;
use dex_core::{CatalogError, CatalogResult, IndexEntry};
use dex_remote::CatalogClient;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::OnceCell;
use tracing::{info, warn};

type InFlight = Shared<BoxFuture<'static, CatalogResult<Arc<[IndexEntry]>>>>;

/// Single-flight index cache.
///
/// The fetch runs in its own task. Callers arriving while it is in flight
/// await that same task, so dropping any caller (the first included) never
/// restarts it. A failed fetch is not cached and the next caller retries.
pub struct IndexCache {
    client: Arc<dyn CatalogClient>,
    cell: OnceCell<Arc<[IndexEntry]>>,
    in_flight: Mutex<Option<(u64, InFlight)>>,
    next_fetch: AtomicU64,
}

impl IndexCache {
    pub fn new(client: Arc<dyn CatalogClient>) -> Self {
        Self { client, cell: OnceCell::new(), in_flight: Mutex::new(None), next_fetch: AtomicU64::new(0) }
    }

    pub async fn get_index(&self) -> CatalogResult<Arc<[IndexEntry]>> {
        if let Some(idx) = self.cell.get() {
            return Ok(Arc::clone(idx));
        }
        let (id, fetch) = {
            let mut slot = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(idx) = self.cell.get() {
                return Ok(Arc::clone(idx));
            }
            // a failure nobody awaited is not reused
            if slot.as_ref().is_some_and(|(_, f)| matches!(f.peek(), Some(Err(_)))) {
                *slot = None;
            }
            match slot.as_ref() {
                Some((id, fetch)) => (*id, fetch.clone()),
                None => {
                    let id = self.next_fetch.fetch_add(1, Ordering::Relaxed);
                    let fetch = spawn_fetch(Arc::clone(&self.client));
                    *slot = Some((id, fetch.clone()));
                    (id, fetch)
                }
            }
        };
        let res = fetch.await;
        let mut slot = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if let Ok(idx) = &res {
            let _ = self.cell.set(Arc::clone(idx));
        }
        if slot.as_ref().is_some_and(|(cur, _)| *cur == id) {
            *slot = None;
        }
        res
    }

    /// Resolved index, if the fetch already completed.
    pub fn cached(&self) -> Option<Arc<[IndexEntry]>> {
        self.cell.get().cloned()
    }
}

fn spawn_fetch(client: Arc<dyn CatalogClient>) -> InFlight {
    let task = tokio::spawn(async move {
        let t0 = Instant::now();
        info!("index: fetch start");
        let refs = client.fetch_full_index().await.map_err(|e| {
            warn!(error = %e, "index: fetch failed");
            e
        })?;
        let entries = refs.iter().map(index_entry).collect::<CatalogResult<Vec<_>>>()?;
        info!(entries = entries.len(), took_ms = %t0.elapsed().as_millis(), "index: ready");
        Ok::<_, CatalogError>(Arc::<[IndexEntry]>::from(entries))
    });
    async move {
        match task.await {
            Ok(res) => res,
            Err(e) => Err(CatalogError::network(format!("index task: {e}"))),
        }
    }
    .boxed()
    .shared()
}
