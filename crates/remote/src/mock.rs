//! Simple in-memory catalog for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dex_core::normalize::{NamedRef, RawDetail, RawTypeSlot};
use dex_core::{CatalogError, CatalogRecord, CatalogResult};
use tokio::sync::Semaphore;

const TYPES: [&str; 6] = ["normal", "fire", "water", "grass", "flying", "poison"];

/// In-memory [`CatalogClient`](crate::CatalogClient). List order is the order
/// of `records`; references use the record id as trailing segment.
#[derive(Default)]
pub struct MockCatalog {
    records: Vec<CatalogRecord>,
    pub page_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub index_calls: AtomicUsize,
    index_delay: Mutex<Option<Duration>>,
    index_failures: AtomicUsize,
    page_gate: Mutex<Option<Arc<Semaphore>>>,
    fail_offsets: Mutex<HashSet<u32>>,
    fail_names: Mutex<HashSet<String>>,
}

impl MockCatalog {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        Self { records, ..Default::default() }
    }

    /// `n` records with ids `1..=n`, names `species{id}`, and one or two types.
    pub fn synthetic(n: u32) -> Self {
        let records = (1..=n)
            .map(|id| {
                let mut types: dex_core::TypeList = smallvec_of(TYPES[(id as usize) % TYPES.len()]);
                if id % 3 == 0 {
                    types.push(TYPES[(id as usize + 1) % TYPES.len()].to_string());
                }
                CatalogRecord { id, name: format!("species{id}"), types, weight: id * 10, height: id % 20 + 1 }
            })
            .collect();
        Self::new(records)
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    pub fn reference(r: &CatalogRecord) -> NamedRef {
        NamedRef { name: r.name.clone(), url: format!("https://mock.invalid/api/v2/pokemon/{}/", r.id) }
    }

    pub fn set_index_delay(&self, d: Duration) {
        *self.index_delay.lock().unwrap_or_else(|p| p.into_inner()) = Some(d);
    }

    /// The next `n` index requests fail.
    pub fn fail_index(&self, n: usize) {
        self.index_failures.store(n, Ordering::SeqCst);
    }

    /// Page requests block until [`release_pages`](Self::release_pages) grants them.
    pub fn hold_pages(&self) {
        *self.page_gate.lock().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_pages(&self, n: usize) {
        if let Some(gate) = self.page_gate.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            gate.add_permits(n);
        }
    }

    pub fn fail_page_at(&self, offset: u32) {
        self.fail_offsets.lock().unwrap_or_else(|p| p.into_inner()).insert(offset);
    }

    pub fn clear_page_failures(&self) {
        self.fail_offsets.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn fail_detail(&self, name: &str) {
        self.fail_names.lock().unwrap_or_else(|p| p.into_inner()).insert(name.to_string());
    }

    pub fn calls(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn find(&self, key: &str) -> Option<&CatalogRecord> {
        match key.parse::<u32>() {
            Ok(id) => self.records.iter().find(|r| r.id == id),
            Err(_) => self.records.iter().find(|r| r.name == key),
        }
    }
}

fn smallvec_of(t: &str) -> dex_core::TypeList {
    let mut v = dex_core::TypeList::new();
    v.push(t.to_string());
    v
}

#[async_trait::async_trait]
impl crate::CatalogClient for MockCatalog {
    async fn fetch_page(&self, offset: u32, limit: u32) -> CatalogResult<Vec<NamedRef>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.page_gate.lock().unwrap_or_else(|p| p.into_inner()).clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.fail_offsets.lock().unwrap_or_else(|p| p.into_inner()).contains(&offset) {
            return Err(CatalogError::status(503, format!("mock page at offset {offset} unavailable")));
        }
        Ok(self
            .records
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(Self::reference)
            .collect())
    }

    async fn fetch_detail(&self, name_or_id: &str) -> CatalogResult<RawDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let key = name_or_id.to_lowercase();
        if self.fail_names.lock().unwrap_or_else(|p| p.into_inner()).contains(&key) {
            return Err(CatalogError::network(format!("mock detail for {key} failed")));
        }
        let r = self.find(&key).ok_or_else(|| CatalogError::status(404, format!("{key} not found")))?;
        Ok(RawDetail {
            id: r.id,
            name: r.name.clone(),
            types: r
                .types
                .iter()
                .enumerate()
                .map(|(i, t)| RawTypeSlot {
                    slot: i as u8 + 1,
                    ty: NamedRef { name: t.clone(), url: format!("https://mock.invalid/api/v2/type/{t}/") },
                })
                .collect(),
            weight: r.weight,
            height: r.height,
        })
    }

    async fn fetch_full_index(&self) -> CatalogResult<Vec<NamedRef>> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.index_delay.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let failing = self
            .index_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CatalogError::status(500, "mock index unavailable"));
        }
        Ok(self.records.iter().map(Self::reference).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CatalogClient;
    use dex_core::normalize::{id_from_url, normalize_detail};

    #[tokio::test]
    async fn pages_slice_list_order_and_refs_carry_ids() {
        let m = MockCatalog::synthetic(30);
        let page = m.fetch_page(20, 20).await.unwrap();
        assert_eq!(page.len(), 10);
        let ids: Vec<u32> = page.iter().map(|r| id_from_url(&r.url).unwrap()).collect();
        assert_eq!(ids, (21..=30).collect::<Vec<_>>());
        assert_eq!(m.calls(&m.page_calls), 1);
    }

    #[tokio::test]
    async fn detail_by_name_or_id_normalizes() {
        let m = MockCatalog::synthetic(10);
        let by_name = normalize_detail(m.fetch_detail("species6").await.unwrap()).unwrap();
        let by_id = normalize_detail(m.fetch_detail("6").await.unwrap()).unwrap();
        assert_eq!(by_name, by_id);
        assert_eq!(by_name.types.len(), 2);
        let missing = m.fetch_detail("missingno").await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn injected_failures_surface_as_network_errors() {
        let m = MockCatalog::synthetic(10);
        m.fail_page_at(0);
        m.fail_detail("species2");
        assert!(matches!(m.fetch_page(0, 5).await, Err(CatalogError::Network { status: Some(503), .. })));
        assert!(m.fetch_page(5, 5).await.is_ok());
        assert!(matches!(m.fetch_detail("species2").await, Err(CatalogError::Network { .. })));
        m.clear_page_failures();
        assert_eq!(m.fetch_page(0, 5).await.unwrap().len(), 5);
    }
}
