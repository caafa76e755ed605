#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dex_core::StorageError;
use dex_persist::{MemoryStorage, ResponseCache, Storage};
use dex_remote::MockCatalog;
use dex_search::{SearchEngine, SearchOutcome, DEFAULT_RESULT_LIMIT};
use dex_store::{IndexCache, PageLoader};

fn engine(mock: &Arc<MockCatalog>) -> SearchEngine {
    let index = Arc::new(IndexCache::new(mock.clone()));
    let loader = Arc::new(PageLoader::new(mock.clone(), Arc::new(ResponseCache::in_memory())));
    SearchEngine::new(index, loader, DEFAULT_RESULT_LIMIT)
}

#[tokio::test]
async fn id_or_name_substring_bounded_to_limit() {
    let mock = Arc::new(MockCatalog::synthetic(dex_core::CATALOG_SIZE));
    let e = engine(&mock);
    let SearchOutcome::Applied(snap) = e.search("  25 ").await.unwrap() else {
        panic!("expected results");
    };
    assert_eq!(snap.query, "25");
    assert_eq!(snap.records.len(), 20);
    assert_eq!(snap.records[0].id, 25);
    assert!(snap.records.iter().all(|r| r.name.contains("25") || r.id.to_string().contains("25")));
    // index order, not relevance
    assert!(snap.records.windows(2).all(|w| w[0].id < w[1].id));
    assert!(!snap.loading);
    assert_eq!(mock.calls(&mock.index_calls), 1);
}

#[tokio::test]
async fn failed_lookups_are_dropped_not_fatal() {
    let mock = Arc::new(MockCatalog::synthetic(300));
    mock.fail_detail("species25");
    let e = engine(&mock);
    let SearchOutcome::Applied(snap) = e.search("25").await.unwrap() else {
        panic!("expected results");
    };
    let ids: Vec<u32> = snap.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, [125, 225, 250, 251, 252, 253, 254, 255, 256, 257, 258, 259]);
}

#[tokio::test(start_paused = true)]
async fn newer_query_wins() {
    let mock = Arc::new(MockCatalog::synthetic(200));
    mock.set_index_delay(Duration::from_millis(300));
    let e = engine(&mock);

    let (older, newer) = tokio::join!(e.search("species1"), e.search("species2"));
    assert_eq!(older.unwrap(), SearchOutcome::Superseded);
    assert!(matches!(newer.unwrap(), SearchOutcome::Applied(_)));

    let cur = e.current();
    assert_eq!(cur.query, "species2");
    assert!(cur.records.iter().all(|r| r.name.contains("species2")));
    assert_eq!(mock.calls(&mock.index_calls), 1);
}

#[tokio::test]
async fn empty_query_clears() {
    let mock = Arc::new(MockCatalog::synthetic(50));
    let e = engine(&mock);
    e.search("3").await.unwrap();
    assert!(!e.current().records.is_empty());
    assert_eq!(e.search("   ").await.unwrap(), SearchOutcome::Cleared);
    assert!(e.current().records.is_empty());
    assert!(e.current().query.is_empty());
}

#[tokio::test]
async fn index_failure_surfaces_and_stops_loading() {
    let mock = Arc::new(MockCatalog::synthetic(50));
    mock.fail_index(1);
    let e = engine(&mock);
    assert!(e.search("pika").await.is_err());
    let cur = e.current();
    assert!(!cur.loading);
    assert!(cur.records.is_empty());
    // next query retries the index
    assert!(matches!(e.search("species4").await.unwrap(), SearchOutcome::Applied(_)));
}

#[derive(Default)]
struct CountingStorage {
    inner: MemoryStorage,
    writes: AtomicUsize,
}

impl Storage for CountingStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.read(key)
    }
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

#[tokio::test]
async fn resolved_matches_are_persisted_in_one_write() {
    let mock = Arc::new(MockCatalog::synthetic(dex_core::CATALOG_SIZE));
    let storage = Arc::new(CountingStorage::default());
    let cache = Arc::new(ResponseCache::new(storage.clone()));
    let loader = Arc::new(PageLoader::new(mock.clone(), cache.clone()));
    let e = SearchEngine::new(Arc::new(IndexCache::new(mock.clone())), loader, DEFAULT_RESULT_LIMIT);

    let SearchOutcome::Applied(snap) = e.search("25").await.unwrap() else {
        panic!("expected results");
    };
    assert_eq!(snap.records.len(), 20);
    assert_eq!(storage.writes.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 20);
}
