use std::sync::Arc;

use dex_core::normalize::normalize_detail;
use dex_core::{CatalogRecord, CatalogResult};
use dex_persist::{PersistOutcome, ResponseCache};
use dex_remote::CatalogClient;
use futures::future::{join_all, try_join_all};
use tracing::debug;

/// Fetches list slices and resolves them into full records, skipping detail
/// requests for names already in the response cache.
pub struct PageLoader {
    client: Arc<dyn CatalogClient>,
    cache: Arc<ResponseCache>,
}

impl PageLoader {
    pub fn new(client: Arc<dyn CatalogClient>, cache: Arc<ResponseCache>) -> Self {
        Self { client, cache }
    }

    pub fn client(&self) -> &Arc<dyn CatalogClient> { &self.client }
    pub fn cache(&self) -> &Arc<ResponseCache> { &self.cache }

    /// All-or-nothing: any failed detail fails the whole slice.
    pub async fn load(&self, offset: u32, limit: u32) -> CatalogResult<Vec<CatalogRecord>> {
        let refs = self.client.fetch_page(offset, limit).await?;
        let mut out = Vec::with_capacity(refs.len());
        let mut misses = Vec::new();
        for r in &refs {
            match self.cache.get(&r.name) {
                Some(hit) => out.push(hit),
                None => misses.push(r.name.as_str()),
            }
        }
        let fetched = try_join_all(misses.iter().map(|name| async move {
            normalize_detail(self.client.fetch_detail(name).await?)
        }))
        .await?;
        debug!(offset, limit, cached = out.len(), fetched = fetched.len(), "loader: page resolved");
        if !fetched.is_empty() && self.cache.put_many(&fetched) == PersistOutcome::Cleared {
            debug!(offset, "loader: response cache cleared during persist; page kept in memory");
        }
        out.extend(fetched);
        Ok(out)
    }

    /// One record by name or decimal id. Name lookups consult the cache first.
    pub async fn detail(&self, name_or_id: &str) -> CatalogResult<CatalogRecord> {
        let (rec, fetched) = self.lookup(name_or_id).await?;
        if fetched {
            self.cache.put(&rec.name, rec.clone());
        }
        Ok(rec)
    }

    /// Resolve several names or ids concurrently. Results keep input order;
    /// newly fetched records are persisted in one batch.
    pub async fn resolve_many<'a, I>(&self, keys: I) -> Vec<CatalogResult<CatalogRecord>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let results = join_all(keys.into_iter().map(|k| self.lookup(k))).await;
        let fetched: Vec<CatalogRecord> = results
            .iter()
            .filter_map(|r| match r {
                Ok((rec, true)) => Some(rec.clone()),
                _ => None,
            })
            .collect();
        if !fetched.is_empty() && self.cache.put_many(&fetched) == PersistOutcome::Cleared {
            debug!(fetched = fetched.len(), "loader: response cache cleared during persist");
        }
        results.into_iter().map(|r| r.map(|(rec, _)| rec)).collect()
    }

    /// Cache-first lookup without persisting. The flag tells whether the
    /// record came from the network.
    async fn lookup(&self, name_or_id: &str) -> CatalogResult<(CatalogRecord, bool)> {
        let key = name_or_id.trim().to_lowercase();
        if key.parse::<u32>().is_err() {
            if let Some(hit) = self.cache.get(&key) {
                return Ok((hit, false));
            }
        }
        let rec = normalize_detail(self.client.fetch_detail(&key).await?)?;
        Ok((rec, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use dex_core::StorageError;
    use dex_persist::{MemoryStorage, Storage};
    use dex_remote::MockCatalog;

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
    async fn resolve_many_persists_once() {
        let storage = Arc::new(CountingStorage::default());
        let mock = Arc::new(MockCatalog::synthetic(40));
        let loader = PageLoader::new(mock.clone(), Arc::new(ResponseCache::new(storage.clone())));

        let names: Vec<String> = (1..=20).map(|i| format!("species{i}")).collect();
        let out = loader.resolve_many(names.iter().map(String::as_str)).await;
        assert_eq!(out.len(), 20);
        assert_eq!(out[6].as_ref().map(|r| r.id).ok(), Some(7));
        assert_eq!(storage.writes.load(Ordering::SeqCst), 1);
        assert_eq!(loader.cache().len(), 20);

        // all hits: nothing fetched, nothing written
        loader.resolve_many(names.iter().map(String::as_str)).await;
        assert_eq!(storage.writes.load(Ordering::SeqCst), 1);
        assert_eq!(mock.calls(&mock.detail_calls), 20);
    }

    #[tokio::test]
    async fn resolve_many_keeps_failures_in_place() {
        let mock = Arc::new(MockCatalog::synthetic(10));
        mock.fail_detail("species2");
        let loader = PageLoader::new(mock, Arc::new(ResponseCache::in_memory()));
        let out = loader.resolve_many(["species1", "species2", "3"]).await;
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
        assert_eq!(out[2].as_ref().map(|r| r.name.as_str()).ok(), Some("species3"));
        assert_eq!(loader.cache().len(), 2);
    }
}
