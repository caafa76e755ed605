//! Dex remote: the catalog REST endpoints and nothing else.
//!
//! No retries here; retry policy belongs to callers.

#![forbid(unsafe_code)]

use std::time::Duration;

use dex_core::normalize::{NamedRef, RawDetail};
use dex_core::CatalogResult;

mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use http::HttpCatalogClient;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockCatalog;

pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";

/// Endpoint shapes of the remote catalog.
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// One slice of the list endpoint.
    async fn fetch_page(&self, offset: u32, limit: u32) -> CatalogResult<Vec<NamedRef>>;

    /// Full detail for a name or decimal id.
    async fn fetch_detail(&self, name_or_id: &str) -> CatalogResult<RawDetail>;

    /// Every `{name, url}` reference of the catalog in one request.
    async fn fetch_full_index(&self) -> CatalogResult<Vec<NamedRef>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Per-request timeout. `None` leaves requests unbounded.
    pub timeout: Option<Duration>,
    /// `limit` used for the full-index request.
    pub index_limit: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string(), timeout: None, index_limit: dex_core::CATALOG_SIZE }
    }
}

impl RemoteConfig {
    /// Defaults overridden by `DEX_BASE_URL`, `DEX_HTTP_TIMEOUT_SECS`, `DEX_INDEX_LIMIT`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("DEX_BASE_URL") {
            if !url.trim().is_empty() {
                cfg.base_url = url;
            }
        }
        cfg.timeout = std::env::var("DEX_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        if let Some(n) = std::env::var("DEX_INDEX_LIMIT").ok().and_then(|s| s.parse().ok()) {
            cfg.index_limit = n;
        }
        cfg
    }
}
