use std::time::Instant;

use dex_core::normalize::{NamedRef, RawDetail, RawPage};
use dex_core::{CatalogError, CatalogResult};
use metrics::{counter, histogram};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{CatalogClient, RemoteConfig};

/// `reqwest`-backed client for the public catalog API.
pub struct HttpCatalogClient {
    client: Client,
    base_url: String,
    index_limit: u32,
}

impl HttpCatalogClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &RemoteConfig) -> CatalogResult<Self> {
        let mut builder = Client::builder().user_agent(concat!("dex/", env!("CARGO_PKG_VERSION")));
        if let Some(t) = config.timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| CatalogError::network(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            index_limit: config.index_limit,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, endpoint: &'static str) -> CatalogResult<T> {
        let started = Instant::now();
        debug!(url = %url, endpoint, "remote: GET");
        counter!("remote_requests_total", 1u64, "endpoint" => endpoint);
        let res = self.send(url).await;
        histogram!("remote_request_ms", started.elapsed().as_secs_f64() * 1000.0, "endpoint" => endpoint);
        match res {
            Ok(resp) => resp
                .json::<T>()
                .await
                .map_err(|e| CatalogError::malformed(format!("decoding {url}: {e}"))),
            Err(e) => {
                counter!("remote_errors_total", 1u64, "endpoint" => endpoint);
                if !e.is_not_found() {
                    warn!(url = %url, error = %e, "remote: request failed");
                }
                Err(e)
            }
        }
    }

    async fn send(&self, url: &str) -> CatalogResult<reqwest::Response> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::network(format!("GET {url}: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            Err(CatalogError::status(status.as_u16(), format!("GET {url}: {status}")))
        }
    }
}

#[async_trait::async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_page(&self, offset: u32, limit: u32) -> CatalogResult<Vec<NamedRef>> {
        let url = format!("{}/pokemon?limit={limit}&offset={offset}", self.base_url);
        let page: RawPage = self.get_json(&url, "page").await?;
        Ok(page.results)
    }

    async fn fetch_detail(&self, name_or_id: &str) -> CatalogResult<RawDetail> {
        let key = name_or_id.trim().to_lowercase();
        if key.is_empty() || key.contains('/') {
            return Err(CatalogError::malformed(format!("invalid lookup key: {name_or_id:?}")));
        }
        let url = format!("{}/pokemon/{key}", self.base_url);
        self.get_json(&url, "detail").await
    }

    async fn fetch_full_index(&self) -> CatalogResult<Vec<NamedRef>> {
        let url = format!("{}/pokemon?limit={}&offset=0", self.base_url, self.index_limit);
        let page: RawPage = self.get_json(&url, "index").await?;
        Ok(page.results)
    }
}
