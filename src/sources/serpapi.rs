//! SerpApi client for the Google Scholar engines.
//!
//! Google Scholar has no public API; SerpApi renders the result pages and
//! returns them as JSON. Each search response also links to the rendered HTML
//! (`search_metadata.raw_html_file`), which this client downloads as well.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::models::Query;
use crate::sources::{PageFetcher, SearchService, SourceError};
use crate::utils::HttpClient;

/// Default SerpApi search endpoint
pub const SERPAPI_URL: &str = "https://serpapi.com/search.json";

/// SerpApi search service and page fetcher
#[derive(Debug, Clone)]
pub struct SerpApiClient {
    client: Arc<HttpClient>,
    page_client: Arc<HttpClient>,
    base_url: String,
}

impl SerpApiClient {
    /// Create a client with separate bounds for searches and page downloads
    pub fn new(search_timeout: Duration, page_timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: Arc::new(HttpClient::new(search_timeout)?),
            page_client: Arc::new(HttpClient::new(page_timeout)?),
            base_url: SERPAPI_URL.to_string(),
        })
    }

    /// Point the client at another endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchService for SerpApiClient {
    fn id(&self) -> &str {
        "serpapi"
    }

    async fn search(&self, query: &Query) -> Result<Value, SourceError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(query.params())
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to query SerpApi: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read response: {}", e)))?;

        // SerpApi reports most failures as a JSON body with an `error` field,
        // whatever the status code
        match serde_json::from_str::<Value>(&text) {
            Ok(document) => Ok(document),
            Err(_) if !status.is_success() => Err(SourceError::RemoteService(format!(
                "SerpApi returned status: {}",
                status
            ))),
            Err(e) => Err(SourceError::Parse(format!("SerpApi response: {}", e))),
        }
    }
}

#[async_trait]
impl PageFetcher for SerpApiClient {
    async fn fetch_page(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self
            .page_client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to download {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Network(format!(
                "{} returned status: {}",
                url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
