//! Mock services for testing purposes.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::models::Query;
use crate::sources::{PageFetcher, SearchService, SourceError};

/// A mock search service that replays scripted responses.
///
/// A scripted response answers every request containing all of its parameters;
/// when several match, the one with the most parameters wins. Requests and page
/// downloads are recorded for later inspection.
#[derive(Debug, Default)]
pub struct MockSearchService {
    responses: Mutex<Vec<(Query, Value)>>,
    pages: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<Query>>,
    page_calls: Mutex<Vec<String>>,
}

impl MockSearchService {
    /// Create a new mock service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests matching `query` with `response`.
    pub fn respond(&self, query: &Query, response: Value) {
        let mut guard = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.retain(|(q, _)| q != query);
        guard.push((query.clone(), response));
    }

    /// Serve `content` for downloads of `url`.
    pub fn serve_page(&self, url: &str, content: impl Into<Vec<u8>>) {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), content.into());
    }

    /// Search requests received so far.
    pub fn calls(&self) -> Vec<Query> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Page downloads received so far.
    pub fn page_calls(&self) -> Vec<String> {
        self.page_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget recorded calls, keeping the script.
    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.page_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn matches(scripted: &Query, request: &Query) -> bool {
    scripted
        .params()
        .iter()
        .all(|(name, value)| request.get(name) == Some(value.as_str()))
}

#[async_trait]
impl SearchService for MockSearchService {
    fn id(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &Query) -> Result<Value, SourceError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.clone());

        let guard = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .iter()
            .filter(|(scripted, _)| matches(scripted, query))
            .max_by_key(|(scripted, _)| scripted.params().len())
            .map(|(_, response)| response.clone())
            .ok_or_else(|| SourceError::Other(format!("no scripted response for {}", query)))
    }
}

#[async_trait]
impl PageFetcher for MockSearchService {
    async fn fetch_page(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        self.page_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .ok_or_else(|| SourceError::Network(format!("{} returned status 404", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_most_specific_response_wins() {
        let service = MockSearchService::new();
        let base = Query::engine("google_scholar").param("cites", "1");
        service.respond(&base, json!({"page": 1}));
        service.respond(&base.clone().param("start", "20"), json!({"page": 2}));

        let first = tokio_test::block_on(service.search(&base.clone().param("num", "20"))).unwrap();
        let second = tokio_test::block_on(service.search(&base.clone().param("start", "20"))).unwrap();

        assert_eq!(first, json!({"page": 1}));
        assert_eq!(second, json!({"page": 2}));
        assert_eq!(service.calls().len(), 2);
    }

    #[test]
    fn test_unscripted_requests_fail() {
        let service = MockSearchService::new();
        let err = tokio_test::block_on(service.search(&Query::engine("google_scholar"))).unwrap_err();
        assert!(matches!(err, SourceError::Other(_)));

        let err = tokio_test::block_on(service.fetch_page("https://example.org/missing")).unwrap_err();
        assert!(matches!(err, SourceError::Network(_)));
        assert_eq!(service.page_calls(), vec!["https://example.org/missing".to_string()]);
    }
}
