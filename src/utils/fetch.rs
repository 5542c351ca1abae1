//! Paginated fetching against the search service.

use serde_json::Value;
use std::ops::Range;
use std::sync::Arc;

use crate::models::{Query, ResultPage};
use crate::sources::{SearchService, SourceError};

/// Default result window size
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Issues queries and follows continuation links until exhausted.
///
/// Errors reported by the service are fatal and never retried: the first page
/// carrying an `error` field aborts the fetch without handing that page on.
#[derive(Debug, Clone)]
pub struct PaginatedFetcher {
    service: Arc<dyn SearchService>,
    api_key: Option<String>,
    page_size: usize,
}

impl PaginatedFetcher {
    pub fn new(service: Arc<dyn SearchService>, api_key: Option<String>) -> Self {
        Self {
            service,
            api_key,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the result window size requested per page
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Perform exactly one fetch
    pub async fn fetch_single(&self, query: &Query) -> Result<ResultPage, SourceError> {
        let request = query.with_defaults(self.api_key.as_deref(), self.page_size)?;
        self.issue(&request).await
    }

    /// Fetch every page of `query`, collecting the items listed under `key`.
    ///
    /// `items` seeds the accumulator and `continuation` the first request, which
    /// lets a half-finished listing resume where it stopped. `on_page` sees each
    /// raw page together with the index range its items occupy in the
    /// accumulator, before the next page is requested.
    pub async fn fetch_pages<F>(
        &self,
        query: &Query,
        key: &str,
        mut items: Vec<Value>,
        continuation: Option<&str>,
        mut on_page: F,
    ) -> Result<Vec<Value>, SourceError>
    where
        F: FnMut(&ResultPage, Range<usize>) -> Result<(), SourceError>,
    {
        let mut request = query.with_defaults(self.api_key.as_deref(), self.page_size)?;
        if let Some(next) = continuation {
            request.merge_continuation(next)?;
        }

        loop {
            let page = self.issue(&request).await?;
            let new_items = page.items(key)?;
            let start = items.len();
            let received = new_items.len();
            items.extend(new_items);
            on_page(&page, start..items.len())?;

            match page.next_link() {
                Some(_) if received == 0 => {
                    tracing::warn!(
                        "Empty page with a continuation for {}; stopping pagination",
                        request
                    );
                    break;
                }
                Some(next) => request.merge_continuation(next)?,
                None => break,
            }
        }

        Ok(items)
    }

    async fn issue(&self, request: &Query) -> Result<ResultPage, SourceError> {
        tracing::debug!("Querying {}: {}", self.service.id(), request);
        let page = ResultPage::new(self.service.search(request).await?);
        if let Some(error) = page.error() {
            return Err(SourceError::RemoteService(error));
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSearchService;
    use serde_json::json;

    fn fetcher(service: &Arc<MockSearchService>) -> PaginatedFetcher {
        PaginatedFetcher::new(service.clone(), Some("test-key".to_string()))
    }

    #[tokio::test]
    async fn test_follows_continuations() {
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar").param("cites", "42");
        service.respond(
            &query,
            json!({
                "organic_results": [{"n": 0}, {"n": 1}],
                "serpapi_pagination": {"next": "https://serpapi.com/search.json?cites=42&start=2"}
            }),
        );
        service.respond(
            &query.clone().param("start", "2"),
            json!({"organic_results": [{"n": 2}]}),
        );

        let mut ranges = Vec::new();
        let items = fetcher(&service)
            .fetch_pages(&query, "organic_results", Vec::new(), None, |_, range| {
                ranges.push(range);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(items, vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]);
        assert_eq!(ranges, vec![0..2, 2..3]);

        let calls = service.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].get("api_key"), Some("test-key"));
        assert_eq!(calls[0].get("num"), Some("20"));
    }

    #[tokio::test]
    async fn test_service_error_is_fatal() {
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar_author").param("author_id", "x");
        service.respond(&query, json!({"error": "Your account has run out of searches."}));

        let mut seen = 0;
        let err = fetcher(&service)
            .fetch_pages(&query, "articles", Vec::new(), None, |_, _| {
                seen += 1;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::RemoteService(ref m) if m.contains("run out")));
        assert_eq!(seen, 0);
    }

    #[tokio::test]
    async fn test_empty_page_stops_pagination() {
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar").param("cites", "42");
        let next = json!({"next": "https://serpapi.com/search.json?cites=42&start=1"});
        service.respond(
            &query,
            json!({"organic_results": [{"n": 0}], "serpapi_pagination": next.clone()}),
        );
        service.respond(
            &query.clone().param("start", "1"),
            json!({"organic_results": [], "serpapi_pagination": next}),
        );

        let mut ranges = Vec::new();
        let items = fetcher(&service)
            .fetch_pages(&query, "organic_results", Vec::new(), None, |_, range| {
                ranges.push(range);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(items, vec![json!({"n": 0})]);
        assert_eq!(ranges, vec![0..1, 1..1]);
        assert_eq!(service.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_resume_from_continuation() {
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar_author").param("author_id", "x");
        service.respond(
            &query.clone().param("cstart", "1"),
            json!({"articles": [{"n": 1}]}),
        );

        let items = fetcher(&service)
            .fetch_pages(
                &query,
                "articles",
                vec![json!({"n": 0})],
                Some("https://serpapi.com/search.json?author_id=x&cstart=1"),
                |_, range| {
                    assert_eq!(range, 1..2);
                    Ok(())
                },
            )
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(service.calls().len(), 1);
    }
}
