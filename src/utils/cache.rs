//! Durable, resumable caching of search results.
//!
//! The cache is the only arbiter of "already fetched". Results live in a
//! directory tree whose paths derive deterministically from the query being
//! answered, so a later run finds them without any index.
//!
//! # Cache Structure
//!
//! ```text
//! <location>/
//!   articles_0-20.yaml        paginated: one raw response per page, named by
//!   articles_20-37.yaml       the [start-end) range its items occupy
//! <location>.yaml             single-shot: the raw response
//! <location>.html             rendered pages, stored verbatim
//! ```
//!
//! Running two crawls against the same directory at the same time is not
//! supported; no locking is performed.

use regex::Regex;
use serde_json::Value;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::ResultPage;
use crate::models::Query;
use crate::sources::{PageFetcher, SourceError};
use crate::utils::fetch::PaginatedFetcher;
use crate::utils::store::{load_yaml, save_bytes, save_yaml};

/// What a cache lookup produced
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutput {
    /// Items extracted under the requested key
    Items(Vec<Value>),

    /// The full raw response
    Document(Value),
}

/// State of the persisted pages for one key
enum CachedPages {
    /// Nothing usable on disk
    Missing,

    /// The last page has no continuation
    Complete(Vec<Value>),

    /// The listing stopped early; `next` continues it
    Partial { items: Vec<Value>, next: String },
}

/// File name of a persisted page
pub fn page_file_name(key: &str, range: &Range<usize>) -> String {
    format!("{}_{}-{}.yaml", key, range.start, range.end)
}

/// Cache service for search results and rendered pages
#[derive(Debug, Clone)]
pub struct ResultCache {
    fetcher: PaginatedFetcher,
    pages: Arc<dyn PageFetcher>,
}

impl ResultCache {
    pub fn new(fetcher: PaginatedFetcher, pages: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher, pages }
    }

    /// Return the results of `query`, fetching only what is not persisted yet.
    ///
    /// With a `key` and `paginate`, `location` is a directory of page files.
    /// Otherwise `location` is a single file holding the raw response; without
    /// a `key` pagination is disabled and the raw response is the result.
    pub async fn fetch_or_load(
        &self,
        query: &Query,
        key: Option<&str>,
        paginate: bool,
        location: &Path,
        overwrite: bool,
    ) -> Result<FetchOutput, SourceError> {
        match key {
            Some(key) if paginate => self
                .fetch_items(query, key, location, overwrite)
                .await
                .map(FetchOutput::Items),
            Some(key) => {
                let document = self.fetch_document(query, location, overwrite).await?;
                ResultPage::new(document).items(key).map(FetchOutput::Items)
            }
            None => {
                if paginate {
                    tracing::debug!("No items key for {}; pagination disabled", query);
                }
                self.fetch_document(query, location, overwrite)
                    .await
                    .map(FetchOutput::Document)
            }
        }
    }

    /// Paginated items under `key`, persisted page by page in `location`
    pub async fn fetch_items(
        &self,
        query: &Query,
        key: &str,
        location: &Path,
        overwrite: bool,
    ) -> Result<Vec<Value>, SourceError> {
        let (items, continuation) = if overwrite {
            remove_pages(location, key)?;
            (Vec::new(), None)
        } else {
            match load_pages(location, key)? {
                CachedPages::Complete(items) => {
                    tracing::debug!(
                        "Cache HIT for {} ({} {})",
                        location.display(),
                        items.len(),
                        key
                    );
                    return Ok(items);
                }
                CachedPages::Partial { items, next } => {
                    tracing::info!(
                        "Resuming {} after {} cached {}",
                        location.display(),
                        items.len(),
                        key
                    );
                    (items, Some(next))
                }
                CachedPages::Missing => {
                    tracing::debug!("Cache MISS for {}", location.display());
                    // Unusable leftovers must not mix with the fresh pages
                    remove_pages(location, key)?;
                    (Vec::new(), None)
                }
            }
        };

        self.fetcher
            .fetch_pages(query, key, items, continuation.as_deref(), |page, range| {
                save_yaml(page.raw(), &location.join(page_file_name(key, &range)))
            })
            .await
    }

    /// Single-shot raw response, persisted verbatim at `location`
    pub async fn fetch_document(
        &self,
        query: &Query,
        location: &Path,
        overwrite: bool,
    ) -> Result<Value, SourceError> {
        if !overwrite && location.is_file() {
            tracing::debug!("Cache HIT for {}", location.display());
            return load_yaml(location);
        }

        let page = self.fetcher.fetch_single(query).await?;
        save_yaml(page.raw(), location)?;
        Ok(page.into_raw())
    }

    /// Rendered page behind `url`, persisted verbatim at `location`
    pub async fn fetch_page(
        &self,
        url: &str,
        location: &Path,
        overwrite: bool,
    ) -> Result<Vec<u8>, SourceError> {
        if !overwrite && location.is_file() {
            tracing::debug!("Cache HIT for {}", location.display());
            return Ok(fs::read(location)?);
        }

        let content = self.pages.fetch_page(url).await?;
        save_bytes(&content, location)?;
        tracing::debug!("Saved {}", location.display());
        Ok(content)
    }

    /// Delete a cached file or directory tree.
    ///
    /// Returns whether anything was removed.
    pub fn invalidate(path: &Path) -> Result<bool, SourceError> {
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.is_file() {
            fs::remove_file(path)?;
        } else {
            return Ok(false);
        }
        tracing::info!("Invalidated {}", path.display());
        Ok(true)
    }
}

/// Page files for `key` in `location`, ordered by start index
fn page_files(location: &Path, key: &str) -> Result<Vec<(Range<usize>, PathBuf)>, SourceError> {
    if !location.is_dir() {
        return Ok(Vec::new());
    }

    let pattern = Regex::new(&format!(r"^{}_(\d+)-(\d+)\.yaml$", regex::escape(key)))
        .map_err(|e| SourceError::Other(e.to_string()))?;

    let mut files = Vec::new();
    for entry in fs::read_dir(location)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(caps) = pattern.captures(name) {
            let (Ok(start), Ok(end)) = (caps[1].parse::<usize>(), caps[2].parse::<usize>()) else {
                continue;
            };
            files.push((start..end, path));
        }
    }
    files.sort_by_key(|(range, _)| (range.start, range.end));
    Ok(files)
}

fn load_pages(location: &Path, key: &str) -> Result<CachedPages, SourceError> {
    let files = page_files(location, key)?;
    if files.is_empty() {
        return Ok(CachedPages::Missing);
    }

    let mut items = Vec::new();
    let mut next = None;
    for (range, path) in files {
        let exhausted = range.is_empty();
        if range.start != items.len() {
            tracing::warn!(
                "Cached pages in {} are not contiguous at {}; refetching",
                location.display(),
                range.start
            );
            return Ok(CachedPages::Missing);
        }

        let page = ResultPage::new(load_yaml(&path)?);
        let page_items = page.items(key)?;
        if page_items.len() != range.len() {
            tracing::warn!(
                "{} holds {} items instead of {}; refetching",
                path.display(),
                page_items.len(),
                range.len()
            );
            return Ok(CachedPages::Missing);
        }
        items.extend(page_items);
        // An empty page ends pagination even when it carries a continuation
        next = page
            .next_link()
            .filter(|_| !exhausted)
            .map(str::to_string);
    }

    Ok(match next {
        Some(next) => CachedPages::Partial { items, next },
        None => CachedPages::Complete(items),
    })
}

fn remove_pages(location: &Path, key: &str) -> Result<(), SourceError> {
    for (_, path) in page_files(location, key)? {
        fs::remove_file(&path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSearchService;
    use serde_json::json;
    use tempfile::tempdir;

    fn cache(service: &Arc<MockSearchService>) -> ResultCache {
        let fetcher = PaginatedFetcher::new(service.clone(), Some("test-key".to_string()));
        ResultCache::new(fetcher, service.clone())
    }

    fn items(range: Range<usize>) -> Vec<Value> {
        range.map(|i| json!({"title": format!("Article {}", i)})).collect()
    }

    /// Three pages of 5/5/2 articles
    fn script_pages(service: &MockSearchService, query: &Query) {
        service.respond(
            query,
            json!({
                "articles": items(0..5),
                "serpapi_pagination": {"next": "https://serpapi.com/search.json?author_id=a&cstart=5"}
            }),
        );
        service.respond(
            &query.clone().param("cstart", "5"),
            json!({
                "articles": items(5..10),
                "serpapi_pagination": {"next": "https://serpapi.com/search.json?author_id=a&cstart=10"}
            }),
        );
        service.respond(
            &query.clone().param("cstart", "10"),
            json!({"articles": items(10..12)}),
        );
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_paginated_pages_are_persisted_by_range() {
        let dir = tempdir().unwrap();
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar_author").param("author_id", "a");
        script_pages(&service, &query);

        let fetched = cache(&service)
            .fetch_items(&query, "articles", dir.path(), false)
            .await
            .unwrap();

        assert_eq!(fetched, items(0..12));
        assert_eq!(
            file_names(dir.path()),
            vec!["articles_0-5.yaml", "articles_10-12.yaml", "articles_5-10.yaml"]
        );

        // The raw response is persisted, not just the items
        let raw: Value = load_yaml(&dir.path().join("articles_0-5.yaml")).unwrap();
        assert!(raw.get("serpapi_pagination").is_some());
    }

    #[tokio::test]
    async fn test_cached_pages_reload_in_order_without_calls() {
        let dir = tempdir().unwrap();
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar_author").param("author_id", "a");
        script_pages(&service, &query);
        let cache = cache(&service);

        let first = cache
            .fetch_items(&query, "articles", dir.path(), false)
            .await
            .unwrap();
        let second = cache
            .fetch_items(&query, "articles", dir.path(), false)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(service.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_overwrite_refetches_once() {
        let dir = tempdir().unwrap();
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar_author").param("author_id", "a");
        script_pages(&service, &query);
        let cache = cache(&service);

        cache
            .fetch_items(&query, "articles", dir.path(), false)
            .await
            .unwrap();
        // A stale page from an older, longer listing
        save_yaml(&json!({"articles": items(12..14)}), &dir.path().join("articles_12-14.yaml"))
            .unwrap();

        let fetched = cache
            .fetch_items(&query, "articles", dir.path(), true)
            .await
            .unwrap();

        assert_eq!(fetched.len(), 12);
        assert_eq!(service.calls().len(), 6);
        assert_eq!(file_names(dir.path()).len(), 3);
    }

    #[tokio::test]
    async fn test_empty_trailing_page_completes_listing() {
        let dir = tempdir().unwrap();
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar").param("cites", "42");
        let next = json!({"next": "https://serpapi.com/search.json?cites=42&start=2"});
        service.respond(
            &query,
            json!({"organic_results": items(0..2), "serpapi_pagination": next.clone()}),
        );
        service.respond(
            &query.clone().param("start", "2"),
            json!({"organic_results": [], "serpapi_pagination": next}),
        );
        let cache = cache(&service);

        for _ in 0..3 {
            let fetched = cache
                .fetch_items(&query, "organic_results", dir.path(), false)
                .await
                .unwrap();
            assert_eq!(fetched, items(0..2));
        }

        assert_eq!(service.calls().len(), 2);
        assert_eq!(
            file_names(dir.path()),
            vec!["organic_results_0-2.yaml", "organic_results_2-2.yaml"]
        );
    }

    #[tokio::test]
    async fn test_interrupted_listing_resumes() {
        let dir = tempdir().unwrap();
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar_author").param("author_id", "a");
        script_pages(&service, &query);

        // Only the first page survived an earlier run
        save_yaml(
            &json!({
                "articles": items(0..5),
                "serpapi_pagination": {"next": "https://serpapi.com/search.json?author_id=a&cstart=5"}
            }),
            &dir.path().join("articles_0-5.yaml"),
        )
        .unwrap();

        let fetched = cache(&service)
            .fetch_items(&query, "articles", dir.path(), false)
            .await
            .unwrap();

        assert_eq!(fetched, items(0..12));
        let calls = service.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].get("cstart"), Some("5"));
    }

    #[tokio::test]
    async fn test_gap_in_pages_is_a_miss() {
        let dir = tempdir().unwrap();
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar_author").param("author_id", "a");
        script_pages(&service, &query);

        save_yaml(&json!({"articles": items(5..10)}), &dir.path().join("articles_5-10.yaml"))
            .unwrap();

        let fetched = cache(&service)
            .fetch_items(&query, "articles", dir.path(), false)
            .await
            .unwrap();

        assert_eq!(fetched.len(), 12);
        assert_eq!(service.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_single_document() {
        let dir = tempdir().unwrap();
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar_author").param("author_id", "b");
        let profile = json!({"author": {"name": "B Lee"}, "articles": [{"title": "x"}]});
        service.respond(&query, profile.clone());
        let cache = cache(&service);
        let location = dir.path().join("b.yaml");

        let output = cache
            .fetch_or_load(&query, None, true, &location, false)
            .await
            .unwrap();
        assert_eq!(output, FetchOutput::Document(profile.clone()));

        // Keyed single-shot lookups extract from the same file
        let output = cache
            .fetch_or_load(&query, Some("articles"), false, &location, false)
            .await
            .unwrap();
        assert_eq!(output, FetchOutput::Items(vec![json!({"title": "x"})]));
        assert_eq!(service.calls().len(), 1);
        assert_eq!(service.calls()[0].get("num"), Some("20"));
    }

    #[tokio::test]
    async fn test_failed_fetch_writes_nothing() {
        let dir = tempdir().unwrap();
        let service = Arc::new(MockSearchService::new());
        let query = Query::engine("google_scholar").param("q", "x");
        service.respond(&query, json!({"error": "Invalid API key."}));
        let location = dir.path().join("article.yaml");

        let err = cache(&service)
            .fetch_document(&query, &location, false)
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::RemoteService(_)));
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_rendered_pages_are_cached() {
        let dir = tempdir().unwrap();
        let service = Arc::new(MockSearchService::new());
        service.serve_page("https://serpapi.com/searches/1.html", "<html>1</html>");
        let cache = cache(&service);
        let location = dir.path().join("article.html");

        for _ in 0..2 {
            let page = cache
                .fetch_page("https://serpapi.com/searches/1.html", &location, false)
                .await
                .unwrap();
            assert_eq!(page, b"<html>1</html>");
        }
        assert_eq!(service.page_calls().len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let dir = tempdir().unwrap();
        let author_dir = dir.path().join("author");
        save_yaml(&json!({"a": 1}), &author_dir.join("results.yaml")).unwrap();

        assert!(ResultCache::invalidate(&author_dir).unwrap());
        assert!(!author_dir.exists());
        assert!(!ResultCache::invalidate(&author_dir).unwrap());
    }
}
