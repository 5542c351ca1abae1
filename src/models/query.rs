//! Search queries and the raw pages they produce.

use serde_json::Value;
use std::fmt;
use url::Url;

use crate::sources::SourceError;

/// Parameter carrying the service credential; never shown in logs
pub const API_KEY_PARAM: &str = "api_key";

/// Parameter carrying the result window size
pub const PAGE_SIZE_PARAM: &str = "num";

/// Key of the pagination descriptor in a search response
const PAGINATION_KEY: &str = "serpapi_pagination";

/// An ordered set of named search parameters.
///
/// Setting a parameter that is already present replaces its value in place, so
/// merging a continuation keeps the original parameter order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: Vec<(String, String)>,
}

impl Query {
    /// Create an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a query for a search engine
    pub fn engine(engine: &str) -> Self {
        Self::new().param("engine", engine)
    }

    /// Builder-style [`Query::set`]
    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a parameter, replacing an existing value
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.params.push((name.to_string(), value)),
        }
    }

    /// Get a parameter value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a parameter is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All parameters in insertion order
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Apply request defaults: the credential and the page size.
    ///
    /// Explicit values already present in the query win.
    pub fn with_defaults(&self, api_key: Option<&str>, page_size: usize) -> Result<Self, SourceError> {
        let mut query = self.clone();
        if !query.contains(API_KEY_PARAM) {
            let key = api_key.filter(|k| !k.is_empty()).ok_or_else(|| {
                SourceError::InvalidRequest(
                    "no search credential configured (set SERP_API_KEY)".to_string(),
                )
            })?;
            query.set(API_KEY_PARAM, key);
        }
        if !query.contains(PAGE_SIZE_PARAM) {
            query.set(PAGE_SIZE_PARAM, page_size.to_string());
        }
        Ok(query)
    }

    /// Merge the query parameters of a continuation link into this query
    pub fn merge_continuation(&mut self, next: &str) -> Result<(), SourceError> {
        let url = Url::parse(next).map_err(|e| {
            SourceError::Parse(format!("invalid continuation link `{}`: {}", next, e))
        })?;
        for (name, value) in url.query_pairs() {
            self.set(&name, value.into_owned());
        }
        Ok(())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: Vec<String> = self
            .params
            .iter()
            .filter(|(k, _)| k != API_KEY_PARAM)
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", shown.join("&"))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query({})", self)
    }
}

/// The raw response for one query step.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    raw: Value,
}

impl ResultPage {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// Error reported by the service, if any
    pub fn error(&self) -> Option<String> {
        match self.raw.get("error") {
            None | Some(Value::Null) => None,
            Some(Value::String(message)) => Some(message.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    /// Items listed under `key`
    pub fn items(&self, key: &str) -> Result<Vec<Value>, SourceError> {
        match self.raw.get(key) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(SourceError::Parse(format!("`{}` is not a list", key))),
            None => Err(SourceError::Parse(format!(
                "response has no `{}` items",
                key
            ))),
        }
    }

    /// Continuation link, present while more results are available
    pub fn next_link(&self) -> Option<&str> {
        self.raw
            .get(PAGINATION_KEY)
            .and_then(|p| p.get("next"))
            .and_then(Value::as_str)
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_replaces_in_place() {
        let mut query = Query::engine("google_scholar").param("cites", "123");
        query.set("engine", "google_scholar_author");

        assert_eq!(query.params().len(), 2);
        assert_eq!(query.params()[0].1, "google_scholar_author");
        assert_eq!(query.get("cites"), Some("123"));
    }

    #[test]
    fn test_defaults_do_not_override() {
        let query = Query::engine("google_scholar").param("num", "5");
        let full = query.with_defaults(Some("secret"), 20).unwrap();

        assert_eq!(full.get("num"), Some("5"));
        assert_eq!(full.get("api_key"), Some("secret"));
    }

    #[test]
    fn test_defaults_require_credential() {
        let query = Query::engine("google_scholar");
        let err = query.with_defaults(None, 20).unwrap_err();
        assert!(matches!(err, SourceError::InvalidRequest(_)));

        // An explicit credential is enough
        let query = query.param("api_key", "inline");
        assert!(query.with_defaults(None, 20).is_ok());
    }

    #[test]
    fn test_merge_continuation() {
        let mut query = Query::engine("google_scholar_author")
            .param("author_id", "abc")
            .param("api_key", "secret");
        query
            .merge_continuation(
                "https://serpapi.com/search.json?author_id=abc&cstart=20&engine=google_scholar_author&pagesize=20",
            )
            .unwrap();

        assert_eq!(query.get("cstart"), Some("20"));
        assert_eq!(query.get("api_key"), Some("secret"));
        assert_eq!(query.params()[0].0, "engine");
    }

    #[test]
    fn test_display_hides_credential() {
        let query = Query::engine("google_scholar").param("api_key", "secret");
        assert_eq!(query.to_string(), "engine=google_scholar");
        assert!(!format!("{:?}", query).contains("secret"));
    }

    #[test]
    fn test_result_page_accessors() {
        let page = ResultPage::new(json!({
            "articles": [{"title": "A"}],
            "serpapi_pagination": {"next": "https://serpapi.com/search.json?start=20"}
        }));

        assert_eq!(page.items("articles").unwrap().len(), 1);
        assert!(matches!(page.items("organic_results"), Err(SourceError::Parse(_))));
        assert_eq!(page.next_link(), Some("https://serpapi.com/search.json?start=20"));
        assert_eq!(page.error(), None);

        let failed = ResultPage::new(json!({"error": "Invalid API key."}));
        assert_eq!(failed.error().as_deref(), Some("Invalid API key."));
    }
}
