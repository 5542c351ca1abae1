//! Typed entities of the citation graph: author → articles → citations → authors.
//!
//! Items arrive from the search service as loosely-typed JSON. Each entity has a
//! `from_item`/`from_document` constructor that validates the required fields at
//! the fetch boundary and fails with [`SourceError::Parse`]. Fields the crawler
//! does not interpret are kept verbatim in `extra`, so persisted records stay
//! faithful to the service response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sources::SourceError;

/// Convert a raw JSON value into a typed entity
fn parse_value<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, SourceError> {
    serde_json::from_value(value).map_err(|e| SourceError::Parse(format!("{}: {}", what, e)))
}

/// A published work owned by the crawled author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,

    /// Stable citation identifier, e.g. `"AbCdEf:u5HHmVD_uO8C"`
    pub citation_id: String,

    #[serde(default)]
    pub cited_by: CitedBy,

    /// Works citing this article; only populated when the citation count is nonzero
    #[serde(default)]
    pub citations: Vec<Citation>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Article {
    pub fn from_item(item: Value) -> Result<Self, SourceError> {
        parse_value(item, "article")
    }

    /// Citation count declared by the service
    pub fn declared_citations(&self) -> usize {
        self.cited_by.value.unwrap_or(0) as usize
    }

    /// Last `:`-separated segment of the citation identifier
    pub fn short_id(&self) -> &str {
        self.citation_id
            .rsplit(':')
            .next()
            .unwrap_or(&self.citation_id)
    }
}

/// The "cited by" block of an article or inline link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitedBy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,

    /// Citation-group identifier: the key of "all works citing X"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cites_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A work citing an [`Article`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,

    pub result_id: String,

    /// Author preview as catalogued by the search engine (truncated)
    #[serde(default)]
    pub publication_info: PublicationInfo,

    #[serde(default)]
    pub inline_links: InlineLinks,

    /// Full author list recovered from the citing work's own result page
    #[serde(default)]
    pub authors: Vec<Author>,

    /// Cross-source inconsistencies; empty when both sources agree
    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Citation {
    pub fn from_item(item: Value) -> Result<Self, SourceError> {
        parse_value(item, "citation")
    }

    /// Names from the catalogued author preview
    pub fn partial_author_names(&self) -> Vec<&str> {
        self.publication_info
            .authors
            .iter()
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Citation-group identifier of the citing work itself
    pub fn cited_work_id(&self) -> Option<&str> {
        self.inline_links.cites_id.as_deref().or_else(|| {
            self.inline_links
                .cited_by
                .as_ref()
                .and_then(|c| c.cites_id.as_deref())
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default)]
    pub authors: Vec<AuthorRef>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An author entry of a catalogued author preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cites_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cited_by: Option<CitedBy>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An author of a citing work.
///
/// Authors are owned per citation; the same person citing twice appears twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Display name as printed on the result page
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Profile details, present when the identifier was resolvable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<AuthorProfile>,

    /// Lifetime citation count from the profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_citations: Option<u64>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author_id: None,
            link: None,
            profile: None,
            lifetime_citations: None,
        }
    }

    /// Attach the result of a profile lookup
    pub fn apply_profile(&mut self, response: ProfileResponse) {
        self.lifetime_citations = Some(response.lifetime_citations());
        self.profile = Some(response.author);
    }
}

/// Profile details of an author
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliations: Option<String>,

    /// Verification line, e.g. "Verified email at cs.ox.ac.uk"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of an author profile query
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub author: AuthorProfile,

    #[serde(default)]
    pub cited_by: Option<CitedByTable>,
}

impl ProfileResponse {
    pub fn from_document(document: Value) -> Result<Self, SourceError> {
        parse_value(document, "author profile")
    }

    /// All-time citations from the first row of the citation table; 0 without one
    pub fn lifetime_citations(&self) -> u64 {
        self.cited_by
            .as_ref()
            .and_then(|c| c.table.first())
            .and_then(|row| row.get("citations"))
            .and_then(|c| c.get("all"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CitedByTable {
    #[serde(default)]
    pub table: Vec<Value>,
}

/// Response of a single-work search, used to locate the rendered page
#[derive(Debug, Clone, Deserialize)]
pub struct SearchDocument {
    pub search_metadata: SearchMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchMetadata {
    /// Location of the rendered result page behind this response
    pub raw_html_file: String,
}

impl SearchDocument {
    pub fn from_document(document: Value) -> Result<Self, SourceError> {
        parse_value(document, "search metadata")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_article_from_item() {
        let article = Article::from_item(json!({
            "title": "Neural operators",
            "citation_id": "XyZ:u5HHmVD_uO8C",
            "year": "2021",
            "cited_by": {"value": 12, "cites_id": "1234"}
        }))
        .unwrap();

        assert_eq!(article.declared_citations(), 12);
        assert_eq!(article.short_id(), "u5HHmVD_uO8C");
        assert_eq!(article.cited_by.cites_id.as_deref(), Some("1234"));
        assert_eq!(article.extra.get("year"), Some(&json!("2021")));
    }

    #[test]
    fn test_article_without_citations() {
        let article = Article::from_item(json!({
            "title": "Preprint",
            "citation_id": "XyZ:abc",
            "cited_by": {"value": null}
        }))
        .unwrap();
        assert_eq!(article.declared_citations(), 0);
    }

    #[test]
    fn test_article_missing_title_is_parse_error() {
        let err = Article::from_item(json!({"citation_id": "XyZ:abc"})).unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_citation_cited_work_id_fallback() {
        let citation = Citation::from_item(json!({
            "title": "Follow-up",
            "result_id": "r1",
            "publication_info": {"authors": [{"name": "A Smith", "author_id": "a1"}]},
            "inline_links": {"cited_by": {"cites_id": "999", "total": 3}}
        }))
        .unwrap();

        assert_eq!(citation.cited_work_id(), Some("999"));
        assert_eq!(citation.partial_author_names(), vec!["A Smith"]);
        assert!(citation.warnings.is_empty());
    }

    #[test]
    fn test_profile_lifetime_citations() {
        let response = ProfileResponse::from_document(json!({
            "author": {"name": "Ada Lovelace", "email": "Verified email at ox.ac.uk"},
            "cited_by": {"table": [{"citations": {"all": 4200, "since_2019": 900}}]}
        }))
        .unwrap();
        assert_eq!(response.lifetime_citations(), 4200);

        let mut author = Author::new("A Lovelace");
        author.apply_profile(response);
        assert_eq!(author.lifetime_citations, Some(4200));
        assert_eq!(
            author.profile.unwrap().email.as_deref(),
            Some("Verified email at ox.ac.uk")
        );
    }

    #[test]
    fn test_profile_without_table_counts_zero() {
        let response =
            ProfileResponse::from_document(json!({"author": {"name": "New Researcher"}})).unwrap();
        assert_eq!(response.lifetime_citations(), 0);

        assert!(ProfileResponse::from_document(json!({"cited_by": {}})).is_err());
    }

    #[test]
    fn test_search_document() {
        let doc = SearchDocument::from_document(json!({
            "search_metadata": {"id": "x", "raw_html_file": "https://serpapi.com/searches/x.html"}
        }))
        .unwrap();
        assert_eq!(doc.search_metadata.raw_html_file, "https://serpapi.com/searches/x.html");

        assert!(SearchDocument::from_document(json!({"search_metadata": {}})).is_err());
    }
}
