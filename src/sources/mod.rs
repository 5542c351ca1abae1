//! Remote collaborators behind async traits.
//!
//! The crawler never talks to the network directly. It goes through two seams:
//!
//! - [`SearchService`]: the structured search engine (SerpApi's Google Scholar
//!   engines). A request is an ordered set of named parameters, the response a
//!   JSON document.
//! - [`PageFetcher`]: plain download of a rendered result page, used to recover
//!   the full author list the search engine truncates.
//!
//! [`SerpApiClient`] implements both against the live services, [`MockSearchService`]
//! replays scripted responses in tests.
//!
//! # Environment
//!
//! - `SERP_API_KEY` - credential added to every live search request

mod serpapi;

pub mod mock;

pub use mock::MockSearchService;
pub use serpapi::{SerpApiClient, SERPAPI_URL};

use crate::models::Query;
use async_trait::async_trait;
use serde_json::Value;

/// A structured search engine.
#[async_trait]
pub trait SearchService: Send + Sync + std::fmt::Debug {
    /// Identifier used in log lines
    fn id(&self) -> &str;

    /// Issue one request and return the decoded response document.
    ///
    /// An `error` field inside the document is not interpreted here; the
    /// pagination layer turns it into [`SourceError::RemoteService`].
    async fn search(&self, query: &Query) -> Result<Value, SourceError>;
}

/// Download of rendered pages.
#[async_trait]
pub trait PageFetcher: Send + Sync + std::fmt::Debug {
    /// Fetch the raw bytes behind `url`
    async fn fetch_page(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

/// Errors that can occur while crawling and analysing
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The search service reported an error in its response
    #[error("Remote service error: {0}")]
    RemoteService(String),

    /// An expected element or field was absent from a fetched document
    #[error("Parse error: {0}")]
    Parse(String),

    /// Network or HTTP error, including timeouts
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO error (file system)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding of a persisted document failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl SourceError {
    /// Whether this error must abort the whole crawl.
    ///
    /// Only [`SourceError::Parse`] is confined to the unit of work it occurred in.
    pub fn is_fatal_for_run(&self) -> bool {
        !matches!(self, SourceError::Parse(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Serialization(format!("JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for SourceError {
    fn from(err: serde_yaml::Error) -> Self {
        SourceError::Serialization(format!("YAML: {}", err))
    }
}

impl From<csv::Error> for SourceError {
    fn from(err: csv::Error) -> Self {
        SourceError::Serialization(format!("CSV: {}", err))
    }
}
