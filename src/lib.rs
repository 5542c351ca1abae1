//! # Citation Atlas
//!
//! Crawls the citation graph of a Google Scholar author, resolves the
//! affiliations of everyone citing them, and maps the result by country.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Typed entities (Query, Article, Citation, Author, AnalysisRow, ...)
//! - [`sources`]: The search service and page download seams, with a SerpApi client
//! - [`utils`]: HTTP client, pagination, and the durable result cache
//! - [`crawl`]: Author → articles → citations → authors traversal
//! - [`analysis`]: Affiliation resolution, country aggregation, and the map
//! - [`config`]: Configuration management

pub mod analysis;
pub mod config;
pub mod crawl;
pub mod models;
pub mod sources;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use crawl::{CitationGraphCrawler, CrawlOptions, CrawlReport};
pub use models::{AnalysisRow, Article, Author, Citation, Query};
pub use sources::{SearchService, SourceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
