//! Utility modules supporting the crawl.
//!
//! - [`HttpClient`]: shared HTTP client with fixed per-request timeouts
//! - [`PaginatedFetcher`]: follows continuation links of the search service
//! - [`ResultCache`]: durable, resumable cache of every fetched page
//! - [`save_yaml`] / [`load_yaml`]: atomic document storage
//!
//! # Cached fetching
//!
//! ```rust,no_run
//! use citation_atlas::models::Query;
//! use citation_atlas::sources::SerpApiClient;
//! use citation_atlas::utils::{PaginatedFetcher, ResultCache};
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(SerpApiClient::new(Duration::from_secs(30), Duration::from_secs(60))?);
//! let fetcher = PaginatedFetcher::new(client.clone(), std::env::var("SERP_API_KEY").ok());
//! let cache = ResultCache::new(fetcher, client);
//!
//! let query = Query::engine("google_scholar_author").param("author_id", "AbCdEfGhIjKl");
//! let articles = cache
//!     .fetch_items(&query, "articles", Path::new("results/AbCdEfGhIjKl"), false)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod fetch;
mod http;
mod store;

pub use cache::{page_file_name, FetchOutput, ResultCache};
pub use fetch::{PaginatedFetcher, DEFAULT_PAGE_SIZE};
pub use http::HttpClient;
pub use store::{load_yaml, save_bytes, save_yaml};
