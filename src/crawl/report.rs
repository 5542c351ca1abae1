//! Summary of one crawl run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Article;
use crate::sources::SourceError;

/// Kind of unit a failure was confined to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Article,
    Citation,
    Author,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Unit::Article => "article",
            Unit::Citation => "citation",
            Unit::Author => "author",
        };
        write!(f, "{}", name)
    }
}

/// A unit of work skipped after a contained error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit: Unit,
    pub title: String,
    pub id: String,
    pub error: String,
}

/// An article whose retrieved citations differ from its declared count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountMismatch {
    pub article: String,
    pub citation_id: String,
    pub declared: usize,
    pub retrieved: usize,
}

/// What a crawl run did, persisted next to the results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub author_id: String,
    pub articles: usize,
    pub citations: usize,
    pub citations_with_warnings: usize,
    #[serde(default)]
    pub count_mismatches: Vec<CountMismatch>,
    #[serde(default)]
    pub failures: Vec<UnitFailure>,
}

impl CrawlReport {
    pub fn new(author_id: &str) -> Self {
        Self {
            author_id: author_id.to_string(),
            ..Self::default()
        }
    }

    /// Record a contained failure and log it with enough context to resume by hand
    pub fn record_failure(&mut self, unit: Unit, title: &str, id: &str, error: &SourceError) {
        tracing::error!("Skipping {} `{}` ({}): {}", unit, title, id, error);
        self.failures.push(UnitFailure {
            unit,
            title: title.to_string(),
            id: id.to_string(),
            error: error.to_string(),
        });
    }

    /// Count a finished article
    pub fn add_article(&mut self, article: &Article) {
        self.articles += 1;
        self.citations += article.citations.len();
        self.citations_with_warnings += article
            .citations
            .iter()
            .filter(|c| !c.warnings.is_empty())
            .count();
    }

    /// No count mismatches and no skipped units
    pub fn is_clean(&self) -> bool {
        self.count_mismatches.is_empty() && self.failures.is_empty()
    }
}
