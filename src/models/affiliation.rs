//! Affiliation reference rows and the flat analysis table.

use serde::{Deserialize, Serialize, Serializer};

/// One row of the reference affiliation table as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AffiliationRow {
    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub alt_domain: Option<String>,

    #[serde(default)]
    pub affil_name: Option<String>,

    #[serde(default)]
    pub affil_country: Option<String>,
}

/// A reference row with normalized join keys
#[derive(Debug, Clone, PartialEq)]
pub struct AffiliationRecord {
    /// Primary domain, reduced to its registrable form
    pub domain: Option<String>,

    pub alt_domain: Option<String>,

    /// `domain` without dashes
    pub fallback_domain: Option<String>,

    pub fallback_alt_domain: Option<String>,

    /// Institution name
    pub name: Option<String>,

    /// ISO 3166-1 alpha-2 country code
    pub country: Option<String>,
}

/// One row per (article, citation, author) triple
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisRow {
    /// Profile name, or the abbreviated name when no profile was resolved
    pub name: String,
    pub abbrv_name: String,
    pub author_id: Option<String>,
    pub affiliations: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub email_domain: Option<String>,
    pub affil_name: Option<String>,
    pub affil_country: Option<String>,
    pub affil_country_name: Option<String>,
    pub citations: Option<u64>,
    #[serde(serialize_with = "join_warnings")]
    pub warnings: Vec<String>,
    pub article: String,
    pub article_id: String,
    pub citation: String,
    pub citation_id: Option<String>,
}

/// Tabular formats hold one value per cell
fn join_warnings<S: Serializer>(warnings: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&warnings.join("; "))
}
