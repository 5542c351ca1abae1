//! Joins crawled authors against the reference affiliation table.
//!
//! The join key is the registrable domain of an author's verified email. The
//! scraped email domains sometimes lack the dashes of the real domain
//! ("unicity.edu" for "uni-city.edu"), so every reference domain also has a
//! dash-stripped fallback form that is tried when no exact match exists.

use std::io::Read;
use std::path::Path;

use crate::models::{AffiliationRecord, AffiliationRow, AnalysisRow, Article, Author, Citation};
use crate::sources::SourceError;

/// Registrable domain of a host name, e.g. `cs.ox.ac.uk` → `ox.ac.uk`
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    psl::domain_str(&host)
        .map(str::to_string)
        .unwrap_or(host)
}

/// Domain of a verification line such as "Verified email at cs.ox.ac.uk"
pub fn email_domain(email: &str) -> Option<String> {
    let host = email.rsplit("at ").next().unwrap_or(email).trim();
    let host = host.rsplit('@').next().unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(registrable_domain(host))
    }
}

/// Full country name of an ISO 3166-1 alpha-2 code
pub fn country_name(code: &str) -> Option<String> {
    isocountry::CountryCode::for_alpha2(&code.trim().to_uppercase())
        .ok()
        .map(|c| c.name().to_string())
}

fn normalized(domain: Option<String>) -> Option<String> {
    domain
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .map(|d| registrable_domain(&d))
}

impl From<AffiliationRow> for AffiliationRecord {
    fn from(row: AffiliationRow) -> Self {
        let domain = normalized(row.domain);
        let alt_domain = normalized(row.alt_domain);
        Self {
            fallback_domain: domain.as_ref().map(|d| d.replace('-', "")),
            fallback_alt_domain: alt_domain.as_ref().map(|d| d.replace('-', "")),
            domain,
            alt_domain,
            name: row.affil_name,
            country: row.affil_country,
        }
    }
}

/// Outcome of a domain lookup
#[derive(Debug, Clone, PartialEq)]
pub struct AffiliationMatch<'a> {
    /// Best candidate, if any row matched
    pub record: Option<&'a AffiliationRecord>,

    /// Ambiguities found along the way
    pub warnings: Vec<String>,
}

/// The reference affiliation table
#[derive(Debug, Clone, Default)]
pub struct AffiliationTable {
    records: Vec<AffiliationRecord>,
}

impl AffiliationTable {
    /// Load a CSV file with `domain`, `alt_domain`, `affil_name` and `affil_country` columns
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let file = std::fs::File::open(path).map_err(|e| {
            SourceError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let table = Self::from_reader(file)?;
        tracing::info!(
            "Loaded {} affiliations from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SourceError> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut records = Vec::new();
        for row in reader.deserialize::<AffiliationRow>() {
            records.push(AffiliationRecord::from(row?));
        }
        Ok(Self { records })
    }

    pub fn from_rows(rows: impl IntoIterator<Item = AffiliationRow>) -> Self {
        Self {
            records: rows.into_iter().map(AffiliationRecord::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Find the affiliation of a normalized email domain.
    ///
    /// Exact matches on the primary or alternate domain come first; only when
    /// there are none are the dash-stripped columns consulted. More than one
    /// candidate at either stage yields a warning. Among several candidates a
    /// primary-domain match beats an alternate-domain one, so the pick does
    /// not hinge on row order alone.
    pub fn lookup(&self, domain: &str) -> AffiliationMatch<'_> {
        let mut warnings = Vec::new();

        let mut candidates = self.candidates(domain, |r| (&r.domain, &r.alt_domain));
        if candidates.is_empty() {
            candidates = self.candidates(domain, |r| (&r.fallback_domain, &r.fallback_alt_domain));
            if candidates.len() > 1 {
                warnings.push(format!("Found affiliation without a dash: {}", domain));
            }
        }
        if candidates.len() > 1 {
            warnings.push(format!("Found multiple affiliations: {}", domain));
        }

        candidates.sort_by_key(|(primary, _)| !*primary);
        AffiliationMatch {
            record: candidates.first().map(|(_, record)| *record),
            warnings,
        }
    }

    /// Matching rows, flagged with whether the primary column matched
    fn candidates<F>(&self, domain: &str, columns: F) -> Vec<(bool, &AffiliationRecord)>
    where
        F: Fn(&AffiliationRecord) -> (&Option<String>, &Option<String>),
    {
        self.records
            .iter()
            .filter_map(|record| {
                let (primary, alternate) = columns(record);
                if primary.as_deref() == Some(domain) {
                    Some((true, record))
                } else if alternate.as_deref() == Some(domain) {
                    Some((false, record))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Flattens crawled articles into an [`AnalysisRow`] per cited author
#[derive(Debug, Clone)]
pub struct AffiliationResolver {
    table: AffiliationTable,
    keep_warnings: bool,
}

impl AffiliationResolver {
    pub fn new(table: AffiliationTable) -> Self {
        Self {
            table,
            keep_warnings: false,
        }
    }

    /// Keep citations and affiliations that carry warnings
    pub fn keep_warnings(mut self, keep: bool) -> Self {
        self.keep_warnings = keep;
        self
    }

    /// One row per (article, citation, author).
    ///
    /// Citations with reconciliation warnings are left out unless warnings are kept.
    pub fn resolve(&self, articles: &[Article]) -> Vec<AnalysisRow> {
        let mut rows = Vec::new();
        for article in articles {
            for citation in &article.citations {
                if !citation.warnings.is_empty() && !self.keep_warnings {
                    continue;
                }
                for author in &citation.authors {
                    rows.push(self.resolve_author(article, citation, author));
                }
            }
        }
        tracing::info!("Resolved {} author rows", rows.len());
        rows
    }

    fn resolve_author(&self, article: &Article, citation: &Citation, author: &Author) -> AnalysisRow {
        let mut row = AnalysisRow {
            name: author.name.clone(),
            abbrv_name: author.name.clone(),
            author_id: author.author_id.clone(),
            citations: author.lifetime_citations,
            article: article.title.clone(),
            article_id: article.citation_id.clone(),
            citation: citation.title.clone(),
            citation_id: citation.cited_work_id().map(str::to_string),
            ..AnalysisRow::default()
        };

        let Some(profile) = &author.profile else {
            return row;
        };
        if let Some(name) = &profile.name {
            row.name = name.clone();
        }
        row.affiliations = profile.affiliations.clone();
        row.website = profile.website.clone();
        row.email = profile.email.clone();

        let Some(domain) = profile.email.as_deref().and_then(email_domain) else {
            return row;
        };

        let found = self.table.lookup(&domain);
        for warning in &found.warnings {
            tracing::warn!("{}", warning);
        }
        if let Some(record) = found.record {
            if found.warnings.is_empty() || self.keep_warnings {
                row.affil_name = record.name.clone();
                row.affil_country = record.country.clone();
                row.affil_country_name = record.country.as_deref().and_then(country_name);
            }
        }
        row.email_domain = Some(domain);
        row.warnings = found.warnings;
        row
    }
}
