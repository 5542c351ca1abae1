//! Core data models for the citation graph and the analysis tables.

mod affiliation;
mod country;
mod query;
mod scholar;

pub use affiliation::{AffiliationRecord, AffiliationRow, AnalysisRow};
pub use country::{Coordinate, CountryPoint, CountryPoints, GeocodedCountries};
pub use query::{Query, ResultPage, API_KEY_PARAM, PAGE_SIZE_PARAM};
pub use scholar::{
    Article, Author, AuthorProfile, AuthorRef, Citation, CitedBy, CitedByTable, InlineLinks,
    ProfileResponse, PublicationInfo, SearchDocument, SearchMetadata,
};
