//! Post-crawl analysis: affiliation resolution, country aggregation and the map.
//!
//! Everything here works on persisted crawl results; only geocoding talks to
//! the network.

mod affiliations;
mod geo;
mod map;

pub use affiliations::{
    country_name, email_domain, registrable_domain, AffiliationMatch, AffiliationResolver,
    AffiliationTable,
};
pub use geo::{marker_radius, GeoAggregator, Geocoder, NominatimGeocoder, COUNTRIES_FILE, NOMINATIM_URL};
pub use map::{render_map, tile_layer, write_map, MapStyle, MAP_FILE};

use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;

use crate::models::AnalysisRow;
use crate::sources::SourceError;

/// File name of the exported flat table
pub const TABLE_FILE: &str = "citations.csv";

/// Collapse rows sharing a key.
///
/// Returns the first row of every key with the number of rows sharing it, in
/// order of first occurrence. Rows without a key are dropped.
pub fn count_duplicates<'a, T, K, F>(rows: &'a [T], key: F) -> Vec<(&'a T, usize)>
where
    K: Eq + Hash,
    F: Fn(&'a T) -> Option<K>,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut counted: Vec<(&'a T, usize)> = Vec::new();
    for row in rows {
        let Some(k) = key(row) else {
            continue;
        };
        match positions.get(&k) {
            Some(&i) => counted[i].1 += 1,
            None => {
                positions.insert(k, counted.len());
                counted.push((row, 1));
            }
        }
    }
    counted
}

/// Write the flat table as CSV with a header row
pub fn write_csv(rows: &[AnalysisRow], path: &Path) -> Result<(), SourceError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| SourceError::Serialization(format!("CSV: {}", e)))?;
    crate::utils::save_bytes(&bytes, path)?;
    tracing::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
