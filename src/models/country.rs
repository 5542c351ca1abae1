//! Per-country aggregates for the map.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Number of citing authors in a country and where to draw them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountryPoint {
    pub count: usize,
    pub latitude: f64,
    pub longitude: f64,
}

impl CountryPoint {
    pub fn new(count: usize, at: Coordinate) -> Self {
        Self {
            count,
            latitude: at.latitude,
            longitude: at.longitude,
        }
    }
}

/// Country name → point, ordered by name
pub type CountryPoints = BTreeMap<String, CountryPoint>;

/// Geocoding results as persisted between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodedCountries {
    #[serde(default)]
    pub located: CountryPoints,

    /// Countries the geocoder had no position for
    #[serde(default)]
    pub unlocated: Vec<String>,
}

impl GeocodedCountries {
    /// Every country this record answers for
    pub fn countries(&self) -> BTreeSet<&str> {
        self.located
            .keys()
            .map(String::as_str)
            .chain(self.unlocated.iter().map(String::as_str))
            .collect()
    }
}
