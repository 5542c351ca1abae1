//! Country aggregation and geocoding.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::models::{AnalysisRow, Coordinate, CountryPoint, CountryPoints, GeocodedCountries};
use crate::sources::SourceError;
use crate::utils::{load_yaml, save_yaml, HttpClient};

/// Default Nominatim endpoint
pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// File the geocoded countries are cached in
pub const COUNTRIES_FILE: &str = "countries.yaml";

/// Resolves a free-text place name to a coordinate
#[async_trait]
pub trait Geocoder: Send + Sync + std::fmt::Debug {
    /// `None` when the place is unknown
    async fn geocode(&self, place: &str) -> Result<Option<Coordinate>, SourceError>;
}

/// OpenStreetMap Nominatim geocoder
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: HttpClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    /// Nominatim's usage policy requires an identifying user agent
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: HttpClient::with_user_agent(user_agent, timeout)?,
            base_url: NOMINATIM_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, place: &str) -> Result<Option<Coordinate>, SourceError> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to geocode {}: {}", place, e)))?;

        if !response.status().is_success() {
            return Err(SourceError::RemoteService(format!(
                "Nominatim returned status: {}",
                response.status()
            )));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Nominatim response: {}", e)))?;

        let Some(first) = places.into_iter().next() else {
            return Ok(None);
        };
        let latitude = first
            .lat
            .parse()
            .map_err(|_| SourceError::Parse(format!("invalid latitude `{}`", first.lat)))?;
        let longitude = first
            .lon
            .parse()
            .map_err(|_| SourceError::Parse(format!("invalid longitude `{}`", first.lon)))?;
        Ok(Some(Coordinate {
            latitude,
            longitude,
        }))
    }
}

/// Marker radius for `count` authors: `log_base(count) * scale`, or `count * scale` when linear
pub fn marker_radius(count: usize, scale: f64, log_base: Option<f64>) -> f64 {
    let count = count as f64;
    match log_base {
        Some(base) if base > 0.0 && base != 1.0 => count.log(base) * scale,
        _ => count * scale,
    }
}

/// Groups resolved authors by country and places them on the globe
#[derive(Debug)]
pub struct GeoAggregator<G> {
    geocoder: G,
}

impl<G: Geocoder> GeoAggregator<G> {
    pub fn new(geocoder: G) -> Self {
        Self { geocoder }
    }

    /// Rows per country, keyed by full name (the code when no name is known).
    ///
    /// Rows without a resolved country are not counted.
    pub fn count_by_country(rows: &[AnalysisRow]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in rows {
            let country = row
                .affil_country_name
                .as_ref()
                .or(row.affil_country.as_ref());
            if let Some(country) = country {
                *counts.entry(country.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Count and geocode every country of `rows`.
    ///
    /// Geocoding results cached at `cache_path`, unknown places included, are
    /// reused when the cached country set equals the current one; counts always
    /// reflect `rows`. Countries the geocoder does not know are logged and left
    /// off the map.
    pub async fn aggregate(
        &self,
        rows: &[AnalysisRow],
        cache_path: Option<&Path>,
        overwrite: bool,
    ) -> Result<CountryPoints, SourceError> {
        let counts = Self::count_by_country(rows);

        if let Some(path) = cache_path.filter(|p| !overwrite && p.is_file()) {
            let cached: GeocodedCountries = load_yaml(path)?;
            if cached.countries().into_iter().eq(counts.keys().map(String::as_str)) {
                tracing::debug!("Using cached coordinates from {}", path.display());
                for country in &cached.unlocated {
                    tracing::warn!("Could not locate country: {}", country);
                }
                return Ok(cached
                    .located
                    .into_iter()
                    .map(|(country, point)| {
                        let count = counts.get(&country).copied().unwrap_or(point.count);
                        (country, CountryPoint { count, ..point })
                    })
                    .collect());
            }
            tracing::info!("Country set changed, geocoding again");
        }

        let mut geocoded = GeocodedCountries::default();
        for (country, count) in counts {
            match self.geocoder.geocode(&country).await? {
                Some(at) => {
                    geocoded.located.insert(country, CountryPoint::new(count, at));
                }
                None => {
                    tracing::warn!("Could not locate country: {}", country);
                    geocoded.unlocated.push(country);
                }
            }
        }

        if let Some(path) = cache_path {
            save_yaml(&geocoded, path)?;
        }
        Ok(geocoded.located)
    }
}
