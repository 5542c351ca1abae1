//! Self-contained Leaflet map of the country aggregate.

use serde::Serialize;
use std::path::Path;

use crate::analysis::geo::marker_radius;
use crate::models::CountryPoints;
use crate::sources::SourceError;
use crate::utils::save_bytes;

/// File name of the rendered map
pub const MAP_FILE: &str = "map.html";

const LEAFLET_VERSION: &str = "1.9.4";

/// Marker sizing and base layer
#[derive(Debug, Clone, PartialEq)]
pub struct MapStyle {
    pub radius_scale: f64,

    /// Logarithm base of the radius; `None` sizes markers linearly
    pub radius_log_base: Option<f64>,

    /// Tile layer name, as understood by [`tile_layer`]
    pub tiles: String,
}

impl Default for MapStyle {
    fn default() -> Self {
        Self {
            radius_scale: 6.0,
            radius_log_base: Some(2.0),
            tiles: "CartoDB Positron".to_string(),
        }
    }
}

/// URL template and attribution of a named tile layer
pub fn tile_layer(name: &str) -> (&'static str, &'static str) {
    match name.to_lowercase().replace([' ', '_'], "").as_str() {
        "openstreetmap" | "osm" => (
            "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
            "&copy; OpenStreetMap contributors",
        ),
        "cartodbdarkmatter" => (
            "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png",
            "&copy; OpenStreetMap contributors &copy; CARTO",
        ),
        _ => (
            "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png",
            "&copy; OpenStreetMap contributors &copy; CARTO",
        ),
    }
}

#[derive(Debug, Serialize)]
struct Marker {
    location: [f64; 2],
    radius: f64,
    tooltip: String,
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the map as a standalone HTML document
pub fn render_map(points: &CountryPoints, style: &MapStyle) -> Result<String, SourceError> {
    let markers: Vec<Marker> = points
        .iter()
        .map(|(country, point)| Marker {
            location: [point.latitude, point.longitude],
            radius: marker_radius(point.count, style.radius_scale, style.radius_log_base),
            tooltip: format!("<b>{}</b>: {}", escape_html(country), point.count),
        })
        .collect();
    // Keep the payload from closing the script element
    let markers = serde_json::to_string(&markers)?.replace("</", "<\\/");
    let (tiles_url, attribution) = tile_layer(&style.tiles);

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Citing authors by country</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@{version}/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@{version}/dist/leaflet.js"></script>
<style>html, body, #map {{ height: 100%; margin: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
var map = L.map("map", {{worldCopyJump: true}}).setView([20, 0], 2);
L.tileLayer("{tiles_url}", {{attribution: "{attribution}", subdomains: "abcd", maxZoom: 18}}).addTo(map);
var markers = {markers};
markers.forEach(function (m) {{
  L.circleMarker(m.location, {{radius: m.radius, fill: true, weight: 1.5, opacity: 0.5, fillOpacity: 0.2}})
    .bindTooltip(m.tooltip)
    .addTo(map);
}});
</script>
</body>
</html>
"#,
        version = LEAFLET_VERSION,
        tiles_url = tiles_url,
        attribution = attribution,
        markers = markers,
    ))
}

/// Render and write the map to `path`
pub fn write_map(points: &CountryPoints, style: &MapStyle, path: &Path) -> Result<(), SourceError> {
    let html = render_map(points, style)?;
    save_bytes(html.as_bytes(), path)?;
    tracing::info!("Map written to {}", path.display());
    Ok(())
}
