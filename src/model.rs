/// Core data types for the weather polling service.
///
/// This module defines the shared domain model imported by all other modules:
/// the payloads returned by the weather service REST API, the locations read
/// from the reference snapshot, and the crate-wide error type.
/// It contains no I/O.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Value reported by station sensors that have no valid reading.
pub const SENSOR_SENTINEL: f64 = 32767.0;

// ---------------------------------------------------------------------------
// Reference snapshot types
// ---------------------------------------------------------------------------

/// Version metadata of the remote reference snapshot (`dbinfo.json`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbInfo {
    /// Must match the `version` row of the local snapshot's metadata table.
    pub db_version: i64,
    #[serde(default)]
    pub checksum: String,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

/// Identifier of a polled location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocationId {
    /// Numeric Swiss postal code, e.g. 8001.
    PostalCode(u32),
    /// Alphanumeric SwissMetNet station code, e.g. "SMA".
    Station(String),
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationId::PostalCode(zip) => write!(f, "{}", zip),
            LocationId::Station(code) => write!(f, "{}", code),
        }
    }
}

/// Metric categories a weather station may support, read from the
/// per-station flags of the reference snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricCategory {
    Temperature,
    Sunshine,
    Precipitation,
    Humidity,
    Foehn,
    Wind,
    Snow,
    Pressure,
}

/// A postal code or weather station as described by the reference snapshot.
///
/// Locations are read-only: they are loaded from the snapshot and never
/// mutated by this service.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub active: bool,
    /// Swiss grid coordinates.
    pub x: f64,
    pub y: f64,
    /// Metres above sea level.
    pub altitude: f64,
    /// Empty for postal codes.
    pub categories: Vec<MetricCategory>,
}

impl Location {
    /// Name of the device object created for this location.
    pub fn device_name(&self) -> String {
        match self.id {
            LocationId::PostalCode(_) => self.name.clone(),
            LocationId::Station(_) => format!("Station {}", self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Postal code detail (`plzDetail`)
// ---------------------------------------------------------------------------

/// Current conditions for a postal code.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    /// Epoch milliseconds.
    pub time: Option<i64>,
    pub icon: Option<i64>,
    pub temperature: Option<f64>,
}

/// One forecast day.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastDay {
    /// Calendar date as published, e.g. "2024-05-01".
    pub day_date: Option<String>,
    pub icon_day: Option<i64>,
    pub temperature_max: Option<f64>,
    pub temperature_min: Option<f64>,
    pub precipitation: Option<f64>,
}

/// A reference link attached to a warning. Not mirrored into state.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub text: String,
}

/// An active hazard warning for a postal code.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    /// Hazard category id, see `hazards::HAZARD_CATALOGUE`.
    pub warn_type: i64,
    /// Severity, 1 (minimal) to 5 (very severe).
    pub warn_level: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub html_text: String,
    /// Epoch milliseconds.
    pub valid_from: Option<i64>,
    /// Epoch milliseconds.
    pub valid_to: Option<i64>,
    #[serde(default)]
    pub ordering: String,
    /// `true` for a forecast-only possibility, `false` for a confirmed warning.
    #[serde(default)]
    pub outlook: bool,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Parallel time series for the forecast graph.
///
/// Hourly series start at `start`. The precipitation series switches from
/// 10-minute resolution (`precipitation10m`) to hourly resolution
/// (`precipitation1h`) at `start_low_resolution`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    /// Epoch milliseconds.
    #[serde(default)]
    pub start: Option<i64>,
    /// Epoch milliseconds of the 10-minute to 1-hour cutover.
    #[serde(default)]
    pub start_low_resolution: Option<i64>,
    #[serde(default)]
    pub precipitation10m: Vec<f64>,
    #[serde(default)]
    pub precipitation1h: Vec<f64>,
    #[serde(default)]
    pub weather_icon3h: Vec<i64>,
    #[serde(default, rename = "weatherIcon3hV2")]
    pub weather_icon3h_v2: Vec<i64>,
    #[serde(default)]
    pub wind_direction3h: Vec<f64>,
    #[serde(default)]
    pub wind_speed3h: Vec<f64>,
    #[serde(default)]
    pub temperature_min1h: Vec<f64>,
    #[serde(default)]
    pub temperature_max1h: Vec<f64>,
    #[serde(default)]
    pub temperature_mean1h: Vec<f64>,
}

/// Full detail record for one postal code, as returned per poll.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlzDetail {
    pub current_weather: Option<CurrentConditions>,
    pub forecast: Option<Vec<ForecastDay>>,
    /// Warnings missing their type or level are dropped while parsing.
    #[serde(default, deserialize_with = "skip_incomplete")]
    pub warnings: Vec<Warning>,
    pub graph: Option<Graph>,
}

/// Deserializes a list, dropping entries that do not parse on their own so
/// one broken record cannot fail the whole response. `null` reads as empty.
fn skip_incomplete<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

// ---------------------------------------------------------------------------
// Station measurements (`currentWeather.json`)
// ---------------------------------------------------------------------------

/// A measurement paired with the time it was taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ValueTime {
    pub value: Option<f64>,
    /// Epoch milliseconds.
    pub timestamp: Option<i64>,
}

/// Latest measurements of one weather station. Every field is optional;
/// stations only report what their sensors support.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationMeasurements {
    pub temperature_min: Option<ValueTime>,
    pub temperature_max: Option<ValueTime>,
    pub sunshine_total: Option<f64>,
    pub sunshine_yesterday: Option<f64>,
    #[serde(rename = "precipitation1H")]
    pub precipitation_1h: Option<f64>,
    pub precipitation_yesterday: Option<f64>,
    #[serde(rename = "precipitation24H")]
    pub precipitation_24h: Option<f64>,
    #[serde(rename = "precipitation48H")]
    pub precipitation_48h: Option<f64>,
    #[serde(rename = "precipitation72H")]
    pub precipitation_72h: Option<f64>,
    pub wind_gust_max: Option<ValueTime>,
    #[serde(rename = "pressureDifference3H")]
    pub pressure_difference_3h: Option<f64>,
    pub pressure850: Option<f64>,
    pub pressure700: Option<f64>,
    #[serde(rename = "snow2D")]
    pub snow_2d: Option<f64>,
    #[serde(rename = "snow3D")]
    pub snow_3d: Option<f64>,
    pub dew_point: Option<f64>,
    pub wind_speed: Option<f64>,
    pub precipitation: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure_sea: Option<f64>,
    pub pressure_standard: Option<f64>,
    pub pressure_station: Option<f64>,
    pub wind_direction: Option<f64>,
    pub wind_gust: Option<f64>,
    pub snow_new: Option<f64>,
    pub snow_total: Option<f64>,
    pub temperature: Option<f64>,
    pub smn_time: Option<i64>,
    pub sunshine: Option<f64>,
    pub snow_time: Option<i64>,
    pub foehn_time: Option<i64>,
    pub foehn: Option<f64>,
}

/// Aggregate current conditions for all stations.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWeather {
    /// Epoch milliseconds of the last SwissMetNet publication. Drives the
    /// poll schedule.
    pub smn_time: Option<i64>,
    pub foehn_time: Option<i64>,
    pub snow_time: Option<i64>,
    #[serde(default)]
    pub data: std::collections::HashMap<String, StationMeasurements>,
}

// ---------------------------------------------------------------------------
// Admin query types
// ---------------------------------------------------------------------------

/// One `(id, label)` entry of an administrative location listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelEntry {
    pub id: String,
    pub label: String,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while fetching, caching or mirroring weather data.
#[derive(Debug, thiserror::Error)]
pub enum MeteoError {
    /// Non-2xx HTTP response from the weather service.
    #[error("HTTP error: {0}")]
    Http(u16),
    /// The request could not be sent or the body could not be read.
    #[error("Request failed: {0}")]
    Request(String),
    /// The response body could not be deserialized.
    #[error("Parse error: {0}")]
    Parse(String),
    /// A configured identifier does not resolve against the reference snapshot.
    #[error("Location not found: {0}")]
    LocationNotFound(String),
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] rusqlite::Error),
    /// A snapshot query ran before `ensure_current` opened the file.
    #[error("Reference snapshot not open: {0}")]
    SnapshotNotOpen(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The host state store rejected an operation.
    #[error("State error: {0}")]
    State(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for MeteoError {
    fn from(err: serde_json::Error) -> Self {
        MeteoError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MeteoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plz_detail_tolerates_missing_sections() {
        let detail: PlzDetail = serde_json::from_str(r#"{"warnings": []}"#)
            .expect("minimal detail should parse");
        assert!(detail.current_weather.is_none());
        assert!(detail.forecast.is_none());
        assert!(detail.graph.is_none());
    }

    #[test]
    fn test_plz_detail_survives_incomplete_records() {
        let json = r#"{
            "currentWeather": {"time": 1714564800000, "icon": 2, "temperature": 14.5},
            "warnings": [
                {"warnType": 1},
                {"warnLevel": 3},
                {"warnType": 2, "warnLevel": 3, "text": "Rain"}
            ],
            "warningsOverview": [{"warnType": 1}],
            "graph": {"start": 0}
        }"#;
        let detail: PlzDetail = serde_json::from_str(json).expect("gaps must not fail the detail");

        assert_eq!(detail.current_weather.and_then(|c| c.temperature), Some(14.5));
        assert_eq!(detail.warnings.len(), 1, "warnings without type or level are dropped");
        assert_eq!((detail.warnings[0].warn_type, detail.warnings[0].warn_level), (2, 3));
        let graph = detail.graph.expect("graph kept");
        assert_eq!(graph.start, Some(0));
        assert_eq!(graph.start_low_resolution, None);
    }

    #[test]
    fn test_plz_detail_null_warnings_read_as_empty() {
        let detail: PlzDetail = serde_json::from_str(r#"{"warnings": null, "graph": {}}"#)
            .expect("null warnings should parse");
        assert!(detail.warnings.is_empty());
        assert_eq!(detail.graph.map(|g| g.start), Some(None));
    }

    #[test]
    fn test_warning_parses_upstream_field_names() {
        let json = r#"{
            "warnType": 11, "warnLevel": 3, "text": "Flood", "htmlText": "<p>Flood</p>",
            "validFrom": 1714557600000, "ordering": "1", "outlook": true,
            "links": [{"url": "https://example.org", "text": "more"}]
        }"#;
        let warning: Warning = serde_json::from_str(json).expect("warning should parse");
        assert_eq!(warning.warn_type, 11);
        assert_eq!(warning.warn_level, 3);
        assert_eq!(warning.valid_from, Some(1_714_557_600_000));
        assert_eq!(warning.valid_to, None);
        assert!(warning.outlook);
        assert_eq!(warning.links.len(), 1);
    }

    #[test]
    fn test_station_measurements_use_upstream_suffixes() {
        let json = r#"{"precipitation1H": 0.4, "snow2D": 12, "pressureDifference3H": -1.2,
                       "windGustMax": {"value": 54.0, "timestamp": 1714557600000}}"#;
        let m: StationMeasurements = serde_json::from_str(json).expect("measurements should parse");
        assert_eq!(m.precipitation_1h, Some(0.4));
        assert_eq!(m.snow_2d, Some(12.0));
        assert_eq!(m.pressure_difference_3h, Some(-1.2));
        assert_eq!(m.wind_gust_max.and_then(|v| v.value), Some(54.0));
    }

    #[test]
    fn test_location_id_display_is_state_prefix() {
        assert_eq!(LocationId::PostalCode(8001).to_string(), "8001");
        assert_eq!(LocationId::Station("SMA".to_string()).to_string(), "SMA");
    }

    #[test]
    fn test_station_device_name_is_prefixed() {
        let station = Location {
            id: LocationId::Station("SMA".to_string()),
            name: "Zürich / Fluntern".to_string(),
            active: true,
            x: 685_117.0,
            y: 248_066.0,
            altitude: 556.0,
            categories: vec![MetricCategory::Temperature],
        };
        assert_eq!(station.device_name(), "Station Zürich / Fluntern");
    }
}
