//! Value translation from upstream fields to state values.
//!
//! Every function here is total: missing input yields `None`, never an error.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::SENSOR_SENTINEL;

const WEATHER_ICON_URL_FORMAT: &str =
    "https://cdn.jsdelivr.net/npm/meteo-icons/icons/weathericon_%s.png";

const WARNING_ICON_URL_FORMAT: &str =
    "https://cdn.jsdelivr.net/npm/meteo-icons/icons/bulletinwebicon_type%s_level%s.png";

/// Formats an epoch-millisecond timestamp as ISO 8601 with millisecond
/// precision, e.g. `2024-05-01T12:00:00.000Z`.
///
/// Absent and zero timestamps map to `None`.
pub fn to_timestamp_string(timestamp: Option<i64>) -> Option<String> {
    match timestamp {
        None | Some(0) => None,
        Some(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}

/// Drops the "no valid reading" sentinel.
pub fn to_measurement(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != SENSOR_SENTINEL)
}

/// Builds the weather icon URL, zero-padding the code to three digits.
pub fn to_icon_url(icon: Option<i64>) -> Option<String> {
    icon.map(|code| WEATHER_ICON_URL_FORMAT.replace("%s", &format!("{:03}", code)))
}

/// Builds the warning icon URL for a hazard category and severity level.
pub fn to_warning_icon_url(hazard_id: i64, level: i64) -> String {
    WARNING_ICON_URL_FORMAT
        .replacen("%s", &hazard_id.to_string(), 1)
        .replacen("%s", &level.to_string(), 1)
}

/// Human label for a day offset from today.
pub fn day_label(offset: usize) -> String {
    match offset {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        n => format!("Today +{}", n),
    }
}
