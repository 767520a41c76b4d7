//! Flattening of upstream responses into state tree writes.
//!
//! Each function takes one parsed response and records the object
//! definitions (first run only) and value writes for one location in a
//! `StateBatch`. Missing postal code data is written as explicit null;
//! station metrics the feed does not report are skipped.

use crate::alert::warnings::{define_warning_channel, select_for_category, write_warning};
use crate::analysis::windows::{aggregate_windows, HOURS_PER_DAY, HOURS_PER_WINDOW};
use crate::hazards::{warning_channel_suffix, HAZARD_CATALOGUE};
use crate::ingest::meteoswiss::ApiVersion;
use crate::model::{CurrentConditions, ForecastDay, Location, PlzDetail, StationMeasurements, ValueTime};
use crate::state::{ObjectSpec, StateBatch, ValueType};
use crate::values::{day_label, to_icon_url, to_measurement, to_timestamp_string};

/// Defines the device object of a location.
pub fn define_device(batch: &mut StateBatch, location: &Location) {
    batch.define(ObjectSpec::device(location.id.to_string(), location.device_name()));
}

// ---------------------------------------------------------------------------
// Postal codes
// ---------------------------------------------------------------------------

/// Maps a full postal code detail response.
pub fn map_postal_code_detail(batch: &mut StateBatch, zip: u32, detail: &PlzDetail, version: ApiVersion) {
    let days = version.forecast_days();

    map_current_conditions(batch, zip, detail.current_weather.as_ref());

    for day in 0..days {
        let forecast = detail.forecast.as_ref().and_then(|f| f.get(day));
        map_forecast_day(batch, zip, day, forecast);
    }

    map_windows(batch, zip, detail, version);

    for hazard in HAZARD_CATALOGUE {
        let channel = format!("{}.{}", zip, warning_channel_suffix(hazard.id));
        define_warning_channel(batch, &channel, hazard);
        write_warning(batch, &channel, hazard.id, select_for_category(&detail.warnings, hazard.id));
    }
}

fn map_current_conditions(batch: &mut StateBatch, zip: u32, current: Option<&CurrentConditions>) {
    let channel = format!("{}.currentWeather", zip);
    batch.define(ObjectSpec::channel(&channel, "Current Weather"));
    batch.define(ObjectSpec::state(format!("{channel}.time"), "Time", ValueType::String, "date", None));
    batch.define(ObjectSpec::state(format!("{channel}.icon"), "Icon", ValueType::Number, "value", None));
    batch.define(ObjectSpec::state(format!("{channel}.iconUrl"), "Icon URL", ValueType::String, "text.url", None));
    batch.define(ObjectSpec::state(
        format!("{channel}.temperature"),
        "Temperature",
        ValueType::Number,
        "value.temperature",
        Some("°C"),
    ));

    let icon = current.and_then(|c| c.icon);
    batch.set(format!("{channel}.time"), to_timestamp_string(current.and_then(|c| c.time)));
    batch.set(format!("{channel}.icon"), icon);
    batch.set(format!("{channel}.iconUrl"), to_icon_url(icon));
    batch.set(format!("{channel}.temperature"), current.and_then(|c| c.temperature));
}

fn map_forecast_day(batch: &mut StateBatch, zip: u32, day: usize, forecast: Option<&ForecastDay>) {
    let channel = format!("{}.forecast-{}", zip, day);
    if batch.is_first_run() {
        batch.define(ObjectSpec::channel(&channel, format!("Forecast {}", day_label(day))));
        batch.define(ObjectSpec::state(
            format!("{channel}.date"),
            "Date",
            ValueType::String,
            format!("date.forecast.{day}"),
            None,
        ));
        batch.define(ObjectSpec::state(format!("{channel}.icon"), "Icon", ValueType::Number, "value", None));
        batch.define(ObjectSpec::state(format!("{channel}.iconUrl"), "Icon URL", ValueType::String, "text.url", None));
        batch.define(ObjectSpec::state(
            format!("{channel}.temperatureMax"),
            "Temperature Max",
            ValueType::Number,
            format!("value.temperature.max.forecast.{day}"),
            Some("°C"),
        ));
        batch.define(ObjectSpec::state(
            format!("{channel}.temperatureMin"),
            "Temperature Min",
            ValueType::Number,
            format!("value.temperature.min.forecast.{day}"),
            Some("°C"),
        ));
        batch.define(ObjectSpec::state(
            format!("{channel}.precipitation"),
            "Precipitation",
            ValueType::Number,
            format!("value.precipitation.forecast.{day}"),
            Some("mm"),
        ));
    }

    let icon = forecast.and_then(|f| f.icon_day);
    batch.set(format!("{channel}.date"), forecast.and_then(|f| f.day_date.clone()));
    batch.set(format!("{channel}.icon"), icon);
    batch.set(format!("{channel}.iconUrl"), to_icon_url(icon));
    batch.set(format!("{channel}.temperatureMax"), forecast.and_then(|f| f.temperature_max));
    batch.set(format!("{channel}.temperatureMin"), forecast.and_then(|f| f.temperature_min));
    batch.set(format!("{channel}.precipitation"), forecast.and_then(|f| f.precipitation));
}

fn window_channel(zip: u32, day: usize, hour: usize) -> String {
    format!("{}.day-{}-hour-{:02}", zip, day, hour)
}

/// 3-hour windows. Objects are always defined on the first run; values are
/// only written when the response carries a graph with start and cutover
/// times.
fn map_windows(batch: &mut StateBatch, zip: u32, detail: &PlzDetail, version: ApiVersion) {
    let days = version.forecast_days();

    if batch.is_first_run() {
        for day in 0..days {
            for hour in (0..HOURS_PER_DAY).step_by(HOURS_PER_WINDOW) {
                define_window_channel(batch, &window_channel(zip, day, hour), day, hour);
            }
        }
    }

    let Some(graph) = detail.graph.as_ref() else {
        return;
    };

    for w in aggregate_windows(graph, version.icon_series(graph), days) {
        let channel = window_channel(zip, w.day, w.hour);
        batch.set(format!("{channel}.time"), to_timestamp_string(Some(w.time)));
        batch.set(format!("{channel}.icon"), w.icon);
        batch.set(format!("{channel}.iconUrl"), to_icon_url(w.icon));
        batch.set(format!("{channel}.windDirection"), w.wind_direction);
        batch.set(format!("{channel}.windSpeed"), w.wind_speed);
        batch.set(format!("{channel}.temperatureMin"), w.temperature_min);
        batch.set(format!("{channel}.temperatureMax"), w.temperature_max);
        batch.set(format!("{channel}.temperatureMean"), w.temperature_mean);
        batch.set(format!("{channel}.precipitation"), w.precipitation);
    }
}

fn define_window_channel(batch: &mut StateBatch, channel: &str, day: usize, hour: usize) {
    batch.define(ObjectSpec::channel(channel, format!("{} @ {:02}:00", day_label(day), hour)));
    batch.define(ObjectSpec::state(format!("{channel}.time"), "Time", ValueType::String, "date", None));
    batch.define(ObjectSpec::state(format!("{channel}.icon"), "Icon", ValueType::Number, "value", None));
    batch.define(ObjectSpec::state(format!("{channel}.iconUrl"), "Icon URL", ValueType::String, "text.url", None));

    let numbers: [(&str, &str, &str, &str); 6] = [
        ("windDirection", "Wind Direction", "value.direction.wind", "°"),
        ("windSpeed", "Wind Speed", "value.speed.wind", "km/h"),
        ("temperatureMin", "Temperature Min", "value.temperature.min", "°C"),
        ("temperatureMax", "Temperature Max", "value.temperature.max", "°C"),
        ("temperatureMean", "Temperature Mean", "value.temperature", "°C"),
        ("precipitation", "Precipitation", "value.precipitation", "mm"),
    ];
    for (id, name, role, unit) in numbers {
        batch.define(ObjectSpec::state(format!("{channel}.{id}"), name, ValueType::Number, role, Some(unit)));
    }
}

// ---------------------------------------------------------------------------
// Stations
// ---------------------------------------------------------------------------

/// Where a station metric's value comes from.
enum Reading {
    /// A bare value, written to `<station>.<id>`.
    Plain(fn(&StationMeasurements) -> Option<f64>),
    /// A value with its measurement time, written to `<station>.<id>.value`
    /// and `<station>.<id>.time`.
    Timed(fn(&StationMeasurements) -> Option<ValueTime>),
}

struct StationMetric {
    id: &'static str,
    name: &'static str,
    role: &'static str,
    unit: &'static str,
    reading: Reading,
}

const fn plain(
    id: &'static str,
    name: &'static str,
    role: &'static str,
    unit: &'static str,
    get: fn(&StationMeasurements) -> Option<f64>,
) -> StationMetric {
    StationMetric { id, name, role, unit, reading: Reading::Plain(get) }
}

const fn timed(
    id: &'static str,
    name: &'static str,
    role: &'static str,
    unit: &'static str,
    get: fn(&StationMeasurements) -> Option<ValueTime>,
) -> StationMetric {
    StationMetric { id, name, role, unit, reading: Reading::Timed(get) }
}

static STATION_METRICS: &[StationMetric] = &[
    timed("temperatureMin", "Temperature Min", "value.temperature", "°C", |m| m.temperature_min),
    timed("temperatureMax", "Temperature Max", "value.temperature", "°C", |m| m.temperature_max),
    plain("sunshineTotal", "Sunshine Total", "value", "min", |m| m.sunshine_total),
    plain("sunshineYesterday", "Sunshine Yesterday", "value", "min", |m| m.sunshine_yesterday),
    plain("precipitation1H", "Precipitation 1 Hour", "value.precipitation", "mm", |m| m.precipitation_1h),
    plain("precipitationYesterday", "Precipitation Yesterday", "value.precipitation", "mm", |m| {
        m.precipitation_yesterday
    }),
    plain("precipitation24H", "Precipitation 24 Hours", "value.precipitation", "mm", |m| m.precipitation_24h),
    plain("precipitation48H", "Precipitation 48 Hours", "value.precipitation", "mm", |m| m.precipitation_48h),
    plain("precipitation72H", "Precipitation 72 Hours", "value.precipitation", "mm", |m| m.precipitation_72h),
    timed("windGustMax", "Wind Gust Max", "value.speed.wind", "km/h", |m| m.wind_gust_max),
    plain("pressureDifference3H", "Pressure Difference 3 Hours", "value.pressure", "hPa", |m| {
        m.pressure_difference_3h
    }),
    plain("pressure850", "Pressure 850", "value.pressure", "hPa", |m| m.pressure850),
    plain("pressure700", "Pressure 700", "value.pressure", "hPa", |m| m.pressure700),
    plain("snow2D", "Snow 2 Days", "value", "cm", |m| m.snow_2d),
    plain("snow3D", "Snow 3 Days", "value", "cm", |m| m.snow_3d),
    plain("dewPoint", "Dew Point", "value.temperature", "°C", |m| m.dew_point),
    plain("windSpeed", "Wind Speed", "value.speed.wind", "km/h", |m| m.wind_speed),
    plain("precipitation", "Precipitation", "value.precipitation", "mm", |m| m.precipitation),
    plain("humidity", "Humidity", "value.humidity", "%", |m| m.humidity),
    plain("pressureSea", "Pressure reduced to sea level (QFF)", "value.pressure", "hPa", |m| m.pressure_sea),
    plain("pressureStandard", "Pressure with standard atmosphere (QNH)", "value.pressure", "hPa", |m| {
        m.pressure_standard
    }),
    plain("pressureStation", "Pressure at station (QFE)", "value.pressure", "hPa", |m| m.pressure_station),
    plain("windDirection", "Wind Direction", "value.direction.wind", "°", |m| m.wind_direction),
    plain("windGust", "Wind Gust", "value.speed.wind", "km/h", |m| m.wind_gust),
    timed("snowNew", "Snow New", "value", "cm", |m| {
        Some(ValueTime { value: m.snow_new, timestamp: m.snow_time })
    }),
    timed("snowTotal", "Snow Total", "value", "cm", |m| {
        Some(ValueTime { value: m.snow_total, timestamp: m.snow_time })
    }),
    plain("temperature", "Temperature", "value.temperature", "°C", |m| m.temperature),
    plain("sunshine", "Sunshine", "value", "min", |m| m.sunshine),
    timed("foehn", "Foehn-Index", "value", "cm", |m| {
        Some(ValueTime { value: m.foehn, timestamp: m.foehn_time })
    }),
];

/// Maps the measurements of one station.
///
/// Plain metrics absent from the feed and timed metrics without a
/// timestamp are skipped entirely. The sensor sentinel is written as null.
pub fn map_station(batch: &mut StateBatch, station: &str, m: &StationMeasurements) {
    for metric in STATION_METRICS {
        let id = format!("{}.{}", station, metric.id);
        match metric.reading {
            Reading::Plain(get) => {
                let Some(value) = get(m) else { continue };
                batch.define(ObjectSpec::state(&id, metric.name, ValueType::Number, metric.role, Some(metric.unit)));
                batch.set(id, to_measurement(Some(value)));
            }
            Reading::Timed(get) => {
                let Some(reading) = get(m).filter(|r| matches!(r.timestamp, Some(ts) if ts != 0)) else {
                    continue;
                };
                batch.define(ObjectSpec::channel(&id, metric.name));
                batch.define(ObjectSpec::state(format!("{id}.time"), "Time", ValueType::String, "date", None));
                batch.define(ObjectSpec::state(
                    format!("{id}.value"),
                    metric.name,
                    ValueType::Number,
                    metric.role,
                    Some(metric.unit),
                ));
                batch.set(format!("{id}.time"), to_timestamp_string(reading.timestamp));
                batch.set(format!("{id}.value"), to_measurement(reading.value));
            }
        }
    }

    let smn_time = format!("{}.smnTime", station);
    batch.define(ObjectSpec::state(&smn_time, "Time", ValueType::String, "date", None));
    batch.set(smn_time, to_timestamp_string(m.smn_time));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Graph, Warning};
    use crate::state::StateValue;

    fn detail_with_graph() -> PlzDetail {
        PlzDetail {
            current_weather: Some(CurrentConditions {
                time: Some(1_714_564_800_000),
                icon: Some(2),
                temperature: Some(14.5),
            }),
            forecast: Some(vec![ForecastDay {
                day_date: Some("2024-05-01".to_string()),
                icon_day: Some(35),
                temperature_max: Some(18.0),
                temperature_min: Some(7.0),
                precipitation: Some(0.4),
            }]),
            warnings: vec![Warning {
                warn_type: 1,
                warn_level: 3,
                text: "Thunderstorms".to_string(),
                ..Warning::default()
            }],
            graph: Some(Graph {
                start: Some(1_714_521_600_000),
                start_low_resolution: Some(1_714_521_600_000),
                precipitation1h: vec![0.0; 24 * 8],
                weather_icon3h: vec![1; 64],
                weather_icon3h_v2: vec![101; 64],
                ..Graph::default()
            }),
        }
    }

    #[test]
    fn test_current_conditions_mapped() {
        let mut batch = StateBatch::new(false);
        map_postal_code_detail(&mut batch, 800100, &detail_with_graph(), ApiVersion::V3);

        assert_eq!(
            batch.value_of("800100.currentWeather.time").and_then(|v| v.as_text()),
            Some("2024-05-01T12:00:00.000Z")
        );
        assert_eq!(batch.value_of("800100.currentWeather.icon"), Some(&StateValue::Number(2.0)));
        assert_eq!(
            batch.value_of("800100.currentWeather.iconUrl").and_then(|v| v.as_text()),
            Some("https://cdn.jsdelivr.net/npm/meteo-icons/icons/weathericon_002.png")
        );
        assert_eq!(batch.value_of("800100.currentWeather.temperature"), Some(&StateValue::Number(14.5)));
    }

    #[test]
    fn test_missing_forecast_days_are_written_as_null() {
        let mut batch = StateBatch::new(false);
        map_postal_code_detail(&mut batch, 800100, &detail_with_graph(), ApiVersion::V3);

        assert_eq!(
            batch.value_of("800100.forecast-0.date").and_then(|v| v.as_text()),
            Some("2024-05-01")
        );
        assert_eq!(batch.value_of("800100.forecast-7.date"), Some(&StateValue::Null));
        assert_eq!(batch.value_of("800100.forecast-7.iconUrl"), Some(&StateValue::Null));
        assert_eq!(batch.value_of("800100.forecast-8.date"), None, "v3 has 8 forecast days");
    }

    #[test]
    fn test_missing_current_weather_writes_nulls() {
        let mut detail = detail_with_graph();
        detail.current_weather = None;
        let mut batch = StateBatch::new(false);
        map_postal_code_detail(&mut batch, 800100, &detail, ApiVersion::V3);
        for field in ["time", "icon", "iconUrl", "temperature"] {
            assert_eq!(
                batch.value_of(&format!("800100.currentWeather.{field}")),
                Some(&StateValue::Null),
                "{field} should be null"
            );
        }
    }

    #[test]
    fn test_window_icons_follow_api_version() {
        let detail = detail_with_graph();

        let mut v1 = StateBatch::new(false);
        map_postal_code_detail(&mut v1, 800100, &detail, ApiVersion::V1);
        assert_eq!(v1.value_of("800100.day-0-hour-03.icon"), Some(&StateValue::Number(1.0)));
        assert_eq!(v1.value_of("800100.day-6-hour-00.icon"), None, "v1 covers 6 days");

        let mut v3 = StateBatch::new(false);
        map_postal_code_detail(&mut v3, 800100, &detail, ApiVersion::V3);
        assert_eq!(v3.value_of("800100.day-7-hour-21.icon"), Some(&StateValue::Number(101.0)));
    }

    #[test]
    fn test_missing_graph_skips_window_writes_but_defines_objects() {
        let mut detail = detail_with_graph();
        detail.graph = None;
        let mut batch = StateBatch::new(true);
        map_postal_code_detail(&mut batch, 800100, &detail, ApiVersion::V1);

        assert!(batch.writes().iter().all(|(id, _)| !id.contains(".day-")));
        let channel = batch
            .objects()
            .iter()
            .find(|o| o.id == "800100.day-1-hour-21")
            .expect("window channel defined");
        assert_eq!(channel.name, "Tomorrow @ 21:00");
    }

    #[test]
    fn test_graph_without_cutover_skips_windows_only() {
        let mut detail = detail_with_graph();
        if let Some(graph) = detail.graph.as_mut() {
            graph.start_low_resolution = None;
        }
        let mut batch = StateBatch::new(false);
        map_postal_code_detail(&mut batch, 800100, &detail, ApiVersion::V3);

        assert!(batch.writes().iter().all(|(id, _)| !id.contains(".day-")));
        assert_eq!(batch.value_of("800100.currentWeather.temperature"), Some(&StateValue::Number(14.5)));
        assert_eq!(batch.value_of("800100.warning-01.level"), Some(&StateValue::Number(3.0)));
    }

    #[test]
    fn test_every_hazard_category_gets_a_channel() {
        let mut batch = StateBatch::new(true);
        map_postal_code_detail(&mut batch, 800100, &detail_with_graph(), ApiVersion::V3);

        assert_eq!(batch.value_of("800100.warning-01.level"), Some(&StateValue::Number(3.0)));
        assert_eq!(batch.value_of("800100.warning-11.level"), Some(&StateValue::Number(0.0)));
        assert_eq!(
            batch.objects().iter().filter(|o| o.id.ends_with(".level")).count(),
            HAZARD_CATALOGUE.len()
        );
    }

    #[test]
    fn test_forecast_channel_names() {
        let mut batch = StateBatch::new(true);
        map_postal_code_detail(&mut batch, 800100, &detail_with_graph(), ApiVersion::V3);
        let name = |id: &str| batch.objects().iter().find(|o| o.id == id).map(|o| o.name.clone());
        assert_eq!(name("800100.forecast-0").as_deref(), Some("Forecast Today"));
        assert_eq!(name("800100.forecast-3").as_deref(), Some("Forecast Today +3"));
    }

    #[test]
    fn test_station_plain_metrics_skip_missing_and_null_sentinel() {
        let m = StationMeasurements {
            temperature: Some(12.3),
            humidity: Some(32767.0),
            ..StationMeasurements::default()
        };
        let mut batch = StateBatch::new(true);
        map_station(&mut batch, "SMA", &m);

        assert_eq!(batch.value_of("SMA.temperature"), Some(&StateValue::Number(12.3)));
        assert_eq!(batch.value_of("SMA.humidity"), Some(&StateValue::Null));
        assert_eq!(batch.value_of("SMA.dewPoint"), None, "absent metrics are skipped");
        assert!(batch.objects().iter().all(|o| o.id != "SMA.dewPoint"));
    }

    #[test]
    fn test_station_timed_metrics_need_a_timestamp() {
        let m = StationMeasurements {
            wind_gust_max: Some(ValueTime { value: Some(54.0), timestamp: Some(1_714_564_800_000) }),
            temperature_max: Some(ValueTime { value: Some(20.0), timestamp: Some(0) }),
            snow_new: Some(3.0),
            foehn: Some(1.0),
            foehn_time: Some(1_714_564_800_000),
            ..StationMeasurements::default()
        };
        let mut batch = StateBatch::new(false);
        map_station(&mut batch, "SMA", &m);

        assert_eq!(batch.value_of("SMA.windGustMax.value"), Some(&StateValue::Number(54.0)));
        assert_eq!(
            batch.value_of("SMA.windGustMax.time").and_then(|v| v.as_text()),
            Some("2024-05-01T12:00:00.000Z")
        );
        assert_eq!(batch.value_of("SMA.temperatureMax.value"), None, "zero timestamp is skipped");
        assert_eq!(batch.value_of("SMA.snowNew.value"), None, "snowNew needs snowTime");
        assert_eq!(batch.value_of("SMA.foehn.value"), Some(&StateValue::Number(1.0)));
    }

    #[test]
    fn test_station_smn_time_always_written() {
        let mut batch = StateBatch::new(false);
        map_station(&mut batch, "SMA", &StationMeasurements::default());
        assert_eq!(batch.value_of("SMA.smnTime"), Some(&StateValue::Null));
    }
}
