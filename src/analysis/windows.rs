//! Three-hour forecast windows.
//!
//! The forecast graph carries hourly temperature series, 3-hourly
//! icon/wind series and a precipitation series that changes resolution at a
//! server-supplied cutover: 10-minute samples before it, hourly samples from
//! then on. This module folds those series into one statistic set per
//! 3-hour window, 8 windows per day.

use crate::model::Graph;

pub const HOURS_PER_DAY: usize = 24;
pub const HOURS_PER_WINDOW: usize = 3;

/// Nominal 10-minute slots in one window.
pub const SLOTS_PER_WINDOW: usize = 18;

/// 10-minute slots folded into one hourly precipitation sample.
const SLOTS_PER_HOUR: usize = 6;

const TEN_MINUTES_MS: i64 = 10 * 60 * 1000;
const HOUR_MS: i64 = 60 * 60 * 1000;

/// Statistics for one 3-hour window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStats {
    /// Day offset from the graph start.
    pub day: usize,
    /// First hour of the window within its day (0, 3, ..., 21).
    pub hour: usize,
    /// Window start, epoch milliseconds.
    pub time: i64,
    pub icon: Option<i64>,
    pub wind_direction: Option<f64>,
    pub wind_speed: Option<f64>,
    pub temperature_min: Option<f64>,
    pub temperature_max: Option<f64>,
    pub temperature_mean: Option<f64>,
    /// Millimetres over the window.
    pub precipitation: Option<f64>,
}

/// Walks the mixed-resolution precipitation series window by window.
///
/// Both indices persist across windows: the series are globally ordered and
/// consumed monotonically over one aggregation pass.
#[derive(Debug)]
pub struct PrecipitationCursor<'a> {
    graph: &'a Graph,
    cutover: i64,
    index_10m: usize,
    index_1h: usize,
}

impl<'a> PrecipitationCursor<'a> {
    /// `None` if the graph carries no cutover time.
    pub fn new(graph: &'a Graph) -> Option<Self> {
        Some(Self {
            graph,
            cutover: graph.start_low_resolution?,
            index_10m: 0,
            index_1h: 0,
        })
    }

    /// Number of 10-minute and hourly samples consumed so far.
    pub fn consumed(&self) -> (usize, usize) {
        (self.index_10m, self.index_1h)
    }

    /// Sums precipitation for the window starting at `window_start`.
    ///
    /// Slots before the cutover consume one 10-minute sample each. From the
    /// cutover on, one hourly sample is consumed, weighted by 6 and the walk
    /// skips the 6 slots it covers. The accumulated slot sum is scaled to the
    /// window with `(sum / 18) * 3`.
    ///
    /// Returns `None` if a consumed sample is missing from its series; the
    /// cursor still advances past it.
    pub fn window_sum(&mut self, window_start: i64) -> Option<f64> {
        let mut sum = Some(0.0);
        let mut slot = 0;
        while slot < SLOTS_PER_WINDOW {
            let slot_time = window_start + slot as i64 * TEN_MINUTES_MS;
            if slot_time < self.cutover {
                let sample = self.graph.precipitation10m.get(self.index_10m).copied();
                self.index_10m += 1;
                sum = sum.zip(sample).map(|(s, v)| s + v);
                slot += 1;
            } else {
                let sample = self.graph.precipitation1h.get(self.index_1h).copied();
                self.index_1h += 1;
                sum = sum.zip(sample).map(|(s, v)| s + v * SLOTS_PER_HOUR as f64);
                slot += SLOTS_PER_HOUR;
            }
        }
        sum.map(|s| s / SLOTS_PER_WINDOW as f64 * HOURS_PER_WINDOW as f64)
    }
}

/// Aggregates `days` days of 3-hour windows from `graph`.
///
/// `icons` is the 3-hourly icon series to report; which one applies depends
/// on the API version. Empty if the graph lacks its start or cutover time.
pub fn aggregate_windows(graph: &Graph, icons: &[i64], days: usize) -> Vec<WindowStats> {
    let (Some(start), Some(mut cursor)) = (graph.start, PrecipitationCursor::new(graph)) else {
        return Vec::new();
    };
    let mut windows = Vec::with_capacity(days * HOURS_PER_DAY / HOURS_PER_WINDOW);

    for day in 0..days {
        for hour in (0..HOURS_PER_DAY).step_by(HOURS_PER_WINDOW) {
            let index_1h = day * HOURS_PER_DAY + hour;
            let index_3h = index_1h / HOURS_PER_WINDOW;
            let time = start + index_1h as i64 * HOUR_MS;

            let min = hourly(&graph.temperature_min1h, index_1h);
            let max = hourly(&graph.temperature_max1h, index_1h);
            let mean = hourly(&graph.temperature_mean1h, index_1h);

            windows.push(WindowStats {
                day,
                hour,
                time,
                icon: icons.get(index_3h).copied(),
                wind_direction: graph.wind_direction3h.get(index_3h).copied(),
                wind_speed: graph.wind_speed3h.get(index_3h).copied(),
                temperature_min: min.iter().copied().reduce(f64::min),
                temperature_max: max.iter().copied().reduce(f64::max),
                temperature_mean: if mean.len() == HOURS_PER_WINDOW {
                    Some(mean.iter().sum::<f64>() / HOURS_PER_WINDOW as f64)
                } else {
                    None
                },
                precipitation: cursor.window_sum(time),
            });
        }
    }

    windows
}

/// The hourly samples of the window starting at `index`, truncated at the
/// end of the series.
fn hourly(series: &[f64], index: usize) -> &[f64] {
    let start = index.min(series.len());
    let end = (index + HOURS_PER_WINDOW).min(series.len());
    &series[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2024-05-01T00:00:00Z
    const START: i64 = 1_714_521_600_000;

    fn graph_with_precipitation(cutover: i64, p10m: Vec<f64>, p1h: Vec<f64>) -> Graph {
        Graph {
            start: Some(START),
            start_low_resolution: Some(cutover),
            precipitation10m: p10m,
            precipitation1h: p1h,
            ..Graph::default()
        }
    }

    #[test]
    fn test_window_entirely_before_cutover_sums_ten_minute_samples() {
        let graph = graph_with_precipitation(START + 24 * HOUR_MS, vec![1.0; 18], vec![]);
        let mut cursor = PrecipitationCursor::new(&graph).expect("cutover present");
        let sum = cursor.window_sum(START).expect("all samples present");
        assert!((sum - 3.0).abs() < 1e-9, "expected (18 * 1.0 / 18) * 3 = 3.0, got {}", sum);
        assert_eq!(cursor.consumed(), (18, 0));
    }

    #[test]
    fn test_window_across_cutover_consumes_two_hourly_samples() {
        // One hour of 10-minute data, then two hours at hourly resolution.
        let graph = graph_with_precipitation(START + HOUR_MS, vec![2.0; 6], vec![3.0, 3.0]);
        let mut cursor = PrecipitationCursor::new(&graph).expect("cutover present");
        let sum = cursor.window_sum(START).expect("all samples present");
        // (6 * 2.0 + 2 * 3.0 * 6) / 18 * 3 = 48 / 18 * 3 = 8.0
        assert!((sum - 8.0).abs() < 1e-9, "expected 8.0, got {}", sum);
        assert_eq!(cursor.consumed(), (6, 2), "exactly 2 hourly samples should be consumed");
    }

    #[test]
    fn test_window_after_cutover_uses_hourly_samples_only() {
        let graph = graph_with_precipitation(START, vec![], vec![0.5, 1.0, 1.5]);
        let mut cursor = PrecipitationCursor::new(&graph).expect("cutover present");
        let sum = cursor.window_sum(START).expect("all samples present");
        // (0.5 + 1.0 + 1.5) * 6 / 18 * 3 = 3.0: the hourly values sum up
        assert!((sum - 3.0).abs() < 1e-9, "got {}", sum);
        assert_eq!(cursor.consumed(), (0, 3));
    }

    #[test]
    fn test_cursor_persists_across_windows() {
        // Cutover after the first window: window 0 uses 18 ten-minute samples,
        // window 1 must start reading the hourly series at index 0.
        let mut p10m = vec![0.0; 18];
        p10m.extend([9.0; 18]); // never consumed
        let graph = graph_with_precipitation(START + 3 * HOUR_MS, p10m, vec![1.0, 2.0, 3.0, 4.0]);
        let mut cursor = PrecipitationCursor::new(&graph).expect("cutover present");

        assert_eq!(cursor.window_sum(START), Some(0.0));
        let second = cursor.window_sum(START + 3 * HOUR_MS).expect("samples present");
        assert!((second - 6.0).abs() < 1e-9, "got {}", second);
        assert_eq!(cursor.consumed(), (18, 3));
    }

    #[test]
    fn test_missing_sample_makes_window_absent_but_advances() {
        let graph = graph_with_precipitation(START + 24 * HOUR_MS, vec![1.0; 10], vec![]);
        let mut cursor = PrecipitationCursor::new(&graph).expect("cutover present");
        assert_eq!(cursor.window_sum(START), None);
        assert_eq!(cursor.consumed(), (18, 0));
    }

    #[test]
    fn test_temperature_stats_over_three_hourly_samples() {
        let graph = Graph {
            start: Some(START),
            start_low_resolution: Some(START),
            precipitation1h: vec![0.0; 48],
            temperature_min1h: vec![5.0, 3.0, 4.0, 7.0, 8.0, 6.0],
            temperature_max1h: vec![9.0, 11.0, 10.0, 12.0, 14.0, 13.0],
            temperature_mean1h: vec![6.0, 7.0, 8.0, 9.0, 10.0, 11.0],
            ..Graph::default()
        };
        let windows = aggregate_windows(&graph, &[], 1);
        assert_eq!(windows.len(), 8);

        let first = &windows[0];
        assert_eq!(first.temperature_min, Some(3.0));
        assert_eq!(first.temperature_max, Some(11.0));
        assert_eq!(first.temperature_mean, Some(7.0));

        let second = &windows[1];
        assert_eq!(second.temperature_min, Some(6.0));
        assert_eq!(second.temperature_max, Some(14.0));
        assert_eq!(second.temperature_mean, Some(10.0));

        // Series exhausted after two windows.
        assert_eq!(windows[2].temperature_min, None);
        assert_eq!(windows[2].temperature_mean, None);
    }

    #[test]
    fn test_window_times_and_three_hour_lookups() {
        let graph = Graph {
            start: Some(START),
            start_low_resolution: Some(START),
            precipitation1h: vec![0.0; 48],
            wind_direction3h: (0..16).map(|i| i as f64 * 10.0).collect(),
            wind_speed3h: (0..16).map(|i| i as f64).collect(),
            ..Graph::default()
        };
        let icons: Vec<i64> = (100..116).collect();
        let windows = aggregate_windows(&graph, &icons, 2);
        assert_eq!(windows.len(), 16);

        let w = &windows[9]; // day 1, 03:00
        assert_eq!((w.day, w.hour), (1, 3));
        assert_eq!(w.time, START + 27 * HOUR_MS);
        assert_eq!(w.icon, Some(109));
        assert_eq!(w.wind_direction, Some(90.0));
        assert_eq!(w.wind_speed, Some(9.0));
    }

    #[test]
    fn test_full_cadence_covers_requested_days() {
        let graph = graph_with_precipitation(START, vec![], vec![0.0; 8 * 24]);
        assert_eq!(aggregate_windows(&graph, &[], 6).len(), 48);
        assert_eq!(aggregate_windows(&graph, &[], 8).len(), 64);
    }

    #[test]
    fn test_graph_without_start_or_cutover_yields_no_windows() {
        let mut graph = graph_with_precipitation(START, vec![], vec![0.0; 24]);
        graph.start_low_resolution = None;
        assert!(PrecipitationCursor::new(&graph).is_none());
        assert!(aggregate_windows(&graph, &[], 1).is_empty());

        let mut graph = graph_with_precipitation(START, vec![], vec![0.0; 24]);
        graph.start = None;
        assert!(aggregate_windows(&graph, &[], 1).is_empty());
    }
}
