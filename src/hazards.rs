/// Hazard category registry for the weather warning states.
///
/// Defines the fixed catalogue of hazard categories mirrored for every
/// postal code. The numeric ids are the weather service's `warnType`
/// enumeration and form a wire contract: never renumber an entry, even when
/// reordering the list. All other modules should reference categories from
/// here rather than hardcoding ids.

// ---------------------------------------------------------------------------
// Hazard metadata
// ---------------------------------------------------------------------------

/// Metadata for a single hazard category.
#[derive(Debug)]
pub struct HazardCategory {
    /// Upstream `warnType` value.
    pub id: i64,
    /// Display name used for the warning channel.
    pub name: &'static str,
    /// Lowest level requested when subscribing to push warnings.
    /// `None` means the category is never subscribed. Not applied when
    /// mirroring polled warnings: every level is shown.
    pub minimum_level: Option<i64>,
}

/// All hazard categories published by the weather service. Id 6 is unused
/// upstream.
pub static HAZARD_CATALOGUE: &[HazardCategory] = &[
    HazardCategory { id: 0, name: "Wind", minimum_level: Some(2) },
    HazardCategory { id: 1, name: "Thunderstorms", minimum_level: Some(3) },
    HazardCategory { id: 2, name: "Rain", minimum_level: Some(2) },
    HazardCategory { id: 3, name: "Snow", minimum_level: Some(2) },
    HazardCategory { id: 4, name: "Slippery Roads", minimum_level: Some(2) },
    HazardCategory { id: 5, name: "Frost", minimum_level: Some(2) },
    HazardCategory { id: 7, name: "Heat Waves", minimum_level: Some(3) },
    HazardCategory { id: 8, name: "Avalanches", minimum_level: Some(2) },
    HazardCategory { id: 9, name: "Earthquakes", minimum_level: None },
    HazardCategory { id: 10, name: "Forest Fire", minimum_level: Some(2) },
    HazardCategory { id: 11, name: "Flood", minimum_level: Some(2) },
    HazardCategory { id: 12, name: "Drought", minimum_level: Some(2) },
];

/// Legend for the `level` state of every warning channel.
pub static LEVEL_LEGEND: &[(i64, &str)] = &[
    (0, "None"),
    (1, "Minimal"),
    (2, "Moderate"),
    (3, "Significant"),
    (4, "Severe"),
    (5, "Very severe"),
];

/// Looks up a hazard category by its upstream id. Returns `None` if unknown.
pub fn find_hazard(id: i64) -> Option<&'static HazardCategory> {
    HAZARD_CATALOGUE.iter().find(|h| h.id == id)
}

/// Channel suffix for a hazard category, e.g. `warning-07`.
pub fn warning_channel_suffix(id: i64) -> String {
    format!("warning-{:02}", id)
}

/// A push subscription filter: deliver warnings of `warn_type` at or above
/// `warn_level`, outlooks included.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    pub warn_type: i64,
    pub warn_level: i64,
    pub with_outlook: bool,
}

/// Returns the subscription filters for every category that has a minimum
/// level.
pub fn subscription_filters() -> Vec<SubscriptionFilter> {
    HAZARD_CATALOGUE
        .iter()
        .filter_map(|h| {
            h.minimum_level.map(|level| SubscriptionFilter {
                warn_type: h.id,
                warn_level: level,
                with_outlook: true,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
