//! Hazard warning resolution.
//!
//! Several warnings of the same hazard category can be active for a postal
//! code at once (e.g. a confirmed level 2 and an outlook for level 4). The
//! state tree shows a single warning per category, chosen here. Warnings
//! that arrive one at a time over the push channel go through
//! `apply_incoming` instead, which refuses downgrades unless a confirmed
//! warning replaces an outlook.

use std::cmp::Ordering;

use crate::hazards::{HazardCategory, LEVEL_LEGEND};
use crate::model::Warning;
use crate::state::{ObjectSpec, StateBatch, ValueType};
use crate::values::{to_timestamp_string, to_warning_icon_url};

// ---------------------------------------------------------------------------
// Selection among concurrent candidates
// ---------------------------------------------------------------------------

/// Picks the warning to show among the candidates of one category.
///
/// Candidates are ranked by descending level. The highest-ranked confirmed
/// (non-outlook) warning wins; if all candidates are outlooks, the highest
/// outlook wins. Returns `None` for no candidates.
///
/// The result does not depend on the order of `candidates`.
pub fn select_current<'a>(candidates: &[&'a Warning]) -> Option<&'a Warning> {
    let mut ranked = candidates.to_vec();
    ranked.sort_by(|a, b| rank(a, b));
    ranked
        .iter()
        .find(|w| !w.outlook)
        .or_else(|| ranked.first())
        .copied()
}

/// Selects the current warning of `hazard_id` from a full warning list.
pub fn select_for_category(warnings: &[Warning], hazard_id: i64) -> Option<&Warning> {
    let candidates: Vec<&Warning> = warnings.iter().filter(|w| w.warn_type == hazard_id).collect();
    select_current(&candidates)
}

/// Descending level, then a total order over the remaining fields so equal
/// levels never depend on input order.
fn rank(a: &Warning, b: &Warning) -> Ordering {
    b.warn_level
        .cmp(&a.warn_level)
        .then(a.outlook.cmp(&b.outlook))
        .then_with(|| a.valid_from.cmp(&b.valid_from))
        .then_with(|| a.valid_to.cmp(&b.valid_to))
        .then_with(|| a.ordering.cmp(&b.ordering))
        .then_with(|| a.text.cmp(&b.text))
        .then_with(|| a.html_text.cmp(&b.html_text))
}

// ---------------------------------------------------------------------------
// Incremental downgrade suppression
// ---------------------------------------------------------------------------

/// What the state tree currently shows for one warning channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoredWarning {
    /// `None` if the level state has never been written.
    pub level: Option<i64>,
    pub outlook: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Apply,
    Ignore,
}

/// Decides whether a single incoming warning replaces the stored one.
///
/// A strictly lower level is ignored, unless the stored warning is an
/// outlook and the incoming one is confirmed. `None` (no warning) always
/// applies and clears the channel.
pub fn apply_incoming(current: StoredWarning, incoming: Option<&Warning>) -> Resolution {
    let Some(incoming) = incoming else {
        return Resolution::Apply;
    };
    match current.level {
        Some(level) if level > incoming.warn_level => {
            let confirms_outlook = current.outlook == Some(true) && !incoming.outlook;
            if confirms_outlook {
                Resolution::Apply
            } else {
                Resolution::Ignore
            }
        }
        _ => Resolution::Apply,
    }
}

// ---------------------------------------------------------------------------
// State writes
// ---------------------------------------------------------------------------

/// Defines the warning channel and its states for one hazard category.
pub fn define_warning_channel(batch: &mut StateBatch, channel: &str, hazard: &HazardCategory) {
    batch.define(ObjectSpec::channel(channel, hazard.name));
    batch.define(
        ObjectSpec::state(format!("{channel}.level"), "Hazard level", ValueType::Number, "value", None)
            .with_legend(LEVEL_LEGEND),
    );
    batch.define(ObjectSpec::state(format!("{channel}.iconUrl"), "Icon URL", ValueType::String, "text.url", None));
    batch.define(ObjectSpec::state(format!("{channel}.text"), "Text", ValueType::String, "text", None));
    batch.define(ObjectSpec::state(format!("{channel}.html"), "HTML", ValueType::String, "html", None));
    batch.define(ObjectSpec::state(format!("{channel}.validFrom"), "Valid from", ValueType::String, "date", None));
    batch.define(ObjectSpec::state(format!("{channel}.validTo"), "Valid to", ValueType::String, "date", None));
    batch.define(ObjectSpec::state(format!("{channel}.outlook"), "Is outlook", ValueType::Boolean, "indicator", None));
}

/// Writes every field of a warning channel. `None` clears the channel to
/// level 0; level is never written as null.
pub fn write_warning(batch: &mut StateBatch, channel: &str, hazard_id: i64, warning: Option<&Warning>) {
    batch.set(format!("{channel}.level"), warning.map(|w| w.warn_level).unwrap_or(0));
    batch.set(
        format!("{channel}.iconUrl"),
        warning.map(|w| to_warning_icon_url(hazard_id, w.warn_level)),
    );
    batch.set(format!("{channel}.text"), warning.map(|w| w.text.clone()));
    batch.set(format!("{channel}.html"), warning.map(|w| w.html_text.clone()));
    batch.set(
        format!("{channel}.validFrom"),
        to_timestamp_string(warning.and_then(|w| w.valid_from)),
    );
    batch.set(
        format!("{channel}.validTo"),
        to_timestamp_string(warning.and_then(|w| w.valid_to)),
    );
    batch.set(format!("{channel}.outlook"), warning.map(|w| w.outlook));
}
