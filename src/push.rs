//! Inbound push warnings.
//!
//! Single warnings delivered asynchronously (one notification per warning)
//! rather than as part of a polled detail response. Every field arrives as
//! a string. Each event is merged into the existing warning channel through
//! the downgrade rule in `alert::warnings::apply_incoming`.

use serde::Deserialize;

use crate::alert::warnings::{apply_incoming, write_warning, Resolution, StoredWarning};
use crate::hazards::warning_channel_suffix;
use crate::logging::{self, DataSource};
use crate::model::{MeteoError, Result, Warning};
use crate::state::{ObjectSpec, StateBatch, StateStore, StateValue, ValueType};

pub const PUSH_IDS_STATE: &str = "info.push-ids";

/// Notification payload as delivered by the push channel.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushWarning {
    pub plz: String,
    pub warn_type: String,
    pub warn_level: String,
    #[serde(default)]
    pub warn_text: String,
    #[serde(default)]
    pub valid_from: Option<String>,
    #[serde(default)]
    pub valid_to: Option<String>,
    #[serde(default)]
    pub ordering: String,
    /// `"true"` for an outlook.
    #[serde(default)]
    pub outlook: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEvent {
    pub persistent_id: String,
    pub warning: PushWarning,
}

impl PushWarning {
    fn hazard_id(&self) -> Result<i64> {
        parse_int("warnType", &self.warn_type)
    }

    /// Warning channel id, e.g. `800100.warning-07`.
    pub fn channel(&self) -> Result<String> {
        Ok(format!("{}.{}", self.plz, warning_channel_suffix(self.hazard_id()?)))
    }

    /// Converts the string payload into a warning. The push payload carries
    /// no separate HTML text; the plain text is used for both.
    pub fn to_warning(&self) -> Result<Warning> {
        Ok(Warning {
            warn_type: self.hazard_id()?,
            warn_level: parse_int("warnLevel", &self.warn_level)?,
            text: self.warn_text.clone(),
            html_text: self.warn_text.clone(),
            valid_from: self.valid_from.as_deref().and_then(|s| s.trim().parse().ok()),
            valid_to: self.valid_to.as_deref().and_then(|s| s.trim().parse().ok()),
            ordering: self.ordering.clone(),
            outlook: self.outlook == "true",
            links: Vec::new(),
        })
    }
}

fn parse_int(field: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| MeteoError::Parse(format!("invalid {} '{}'", field, value)))
}

/// Applies push events to the state tree and tracks the received
/// notification ids.
#[derive(Debug, Default)]
pub struct PushHandler {
    persistent_ids: Vec<String>,
}

impl PushHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persistent_ids(&self) -> &[String] {
        &self.persistent_ids
    }

    /// Defines the id list state and picks up ids stored by an earlier run.
    pub fn restore<S: StateStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        store.ensure_object(&ObjectSpec::state(
            PUSH_IDS_STATE,
            "Push persistent IDs",
            ValueType::String,
            "json",
            None,
        ))?;

        if let Some(StateValue::Text(json)) = store.read(PUSH_IDS_STATE)? {
            match serde_json::from_str::<Vec<String>>(&json) {
                Ok(ids) => self.persistent_ids = ids,
                Err(e) => logging::debug(
                    DataSource::Push,
                    None,
                    &format!("Ignoring unreadable {}: {}", PUSH_IDS_STATE, e),
                ),
            }
        }
        Ok(())
    }

    /// Records the event id, then applies the warning unless it is a
    /// suppressed downgrade.
    ///
    /// Fails if the payload is malformed or the target warning channel does
    /// not exist.
    pub fn handle<S: StateStore + ?Sized>(&mut self, store: &mut S, event: &PushEvent) -> Result<Resolution> {
        self.persistent_ids.push(event.persistent_id.clone());
        store.write(PUSH_IDS_STATE, StateValue::Text(serde_json::to_string(&self.persistent_ids)?))?;

        let payload = &event.warning;
        let channel = payload.channel()?;
        if !store.object_exists(&channel)? {
            return Err(MeteoError::State(format!(
                "Received warning {} for {}, but couldn't find channel",
                payload.warn_type, payload.plz
            )));
        }

        let warning = payload.to_warning()?;
        let current = StoredWarning {
            level: store
                .read(&format!("{channel}.level"))?
                .and_then(|v| v.as_number())
                .map(|n| n as i64),
            outlook: store.read(&format!("{channel}.outlook"))?.and_then(|v| v.as_bool()),
        };

        let resolution = apply_incoming(current, Some(&warning));
        match resolution {
            Resolution::Ignore => logging::debug(
                DataSource::Push,
                Some(payload.plz.as_str()),
                &format!("Ignoring warning {} because of lower level", payload.warn_type),
            ),
            Resolution::Apply => {
                let mut batch = StateBatch::new(false);
                write_warning(&mut batch, &channel, warning.warn_type, Some(&warning));
                batch.apply(store)?;
            }
        }
        Ok(resolution)
    }
}
