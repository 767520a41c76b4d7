//! Refresh scheduling and the service event loop.
//!
//! One thread runs every refresh pass in sequence and waits for the next
//! deadline on an event channel, so passes never overlap. The same channel
//! carries shutdown requests, push warnings and administrative queries.
//!
//! The upstream station feed is republished roughly every 10 minutes; the
//! next pass is timed 11 minutes after the last publication, kept within 3
//! to 11 minutes from now and spread by up to 30 seconds either way.

use chrono::Utc;
use rand::Rng;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::hazards::subscription_filters;
use crate::ingest::meteoswiss::{ApiVersion, MeteoClient, Transport};
use crate::logging::{self, DataSource};
use crate::mapping::{define_device, map_postal_code_detail, map_station};
use crate::model::{LabelEntry, Location, MeteoError, Result, StationMeasurements};
use crate::push::{PushEvent, PushHandler};
use crate::reference::ReferenceCache;
use crate::state::{ObjectSpec, StateBatch, StateStore, StateValue, ValueType};

const MINUTE_MS: i64 = 60 * 1000;

/// Time after a publication at which its data is reliably available.
pub const PUBLICATION_DELAY_MS: i64 = 11 * MINUTE_MS;
pub const MIN_DELAY_MS: i64 = 3 * MINUTE_MS;
pub const MAX_DELAY_MS: i64 = 11 * MINUTE_MS;
pub const JITTER_MS: i64 = 30 * 1000;

pub const CONNECTION_STATE: &str = "info.connection";

/// Delay until the next pass.
///
/// `server_time` is the last publication time in epoch milliseconds; when
/// unknown the raw delay is 0 and the lower bound applies.
pub fn next_delay<R: Rng>(server_time: Option<i64>, now_ms: i64, rng: &mut R) -> Duration {
    let raw = server_time.map_or(0, |ts| ts.saturating_add(PUBLICATION_DELAY_MS).saturating_sub(now_ms));
    let clamped = raw.clamp(MIN_DELAY_MS, MAX_DELAY_MS);
    let jittered = clamped + rng.gen_range(-JITTER_MS..=JITTER_MS);
    Duration::from_millis(jittered.max(0) as u64)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRequest {
    ListPostalCodes,
    ListStations,
}

#[derive(Debug)]
pub enum Event {
    Shutdown,
    Push(PushEvent),
    /// Answered on the sender; errors yield an empty list.
    Admin(AdminRequest, Sender<Vec<LabelEntry>>),
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Result of one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Every location and the station feed were refreshed.
    pub success: bool,
    /// Publication time reported by the station feed.
    pub server_time: Option<i64>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Owns the active location set and drives refresh passes.
pub struct Poller<T: Transport, S: StateStore> {
    client: MeteoClient<T>,
    cache: ReferenceCache,
    store: S,
    version: ApiVersion,
    postal_codes: Vec<u32>,
    stations: Vec<String>,
    first_run: bool,
    validated: bool,
    push: PushHandler,
}

impl<T: Transport, S: StateStore> Poller<T, S> {
    pub fn new(
        client: MeteoClient<T>,
        cache: ReferenceCache,
        store: S,
        version: ApiVersion,
        postal_codes: Vec<u32>,
        stations: Vec<String>,
    ) -> Self {
        Self {
            client,
            cache,
            store,
            version,
            postal_codes,
            stations,
            first_run: true,
            validated: false,
            push: PushHandler::new(),
        }
    }

    pub fn postal_codes(&self) -> &[u32] {
        &self.postal_codes
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn client(&self) -> &MeteoClient<T> {
        &self.client
    }

    /// Creates the service's own states and marks the connection down.
    pub fn start(&mut self) -> Result<()> {
        self.store.ensure_object(&ObjectSpec::channel("info", "Information"))?;
        self.store.ensure_object(&ObjectSpec::state(
            CONNECTION_STATE,
            "Connected to the weather service",
            ValueType::Boolean,
            "indicator.connected",
            None,
        ))?;
        self.store.write(CONNECTION_STATE, StateValue::Bool(false))?;
        self.push.restore(&mut self.store)?;
        logging::debug(
            DataSource::Push,
            None,
            &format!("{} warning subscription filters available", subscription_filters().len()),
        );
        self.store.flush()
    }

    /// Runs one refresh pass. Never fails: errors are logged and reported
    /// through the outcome and the connection state.
    pub fn poll_once(&mut self) -> PassOutcome {
        let outcome = match self.refresh() {
            Ok(outcome) => outcome,
            Err(e) => {
                logging::error(DataSource::System, None, &format!("Update error {}", e));
                PassOutcome::default()
            }
        };

        if outcome.success && self.first_run {
            logging::debug(DataSource::System, None, "All objects created, switching to updates only");
            self.first_run = false;
        }

        if let Err(e) = self.store.write(CONNECTION_STATE, StateValue::Bool(outcome.success)) {
            logging::error(DataSource::State, None, &format!("Couldn't update {}: {}", CONNECTION_STATE, e));
        }
        self.flush();
        outcome
    }

    fn refresh(&mut self) -> Result<PassOutcome> {
        self.cache.ensure_current(&self.client)?;

        if !self.validated {
            self.validate_locations();
            self.validated = true;
        }

        let mut succeeded = 0;
        let mut failed = 0;

        for zip in self.postal_codes.clone() {
            logging::debug(DataSource::Remote, Some(zip.to_string().as_str()), "Updating");
            match self.client.fetch_plz_detail(zip) {
                Ok(detail) => {
                    let mut batch = StateBatch::new(self.first_run);
                    map_postal_code_detail(&mut batch, zip, &detail, self.version);
                    batch.apply(&mut self.store)?;
                    succeeded += 1;
                }
                Err(e) => {
                    logging::log_failure(DataSource::Remote, &zip.to_string(), "plzDetail", &e);
                    failed += 1;
                }
            }
        }

        let current = self.client.fetch_current_weather()?;
        let empty = StationMeasurements::default();
        for station in &self.stations {
            logging::debug(DataSource::Remote, Some(station.as_str()), "Updating");
            let measurements = current.data.get(station).unwrap_or(&empty);
            let mut batch = StateBatch::new(self.first_run);
            map_station(&mut batch, station, measurements);
            batch.apply(&mut self.store)?;
            succeeded += 1;
        }

        logging::log_pass_summary(succeeded + failed, succeeded, failed);
        Ok(PassOutcome {
            success: failed == 0,
            server_time: current.smn_time,
            succeeded,
            failed,
        })
    }

    /// Resolves every configured location against the snapshot and creates
    /// its device. Locations that fail are dropped for the lifetime of the
    /// process.
    fn validate_locations(&mut self) {
        let mut postal_codes = Vec::with_capacity(self.postal_codes.len());
        for zip in std::mem::take(&mut self.postal_codes) {
            let id = zip.to_string();
            logging::debug(DataSource::Snapshot, Some(id.as_str()), "Creating objects");
            match self.cache.find_postal_code(zip).and_then(|found| self.create_device(&id, found)) {
                Ok(()) => postal_codes.push(zip),
                Err(e) => logging::warn(
                    DataSource::Snapshot,
                    Some(id.as_str()),
                    &format!("Couldn't create objects, not polling its values: {}", e),
                ),
            }
        }
        self.postal_codes = postal_codes;

        let mut stations = Vec::with_capacity(self.stations.len());
        for code in std::mem::take(&mut self.stations) {
            logging::debug(DataSource::Snapshot, Some(code.as_str()), "Creating objects");
            match self.cache.find_station(&code).and_then(|found| self.create_device(&code, found)) {
                Ok(()) => stations.push(code),
                Err(e) => logging::warn(
                    DataSource::Snapshot,
                    Some(code.as_str()),
                    &format!("Couldn't create objects, not polling its values: {}", e),
                ),
            }
        }
        self.stations = stations;
    }

    fn create_device(&mut self, id: &str, found: Option<Location>) -> Result<()> {
        let location = found.ok_or_else(|| MeteoError::LocationNotFound(id.to_string()))?;
        let mut batch = StateBatch::new(true);
        define_device(&mut batch, &location);
        batch.apply(&mut self.store)
    }

    fn flush(&mut self) {
        if let Err(e) = self.store.flush() {
            logging::error(DataSource::State, None, &format!("Couldn't persist states: {}", e));
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Handles a non-timer event.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Shutdown => {}
            Event::Push(push) => {
                if let Err(e) = self.push.handle(&mut self.store, &push) {
                    logging::error(DataSource::Push, None, &format!("Couldn't handle push notification: {}", e));
                }
                self.flush();
            }
            Event::Admin(request, reply) => {
                let entries = self.admin_query(request);
                // The requester may have given up waiting.
                let _ = reply.send(entries);
            }
        }
    }

    /// Lists snapshot locations. Errors yield an empty list and a warning.
    pub fn admin_query(&mut self, request: AdminRequest) -> Vec<LabelEntry> {
        let result = self.cache.ensure_current(&self.client).and_then(|()| match request {
            AdminRequest::ListPostalCodes => self.cache.list_postal_codes(),
            AdminRequest::ListStations => self.cache.list_stations(),
        });
        result.unwrap_or_else(|e| {
            logging::warn(DataSource::System, None, &format!("Couldn't handle {:?}: {}", request, e));
            Vec::new()
        })
    }

    /// Polls until `Shutdown` arrives or every sender is gone. The first pass
    /// runs immediately.
    pub fn run(&mut self, events: &Receiver<Event>) -> Result<()> {
        self.start()?;
        let mut deadline = Instant::now();

        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(wait) {
                Ok(Event::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {
                    logging::info(DataSource::System, None, "Refreshing data");
                    let outcome = self.poll_once();
                    let delay = next_delay(
                        outcome.server_time,
                        Utc::now().timestamp_millis(),
                        &mut rand::thread_rng(),
                    );
                    logging::debug(
                        DataSource::System,
                        None,
                        &format!("Next update will be in {} seconds", delay.as_secs()),
                    );
                    deadline = Instant::now() + delay;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Persists the state tree and closes the snapshot.
    pub fn shutdown(&mut self) {
        logging::info(DataSource::System, None, "Shutting down");
        self.flush();
        self.cache.close();
    }
}
