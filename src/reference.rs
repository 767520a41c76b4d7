/// Local reference snapshot of postal codes and weather stations.
///
/// The weather service publishes its location metadata as a versioned SQLite
/// file. `ReferenceCache` keeps one local copy open read-only and replaces
/// it wholesale whenever the remote version differs from the local one.
///
/// Snapshot layout:
///   metadata(version)
///   plz(plz_pk, primary_name, warnregion, station, active, x, y, altitude)
///   wetterstation(station_pk, name, ..., active, x, y, altitude,
///                 temperature, sunshine, precipitation, humidity,
///                 foehn, wind, snow, pressure)

use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::meteoswiss::{MeteoClient, Transport, SNAPSHOT_FILE};
use crate::logging::{self, DataSource};
use crate::model::{LabelEntry, Location, LocationId, MeteoError, MetricCategory, Result};

/// Station flag columns and the metric category each one enables.
const STATION_CATEGORY_COLUMNS: &[(&str, MetricCategory)] = &[
    ("temperature", MetricCategory::Temperature),
    ("sunshine", MetricCategory::Sunshine),
    ("precipitation", MetricCategory::Precipitation),
    ("humidity", MetricCategory::Humidity),
    ("foehn", MetricCategory::Foehn),
    ("wind", MetricCategory::Wind),
    ("snow", MetricCategory::Snow),
    ("pressure", MetricCategory::Pressure),
];

pub struct ReferenceCache {
    path: PathBuf,
    conn: Option<Connection>,
}

impl ReferenceCache {
    /// A cache keeping its snapshot at `<data_dir>/db.sqlite`. Nothing is
    /// opened until `ensure_current`.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            path: data_dir.as_ref().join(SNAPSHOT_FILE),
            conn: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Makes sure the local snapshot matches the remote version.
    ///
    /// Any problem with the local copy (missing, unreadable, outdated) only
    /// forces a redownload and is logged at debug level. Errors while
    /// downloading or reopening propagate.
    pub fn ensure_current<T: Transport>(&mut self, client: &MeteoClient<T>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        match self.check_local(client) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => logging::debug(
                DataSource::Snapshot,
                None,
                &format!("Couldn't open local snapshot {}: {}", self.path.display(), e),
            ),
        }

        self.close();
        client.download_snapshot(&self.path)?;
        self.open()?;
        logging::debug(DataSource::Snapshot, None, "Snapshot ready");
        Ok(())
    }

    /// `Ok(true)` if the open local snapshot carries the remote version.
    fn check_local<T: Transport>(&mut self, client: &MeteoClient<T>) -> Result<bool> {
        if self.conn.is_none() {
            self.open()?;
        }

        let info = client.fetch_db_info()?;
        let local = self.local_version()?;
        let remote = info.db_version.to_string();

        if local.as_deref() == Some(remote.as_str()) {
            logging::debug(DataSource::Snapshot, None, &format!("Snapshot ready: {}", remote));
            return Ok(true);
        }

        logging::debug(
            DataSource::Snapshot,
            None,
            &format!(
                "Outdated local snapshot: {} <> {}",
                local.as_deref().unwrap_or("none"),
                remote
            ),
        );
        Ok(false)
    }

    fn open(&mut self) -> Result<()> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Closes the snapshot handle, if open. Close errors are logged only.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                logging::debug(DataSource::Snapshot, None, &format!("Couldn't close snapshot: {}", e));
            }
        }
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| MeteoError::SnapshotNotOpen(self.path.display().to_string()))
    }

    /// Version stored in the local snapshot's metadata row, as text.
    pub fn local_version(&self) -> Result<Option<String>> {
        let value: Option<Value> = self
            .conn()?
            .query_row("SELECT version FROM metadata LIMIT 1", [], |row| row.get(0))
            .optional()?;

        Ok(value.and_then(|v| match v {
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Text(s) => Some(s),
            Value::Null | Value::Blob(_) => None,
        }))
    }

    /// Looks up a postal code by its `plz_pk`.
    pub fn find_postal_code(&self, zip: u32) -> Result<Option<Location>> {
        let location = self
            .conn()?
            .query_row(
                "SELECT plz_pk, primary_name, active, x, y, altitude FROM plz WHERE plz_pk = ?1",
                params![zip],
                |row| {
                    Ok(Location {
                        id: LocationId::PostalCode(row.get(0)?),
                        name: row.get(1)?,
                        active: flag(row, 2)?,
                        x: real(row, 3)?,
                        y: real(row, 4)?,
                        altitude: real(row, 5)?,
                        categories: Vec::new(),
                    })
                },
            )
            .optional()?;
        Ok(location)
    }

    /// Looks up a weather station by its `station_pk`.
    pub fn find_station(&self, code: &str) -> Result<Option<Location>> {
        let columns: Vec<&str> = STATION_CATEGORY_COLUMNS.iter().map(|(c, _)| *c).collect();
        let sql = format!(
            "SELECT station_pk, name, active, x, y, altitude, {} FROM wetterstation WHERE station_pk = ?1",
            columns.join(", ")
        );

        let location = self
            .conn()?
            .query_row(&sql, params![code], |row| {
                let mut categories = Vec::new();
                for (i, (_, category)) in STATION_CATEGORY_COLUMNS.iter().enumerate() {
                    if flag(row, 6 + i)? {
                        categories.push(*category);
                    }
                }
                Ok(Location {
                    id: LocationId::Station(row.get(0)?),
                    name: row.get(1)?,
                    active: flag(row, 2)?,
                    x: real(row, 3)?,
                    y: real(row, 4)?,
                    altitude: real(row, 5)?,
                    categories,
                })
            })
            .optional()?;
        Ok(location)
    }

    /// All postal codes in the snapshot with their primary names.
    pub fn list_postal_codes(&self) -> Result<Vec<LabelEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT plz_pk, primary_name FROM plz ORDER BY plz_pk")?;
        let rows = stmt.query_map([], |row| {
            Ok(LabelEntry {
                id: row.get::<_, i64>(0)?.to_string(),
                label: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// All weather stations in the snapshot with their names.
    pub fn list_stations(&self) -> Result<Vec<LabelEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT station_pk, name FROM wetterstation ORDER BY station_pk")?;
        let rows = stmt.query_map([], |row| {
            Ok(LabelEntry {
                id: row.get(0)?,
                label: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl Drop for ReferenceCache {
    fn drop(&mut self) {
        self.close();
    }
}

/// 0/1 flag column; NULL reads as unset.
fn flag(row: &Row<'_>, index: usize) -> rusqlite::Result<bool> {
    Ok(row.get::<_, Option<i64>>(index)?.unwrap_or(0) != 0)
}

fn real(row: &Row<'_>, index: usize) -> rusqlite::Result<f64> {
    Ok(row.get::<_, Option<f64>>(index)?.unwrap_or_default())
}
