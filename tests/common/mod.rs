//! Shared fixtures: a scripted transport that serves canned bodies and
//! writes real SQLite snapshots on download.

#![allow(dead_code)]

use meteo_service::ingest::meteoswiss::{Endpoints, Transport};
use meteo_service::model::{MeteoError, Result};
use rusqlite::{params, Connection};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

pub const STATIC_BASE: &str = "https://static.test/v1/";
pub const DYNAMIC_BASE: &str = "https://dynamic.test/v3/";

pub fn endpoints() -> Endpoints {
    Endpoints {
        static_base: STATIC_BASE.to_string(),
        dynamic_base: DYNAMIC_BASE.to_string(),
    }
}

/// Contents of a reference snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotFixture {
    pub version: String,
    pub postal_codes: Vec<(u32, String)>,
    pub stations: Vec<(String, String)>,
}

impl SnapshotFixture {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            postal_codes: vec![(800100, "Zürich".to_string()), (300000, "Bern".to_string())],
            stations: vec![("SMA".to_string(), "Zürich / Fluntern".to_string())],
        }
    }
}

/// Writes a snapshot file with the reference schema.
pub fn write_snapshot(path: &Path, fixture: &SnapshotFixture) {
    if path.exists() {
        std::fs::remove_file(path).unwrap();
    }
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE metadata (version TEXT);
         CREATE TABLE plz (plz_pk INTEGER PRIMARY KEY, primary_name TEXT, warnregion INTEGER,
                           station TEXT, active INTEGER, x REAL, y REAL, altitude REAL);
         CREATE TABLE wetterstation (station_pk TEXT PRIMARY KEY, name TEXT, active INTEGER,
                           x REAL, y REAL, altitude INTEGER,
                           temperature INTEGER, sunshine INTEGER, precipitation INTEGER,
                           humidity INTEGER, foehn INTEGER, wind INTEGER, snow INTEGER,
                           pressure INTEGER);",
    )
    .unwrap();
    conn.execute("INSERT INTO metadata VALUES (?1)", params![fixture.version]).unwrap();
    for (zip, name) in &fixture.postal_codes {
        conn.execute(
            "INSERT INTO plz VALUES (?1, ?2, 1, 'SMA', 1, 683000, 247000, 408)",
            params![zip, name],
        )
        .unwrap();
    }
    for (code, name) in &fixture.stations {
        conn.execute(
            "INSERT INTO wetterstation VALUES (?1, ?2, 1, 685117, 248066, 556, 1, 1, 1, 1, 1, 1, 1, 1)",
            params![code, name],
        )
        .unwrap();
    }
}

/// Serves canned bodies by URL and records every request.
pub struct ScriptedTransport {
    bodies: RefCell<HashMap<String, String>>,
    snapshot: RefCell<Option<SnapshotFixture>>,
    requests: RefCell<Vec<String>>,
    downloads: RefCell<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            bodies: RefCell::new(HashMap::new()),
            snapshot: RefCell::new(None),
            requests: RefCell::new(Vec::new()),
            downloads: RefCell::new(Vec::new()),
        }
    }

    pub fn serve(&self, url: &str, body: &str) {
        self.bodies.borrow_mut().insert(url.to_string(), body.to_string());
    }

    pub fn remove(&self, url: &str) {
        self.bodies.borrow_mut().remove(url);
    }

    /// Publishes `fixture` as the remote snapshot, including its `dbinfo.json`.
    pub fn publish_snapshot(&self, fixture: SnapshotFixture) {
        self.serve(
            &format!("{}dbinfo.json", STATIC_BASE),
            &format!(r#"{{"dbVersion": {}, "checksum": "c", "timestamp": 1}}"#, fixture.version),
        );
        *self.snapshot.borrow_mut() = Some(fixture);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.borrow().clone()
    }

    pub fn clear_log(&self) {
        self.requests.borrow_mut().clear();
        self.downloads.borrow_mut().clear();
    }
}

impl Transport for ScriptedTransport {
    fn get_text(&self, url: &str) -> Result<String> {
        self.requests.borrow_mut().push(url.to_string());
        self.bodies.borrow().get(url).cloned().ok_or(MeteoError::Http(404))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.downloads.borrow_mut().push(url.to_string());
        match self.snapshot.borrow().as_ref() {
            Some(fixture) => {
                write_snapshot(dest, fixture);
                Ok(())
            }
            None => Err(MeteoError::Http(404)),
        }
    }
}
