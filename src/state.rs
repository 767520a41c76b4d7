/// Host state store boundary.
///
/// The host automation platform exposes a hierarchical key-value tree of
/// objects (devices, channels, states) addressed by dot-delimited ids such as
/// `8001.currentWeather.temperature`. This module defines the narrow
/// capability the poller needs from that host (`StateStore`), two
/// implementations (in-memory and a JSON file mirror), and `StateBatch`, the
/// flat list of object definitions and value writes produced from one
/// upstream response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::{MeteoError, Result};

// ---------------------------------------------------------------------------
// Object and value types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Device,
    Channel,
    State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
}

/// Metadata of an object in the state tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub id: String,
    pub kind: ObjectKind,
    pub name: String,
    /// Only set for states.
    pub value_type: Option<ValueType>,
    /// Semantic role, e.g. `value.temperature`.
    pub role: Option<String>,
    pub unit: Option<String>,
    /// Discrete value legend, e.g. `0 => "None"`.
    pub legend: Option<BTreeMap<i64, String>>,
    pub read: bool,
    pub write: bool,
}

impl ObjectSpec {
    pub fn device(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::container(id.into(), ObjectKind::Device, name.into())
    }

    pub fn channel(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::container(id.into(), ObjectKind::Channel, name.into())
    }

    /// A read-only state.
    pub fn state(
        id: impl Into<String>,
        name: impl Into<String>,
        value_type: ValueType,
        role: impl Into<String>,
        unit: Option<&str>,
    ) -> Self {
        ObjectSpec {
            id: id.into(),
            kind: ObjectKind::State,
            name: name.into(),
            value_type: Some(value_type),
            role: Some(role.into()),
            unit: unit.map(String::from),
            legend: None,
            read: true,
            write: false,
        }
    }

    pub fn with_legend(mut self, legend: &[(i64, &str)]) -> Self {
        self.legend = Some(legend.iter().map(|(k, v)| (*k, v.to_string())).collect());
        self
    }

    fn container(id: String, kind: ObjectKind, name: String) -> Self {
        ObjectSpec {
            id,
            kind,
            name,
            value_type: None,
            role: None,
            unit: None,
            legend: None,
            read: true,
            write: false,
        }
    }
}

/// A state value. `Null` is the explicit "no value" written when upstream
/// data is missing, distinct from a state that was never written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Null,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl StateValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            StateValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        StateValue::Number(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Number(v as f64)
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        StateValue::Bool(v)
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        StateValue::Text(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        StateValue::Text(v.to_string())
    }
}

impl<T: Into<StateValue>> From<Option<T>> for StateValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(StateValue::Null)
    }
}

/// A stored value with its acknowledgement flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub val: StateValue,
    /// `true` when written by this service as authoritative data.
    pub ack: bool,
    pub ts: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Capabilities the poller needs from the host platform.
pub trait StateStore {
    /// Creates the object if no object with this id exists. Existing objects
    /// are left untouched.
    fn ensure_object(&mut self, object: &ObjectSpec) -> Result<()>;

    /// Writes an acknowledged value.
    fn write(&mut self, id: &str, value: StateValue) -> Result<()>;

    fn read(&self, id: &str) -> Result<Option<StateValue>>;

    fn object_exists(&self, id: &str) -> Result<bool>;

    /// Persists pending changes, if the store buffers them.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory state tree.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryStateStore {
    objects: BTreeMap<String, ObjectSpec>,
    states: BTreeMap<String, StoredState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, id: &str) -> Option<&ObjectSpec> {
        self.objects.get(id)
    }

    pub fn state(&self, id: &str) -> Option<&StoredState> {
        self.states.get(id)
    }

    /// Ids of all objects whose id starts with `prefix`.
    pub fn object_ids_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.objects
            .keys()
            .filter(|id| id.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl StateStore for MemoryStateStore {
    fn ensure_object(&mut self, object: &ObjectSpec) -> Result<()> {
        if object.id.is_empty() || object.id.starts_with('.') || object.id.ends_with('.') {
            return Err(MeteoError::State(format!("invalid object id '{}'", object.id)));
        }
        self.objects
            .entry(object.id.clone())
            .or_insert_with(|| object.clone());
        Ok(())
    }

    fn write(&mut self, id: &str, value: StateValue) -> Result<()> {
        self.states.insert(
            id.to_string(),
            StoredState {
                val: value,
                ack: true,
                ts: Utc::now(),
            },
        );
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Option<StateValue>> {
        Ok(self.states.get(id).map(|s| s.val.clone()))
    }

    fn object_exists(&self, id: &str) -> Result<bool> {
        Ok(self.objects.contains_key(id))
    }
}

/// In-memory state tree mirrored to a JSON file on every flush and
/// reloaded from it on open.
pub struct FileStateStore {
    inner: MemoryStateStore,
    path: PathBuf,
}

impl FileStateStore {
    /// Loads the tree saved at `path`. A missing file yields an empty tree;
    /// an unreadable one is an error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryStateStore::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { inner, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn ensure_object(&mut self, object: &ObjectSpec) -> Result<()> {
        self.inner.ensure_object(object)
    }

    fn write(&mut self, id: &str, value: StateValue) -> Result<()> {
        self.inner.write(id, value)
    }

    fn read(&self, id: &str) -> Result<Option<StateValue>> {
        self.inner.read(id)
    }

    fn object_exists(&self, id: &str) -> Result<bool> {
        self.inner.object_exists(id)
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.inner)?;
        // Write then rename so readers never see a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// Object definitions and value writes produced from one upstream response.
///
/// Object definitions are only recorded on the first run; later runs only
/// carry writes.
#[derive(Debug, Default)]
pub struct StateBatch {
    first_run: bool,
    objects: Vec<ObjectSpec>,
    writes: Vec<(String, StateValue)>,
}

impl StateBatch {
    pub fn new(first_run: bool) -> Self {
        Self {
            first_run,
            ..Self::default()
        }
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    /// Records an object definition when this is a first-run batch.
    pub fn define(&mut self, object: ObjectSpec) {
        if self.first_run {
            self.objects.push(object);
        }
    }

    pub fn set(&mut self, id: impl Into<String>, value: impl Into<StateValue>) {
        self.writes.push((id.into(), value.into()));
    }

    pub fn objects(&self) -> &[ObjectSpec] {
        &self.objects
    }

    pub fn writes(&self) -> &[(String, StateValue)] {
        &self.writes
    }

    /// Value written for `id`, if any. The last write wins.
    pub fn value_of(&self, id: &str) -> Option<&StateValue> {
        self.writes.iter().rev().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    /// Ensures all objects, then performs all writes, in order.
    pub fn apply<S: StateStore + ?Sized>(self, store: &mut S) -> Result<()> {
        for object in &self.objects {
            store.ensure_object(object)?;
        }
        for (id, value) in self.writes {
            store.write(&id, value)?;
        }
        Ok(())
    }
}
