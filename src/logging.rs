/// Structured logging for the weather polling service
///
/// Every record is tagged with the data source it concerns and, where
/// relevant, the location id, e.g. `REMOTE [8001]: plzDetail failed`.
/// Records go through the `log` facade; `init_logger` installs an
/// `env_logger` backend writing to stderr and optionally appending to a
/// file for daemon operation.

use chrono::Utc;
use log::LevelFilter;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use crate::model::MeteoError;

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// The weather service REST API.
    Remote,
    /// The local reference snapshot.
    Snapshot,
    /// The host state store.
    State,
    /// Inbound push warnings.
    Push,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Remote => write!(f, "REMOTE"),
            DataSource::Snapshot => write!(f, "SNAPSHOT"),
            DataSource::State => write!(f, "STATE"),
            DataSource::Push => write!(f, "PUSH"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the location has nothing to report right now
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Writes every record to stderr and appends it to a file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Initialize the global logger.
///
/// `RUST_LOG` still overrides `min_level` per module. Fails only if the log
/// file cannot be opened; a second call is ignored.
pub fn init_logger(
    min_level: LevelFilter,
    log_file: Option<&str>,
    timestamps: bool,
) -> io::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(min_level).parse_default_env();

    builder.format(move |buf, record| {
        if timestamps {
            write!(buf, "{} ", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        writeln!(buf, "{:<5} {}", record.level(), record.args())
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
    }

    // Tests and repeated initialisation keep the first logger.
    let _ = builder.try_init();
    Ok(())
}

/// Parses a level name such as `info` or `debug`.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.parse().ok()
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

fn tag(source: DataSource, location: Option<&str>) -> String {
    match location {
        Some(id) => format!("{} [{}]", source, id),
        None => source.to_string(),
    }
}

/// Log a general informational message
pub fn info(source: DataSource, location: Option<&str>, message: &str) {
    log::info!("{}: {}", tag(source, location), message);
}

/// Log a warning message
pub fn warn(source: DataSource, location: Option<&str>, message: &str) {
    log::warn!("{}: {}", tag(source, location), message);
}

/// Log an error message
pub fn error(source: DataSource, location: Option<&str>, message: &str) {
    log::error!("{}: {}", tag(source, location), message);
}

/// Log a debug message
pub fn debug(source: DataSource, location: Option<&str>, message: &str) {
    log::debug!("{}: {}", tag(source, location), message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a per-location failure by its error kind.
pub fn classify_failure(err: &MeteoError) -> FailureType {
    match err {
        // 404 on a detail request means the service has no data for the id
        MeteoError::Http(404) => FailureType::Expected,
        MeteoError::Http(_) | MeteoError::Parse(_) => FailureType::Unexpected,
        MeteoError::Snapshot(_)
        | MeteoError::SnapshotNotOpen(_)
        | MeteoError::State(_)
        | MeteoError::Config(_) => FailureType::Unexpected,
        // Network trouble may be ours or theirs
        MeteoError::Request(_) | MeteoError::Io(_) => FailureType::Unknown,
        MeteoError::LocationNotFound(_) => FailureType::Unknown,
    }
}

/// Log a failure with automatic classification
pub fn log_failure(source: DataSource, location: &str, operation: &str, err: &MeteoError) {
    let failure_type = classify_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(source, Some(location), &message),
        FailureType::Unexpected => error(source, Some(location), &message),
        FailureType::Unknown => warn(source, Some(location), &message),
    }
}

// ---------------------------------------------------------------------------
// Pass Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one refresh pass
pub fn log_pass_summary(total: usize, successful: usize, failed: usize) {
    let message = format!(
        "Refresh complete: {}/{} successful, {} failed",
        successful, total, failed
    );

    if failed == 0 {
        info(DataSource::System, None, &message);
    } else if successful == 0 {
        error(DataSource::System, None, &message);
    } else {
        warn(DataSource::System, None, &message);
    }
}

/// Test-only logger that keeps every record in memory.
#[cfg(test)]
pub(crate) mod capture {
    use log::{Log, Metadata, Record};
    use std::sync::{Mutex, Once};

    static RECORDS: Mutex<Vec<String>> = Mutex::new(Vec::new());
    static INSTALL: Once = Once::new();

    struct Collector;

    impl Log for Collector {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            if let Ok(mut records) = RECORDS.lock() {
                records.push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    /// Installs the collector for the whole test binary.
    pub fn install() {
        INSTALL.call_once(|| {
            if log::set_boxed_logger(Box::new(Collector)).is_ok() {
                log::set_max_level(log::LevelFilter::Debug);
            }
        });
    }

    /// Records containing `needle`. Tests run in parallel, so filter on
    /// something unique to the test.
    pub fn matching(needle: &str) -> Vec<String> {
        RECORDS
            .lock()
            .map(|records| records.iter().filter(|r| r.contains(needle)).cloned().collect())
            .unwrap_or_default()
    }
}
