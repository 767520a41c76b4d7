/// Service configuration
///
/// Loaded from a TOML file (path from `--config`, else `METEO_CONFIG`,
/// else `meteo.toml`). A `.env` file in the working directory is read
/// first, so `METEO_*` overrides can live there too.
///
/// ```toml
/// language = "de"
/// api_version = "v3"
/// data_dir = "./data"
/// postal_codes = [800100, 300000]
/// stations = ["SMA", "BER"]
///
/// [logging]
/// level = "info"
/// timestamps = true
/// ```

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::meteoswiss::{ApiVersion, Endpoints};
use crate::model::{MeteoError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "meteo.toml";
const STATE_FILE_NAME: &str = "states.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Sent as `Accept-Language`.
    pub language: String,
    pub api_version: ApiVersion,
    /// Holds the reference snapshot.
    pub data_dir: PathBuf,
    /// JSON mirror of the state tree. Defaults to `<data_dir>/states.json`.
    pub state_file: Option<PathBuf>,
    /// Snapshot `plz_pk` values, e.g. 800100.
    pub postal_codes: Vec<u32>,
    /// SwissMetNet station codes, e.g. "SMA".
    pub stations: Vec<String>,
    pub endpoints: EndpointOverrides,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: "de".to_string(),
            api_version: ApiVersion::default(),
            data_dir: PathBuf::from("./data"),
            state_file: None,
            postal_codes: Vec::new(),
            stations: Vec::new(),
            endpoints: EndpointOverrides::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointOverrides {
    pub static_base_url: Option<String>,
    pub dynamic_base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// Appended to in addition to stderr.
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

impl Config {
    /// Loads `.env`, then the config file, then applies `METEO_*` overrides.
    ///
    /// A missing default file yields the defaults; a missing file that was
    /// asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("METEO_CONFIG").map(PathBuf::from));

        let mut config = match explicit {
            Some(p) => Self::from_file(&p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.normalize();
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| MeteoError::Config(format!("couldn't read {}: {}", path.display(), e)))?;
        Self::parse(&contents)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(text).map_err(|e| MeteoError::Config(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    /// Applies `METEO_DATA_DIR` and `METEO_LANGUAGE` as returned by `lookup`.
    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(dir) = lookup("METEO_DATA_DIR").filter(|s| !s.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(language) = lookup("METEO_LANGUAGE").filter(|s| !s.is_empty()) {
            self.language = language;
        }
    }

    /// Drops repeated locations, keeping the first occurrence.
    fn normalize(&mut self) {
        let mut seen = Vec::with_capacity(self.postal_codes.len());
        self.postal_codes.retain(|zip| {
            let fresh = !seen.contains(zip);
            seen.push(*zip);
            fresh
        });

        let mut seen: Vec<String> = Vec::with_capacity(self.stations.len());
        self.stations.retain(|code| {
            let fresh = !seen.contains(code);
            seen.push(code.clone());
            fresh
        });
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(STATE_FILE_NAME))
    }

    pub fn endpoints(&self) -> Endpoints {
        let mut endpoints = Endpoints::for_version(self.api_version);
        if let Some(url) = &self.endpoints.static_base_url {
            endpoints.static_base = url.clone();
        }
        if let Some(url) = &self.endpoints.dynamic_base_url {
            endpoints.dynamic_base = url.clone();
        }
        endpoints
    }
}
