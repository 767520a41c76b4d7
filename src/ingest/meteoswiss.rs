/// MeteoSwiss app API client
///
/// Retrieves reference snapshot metadata, the snapshot file itself, per
/// postal code detail (current conditions, forecast, warnings, graph) and
/// the aggregate current-conditions feed for all SwissMetNet stations.
///
/// Static resources (snapshot, station feed) are served from S3; postal
/// code detail comes from the dynamic web service, whose path carries the
/// API version.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use crate::logging::{self, DataSource};
use crate::model::{CurrentWeather, DbInfo, Graph, MeteoError, PlzDetail, Result};

pub const STATIC_BASE_URL: &str =
    "https://s3-eu-central-1.amazonaws.com/app-prod-static-fra.meteoswiss-app.ch/v1/";

const DYNAMIC_BASE_URL_V1: &str = "https://app-prod-ws.meteoswiss-app.ch/v1/";
const DYNAMIC_BASE_URL_V3: &str = "https://app-prod-ws.meteoswiss-app.ch/v3/";

const USER_AGENT_V1: &str = "Android-30 ch.admin.meteoswiss-2410";
const USER_AGENT_V3: &str = "Android-30 ch.admin.meteoswiss-3420";

pub const DB_INFO_FILE: &str = "dbinfo.json";
pub const SNAPSHOT_FILE: &str = "db.sqlite";
pub const CURRENT_WEATHER_FILE: &str = "currentWeather.json";

// ============================================================================
// API versions
// ============================================================================

/// Version of the dynamic web service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    /// 6 forecast days, `weatherIcon3h`.
    V1,
    /// 8 forecast days, `weatherIcon3hV2`.
    #[default]
    V3,
}

impl ApiVersion {
    pub fn forecast_days(self) -> usize {
        match self {
            ApiVersion::V1 => 6,
            ApiVersion::V3 => 8,
        }
    }

    pub fn dynamic_base_url(self) -> &'static str {
        match self {
            ApiVersion::V1 => DYNAMIC_BASE_URL_V1,
            ApiVersion::V3 => DYNAMIC_BASE_URL_V3,
        }
    }

    pub fn user_agent(self) -> &'static str {
        match self {
            ApiVersion::V1 => USER_AGENT_V1,
            ApiVersion::V3 => USER_AGENT_V3,
        }
    }

    /// The 3-hourly icon series this version reports.
    pub fn icon_series(self, graph: &Graph) -> &[i64] {
        match self {
            ApiVersion::V1 => &graph.weather_icon3h,
            ApiVersion::V3 => &graph.weather_icon3h_v2,
        }
    }
}

/// Base URLs of the two upstream hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub static_base: String,
    pub dynamic_base: String,
}

impl Endpoints {
    pub fn for_version(version: ApiVersion) -> Self {
        Self {
            static_base: STATIC_BASE_URL.to_string(),
            dynamic_base: version.dynamic_base_url().to_string(),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Raw request execution. The HTTP implementation is `HttpTransport`;
/// tests substitute a scripted transport.
pub trait Transport {
    /// GETs `url` and returns the body.
    fn get_text(&self, url: &str) -> Result<String>;

    /// GETs `url` and writes the body to `dest`, replacing any existing file.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Blocking HTTP transport carrying the app's client identity headers.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Builds a client with the app identity for `version`, negotiating
    /// `language` and gzip.
    pub fn new(version: ApiVersion, language: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(language)
                .map_err(|e| MeteoError::Config(format!("invalid language '{}': {}", language, e)))?,
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(version.user_agent()));

        // The gzip feature adds Accept-Encoding: gzip and decodes transparently.
        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .gzip(true)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MeteoError::Request(e.to_string()))?;

        Ok(Self { client })
    }

    fn send(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| MeteoError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MeteoError::Http(response.status().as_u16()));
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> Result<String> {
        self.send(url)?
            .text()
            .map_err(|e| MeteoError::Request(e.to_string()))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self.send(url)?;
        let mut file = File::create(dest)?;
        response
            .copy_to(&mut file)
            .map_err(|e| MeteoError::Request(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// API Client
// ============================================================================

/// Typed access to the weather service endpoints.
pub struct MeteoClient<T: Transport> {
    transport: T,
    endpoints: Endpoints,
}

impl<T: Transport> MeteoClient<T> {
    pub fn new(transport: T, endpoints: Endpoints) -> Self {
        Self { transport, endpoints }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Fetch the remote snapshot version.
    pub fn fetch_db_info(&self) -> Result<DbInfo> {
        self.get_json(&self.static_url(DB_INFO_FILE))
    }

    /// Download the full snapshot to `dest`, overwriting it.
    pub fn download_snapshot(&self, dest: &Path) -> Result<()> {
        let url = self.static_url(SNAPSHOT_FILE);
        logging::debug(
            DataSource::Remote,
            None,
            &format!("Downloading file {} to {}", url, dest.display()),
        );
        self.transport.download(&url, dest)
    }

    /// Fetch detail for one postal code.
    pub fn fetch_plz_detail(&self, zip: u32) -> Result<PlzDetail> {
        self.get_json(&plz_detail_url(&self.endpoints.dynamic_base, zip))
    }

    /// Fetch current measurements for all stations.
    pub fn fetch_current_weather(&self) -> Result<CurrentWeather> {
        self.get_json(&self.static_url(CURRENT_WEATHER_FILE))
    }

    fn static_url(&self, file: &str) -> String {
        format!("{}{}", self.endpoints.static_base, file)
    }

    fn get_json<D: DeserializeOwned>(&self, url: &str) -> Result<D> {
        logging::debug(DataSource::Remote, None, &format!("Downloading {}", url));
        let body = self.transport.get_text(url)?;
        parse_json(&body)
    }
}

/// URL of the detail endpoint for `zip`, a snapshot `plz_pk` such as
/// `800100`.
pub fn plz_detail_url(dynamic_base: &str, zip: u32) -> String {
    format!("{}plzDetail?plz={}", dynamic_base, zip)
}

/// Parse a JSON body, mapping failures to `MeteoError::Parse`.
pub fn parse_json<D: DeserializeOwned>(body: &str) -> Result<D> {
    Ok(serde_json::from_str(body)?)
}

// ============================================================================
// Tests
// ============================================================================
