use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use tracing::debug;

const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
const DEFAULT_AUTHORITY_ENDPOINT: &str =
    "https://portal.rarom.ro/rarApi/public/RarPublicAuthorizations/ITP";
pub const DEFAULT_CHECKPOINT_EVERY: usize = 100;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub input_csv: PathBuf,
    pub output_csv: PathBuf,
    pub cache_json: PathBuf,
    pub stations_json: PathBuf,
    pub csv_delimiter: Option<u8>,
    pub columns: ColumnNames,
    pub geocoder_endpoint: String,
    pub geocoder_user_agent: String,
    pub geocoder_min_delay_ms: u64,
    pub geocoder_timeout_secs: u64,
    pub geocoder_max_attempts: u32,
    pub geocoder_backoff_ms: u64,
    pub authority_endpoint: String,
    pub checkpoint_every: usize,
}

/// Header names of the columns the pipeline reads and writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnNames {
    pub station_code: String,
    pub address: String,
    pub latitude: String,
    pub longitude: String,
    pub status: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            station_code: "COD_STATIE".into(),
            address: "ADRESA_SITP".into(),
            latitude: "LATITUDINE".into(),
            longitude: "LONGITUDINE".into(),
            status: "GEOCODER_STATUS".into(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let defaults = ColumnNames::default();
        Self {
            input_csv: parse_path("INPUT_CSV", "statii_itp_fara_diacritice.csv"),
            output_csv: parse_path("OUTPUT_CSV", "statii_itp_geoloc.csv"),
            cache_json: parse_path("CACHE_JSON", "geocode_cache.json"),
            stations_json: parse_path("STATIONS_COORDINATES_JSON", "stations_coordinates.json"),
            csv_delimiter: env::var("CSV_DELIMITER")
                .ok()
                .and_then(|v| parse_delimiter(&v)),
            columns: ColumnNames {
                station_code: parse_string("STATION_CODE_COLUMN", &defaults.station_code),
                address: parse_string("ADDRESS_COLUMN", &defaults.address),
                latitude: parse_string("LATITUDE_COLUMN", &defaults.latitude),
                longitude: parse_string("LONGITUDE_COLUMN", &defaults.longitude),
                status: parse_string("STATUS_COLUMN", &defaults.status),
            },
            geocoder_endpoint: parse_string("GEOCODER_ENDPOINT", DEFAULT_GEOCODER_ENDPOINT),
            geocoder_user_agent: parse_string(
                "GEOCODER_USER_AGENT",
                concat!("sitp-geocoder/", env!("CARGO_PKG_VERSION")),
            ),
            geocoder_min_delay_ms: parse_u64("GEOCODER_MIN_DELAY_MS", 1_000),
            geocoder_timeout_secs: parse_u64("GEOCODER_TIMEOUT_SECS", 10).max(1),
            geocoder_max_attempts: parse_u32("GEOCODER_MAX_ATTEMPTS", 3).max(1),
            geocoder_backoff_ms: parse_u64("GEOCODER_BACKOFF_MS", 2_000),
            authority_endpoint: parse_string("AUTHORITY_ENDPOINT", DEFAULT_AUTHORITY_ENDPOINT),
            checkpoint_every: parse_usize("CHECKPOINT_EVERY", DEFAULT_CHECKPOINT_EVERY).max(1),
        }
    }

    pub fn geocoder_min_delay(&self) -> Duration {
        Duration::from_millis(self.geocoder_min_delay_ms)
    }

    pub fn geocoder_timeout(&self) -> Duration {
        Duration::from_secs(self.geocoder_timeout_secs)
    }

    pub fn geocoder_backoff(&self) -> Duration {
        Duration::from_millis(self.geocoder_backoff_ms)
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

/// Accepts a single-byte delimiter, or the words `tab`, `comma`, `semicolon`.
fn parse_delimiter(value: &str) -> Option<u8> {
    match value.trim() {
        "tab" | "\\t" => Some(b'\t'),
        "comma" => Some(b','),
        "semicolon" => Some(b';'),
        other if other.len() == 1 => other.bytes().next(),
        _ => None,
    }
}

fn parse_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(parse_string(key, default))
}

fn parse_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}
