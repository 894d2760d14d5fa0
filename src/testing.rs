//! Scripted collaborators shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::authority::StationAuthority;
use crate::config::{AppConfig, ColumnNames};
use crate::errors::{AppError, AppResult};
use crate::geocoder::{GeocodeOutcome, Geocoder, Location};
use crate::model::Coordinates;

pub fn found(latitude: f64, longitude: f64) -> GeocodeOutcome {
    GeocodeOutcome::Found(Location {
        coordinates: Coordinates::new(latitude, longitude),
        display_name: None,
    })
}

pub fn test_config() -> AppConfig {
    AppConfig {
        input_csv: PathBuf::from("input.csv"),
        output_csv: PathBuf::from("output.csv"),
        cache_json: PathBuf::from("cache.json"),
        stations_json: PathBuf::from("stations.json"),
        csv_delimiter: None,
        columns: ColumnNames::default(),
        geocoder_endpoint: "http://127.0.0.1:9/search".into(),
        geocoder_user_agent: "sitp-geocoder-tests".into(),
        geocoder_min_delay_ms: 0,
        geocoder_timeout_secs: 5,
        geocoder_max_attempts: 3,
        geocoder_backoff_ms: 0,
        authority_endpoint: "http://127.0.0.1:9/ITP".into(),
        checkpoint_every: 100,
    }
}

/// Replays scripted outcomes per query; unscripted queries find nothing.
#[derive(Default)]
pub struct ScriptedGeocoder {
    scripts: Mutex<HashMap<String, VecDeque<GeocodeOutcome>>>,
    queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, query: &str, outcomes: Vec<GeocodeOutcome>) -> Self {
        self.scripts
            .lock()
            .insert(query.to_string(), outcomes.into_iter().collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Geocoder for ScriptedGeocoder {
    async fn geocode(&self, query: &str) -> GeocodeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.to_string());
        self.scripts
            .lock()
            .get_mut(query)
            .and_then(VecDeque::pop_front)
            .unwrap_or(GeocodeOutcome::NoMatch)
    }
}

/// Answers from a fixed table; codes listed in `failing` produce a transport error.
#[derive(Default)]
pub struct StubAuthority {
    known: HashMap<String, Coordinates>,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl StubAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_station(mut self, code: &str, coordinates: Coordinates) -> Self {
        self.known.insert(code.to_string(), coordinates);
        self
    }

    pub fn failing_for(mut self, code: &str) -> Self {
        self.failing.push(code.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StationAuthority for StubAuthority {
    async fn lookup_station(&self, station_code: &str) -> AppResult<Option<Coordinates>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|code| code == station_code) {
            return Err(AppError::Config(format!(
                "registry unreachable for {station_code}"
            )));
        }
        Ok(self.known.get(station_code).copied())
    }
}
