use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::model::Coordinates;

/// Known station coordinates keyed by station code. Produced elsewhere; never written here.
#[derive(Debug, Default, Clone)]
pub struct StationTable {
    stations: HashMap<String, Coordinates>,
}

impl StationTable {
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "station coordinate table missing; continuing without it");
                return Self::default();
            }
            Err(err) => {
                warn!(path = %path.display(), error = ?err, "failed to read station coordinate table");
                return Self::default();
            }
        };

        let raw = match serde_json::from_str::<HashMap<String, Value>>(&contents) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = ?err, "failed to parse station coordinate table");
                return Self::default();
            }
        };

        // One bad entry only costs that station.
        let mut stations = HashMap::with_capacity(raw.len());
        for (station_code, value) in raw {
            match serde_json::from_value::<Coordinates>(value) {
                Ok(coordinates) => {
                    stations.insert(station_code, coordinates);
                }
                Err(err) => {
                    warn!(%station_code, error = %err, "skipping malformed station coordinates");
                }
            }
        }
        debug!(path = %path.display(), stations = stations.len(), "station coordinate table loaded");
        Self { stations }
    }

    pub fn lookup(&self, station_code: Option<&str>) -> Option<Coordinates> {
        station_code.and_then(|code| self.stations.get(code).copied())
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

impl FromIterator<(String, Coordinates)> for StationTable {
    fn from_iter<T: IntoIterator<Item = (String, Coordinates)>>(iter: T) -> Self {
        Self {
            stations: iter.into_iter().collect(),
        }
    }
}
