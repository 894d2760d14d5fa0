use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::AppResult;
use crate::model::{lenient_coordinate, Coordinates, ResolutionStatus};

/// A past resolution, stored on disk as `[lat|null, lon|null, status]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry(
    #[serde(deserialize_with = "lenient_coordinate")] pub Option<f64>,
    #[serde(deserialize_with = "lenient_coordinate")] pub Option<f64>,
    pub ResolutionStatus,
);

impl CacheEntry {
    pub fn resolved(coordinates: Coordinates, status: ResolutionStatus) -> Self {
        Self(Some(coordinates.latitude), Some(coordinates.longitude), status)
    }

    pub fn not_found() -> Self {
        Self(None, None, ResolutionStatus::NotFound)
    }

    pub fn latitude(&self) -> Option<f64> {
        self.0
    }

    pub fn longitude(&self) -> Option<f64> {
        self.1
    }

    pub fn status(&self) -> ResolutionStatus {
        self.2
    }
}

/// Permanent ledger of resolved queries, keyed by normalized query.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResolutionCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the cache document, falling back to an empty cache on any failure.
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no resolution cache yet; starting empty");
                return Self::new();
            }
            Err(err) => {
                warn!(path = %path.display(), error = ?err, "failed to read resolution cache; starting empty");
                return Self::new();
            }
        };

        match serde_json::from_str::<BTreeMap<String, CacheEntry>>(&contents) {
            Ok(entries) => {
                debug!(path = %path.display(), entries = entries.len(), "resolution cache loaded");
                Self { entries }
            }
            Err(err) => {
                warn!(path = %path.display(), error = ?err, "failed to parse resolution cache; starting empty");
                Self::new()
            }
        }
    }

    pub fn get(&self, query: &str) -> Option<&CacheEntry> {
        self.entries.get(query)
    }

    pub fn put(&mut self, query: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(query.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrites the whole document at `path`, replacing the file only once fully written.
    pub fn persist(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(&self.entries)?;
        let staging = path.with_extension("json.partial");
        fs::write(&staging, serialized)?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}
