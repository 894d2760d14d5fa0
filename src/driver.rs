use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::cache::ResolutionCache;
use crate::dataset::Dataset;
use crate::errors::AppResult;
use crate::model::ResolutionStatus;
use crate::resolver::{FallbackCoordinator, Resolution, ResolutionSource};

/// Durable storage for a checkpoint of the working table and the cache.
pub trait CheckpointSink {
    fn persist(&mut self, dataset: &Dataset, cache: &ResolutionCache) -> AppResult<()>;
}

pub struct FileCheckpoint {
    output_csv: PathBuf,
    cache_json: PathBuf,
}

impl FileCheckpoint {
    pub fn new(output_csv: impl Into<PathBuf>, cache_json: impl Into<PathBuf>) -> Self {
        Self {
            output_csv: output_csv.into(),
            cache_json: cache_json.into(),
        }
    }
}

impl CheckpointSink for FileCheckpoint {
    fn persist(&mut self, dataset: &Dataset, cache: &ResolutionCache) -> AppResult<()> {
        dataset.save(&self.output_csv)?;
        cache.persist(&self.cache_json)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_rows: usize,
    pub skipped: usize,
    pub processed: usize,
    pub cache_hits: usize,
    pub station_table_hits: usize,
    pub geocoded: usize,
    pub geocoded_without_number: usize,
    pub authority_hits: usize,
    pub not_found: usize,
    pub checkpoints: usize,
}

impl RunSummary {
    fn record(&mut self, resolution: &Resolution) {
        self.processed += 1;
        match resolution.source {
            ResolutionSource::Cache => self.cache_hits += 1,
            ResolutionSource::StationTable => self.station_table_hits += 1,
            ResolutionSource::Geocoder => self.geocoded += 1,
            ResolutionSource::GeocoderWithoutNumber => self.geocoded_without_number += 1,
            ResolutionSource::Authority => self.authority_hits += 1,
            ResolutionSource::Exhausted => {}
        }
        if resolution.entry.status() == ResolutionStatus::NotFound {
            self.not_found += 1;
        }
    }
}

/// Walks the table once, resolving rows and checkpointing every `checkpoint_every` processed rows.
pub struct CheckpointDriver<S> {
    coordinator: FallbackCoordinator,
    sink: S,
    checkpoint_every: usize,
}

impl<S: CheckpointSink> CheckpointDriver<S> {
    pub fn new(coordinator: FallbackCoordinator, sink: S, checkpoint_every: usize) -> Self {
        Self {
            coordinator,
            sink,
            checkpoint_every: checkpoint_every.max(1),
        }
    }

    pub fn coordinator(&self) -> &FallbackCoordinator {
        &self.coordinator
    }

    pub fn into_parts(self) -> (FallbackCoordinator, S) {
        (self.coordinator, self.sink)
    }

    /// Processes every row, then always writes a final checkpoint. A row that
    /// fails stops the run; its error is returned after that checkpoint.
    pub async fn run(&mut self, dataset: &mut Dataset) -> AppResult<RunSummary> {
        let mut summary = RunSummary {
            total_rows: dataset.len(),
            ..RunSummary::default()
        };

        let outcome = self.process(dataset, &mut summary).await;

        match self.sink.persist(dataset, self.coordinator.cache()) {
            Ok(()) => summary.checkpoints += 1,
            Err(err) => {
                error!(error = ?err, "failed to write final checkpoint");
                outcome?;
                return Err(err);
            }
        }

        outcome.map(|()| summary)
    }

    async fn process(&mut self, dataset: &mut Dataset, summary: &mut RunSummary) -> AppResult<()> {
        for index in 0..dataset.len() {
            let record = &mut dataset.records_mut()[index];
            let resolution = match self.coordinator.resolve_record(record).await {
                Ok(Some(resolution)) => resolution,
                Ok(None) => {
                    summary.skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(row = index, error = ?err, "failed to resolve row; stopping run");
                    return Err(err);
                }
            };
            summary.record(&resolution);

            if summary.processed % self.checkpoint_every == 0 {
                self.sink.persist(dataset, self.coordinator.cache())?;
                summary.checkpoints += 1;
                info!(processed = summary.processed, "progress saved at {} rows", summary.processed);
            }
        }
        Ok(())
    }
}
