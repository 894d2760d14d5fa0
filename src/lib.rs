mod address;
mod authority;
mod cache;
mod config;
mod dataset;
mod driver;
mod errors;
mod geocoder;
mod model;
mod resolver;
mod stations;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::address::{normalize_address, strip_house_number};
pub use crate::authority::{RarAuthorityClient, StationAuthority};
pub use crate::cache::{CacheEntry, ResolutionCache};
pub use crate::config::{AppConfig, ColumnNames, DEFAULT_CHECKPOINT_EVERY};
pub use crate::dataset::{Dataset, StationRecord};
pub use crate::driver::{CheckpointDriver, CheckpointSink, FileCheckpoint, RunSummary};
pub use crate::errors::{AppError, AppResult};
pub use crate::geocoder::{GeocodeOutcome, Geocoder, Location, NominatimClient, RateLimitedGeocoder};
pub use crate::model::{Coordinates, ResolutionStatus};
pub use crate::resolver::{FallbackCoordinator, Resolution, ResolutionSource};
pub use crate::stations::StationTable;

/// Geocodes every pending row of the configured dataset, resuming from the
/// output file when a previous run left one behind.
pub async fn run(config: &AppConfig) -> AppResult<RunSummary> {
    let source = if config.output_csv.exists() {
        &config.output_csv
    } else {
        &config.input_csv
    };
    let mut dataset = Dataset::load(source, &config.columns, config.csv_delimiter)?;
    info!(
        source = %source.display(),
        rows = dataset.len(),
        resolved = dataset.resolved_count(),
        "dataset loaded"
    );

    let cache = ResolutionCache::load(&config.cache_json);
    let stations = StationTable::load(&config.stations_json);
    info!(
        cached_queries = cache.len(),
        known_stations = stations.len(),
        "lookup tables ready"
    );

    let geocoder = RateLimitedGeocoder::new(Arc::new(NominatimClient::new(config)?), config);
    let authority = Arc::new(RarAuthorityClient::new(config)?);
    let coordinator = FallbackCoordinator::new(cache, stations, geocoder, authority);
    let sink = FileCheckpoint::new(&config.output_csv, &config.cache_json);
    let mut driver = CheckpointDriver::new(coordinator, sink, config.checkpoint_every);

    let summary = driver.run(&mut dataset).await?;
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        cache_hits = summary.cache_hits,
        station_table_hits = summary.station_table_hits,
        geocoded = summary.geocoded,
        geocoded_without_number = summary.geocoded_without_number,
        authority_hits = summary.authority_hits,
        not_found = summary.not_found,
        "geocoding finished; output written to {}",
        config.output_csv.display()
    );
    Ok(summary)
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,sitp_geocoder=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
