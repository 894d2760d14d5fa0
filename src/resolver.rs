use std::sync::Arc;

use tracing::{debug, trace};

use crate::address::{normalize_address, strip_house_number};
use crate::authority::StationAuthority;
use crate::cache::{CacheEntry, ResolutionCache};
use crate::dataset::StationRecord;
use crate::errors::AppResult;
use crate::geocoder::RateLimitedGeocoder;
use crate::model::ResolutionStatus;
use crate::stations::StationTable;

/// Which strategy produced a record's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    StationTable,
    Geocoder,
    GeocoderWithoutNumber,
    Authority,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub query: String,
    pub entry: CacheEntry,
    pub source: ResolutionSource,
}

/// Runs the fallback chain for one record at a time and owns the resolution cache.
pub struct FallbackCoordinator {
    cache: ResolutionCache,
    stations: StationTable,
    geocoder: RateLimitedGeocoder,
    authority: Arc<dyn StationAuthority>,
}

impl FallbackCoordinator {
    pub fn new(
        cache: ResolutionCache,
        stations: StationTable,
        geocoder: RateLimitedGeocoder,
        authority: Arc<dyn StationAuthority>,
    ) -> Self {
        Self {
            cache,
            stations,
            geocoder,
            authority,
        }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn into_cache(self) -> ResolutionCache {
        self.cache
    }

    /// Resolves `record` in place. Returns `None` when it already had coordinates.
    pub async fn resolve_record(&mut self, record: &mut StationRecord) -> AppResult<Option<Resolution>> {
        if record.has_coordinates() {
            return Ok(None);
        }

        let query = normalize_address(record.address.as_deref());
        // Address-less rows all normalize to "", so that key would alias unrelated stations.
        let cacheable = !query.is_empty();
        if let Some(entry) = self.cache.get(&query).copied().filter(|_| cacheable) {
            trace!(%query, status = %entry.status(), "resolution cache hit");
            record.apply(&entry);
            return Ok(Some(Resolution {
                query,
                entry,
                source: ResolutionSource::Cache,
            }));
        }

        let (entry, source) = self.lookup(&query, record.station_code.as_deref()).await?;
        debug!(
            %query,
            station_code = record.station_code.as_deref().unwrap_or_default(),
            status = %entry.status(),
            ?source,
            "record resolved"
        );
        if cacheable {
            self.cache.put(query.clone(), entry);
        }
        record.apply(&entry);
        Ok(Some(Resolution {
            query,
            entry,
            source,
        }))
    }

    async fn lookup(
        &self,
        query: &str,
        station_code: Option<&str>,
    ) -> AppResult<(CacheEntry, ResolutionSource)> {
        if let Some(coordinates) = self.stations.lookup(station_code) {
            return Ok((
                CacheEntry::resolved(coordinates, ResolutionStatus::Ok),
                ResolutionSource::StationTable,
            ));
        }

        if let Some(location) = self.geocoder.resolve(query).await {
            return Ok((
                CacheEntry::resolved(location.coordinates, ResolutionStatus::Ok),
                ResolutionSource::Geocoder,
            ));
        }

        let degraded = strip_house_number(query);
        if degraded != query {
            if let Some(location) = self.geocoder.resolve(&degraded).await {
                return Ok((
                    CacheEntry::resolved(location.coordinates, ResolutionStatus::FallbackNoNumber),
                    ResolutionSource::GeocoderWithoutNumber,
                ));
            }
        }

        let Some(code) = station_code.map(str::trim).filter(|code| !code.is_empty()) else {
            return Ok((CacheEntry::not_found(), ResolutionSource::Exhausted));
        };
        match self.authority.lookup_station(code).await? {
            Some(coordinates) => Ok((
                CacheEntry::resolved(coordinates, ResolutionStatus::Ok),
                ResolutionSource::Authority,
            )),
            None => Ok((CacheEntry::not_found(), ResolutionSource::Exhausted)),
        }
    }
}
