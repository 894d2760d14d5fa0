use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::model::Coordinates;

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub coordinates: Coordinates,
    pub display_name: Option<String>,
}

/// Result of a single geocoding request. Retry policy is decided from the tag alone.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Found(Location),
    NoMatch,
    /// The service is unavailable or overloaded; the same request may succeed later.
    Transient(String),
    /// The request itself is unusable; repeating it would fail the same way.
    Permanent(String),
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> GeocodeOutcome;
}

pub struct NominatimClient {
    http: Client,
    endpoint: String,
}

impl NominatimClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(config.geocoder_user_agent.as_str())
            .timeout(config.geocoder_timeout())
            .build()?;
        Ok(Self {
            http,
            endpoint: config.geocoder_endpoint.clone(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn geocode(&self, query: &str) -> GeocodeOutcome {
        #[derive(Deserialize)]
        struct SearchResult {
            lat: String,
            lon: String,
            display_name: Option<String>,
        }

        if query.trim().is_empty() {
            return GeocodeOutcome::Permanent("empty query".into());
        }

        let response = match self
            .http
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("limit", "1"),
                ("addressdetails", "0"),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return GeocodeOutcome::Transient(err.to_string()),
        };

        let status = response.status();
        if let Some(outcome) = classify_status(status) {
            return outcome;
        }

        let results: Vec<SearchResult> = match response.json().await {
            Ok(results) => results,
            Err(err) if err.is_timeout() => return GeocodeOutcome::Transient(err.to_string()),
            Err(err) => return GeocodeOutcome::Permanent(format!("undecodable response: {err}")),
        };

        let Some(first) = results.into_iter().next() else {
            return GeocodeOutcome::NoMatch;
        };
        match (first.lat.trim().parse(), first.lon.trim().parse()) {
            (Ok(latitude), Ok(longitude)) => GeocodeOutcome::Found(Location {
                coordinates: Coordinates::new(latitude, longitude),
                display_name: first.display_name,
            }),
            _ => GeocodeOutcome::Permanent(format!(
                "invalid coordinates in response: {},{}",
                first.lat, first.lon
            )),
        }
    }
}

fn classify_status(status: StatusCode) -> Option<GeocodeOutcome> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Some(GeocodeOutcome::Transient(format!("service returned {status}")))
    } else {
        Some(GeocodeOutcome::Permanent(format!("service rejected query with {status}")))
    }
}

/// Enforces a minimum spacing between consecutive requests.
struct RateLimiter {
    min_interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_tick: AsyncMutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

pub struct RateLimitedGeocoder {
    inner: Arc<dyn Geocoder>,
    rate_limiter: RateLimiter,
    max_attempts: u32,
    backoff_base: Duration,
}

impl RateLimitedGeocoder {
    pub fn new(inner: Arc<dyn Geocoder>, config: &AppConfig) -> Self {
        Self::with_policy(
            inner,
            config.geocoder_min_delay(),
            config.geocoder_max_attempts,
            config.geocoder_backoff(),
        )
    }

    pub fn with_policy(
        inner: Arc<dyn Geocoder>,
        min_delay: Duration,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            inner,
            rate_limiter: RateLimiter::new(min_delay),
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Resolves `query`, retrying transient failures. Every failure ends as `None`.
    pub async fn resolve(&self, query: &str) -> Option<Location> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.rate_limiter.wait().await;
            match self.inner.geocode(query).await {
                GeocodeOutcome::Found(location) => return Some(location),
                GeocodeOutcome::NoMatch => {
                    trace!(query, "geocoder found no match");
                    return None;
                }
                GeocodeOutcome::Permanent(reason) => {
                    debug!(query, %reason, "geocoder rejected query");
                    return None;
                }
                GeocodeOutcome::Transient(reason) if attempt < self.max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        query,
                        %reason,
                        attempt, "geocoder unavailable; retrying after {:?}", delay
                    );
                    sleep(delay).await;
                }
                GeocodeOutcome::Transient(reason) => {
                    warn!(query, %reason, attempt, "geocoder unavailable; giving up");
                    return None;
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}
