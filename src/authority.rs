//! Lookup against the public registry of authorized inspection stations.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::model::Coordinates;

#[async_trait]
pub trait StationAuthority: Send + Sync {
    /// `Ok(None)` means the registry answered but has no usable position for the station.
    /// Transport failures are returned as errors.
    async fn lookup_station(&self, station_code: &str) -> AppResult<Option<Coordinates>>;
}

pub struct RarAuthorityClient {
    http: Client,
    endpoint: String,
}

impl RarAuthorityClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(config.geocoder_user_agent.as_str())
            .timeout(config.geocoder_timeout())
            .build()?;
        Ok(Self {
            http,
            endpoint: config.authority_endpoint.clone(),
        })
    }
}

#[async_trait]
impl StationAuthority for RarAuthorityClient {
    async fn lookup_station(&self, station_code: &str) -> AppResult<Option<Coordinates>> {
        #[derive(Deserialize)]
        struct Authorization {
            #[serde(default)]
            branch: Option<Branch>,
        }

        #[derive(Deserialize)]
        struct Branch {
            #[serde(default)]
            address: Option<BranchAddress>,
        }

        #[derive(Deserialize)]
        struct BranchAddress {
            #[serde(rename = "gpsLocation", default)]
            gps_location: Option<String>,
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("searchTerm", station_code)])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!(station_code, %status, "station registry returned no listing");
            return Ok(None);
        }

        let body = response.bytes().await?;
        let authorizations: Vec<Authorization> = match serde_json::from_slice(&body) {
            Ok(authorizations) => authorizations,
            Err(err) => {
                debug!(station_code, error = ?err, "station registry payload not understood");
                return Ok(None);
            }
        };

        let gps_location = authorizations
            .into_iter()
            .next()
            .and_then(|first| first.branch)
            .and_then(|branch| branch.address)
            .and_then(|address| address.gps_location);

        let coordinates = gps_location.as_deref().and_then(Coordinates::parse_pair);
        trace!(station_code, ?gps_location, found = coordinates.is_some(), "station registry lookup");
        Ok(coordinates)
    }
}
