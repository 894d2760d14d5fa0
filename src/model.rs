use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    /// Resolved at full precision.
    Ok,
    /// Resolved only after the street number was dropped from the query.
    FallbackNoNumber,
    /// Every strategy was exhausted.
    NotFound,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Ok => "OK",
            ResolutionStatus::FallbackNoNumber => "FALLBACK_NO_NUMBER",
            ResolutionStatus::NotFound => "NOT_FOUND",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OK" => Ok(ResolutionStatus::Ok),
            "FALLBACK_NO_NUMBER" => Ok(ResolutionStatus::FallbackNoNumber),
            "NOT_FOUND" => Ok(ResolutionStatus::NotFound),
            _ => Err(AppError::Parse(format!(
                "invalid resolution status: {value}"
            ))),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, ResolutionStatus::NotFound)
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(deserialize_with = "lenient_f64")]
    pub latitude: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Parses a `"lat,lon"` pair as published by the authorization registry.
    pub fn parse_pair(value: &str) -> Option<Self> {
        let (lat, lon) = value.split_once(',')?;
        let latitude = lat.trim().parse().ok()?;
        let longitude = lon.trim().parse().ok()?;
        Some(Self::new(latitude, longitude))
    }
}

// Scraped tables and older caches carry coordinates as text (`"44.1"`) as often as numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCoordinate {
    Number(f64),
    Text(String),
}

impl RawCoordinate {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            RawCoordinate::Number(value) => Ok(value),
            RawCoordinate::Text(text) => text.trim().parse::<f64>().map_err(E::custom),
        }
    }
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    RawCoordinate::deserialize(deserializer)?.into_f64()
}

pub(crate) fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawCoordinate>::deserialize(deserializer)?
        .map(RawCoordinate::into_f64)
        .transpose()
}
