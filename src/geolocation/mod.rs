//! IP geolocation with a time-bounded cache
//!
//! Locations are looked up against a public HTTP geolocation endpoint
//! and cached per address. Lookups never fail from the caller's point
//! of view: once retries are exhausted the [`UNKNOWN_LOCATION`] sentinel
//! is returned and nothing is cached, so the next call starts over.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::config::GeoConfig;

/// Location text used whenever an address cannot be resolved
pub const UNKNOWN_LOCATION: &str = "未知位置";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";

/// Errors that can occur during a single geolocation lookup
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Lookup returned status {0}")]
    Status(u16),

    #[error("Response has no country")]
    MissingCountry,

    #[error("Invalid geolocation setting: {0}")]
    InvalidSetting(String),
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    country: Option<String>,
    city: Option<String>,
}

impl GeoResponse {
    fn into_location(self) -> Result<String, GeoError> {
        let country = self
            .country
            .filter(|c| !c.is_empty())
            .ok_or(GeoError::MissingCountry)?;
        Ok(match self.city.filter(|c| !c.is_empty()) {
            Some(city) => format!("{}-{}", country, city),
            None => country,
        })
    }
}

/// A resolved location and when it was fetched
#[derive(Debug, Clone)]
pub struct GeoCacheEntry {
    pub location: String,
    pub resolved_at: DateTime<Utc>,
}

/// Resolves addresses to "country-city" strings
///
/// Shared between all tailers; the cache takes a read lock on the hot
/// path and a write lock only after a successful network lookup.
pub struct GeoLocator {
    client: Client,
    endpoint: String,
    enabled: bool,
    max_attempts: u32,
    retry_delay: Duration,
    ttl: chrono::Duration,
    cache: RwLock<HashMap<String, GeoCacheEntry>>,
}

impl GeoLocator {
    pub fn new(config: &GeoConfig) -> Result<Self, GeoError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        let ttl = chrono::Duration::try_hours(config.cache_ttl_hours).ok_or_else(|| {
            GeoError::InvalidSetting(format!("cache_ttl_hours = {}", config.cache_ttl_hours))
        })?;

        Ok(GeoLocator {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            enabled: config.enabled,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            ttl,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Resolve an address, falling back to [`UNKNOWN_LOCATION`]
    pub async fn resolve(&self, address: &str) -> String {
        if address.is_empty() || !self.enabled {
            return UNKNOWN_LOCATION.to_string();
        }

        if let Some(location) = self.cached(address) {
            log::debug!("Geolocation cache hit for {}", address);
            return location;
        }

        for attempt in 1..=self.max_attempts {
            match self.lookup(address).await {
                Ok(location) => {
                    self.store(address, &location);
                    return location;
                }
                Err(e) => {
                    log::warn!(
                        "Geolocation lookup for {} failed (attempt {}/{}): {}",
                        address,
                        attempt,
                        self.max_attempts,
                        e
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                }
            }
        }

        UNKNOWN_LOCATION.to_string()
    }

    /// Perform one uncached lookup
    pub async fn lookup(&self, address: &str) -> Result<String, GeoError> {
        let url = format!("{}/{}", self.endpoint, address);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(GeoError::Status(response.status().as_u16()));
        }

        response.json::<GeoResponse>().await?.into_location()
    }

    /// Cached location for an address, if still within the TTL
    pub fn cached(&self, address: &str) -> Option<String> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(address)
            .filter(|entry| Utc::now() - entry.resolved_at < self.ttl)
            .map(|entry| entry.location.clone())
    }

    /// Delay after failed attempt `attempt`, saturating on huge settings
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }

    fn store(&self, address: &str, location: &str) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(
            address.to_string(),
            GeoCacheEntry {
                location: location.to_string(),
                resolved_at: Utc::now(),
            },
        );
    }
}
