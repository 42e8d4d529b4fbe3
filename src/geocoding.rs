//! Geocoding gateway: cache-aware, rate-limited, retrying batch resolution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fxhash::FxHashMap;
use jiff::Timestamp;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::cache::{DEFAULT_TTL, GeocodeEntry, normalize_address};
use crate::error::{GeocodeError, GeocodeFailure, NonPositiveSetting};
use crate::model::Coordinate;
use crate::rate_limit::TokenBucket;
use crate::retry::RetryPolicy;
use crate::traits::{GeocodeCache, GeocodeMatch, Geocoder};

#[derive(Debug, Clone)]
pub struct GeocodingConfig {
    /// Request budget shared by every batch in the process.
    pub requests_per_sec: f64,
    pub burst: u32,
    /// Upper bound on concurrent external requests.
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            requests_per_sec: 50.0,
            burst: 1,
            max_in_flight: 8,
            retry: RetryPolicy::default(),
            cache_ttl: DEFAULT_TTL,
        }
    }
}

impl GeocodingConfig {
    /// Builds the limiter described by this config. Create it once and
    /// share it; a limiter per call defeats the global budget.
    pub fn limiter(&self) -> Result<Arc<TokenBucket>, NonPositiveSetting> {
        TokenBucket::new(self.requests_per_sec, self.burst).map(Arc::new)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodedAddress {
    pub coordinate: Coordinate,
    pub formatted_address: String,
    pub confidence: f64,
    pub from_cache: bool,
}

impl GeocodedAddress {
    fn new(result: GeocodeMatch, from_cache: bool) -> Self {
        Self {
            coordinate: result.coordinate,
            formatted_address: result.formatted_address,
            confidence: result.confidence,
            from_cache,
        }
    }
}

/// Outcome for one input address.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub input: String,
    pub result: Result<GeocodedAddress, GeocodeFailure>,
}

pub struct GeocodingGateway {
    geocoder: Arc<dyn Geocoder>,
    cache: Arc<dyn GeocodeCache>,
    limiter: Arc<TokenBucket>,
    retry: RetryPolicy,
    cache_ttl: Duration,
    pool: rayon::ThreadPool,
}

impl GeocodingGateway {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        cache: Arc<dyn GeocodeCache>,
        limiter: Arc<TokenBucket>,
        config: &GeocodingConfig,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_in_flight.max(1))
            .thread_name(|index| format!("geocode-{index}"))
            .build()?;

        Ok(Self {
            geocoder,
            cache,
            limiter,
            retry: config.retry.clone(),
            cache_ttl: config.cache_ttl,
            pool,
        })
    }

    pub fn cache(&self) -> &Arc<dyn GeocodeCache> {
        &self.cache
    }

    pub fn resolve_one(&self, address: &str) -> Resolution {
        let mut results = self.resolve(&[address.to_string()]);
        results.pop().unwrap_or_else(|| Resolution {
            input: address.to_string(),
            result: Err(GeocodeFailure::invalid_input("address is empty")),
        })
    }

    /// Resolves every address, returning one result per input in input
    /// order. A failure on one address never affects its siblings.
    pub fn resolve(&self, addresses: &[String]) -> Vec<Resolution> {
        self.resolve_until(addresses, None)
    }

    /// Like [`resolve`](Self::resolve), but no request is sent once
    /// `deadline` has passed; those addresses fail with
    /// [`FailureKind::DeadlineExceeded`](crate::error::FailureKind). Cache
    /// hits are still served.
    pub fn resolve_until(&self, addresses: &[String], deadline: Option<Instant>) -> Vec<Resolution> {
        let keys: Vec<String> = addresses
            .iter()
            .map(|address| normalize_address(address))
            .collect();

        // One lookup per distinct key, in first-seen order.
        let mut slots: FxHashMap<&str, usize> = FxHashMap::default();
        let mut unique: Vec<(&str, &str)> = Vec::new();
        for (key, address) in keys.iter().zip(addresses) {
            if key.is_empty() || slots.contains_key(key.as_str()) {
                continue;
            }
            slots.insert(key.as_str(), unique.len());
            unique.push((key.as_str(), address.as_str()));
        }

        let outcomes: Vec<Result<GeocodedAddress, GeocodeFailure>> = self.pool.install(|| {
            unique
                .par_iter()
                .map(|(key, address)| self.resolve_key(key, address, deadline))
                .collect()
        });

        let failures = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        info!(
            addresses = addresses.len(),
            distinct = unique.len(),
            failures,
            "geocoding batch resolved"
        );

        keys.iter()
            .zip(addresses)
            .map(|(key, address)| {
                let result = match slots.get(key.as_str()) {
                    Some(&slot) => outcomes[slot].clone(),
                    None => Err(GeocodeFailure::invalid_input("address is empty")),
                };
                Resolution {
                    input: address.clone(),
                    result,
                }
            })
            .collect()
    }

    fn resolve_key(&self, key: &str, address: &str, deadline: Option<Instant>) -> Result<GeocodedAddress, GeocodeFailure> {
        if let Some(entry) = self.cache.get(key) {
            debug!(key, "geocode cache hit");
            return Ok(GeocodedAddress::new(entry.to_match(), true));
        }

        let outcome = self.retry.run(
            |attempt| {
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return Err(GeocodeError::DeadlineExceeded);
                }
                self.limiter.acquire();
                trace!(key, attempt, "geocoding request");
                self.geocoder.geocode(address.trim())
            },
            GeocodeError::is_retryable,
        );

        match outcome {
            Ok(result) => {
                self.cache
                    .put(GeocodeEntry::new(key, &result, Timestamp::now(), self.cache_ttl));
                Ok(GeocodedAddress::new(result, false))
            }
            Err(err) => {
                warn!(key, error = %err, "geocoding failed");
                Err(err.into())
            }
        }
    }
}
