mod support;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use distribution_planner::cache::InMemoryGeocodeCache;
use distribution_planner::error::{FailureKind, GeocodeError};
use distribution_planner::geocoding::{GeocodingConfig, GeocodingGateway};
use distribution_planner::traits::GeocodeCache;

use support::fixtures::{CASINOS, STRIP_RESTAURANTS};
use support::{FakeGeocoder, gateway_with, test_geocoding_config};

fn addresses(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn test_second_resolution_is_served_from_cache() {
    let geocoder = Arc::new(FakeGeocoder::with_locations(CASINOS));
    let gateway = gateway_with(geocoder.clone(), &test_geocoding_config());

    let first = gateway.resolve_one("Bellagio");
    let second = gateway.resolve_one("  bellagio ");

    assert!(!first.result.as_ref().unwrap().from_cache);
    assert!(second.result.as_ref().unwrap().from_cache);
    assert_eq!(
        first.result.unwrap().coordinate,
        second.result.unwrap().coordinate
    );
    assert_eq!(geocoder.calls(), 1);
}

#[test]
fn test_empty_address_fails_alone() {
    let geocoder = Arc::new(FakeGeocoder::with_locations(CASINOS));
    let gateway = gateway_with(geocoder.clone(), &test_geocoding_config());

    let results = gateway.resolve(&addresses(&["Wynn Las Vegas", "", "MGM Grand"]));

    assert_eq!(results.len(), 3);
    assert!(results[0].result.is_ok());
    assert_eq!(
        results[1].result.as_ref().unwrap_err().kind,
        FailureKind::InvalidInput
    );
    assert!(results[2].result.is_ok());
    assert_eq!(results[2].input, "MGM Grand");
    assert_eq!(geocoder.calls(), 2);
}

#[test]
fn test_one_unknown_address_does_not_cascade() {
    let geocoder = Arc::new(FakeGeocoder::with_locations(STRIP_RESTAURANTS));
    let gateway = gateway_with(geocoder, &test_geocoding_config());

    let mut batch: Vec<String> = STRIP_RESTAURANTS.iter().map(|l| l.name.to_string()).collect();
    batch.insert(4, "742 Evergreen Terrace".to_string());

    let results = gateway.resolve(&batch);
    let failures: Vec<_> = results.iter().filter(|r| r.result.is_err()).collect();

    assert_eq!(results.len(), batch.len());
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].input, "742 Evergreen Terrace");
    assert_eq!(
        failures[0].result.as_ref().unwrap_err().kind,
        FailureKind::NotFound
    );
}

#[test]
fn test_transient_errors_are_retried() {
    let geocoder = Arc::new(FakeGeocoder::with_locations(CASINOS));
    geocoder.fail_next("Bellagio", GeocodeError::RateLimited("429".into()));
    geocoder.fail_next("Bellagio", GeocodeError::Transient("timeout".into()));
    let gateway = gateway_with(geocoder.clone(), &test_geocoding_config());

    let resolution = gateway.resolve_one("Bellagio");

    assert!(resolution.result.is_ok());
    assert_eq!(geocoder.calls_for("Bellagio"), 3);
}

#[test]
fn test_retry_budget_is_bounded() {
    let geocoder = Arc::new(FakeGeocoder::with_locations(CASINOS));
    for _ in 0..5 {
        geocoder.fail_next("Bellagio", GeocodeError::Transient("timeout".into()));
    }
    let gateway = gateway_with(geocoder.clone(), &test_geocoding_config());

    let resolution = gateway.resolve_one("Bellagio");

    assert_eq!(
        resolution.result.unwrap_err().kind,
        FailureKind::Transient
    );
    assert_eq!(geocoder.calls_for("Bellagio"), 3);
}

#[test]
fn test_not_found_is_not_retried() {
    let geocoder = Arc::new(FakeGeocoder::new());
    let gateway = gateway_with(geocoder.clone(), &test_geocoding_config());

    let resolution = gateway.resolve_one("1 Nowhere Road");

    assert_eq!(resolution.result.unwrap_err().kind, FailureKind::NotFound);
    assert_eq!(geocoder.calls(), 1);
}

#[test]
fn test_duplicates_in_batch_share_one_request() {
    let geocoder = Arc::new(FakeGeocoder::with_locations(CASINOS));
    let gateway = gateway_with(geocoder.clone(), &test_geocoding_config());

    let results = gateway.resolve(&addresses(&["MGM Grand", "mgm grand", "MGM  Grand.", "Bellagio"]));

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.result.is_ok()));
    assert_eq!(results[1].input, "mgm grand");
    assert_eq!(geocoder.calls(), 2);
}

#[test]
fn test_expired_entries_are_resolved_again() {
    let geocoder = Arc::new(FakeGeocoder::with_locations(CASINOS));
    let config = GeocodingConfig {
        cache_ttl: Duration::from_millis(30),
        ..test_geocoding_config()
    };
    let gateway = gateway_with(geocoder.clone(), &config);

    gateway.resolve_one("Caesars Palace");
    thread::sleep(Duration::from_millis(60));
    let again = gateway.resolve_one("Caesars Palace");

    assert!(!again.result.unwrap().from_cache);
    assert_eq!(geocoder.calls(), 2);
}

#[test]
fn test_invalidated_entry_is_resolved_again() {
    let geocoder = Arc::new(FakeGeocoder::with_locations(CASINOS));
    let gateway = gateway_with(geocoder.clone(), &test_geocoding_config());

    gateway.resolve_one("Encore at Wynn");
    assert!(gateway.cache().invalidate("encore at wynn"));
    gateway.resolve_one("Encore at Wynn");

    assert_eq!(geocoder.calls(), 2);
}

#[test]
fn test_gateways_share_one_rate_budget() {
    let geocoder = Arc::new(FakeGeocoder::with_locations(STRIP_RESTAURANTS));
    let config = GeocodingConfig {
        requests_per_sec: 40.0,
        burst: 1,
        ..test_geocoding_config()
    };
    let limiter = config.limiter().unwrap();

    let gateway = |cache: InMemoryGeocodeCache| {
        GeocodingGateway::new(geocoder.clone(), Arc::new(cache), Arc::clone(&limiter), &config).unwrap()
    };
    let first = gateway(InMemoryGeocodeCache::new());
    let second = gateway(InMemoryGeocodeCache::new());

    let names: Vec<String> = STRIP_RESTAURANTS.iter().map(|l| l.name.to_string()).collect();
    let (left, right) = names.split_at(5);

    let started = Instant::now();
    thread::scope(|scope| {
        scope.spawn(|| first.resolve(left));
        scope.spawn(|| second.resolve(right));
    });

    // 10 requests, one token up front, then 40 per second: at least ~225 ms.
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(geocoder.calls(), 10);
}

#[test]
fn test_no_requests_after_deadline() {
    let geocoder = Arc::new(FakeGeocoder::with_locations(CASINOS));
    let gateway = gateway_with(geocoder.clone(), &test_geocoding_config());
    gateway.resolve_one("Bellagio");

    let expired = Some(Instant::now());
    let results = gateway.resolve_until(&addresses(&["Bellagio", "MGM Grand"]), expired);

    assert!(results[0].result.as_ref().unwrap().from_cache);
    assert_eq!(
        results[1].result.as_ref().unwrap_err().kind,
        FailureKind::DeadlineExceeded
    );
    assert_eq!(geocoder.calls(), 1);
}

#[test]
fn test_zero_rate_is_a_config_error() {
    let config = GeocodingConfig {
        requests_per_sec: 0.0,
        ..test_geocoding_config()
    };
    assert!(config.limiter().is_err());
}
