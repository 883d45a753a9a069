//! Best-effort location under time pressure.
//!
//! [`LocationResolver::resolve`] never waits longer than its timeout: a fresh
//! fix, else the last known fix labeled stale, else the `(0, 0)` sentinel
//! labeled unknown. [`LocationTracker`] feeds the shared [`LastKnownCache`]
//! in the background whether or not an alert is in progress.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::geocode::ReverseGeocoder;
use crate::model::{GeoPoint, LocationSample};
use crate::platform::{Connectivity, Geolocator, LocalCache, PlatformError, PositionOptions};

/// Place name shown while tracking offline.
pub const OFFLINE_PLACE: &str = "Offline Mode (Precise GPS Active)";

/// Place name shown when the geocoder could not be reached.
pub const GEOCODE_FAILED_PLACE: &str = "GPS Active (Map Unavailable)";

/// A place name describes fixes up to this far from where it was looked up.
pub const PLACE_RADIUS_M: f64 = 500.0;

#[derive(Debug, Clone)]
struct PlaceName {
    at: GeoPoint,
    name: String,
}

#[derive(Debug, Clone, Default)]
struct CacheEntry {
    sample: Option<LocationSample>,
    place: Option<PlaceName>,
}

/// Most recent successful fix. Writes are last-writer-wins.
#[derive(Clone, Default)]
pub struct LastKnownCache {
    inner: Arc<RwLock<CacheEntry>>,
}

impl LastKnownCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new fix. The place name stays until a lookup for a newer
    /// fix replaces it; see [`Self::place_near`] for when it still applies.
    pub fn update(&self, sample: LocationSample) {
        let mut entry = self.inner.write().unwrap_or_else(|p| p.into_inner());
        entry.sample = Some(sample);
    }

    /// Attach a place name, unless a newer fix has replaced `for_fix`.
    pub fn set_place(&self, for_fix: DateTime<Utc>, place: String) {
        let mut entry = self.inner.write().unwrap_or_else(|p| p.into_inner());
        let at = match &entry.sample {
            Some(sample) if sample.timestamp == for_fix => sample.point(),
            _ => return,
        };
        entry.place = Some(PlaceName { at, name: place });
    }

    pub fn sample(&self) -> Option<LocationSample> {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).sample.clone()
    }

    /// The most recent place name, wherever it was looked up.
    pub fn place(&self) -> Option<String> {
        let entry = self.inner.read().unwrap_or_else(|p| p.into_inner());
        entry.place.as_ref().map(|p| p.name.clone())
    }

    /// The place name, if it was looked up within [`PLACE_RADIUS_M`] of `point`.
    pub fn place_near(&self, point: GeoPoint) -> Option<String> {
        let entry = self.inner.read().unwrap_or_else(|p| p.into_inner());
        entry
            .place
            .as_ref()
            .filter(|p| p.at.distance_m(point) <= PLACE_RADIUS_M)
            .map(|p| p.name.clone())
    }
}

/// How much a resolved location can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Obtained during this resolve call.
    Fresh,
    /// Last known fix; `age` at resolve time.
    Stale { age: chrono::Duration },
    /// No fix at all; the sample is the sentinel.
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub sample: LocationSample,
    pub freshness: Freshness,
    pub place: Option<String>,
}

impl ResolvedLocation {
    pub fn unknown(at: DateTime<Utc>) -> Self {
        Self {
            sample: LocationSample::unknown(at),
            freshness: Freshness::Unknown,
            place: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.freshness == Freshness::Unknown || self.sample.is_unknown()
    }
}

/// Resolves a location for one alert attempt.
#[derive(Clone)]
pub struct LocationResolver {
    geolocator: Arc<dyn Geolocator>,
    cache: LastKnownCache,
    local: Option<Arc<dyn LocalCache>>,
}

impl LocationResolver {
    pub fn new(geolocator: Arc<dyn Geolocator>, cache: LastKnownCache) -> Self {
        Self {
            geolocator,
            cache,
            local: None,
        }
    }

    /// Also persist fixes and fall back to the persisted fix when the
    /// in-memory cache is empty (e.g. right after start-up).
    pub fn with_local_cache(mut self, local: Arc<dyn LocalCache>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn cache(&self) -> &LastKnownCache {
        &self.cache
    }

    pub async fn resolve(&self, timeout: Duration) -> ResolvedLocation {
        let options = PositionOptions::fresh(timeout);
        let attempt =
            tokio::time::timeout(timeout, self.geolocator.current_position(options)).await;

        let error = match attempt {
            Ok(Ok(sample)) if !sample.is_unknown() => {
                debug!(accuracy = ?sample.accuracy, "Fresh fix obtained");
                self.cache.update(sample.clone());
                if let Some(local) = &self.local {
                    local.store_location(&sample);
                }
                let place = self.cache.place_near(sample.point());
                return ResolvedLocation {
                    sample,
                    freshness: Freshness::Fresh,
                    place,
                };
            }
            Ok(Ok(_)) => PlatformError::Failed("fix reported (0, 0)".to_string()),
            Ok(Err(e)) => e,
            Err(_) => PlatformError::Timeout,
        };

        let now = Utc::now();
        let cached = self
            .cache
            .sample()
            .or_else(|| self.local.as_ref()?.load_location())
            .filter(|s| !s.is_unknown());

        match cached {
            Some(sample) => {
                let age = now - sample.timestamp;
                warn!(
                    error = %error,
                    age_secs = age.num_seconds(),
                    "No fresh fix, using last known location"
                );
                let place = self.cache.place_near(sample.point());
                ResolvedLocation {
                    sample,
                    freshness: Freshness::Stale { age },
                    place,
                }
            }
            None => {
                warn!(error = %error, "No fix and no cached location");
                ResolvedLocation::unknown(now)
            }
        }
    }
}

/// Background position watch feeding the [`LastKnownCache`].
pub struct LocationTracker {
    task: JoinHandle<()>,
}

impl LocationTracker {
    /// Start watching. Each successful fix updates the cache and, when a
    /// geocoder is given, gets a best-effort place name.
    pub fn start(
        geolocator: Arc<dyn Geolocator>,
        cache: LastKnownCache,
        options: PositionOptions,
        geocoder: Option<Arc<dyn ReverseGeocoder>>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, PlatformError> {
        let mut watch = geolocator.watch_position(options)?;
        info!(high_accuracy = options.high_accuracy, "Location tracking started");

        let task = tokio::spawn(async move {
            while let Some(update) = watch.recv().await {
                let sample = match update {
                    Ok(sample) if !sample.is_unknown() => sample,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "Tracking fix failed");
                        continue;
                    }
                };

                let fix_time = sample.timestamp;
                let point = sample.point();
                cache.update(sample);

                if !connectivity.is_online() {
                    cache.set_place(fix_time, OFFLINE_PLACE.to_string());
                    continue;
                }
                let Some(geocoder) = geocoder.clone() else {
                    continue;
                };
                let cache = cache.clone();
                // Geocoding must not hold up the next fix.
                tokio::spawn(async move {
                    let place = match geocoder.place_name(point).await {
                        Ok(name) => name,
                        Err(e) => {
                            debug!(error = %e, "Reverse geocoding failed");
                            GEOCODE_FAILED_PLACE.to_string()
                        }
                    };
                    cache.set_place(fix_time, place);
                });
            }
            debug!("Location watch ended");
        });

        Ok(Self { task })
    }

    /// Stop watching. Also happens on drop.
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    use crate::platform::PositionWatch;

    enum Behaviour {
        Fix(LocationSample),
        Fail,
        Hang,
    }

    struct FakeGps {
        behaviour: Behaviour,
        watch: Mutex<Option<PositionWatch>>,
    }

    impl FakeGps {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                watch: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Geolocator for FakeGps {
        async fn current_position(
            &self,
            _options: PositionOptions,
        ) -> Result<LocationSample, PlatformError> {
            match &self.behaviour {
                Behaviour::Fix(sample) => Ok(sample.clone()),
                Behaviour::Fail => Err(PlatformError::PermissionDenied("location".to_string())),
                Behaviour::Hang => std::future::pending().await,
            }
        }

        fn watch_position(
            &self,
            _options: PositionOptions,
        ) -> Result<PositionWatch, PlatformError> {
            self.watch
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| PlatformError::Unavailable("watch".to_string()))
        }
    }

    struct Online(AtomicBool);

    impl Connectivity for Online {
        fn is_online(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct FixedGeocoder;

    #[async_trait]
    impl ReverseGeocoder for FixedGeocoder {
        async fn place_name(&self, _point: GeoPoint) -> anyhow::Result<String> {
            Ok("Indirapuram, Ghaziabad".to_string())
        }
    }

    fn sample(lat: f64, lng: f64) -> LocationSample {
        LocationSample::new(lat, lng, Some(12.0), Utc::now())
    }

    #[tokio::test]
    async fn test_fresh_fix_updates_cache() {
        let cache = LastKnownCache::new();
        let resolver = LocationResolver::new(
            Arc::new(FakeGps::new(Behaviour::Fix(sample(28.6, 77.2)))),
            cache.clone(),
        );

        let resolved = resolver.resolve(Duration::from_secs(4)).await;
        assert_eq!(resolved.freshness, Freshness::Fresh);
        assert_eq!(cache.sample().unwrap().lat, 28.6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_to_stale_cache() {
        let cache = LastKnownCache::new();
        let old = LocationSample::new(28.6, 77.2, None, Utc::now() - chrono::Duration::minutes(3));
        cache.update(old.clone());
        cache.set_place(old.timestamp, "Indirapuram, Ghaziabad".to_string());

        let resolver = LocationResolver::new(Arc::new(FakeGps::new(Behaviour::Hang)), cache);
        let resolved = resolver.resolve(Duration::from_secs(4)).await;

        assert!(matches!(resolved.freshness, Freshness::Stale { .. }));
        assert_eq!(resolved.sample, old);
        assert_eq!(resolved.place.as_deref(), Some("Indirapuram, Ghaziabad"));
    }

    #[tokio::test]
    async fn test_failure_without_cache_is_unknown_sentinel() {
        let resolver = LocationResolver::new(
            Arc::new(FakeGps::new(Behaviour::Fail)),
            LastKnownCache::new(),
        );
        let resolved = resolver.resolve(Duration::from_secs(4)).await;
        assert_eq!(resolved.freshness, Freshness::Unknown);
        assert!(resolved.sample.is_unknown());
    }

    #[tokio::test]
    async fn test_zero_zero_fix_is_not_trusted() {
        let resolver = LocationResolver::new(
            Arc::new(FakeGps::new(Behaviour::Fix(sample(0.0, 0.0)))),
            LastKnownCache::new(),
        );
        let resolved = resolver.resolve(Duration::from_secs(4)).await;
        assert!(resolved.is_unknown());
    }

    #[tokio::test]
    async fn test_fresh_fix_keeps_only_a_nearby_place() {
        let cache = LastKnownCache::new();
        let two_minutes_ago = Utc::now() - chrono::Duration::minutes(2);
        let earlier = LocationSample::new(28.6139, 77.209, None, two_minutes_ago);
        cache.update(earlier.clone());
        cache.set_place(earlier.timestamp, "Connaught Place, New Delhi".to_string());

        // About 100 m away: still the same place.
        let nearby = LocationResolver::new(
            Arc::new(FakeGps::new(Behaviour::Fix(sample(28.6148, 77.2092)))),
            cache.clone(),
        );
        let resolved = nearby.resolve(Duration::from_secs(4)).await;
        assert_eq!(resolved.place.as_deref(), Some("Connaught Place, New Delhi"));

        // Across town the old name would be wrong.
        let far = LocationResolver::new(
            Arc::new(FakeGps::new(Behaviour::Fix(sample(28.6692, 77.4538)))),
            cache.clone(),
        );
        let resolved = far.resolve(Duration::from_secs(4)).await;
        assert_eq!(resolved.freshness, Freshness::Fresh);
        assert_eq!(resolved.place, None);
    }

    #[test]
    fn test_place_for_superseded_fix_is_ignored() {
        let cache = LastKnownCache::new();
        let first = LocationSample::new(1.0, 1.0, None, Utc::now() - chrono::Duration::seconds(10));
        cache.update(first.clone());
        let second = sample(2.0, 2.0);
        cache.update(second.clone());
        cache.set_place(first.timestamp, "Old Place".to_string());
        assert_eq!(cache.place(), None);

        cache.set_place(second.timestamp, "New Place".to_string());
        cache.update(sample(2.001, 2.001));
        assert_eq!(cache.place().as_deref(), Some("New Place"));
    }

    #[tokio::test]
    async fn test_tracker_updates_cache_and_geocodes() {
        let (tx, rx) = mpsc::channel(4);
        let gps = FakeGps::new(Behaviour::Fail);
        *gps.watch.lock().unwrap() = Some(rx);

        let cache = LastKnownCache::new();
        let tracker = LocationTracker::start(
            Arc::new(gps),
            cache.clone(),
            PositionOptions::tracking(Duration::from_secs(15), false),
            Some(Arc::new(FixedGeocoder)),
            Arc::new(Online(AtomicBool::new(true))),
        )
        .unwrap();

        tx.send(Err(PlatformError::Timeout)).await.unwrap();
        tx.send(Ok(sample(28.6, 77.2))).await.unwrap();

        for _ in 0..50 {
            if cache.place().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(cache.sample().unwrap().lat, 28.6);
        assert_eq!(cache.place().as_deref(), Some("Indirapuram, Ghaziabad"));

        tracker.stop();
        for _ in 0..50 {
            if !tracker.is_running() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!tracker.is_running());
    }

    #[tokio::test]
    async fn test_tracker_offline_place() {
        let (tx, rx) = mpsc::channel(4);
        let gps = FakeGps::new(Behaviour::Fail);
        *gps.watch.lock().unwrap() = Some(rx);

        let cache = LastKnownCache::new();
        let _tracker = LocationTracker::start(
            Arc::new(gps),
            cache.clone(),
            PositionOptions::tracking(Duration::from_secs(15), true),
            Some(Arc::new(FixedGeocoder)),
            Arc::new(Online(AtomicBool::new(false))),
        )
        .unwrap();

        tx.send(Ok(sample(28.6, 77.2))).await.unwrap();
        for _ in 0..50 {
            if cache.place().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(cache.place().as_deref(), Some(OFFLINE_PLACE));
    }
}
