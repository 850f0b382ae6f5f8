//! Heart-rate adapter over platform health stores.
//!
//! The platform bridges (HealthKit, Health Connect) are injected by the
//! host app behind one capability trait; a null store stands in when no
//! platform API exists. Health data is enrichment, never activity-blocking:
//! every failure mode — missing store, denied permission, store error,
//! timeout — degrades to a logged empty result.

use crate::downsample::downsample;
use crate::error::HealthError;
use crate::types::HeartRateSample;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Hard upper bound on one health-store query; firing abandons the call.
pub const HEALTH_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Capability interface over a platform health store.
///
/// Implementations wrap blocking native calls; the service runs them on
/// the blocking pool under a timeout, so implementors do not need their
/// own deadline handling.
pub trait HealthStore: Send + Sync {
    /// Whether the platform store exists on this device.
    fn is_available(&self) -> bool;

    /// Request/verify read authorization. Returns whether access is granted.
    fn request_authorization(&self) -> Result<bool, HealthError>;

    /// Heart-rate samples in `[start_ms, end_ms]` (epoch milliseconds).
    /// Order is not guaranteed; the service sorts.
    fn heart_rate_samples(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<HeartRateSample>, HealthError>;
}

/// Fallback when no platform health API exists.
pub struct NullHealthStore;

impl HealthStore for NullHealthStore {
    fn is_available(&self) -> bool {
        false
    }

    fn request_authorization(&self) -> Result<bool, HealthError> {
        Err(HealthError::Unavailable)
    }

    fn heart_rate_samples(
        &self,
        _start_ms: i64,
        _end_ms: i64,
    ) -> Result<Vec<HeartRateSample>, HealthError> {
        Err(HealthError::Unavailable)
    }
}

/// Platform-agnostic heart-rate reader.
///
/// Built once at startup via [`for_platform`](Self::for_platform); callers
/// never branch on platform themselves.
pub struct HealthService {
    store: Arc<dyn HealthStore>,
    provider: &'static str,
    timeout: Duration,
}

impl HealthService {
    /// Select the platform provider once. `bridge` is the host-supplied
    /// native store; passing `None` yields the null provider.
    pub fn for_platform(bridge: Option<Arc<dyn HealthStore>>) -> Self {
        match bridge {
            Some(store) => {
                #[cfg(target_os = "ios")]
                let provider = "HealthKit";
                #[cfg(target_os = "android")]
                let provider = "Health Connect";
                #[cfg(not(any(target_os = "ios", target_os = "android")))]
                let provider = "none";

                Self {
                    store,
                    provider,
                    timeout: HEALTH_QUERY_TIMEOUT,
                }
            }
            None => Self {
                store: Arc::new(NullHealthStore),
                provider: "none",
                timeout: HEALTH_QUERY_TIMEOUT,
            },
        }
    }

    /// Service with a non-default query deadline (tests use short ones).
    pub fn with_timeout(store: Arc<dyn HealthStore>, timeout: Duration) -> Self {
        Self {
            store,
            provider: "custom",
            timeout,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    /// Request read authorization, bounded by the query timeout.
    pub async fn request_authorization(&self) -> bool {
        let store = Arc::clone(&self.store);
        let call = tokio::task::spawn_blocking(move || store.request_authorization());

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Ok(granted))) => granted,
            Ok(Ok(Err(e))) => {
                warn!("[health] {} authorization failed: {}", self.provider, e);
                false
            }
            Ok(Err(e)) => {
                warn!("[health] {} authorization task failed: {}", self.provider, e);
                false
            }
            Err(_) => {
                warn!(
                    "[health] {} authorization timed out after {:?}",
                    self.provider, self.timeout
                );
                false
            }
        }
    }

    /// Heart-rate samples for a time window, sorted ascending by timestamp.
    ///
    /// Permission is verified before reading. Timeouts and store errors are
    /// logged and return empty rather than propagating.
    pub async fn heart_rate_samples(&self, start_ms: i64, end_ms: i64) -> Vec<HeartRateSample> {
        if !self.store.is_available() {
            debug!("[health] {} store not available", self.provider);
            return Vec::new();
        }

        if !self.request_authorization().await {
            warn!("[health] {} read not authorized", self.provider);
            return Vec::new();
        }

        let store = Arc::clone(&self.store);
        let call =
            tokio::task::spawn_blocking(move || store.heart_rate_samples(start_ms, end_ms));

        let mut samples = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Ok(samples))) => samples,
            Ok(Ok(Err(e))) => {
                warn!("[health] {} query failed: {}", self.provider, e);
                return Vec::new();
            }
            Ok(Err(e)) => {
                warn!("[health] {} query task failed: {}", self.provider, e);
                return Vec::new();
            }
            Err(_) => {
                warn!(
                    "[health] {} query timed out after {:?}, abandoned",
                    self.provider, self.timeout
                );
                return Vec::new();
            }
        };

        samples.sort_by_key(|s| s.timestamp);
        debug!(
            "[health] {} returned {} samples for [{}, {}]",
            self.provider,
            samples.len(),
            start_ms,
            end_ms
        );
        samples
    }

    /// Heart-rate series bounded to `max_samples` for upload.
    pub async fn heart_rate_series(
        &self,
        start_ms: i64,
        end_ms: i64,
        max_samples: usize,
    ) -> Vec<HeartRateSample> {
        let samples = self.heart_rate_samples(start_ms, end_ms).await;
        downsample(&samples, max_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeStore {
        samples: Vec<HeartRateSample>,
        authorized: bool,
        delay: Option<Duration>,
    }

    impl HealthStore for FakeStore {
        fn is_available(&self) -> bool {
            true
        }

        fn request_authorization(&self) -> Result<bool, HealthError> {
            Ok(self.authorized)
        }

        fn heart_rate_samples(
            &self,
            _start_ms: i64,
            _end_ms: i64,
        ) -> Result<Vec<HeartRateSample>, HealthError> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            Ok(self.samples.clone())
        }
    }

    fn hr(timestamp: i64, bpm: u16) -> HeartRateSample {
        HeartRateSample { timestamp, bpm }
    }

    #[tokio::test]
    async fn test_samples_are_sorted_ascending() {
        let store = Arc::new(FakeStore {
            samples: vec![hr(3000, 150), hr(1000, 120), hr(2000, 135)],
            authorized: true,
            delay: None,
        });
        let service = HealthService::with_timeout(store, Duration::from_secs(1));

        let samples = service.heart_rate_samples(0, 10_000).await;
        let timestamps: Vec<i64> = samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![1000, 2000, 3000]);
    }

    #[tokio::test]
    async fn test_denied_permission_returns_empty() {
        let store = Arc::new(FakeStore {
            samples: vec![hr(1000, 120)],
            authorized: false,
            delay: None,
        });
        let service = HealthService::with_timeout(store, Duration::from_secs(1));

        assert!(service.heart_rate_samples(0, 10_000).await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_empty() {
        let store = Arc::new(FakeStore {
            samples: vec![hr(1000, 120)],
            authorized: true,
            delay: Some(Duration::from_millis(500)),
        });
        let service = HealthService::with_timeout(store, Duration::from_millis(50));

        assert!(service.heart_rate_samples(0, 10_000).await.is_empty());
    }

    #[tokio::test]
    async fn test_null_provider_reports_unavailable() {
        let service = HealthService::for_platform(None);
        assert!(!service.is_available());
        assert_eq!(service.provider(), "none");
        assert!(service.heart_rate_samples(0, 10_000).await.is_empty());
    }

    #[tokio::test]
    async fn test_series_is_downsampled() {
        let samples: Vec<HeartRateSample> = (0..200).map(|i| hr(i * 1000, 120)).collect();
        let store = Arc::new(FakeStore {
            samples,
            authorized: true,
            delay: None,
        });
        let service = HealthService::with_timeout(store, Duration::from_secs(1));

        let series = service.heart_rate_series(0, 1_000_000, 50).await;
        assert_eq!(series.len(), 50);
        assert_eq!(series[0].timestamp, 0);
        assert_eq!(series[49].timestamp, 199_000);
    }
}
