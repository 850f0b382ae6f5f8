//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module provides the UniFFI bindings that expose the recording core
//! to Kotlin and Swift. All FFI functions are prefixed with `ffi_` to avoid
//! naming conflicts with the internal API. FFI types mirror the internal
//! data model; conversions live next to the records.

use crate::error::{HealthError, SyncError};
use crate::health::{HealthService, HealthStore};
use crate::http::SyncClient;
use crate::scheduler::{SyncConfig, SyncSnapshot};
use crate::session::{should_force_finish, RecordingSession};
use crate::store::SyncStore;
use crate::types::{ActivityRecord, ActivityStatus, HeartRateSample, LocationSample, Milestone};
use log::{info, warn};
use std::sync::{Arc, Mutex};

// ============================================================================
// FFI Types
// ============================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLocationSample {
    pub lat: f64,
    pub lng: f64,
    pub elevation: Option<f64>,
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub speed: Option<f64>,
    pub heart_rate: Option<u16>,
    pub cadence: Option<u16>,
}

impl From<FfiLocationSample> for LocationSample {
    fn from(s: FfiLocationSample) -> Self {
        Self {
            lat: s.lat,
            lng: s.lng,
            elevation: s.elevation,
            timestamp: s.timestamp,
            speed: s.speed,
            heart_rate: s.heart_rate,
            cadence: s.cadence,
        }
    }
}

#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiActivityStatus {
    InProgress,
    Paused,
    Completed,
}

impl From<ActivityStatus> for FfiActivityStatus {
    fn from(status: ActivityStatus) -> Self {
        match status {
            ActivityStatus::InProgress => FfiActivityStatus::InProgress,
            ActivityStatus::Paused => FfiActivityStatus::Paused,
            ActivityStatus::Completed => FfiActivityStatus::Completed,
        }
    }
}

impl From<FfiActivityStatus> for ActivityStatus {
    fn from(status: FfiActivityStatus) -> Self {
        match status {
            FfiActivityStatus::InProgress => ActivityStatus::InProgress,
            FfiActivityStatus::Paused => ActivityStatus::Paused,
            FfiActivityStatus::Completed => ActivityStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiActivityRecord {
    pub id: String,
    /// RFC 3339 start time
    pub started_at: String,
    /// Cumulative paused time in seconds
    pub total_paused_duration: f64,
    pub status: FfiActivityStatus,
    pub distance: f64,
    pub duration: u32,
    pub elevation_gain: f64,
    pub last_point_at: Option<String>,
}

impl From<ActivityRecord> for FfiActivityRecord {
    fn from(a: ActivityRecord) -> Self {
        Self {
            id: a.id,
            started_at: a.started_at,
            total_paused_duration: a.total_paused_duration,
            status: a.status.into(),
            distance: a.distance,
            duration: a.duration,
            elevation_gain: a.elevation_gain,
            last_point_at: a.last_point_at,
        }
    }
}

impl From<FfiActivityRecord> for ActivityRecord {
    fn from(a: FfiActivityRecord) -> Self {
        Self {
            id: a.id,
            started_at: a.started_at,
            total_paused_duration: a.total_paused_duration,
            status: a.status.into(),
            distance: a.distance,
            duration: a.duration,
            elevation_gain: a.elevation_gain,
            last_point_at: a.last_point_at,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiHeartRateSample {
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub bpm: u16,
}

impl From<HeartRateSample> for FfiHeartRateSample {
    fn from(s: HeartRateSample) -> Self {
        Self {
            timestamp: s.timestamp,
            bpm: s.bpm,
        }
    }
}

impl From<FfiHeartRateSample> for HeartRateSample {
    fn from(s: FfiHeartRateSample) -> Self {
        Self {
            timestamp: s.timestamp,
            bpm: s.bpm,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMilestone {
    pub sport_type: String,
    pub threshold_meters: f64,
}

impl From<Milestone> for FfiMilestone {
    fn from(m: Milestone) -> Self {
        Self {
            sport_type: m.sport_type,
            threshold_meters: m.threshold_meters,
        }
    }
}

impl From<FfiMilestone> for Milestone {
    fn from(m: FfiMilestone) -> Self {
        Self {
            sport_type: m.sport_type,
            threshold_meters: m.threshold_meters,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSyncSnapshot {
    pub activity: Option<FfiActivityRecord>,
    pub pending: u32,
    pub last_synced_at: Option<i64>,
    pub needs_reauth: bool,
    pub consecutive_failures: u32,
}

impl From<SyncSnapshot> for FfiSyncSnapshot {
    fn from(s: SyncSnapshot) -> Self {
        Self {
            activity: s.activity.map(Into::into),
            pending: s.pending as u32,
            last_synced_at: s.last_synced_at,
            needs_reauth: s.needs_reauth,
            consecutive_failures: s.consecutive_failures,
        }
    }
}

/// Flattened error crossing the FFI boundary; only the message survives.
#[derive(Debug, thiserror::Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum FfiError {
    #[error("{0}")]
    Sync(String),
}

impl From<SyncError> for FfiError {
    fn from(e: SyncError) -> Self {
        FfiError::Sync(e.to_string())
    }
}

// ============================================================================
// Recording Session Handle
// ============================================================================

/// Opaque handle around one [`RecordingSession`], owning the runtime the
/// scheduler runs on. Constructed when the server activity record exists,
/// dropped after `finish()`.
#[derive(uniffi::Object)]
pub struct RecorderHandle {
    runtime: tokio::runtime::Runtime,
    session: Mutex<Option<RecordingSession>>,
}

impl RecorderHandle {
    fn with_session<R>(&self, f: impl FnOnce(&mut RecordingSession) -> R) -> Option<R> {
        let mut guard = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.as_mut().map(f)
    }
}

#[uniffi::export]
impl RecorderHandle {
    /// Wire up buffer, client, store and scheduler for one activity.
    #[uniffi::constructor]
    pub fn new(
        activity: FfiActivityRecord,
        milestones: Vec<FfiMilestone>,
        base_url: String,
        store_path: String,
    ) -> Result<Arc<Self>, FfiError> {
        crate::init_logging();
        info!("[RecorderHandle] creating session for {}", activity.id);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| FfiError::Sync(format!("Runtime error: {}", e)))?;

        let store = Arc::new(SyncStore::open(&store_path)?);
        let client = SyncClient::new(base_url, Arc::clone(&store))?;

        let session = {
            let _guard = runtime.enter();
            RecordingSession::new(
                activity.into(),
                milestones.into_iter().map(Into::into).collect(),
                client,
                store,
                SyncConfig::default(),
            )
        };

        Ok(Arc::new(Self {
            runtime,
            session: Mutex::new(Some(session)),
        }))
    }

    /// Begin capture and background flushing.
    pub fn start(&self) {
        let _guard = self.runtime.enter();
        self.with_session(|s| s.start());
    }

    pub fn record_location(&self, sample: FfiLocationSample) {
        self.with_session(|s| s.record_location(sample.into()));
    }

    pub fn pause(&self) {
        self.with_session(|s| s.pause());
    }

    pub fn resume(&self) {
        self.with_session(|s| s.resume());
    }

    /// Display duration in seconds; poll on a sub-second cadence.
    pub fn elapsed_seconds(&self) -> u32 {
        self.with_session(|s| s.tick(chrono::Utc::now()))
            .unwrap_or(0)
    }

    /// Milestones newly crossed since the last poll.
    pub fn crossed_milestones(&self) -> Vec<FfiMilestone> {
        self.with_session(|s| {
            s.check_milestones()
                .into_iter()
                .map(Into::into)
                .collect::<Vec<FfiMilestone>>()
        })
        .unwrap_or_default()
    }

    /// Latest sync state for the UI.
    pub fn snapshot(&self) -> Option<FfiSyncSnapshot> {
        self.with_session(|s| {
            let snapshot = s.subscribe().borrow().clone();
            snapshot.into()
        })
    }

    /// Best-effort flush; call when the app moves to the background.
    pub fn flush_now(&self) {
        self.with_session(|s| s.app_backgrounded());
    }

    pub fn pending_samples(&self) -> u32 {
        self.with_session(|s| s.pending_samples() as u32)
            .unwrap_or(0)
    }

    /// Finish recording. Blocks for the final flush and durable spill,
    /// then returns the last known server record. The handle is inert
    /// afterwards.
    pub fn finish(&self) -> Option<FfiActivityRecord> {
        let session = {
            let mut guard = match self.session.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        }?;

        let record = self.runtime.block_on(session.finish());
        Some(record.into())
    }
}

// ============================================================================
// Health Bridge
// ============================================================================

/// Callback interface the host app implements over its native health store
/// (HealthKit on iOS, Health Connect on Android).
#[uniffi::export(callback_interface)]
pub trait HealthBridge: Send + Sync {
    fn is_available(&self) -> bool;
    fn request_authorization(&self) -> bool;
    /// Heart-rate samples in `[start_ms, end_ms]`, any order.
    fn heart_rate_samples(&self, start_ms: i64, end_ms: i64) -> Vec<FfiHeartRateSample>;
}

struct BridgeStore {
    bridge: Box<dyn HealthBridge>,
}

impl HealthStore for BridgeStore {
    fn is_available(&self) -> bool {
        self.bridge.is_available()
    }

    fn request_authorization(&self) -> Result<bool, HealthError> {
        Ok(self.bridge.request_authorization())
    }

    fn heart_rate_samples(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<HeartRateSample>, HealthError> {
        Ok(self
            .bridge
            .heart_rate_samples(start_ms, end_ms)
            .into_iter()
            .map(Into::into)
            .collect())
    }
}

/// Heart-rate series for a window, bounded to `max_samples`, sorted
/// ascending. Failures degrade to an empty list.
#[uniffi::export]
pub fn ffi_heart_rate_series(
    bridge: Box<dyn HealthBridge>,
    start_ms: i64,
    end_ms: i64,
    max_samples: u32,
) -> Vec<FfiHeartRateSample> {
    crate::init_logging();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            warn!("[ffi_heart_rate_series] failed to create runtime: {}", e);
            return Vec::new();
        }
    };

    let service = HealthService::for_platform(Some(Arc::new(BridgeStore { bridge })));
    rt.block_on(service.heart_rate_series(start_ms, end_ms, max_samples as usize))
        .into_iter()
        .map(Into::into)
        .collect()
}

// ============================================================================
// Crash Recovery
// ============================================================================

/// Whether an in-progress activity found at launch is stale enough to
/// force-finish.
#[uniffi::export]
pub fn ffi_should_force_finish(activity: FfiActivityRecord, stale_after_hours: i64) -> bool {
    crate::init_logging();
    let record: ActivityRecord = activity.into();
    should_force_finish(
        &record,
        chrono::Utc::now(),
        chrono::Duration::hours(stale_after_hours),
    )
}
