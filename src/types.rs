//! Core data model for activity recording and sync.
//!
//! These types are data containers shared between the capture path, the
//! sync path and the FFI boundary. Everything wire-facing serializes with
//! camelCase names to match the backend contract.

use serde::{Deserialize, Serialize};

// ============================================================================
// Location Samples
// ============================================================================

/// One GPS reading captured while an activity is being recorded.
///
/// Immutable once captured; owned by the [`SampleBuffer`](crate::SampleBuffer)
/// until the server acknowledges the batch it was uploaded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    /// Elevation in meters, if the fix carried one
    pub elevation: Option<f64>,
    /// Capture time, Unix epoch milliseconds
    pub timestamp: i64,
    /// Instantaneous speed in m/s
    pub speed: Option<f64>,
    /// Heart rate at capture time, bpm
    pub heart_rate: Option<u16>,
    /// Cadence in steps/revolutions per minute
    pub cadence: Option<u16>,
}

/// An ordered, bounded slice of samples selected for one upload attempt.
///
/// Never mutated after selection: either the whole batch is acknowledged
/// and discarded, or the whole batch is requeued. There is no partial ack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    pub samples: Vec<LocationSample>,
}

impl SampleBatch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp of the newest sample in the batch (capture order is
    /// chronological, so this is the last element).
    pub fn newest_timestamp(&self) -> Option<i64> {
        self.samples.last().map(|s| s.timestamp)
    }
}

impl From<Vec<LocationSample>> for SampleBatch {
    fn from(samples: Vec<LocationSample>) -> Self {
        Self { samples }
    }
}

// ============================================================================
// Activity Record
// ============================================================================

/// Lifecycle state of a server-side activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    InProgress,
    Paused,
    Completed,
}

/// Server-authoritative activity record.
///
/// The server recomputes distance/duration/elevation from submitted points;
/// this local copy is a cache refreshed on every successful batch upload,
/// never a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    /// RFC 3339 start time as declared by the server
    pub started_at: String,
    /// Cumulative paused time in seconds
    #[serde(default)]
    pub total_paused_duration: f64,
    pub status: ActivityStatus,
    /// Total distance in meters
    #[serde(default)]
    pub distance: f64,
    /// Elapsed duration in seconds
    #[serde(default)]
    pub duration: u32,
    /// Total elevation gain in meters
    #[serde(default)]
    pub elevation_gain: f64,
    /// RFC 3339 timestamp of the newest point the server has accepted
    #[serde(default)]
    pub last_point_at: Option<String>,
}

// ============================================================================
// Heart Rate
// ============================================================================

/// One heart-rate reading from a platform health store.
///
/// Sourced outside the sample buffer; merged into activity statistics at
/// point-submission or finish time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateSample {
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub bpm: u16,
}

// ============================================================================
// Milestones
// ============================================================================

/// A distance threshold that fires a one-shot notification when crossed.
/// Static per sport configuration; crossing state lives in
/// [`MilestoneDetector`](crate::MilestoneDetector) and is session-scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    /// Sport this milestone applies to (e.g., "Run", "Ride")
    pub sport_type: String,
    pub threshold_meters: f64,
}
