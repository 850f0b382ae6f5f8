//! Recording session: one activity's capture, sync and feedback state.
//!
//! Owns the sample buffer, the scheduler, the milestone detector and the
//! display timer for a single activity, with a lifecycle tied to recording
//! start/finish. No ambient globals: anything that needs the session gets
//! it passed in explicitly.

use crate::buffer::SampleBuffer;
use crate::http::SyncClient;
use crate::milestones::MilestoneDetector;
use crate::scheduler::{SyncConfig, SyncScheduler, SyncSnapshot};
use crate::store::SyncStore;
use crate::timer::ElapsedTimer;
use crate::types::{ActivityRecord, ActivityStatus, LocationSample, Milestone};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;

/// How stale an in-progress activity may be before crash recovery
/// force-finishes it on next launch.
pub const DEFAULT_STALE_AFTER_HOURS: i64 = 6;

/// Default staleness window for [`should_force_finish`].
pub fn default_stale_after() -> Duration {
    Duration::hours(DEFAULT_STALE_AFTER_HOURS)
}

/// Decide whether an in-progress activity found at launch belongs to a
/// crashed session and should be force-finished by the host.
///
/// Uses the newest server-acknowledged point (falling back to the start
/// time) — any state kept only in memory may have died with the process,
/// so the decision rests on the server record alone.
pub fn should_force_finish(
    activity: &ActivityRecord,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> bool {
    if activity.status != ActivityStatus::InProgress {
        return false;
    }

    let last = activity
        .last_point_at
        .as_deref()
        .unwrap_or(&activity.started_at);

    match DateTime::parse_from_rfc3339(last) {
        Ok(t) => now.signed_duration_since(t.with_timezone(&Utc)) > stale_after,
        Err(e) => {
            warn!(
                "[session] unparseable timestamp '{}' on {}: {}",
                last, activity.id, e
            );
            false
        }
    }
}

/// A single activity being recorded.
pub struct RecordingSession {
    activity: ActivityRecord,
    buffer: Arc<SampleBuffer>,
    scheduler: SyncScheduler,
    snapshot_rx: watch::Receiver<SyncSnapshot>,
    milestones: Vec<Milestone>,
    detector: MilestoneDetector,
    timer: ElapsedTimer,
    is_tracking: bool,
    is_paused: bool,
}

impl RecordingSession {
    /// Wire up a session for a server-created activity record.
    pub fn new(
        activity: ActivityRecord,
        milestones: Vec<Milestone>,
        client: SyncClient,
        store: Arc<SyncStore>,
        config: SyncConfig,
    ) -> Self {
        let buffer = Arc::new(SampleBuffer::new());
        let scheduler = SyncScheduler::new(
            activity.id.clone(),
            Arc::clone(&buffer),
            client,
            store,
            config,
        );
        let snapshot_rx = scheduler.subscribe();

        Self {
            activity,
            buffer,
            scheduler,
            snapshot_rx,
            milestones,
            detector: MilestoneDetector::new(),
            timer: ElapsedTimer::new(),
            is_tracking: false,
            is_paused: false,
        }
    }

    /// Begin capture and background flushing.
    pub fn start(&mut self) {
        self.detector.reset();
        self.timer.reset();
        self.is_tracking = true;
        self.is_paused = false;
        self.scheduler.start();
        info!("[session] recording started for {}", self.activity.id);
    }

    /// Ingest one captured location sample. Ignored while paused or
    /// before start — no accidental captures land in the buffer.
    pub fn record_location(&self, sample: LocationSample) {
        if !self.is_tracking || self.is_paused {
            return;
        }
        self.buffer.append(sample);
    }

    pub fn pause(&mut self) {
        self.is_paused = true;
    }

    pub fn resume(&mut self) {
        self.is_paused = false;
    }

    pub fn is_tracking(&self) -> bool {
        self.is_tracking
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    /// Latest local cache of the server record.
    pub fn activity(&self) -> &ActivityRecord {
        &self.activity
    }

    /// Display duration in seconds; call on a sub-second cadence.
    pub fn tick(&mut self, now: DateTime<Utc>) -> u32 {
        self.refresh_from_snapshot();
        let activity = Some(&self.activity);
        self.timer
            .update(activity, self.is_tracking, self.is_paused, now)
    }

    /// Milestones newly crossed by the server-computed distance.
    pub fn check_milestones(&mut self) -> Vec<Milestone> {
        self.refresh_from_snapshot();
        self.detector
            .on_distance_update(self.activity.distance, &self.milestones)
    }

    /// Best-effort flush when the app moves to the background.
    pub fn app_backgrounded(&self) {
        self.scheduler.flush_now();
    }

    /// Subscribe to sync results (server aggregates, re-auth signal).
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.scheduler.subscribe()
    }

    pub fn pending_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Finish recording: stop the scheduler (final flush + durable spill of
    /// anything unsynced) and return the last known server record.
    pub async fn finish(mut self) -> ActivityRecord {
        self.is_tracking = false;
        self.scheduler.stop().await;
        self.refresh_from_snapshot();
        info!("[session] recording finished for {}", self.activity.id);
        self.activity
    }

    fn refresh_from_snapshot(&mut self) {
        let updated = {
            let snapshot = self.snapshot_rx.borrow();
            snapshot.activity.clone()
        };
        if let Some(activity) = updated {
            self.activity = activity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(status: ActivityStatus, last_point_at: Option<&str>) -> ActivityRecord {
        ActivityRecord {
            id: "act-1".to_string(),
            started_at: "2024-06-01T10:00:00Z".to_string(),
            total_paused_duration: 0.0,
            status,
            distance: 0.0,
            duration: 0,
            elevation_gain: 0.0,
            last_point_at: last_point_at.map(|s| s.to_string()),
        }
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_stale_in_progress_activity_is_force_finished() {
        let record = activity(ActivityStatus::InProgress, Some("2024-06-01T10:30:00Z"));

        assert!(should_force_finish(
            &record,
            at("2024-06-01T17:00:00Z"),
            default_stale_after()
        ));
        assert!(!should_force_finish(
            &record,
            at("2024-06-01T12:00:00Z"),
            default_stale_after()
        ));
    }

    #[test]
    fn test_force_finish_falls_back_to_start_time() {
        let record = activity(ActivityStatus::InProgress, None);
        assert!(should_force_finish(
            &record,
            at("2024-06-02T10:00:00Z"),
            default_stale_after()
        ));
    }

    #[test]
    fn test_completed_activity_is_never_force_finished() {
        let record = activity(ActivityStatus::Completed, Some("2024-06-01T10:30:00Z"));
        assert!(!should_force_finish(
            &record,
            at("2024-06-03T10:00:00Z"),
            default_stale_after()
        ));
    }

    #[test]
    fn test_unparseable_timestamp_is_not_force_finished() {
        let mut record = activity(ActivityStatus::InProgress, None);
        record.started_at = "garbage".to_string();
        assert!(!should_force_finish(
            &record,
            at("2024-06-03T10:00:00Z"),
            default_stale_after()
        ));
    }
}
