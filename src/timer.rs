//! Display-timer reconciliation against the server-held activity record.
//!
//! The elapsed value shown while recording is derived from the server's
//! `startedAt` and cumulative paused duration, not from any locally
//! persisted clock. A process killed and restarted mid-activity recovers
//! the correct elapsed time as soon as the activity record is fetched.

use crate::types::ActivityRecord;
use chrono::{DateTime, Utc};
use log::warn;

/// Derives a display-only elapsed duration in seconds.
///
/// Call [`update`](Self::update) on a sub-second cadence for smooth UI
/// feedback. The produced value is never written back to the server.
#[derive(Debug, Default)]
pub struct ElapsedTimer {
    last: u32,
}

impl ElapsedTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the displayed duration.
    ///
    /// - No activity: reset to zero (ended or not yet started).
    /// - Paused: freeze at the server-reported aggregate `duration` — once a
    ///   pause boundary is crossed, only the server's view across all synced
    ///   points is authoritative.
    /// - Tracking: seconds since `startedAt` plus cumulative paused time,
    ///   clamped monotonically non-decreasing while running.
    pub fn update(
        &mut self,
        activity: Option<&ActivityRecord>,
        is_tracking: bool,
        is_paused: bool,
        now: DateTime<Utc>,
    ) -> u32 {
        let Some(activity) = activity else {
            self.last = 0;
            return 0;
        };

        if is_paused {
            self.last = activity.duration;
            return self.last;
        }

        if !is_tracking {
            return self.last;
        }

        let started = match DateTime::parse_from_rfc3339(&activity.started_at) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                warn!(
                    "[timer] unparseable startedAt '{}' for {}: {}",
                    activity.started_at, activity.id, e
                );
                return self.last;
            }
        };

        let anchor_ms =
            started.timestamp_millis() + (activity.total_paused_duration * 1000.0) as i64;
        let elapsed = ((now.timestamp_millis() - anchor_ms) / 1000).max(0) as u32;

        self.last = self.last.max(elapsed);
        self.last
    }

    /// Last value produced by [`update`](Self::update).
    pub fn current(&self) -> u32 {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityStatus;

    fn activity(started_at: &str, total_paused_duration: f64, duration: u32) -> ActivityRecord {
        ActivityRecord {
            id: "act-1".to_string(),
            started_at: started_at.to_string(),
            total_paused_duration,
            status: ActivityStatus::InProgress,
            distance: 0.0,
            duration,
            elevation_gain: 0.0,
            last_point_at: None,
        }
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_tracking_derives_elapsed_from_server_anchor() {
        let record = activity("2024-06-01T10:00:00Z", 0.0, 0);
        let mut timer = ElapsedTimer::new();

        let shown = timer.update(Some(&record), true, false, at("2024-06-01T10:02:05Z"));
        assert_eq!(shown, 125);
    }

    #[test]
    fn test_paused_time_shifts_the_anchor() {
        // 30 s paused: at T0+125 s wall clock only 95 s count as moving
        let record = activity("2024-06-01T10:00:00Z", 30.0, 0);
        let mut timer = ElapsedTimer::new();

        let shown = timer.update(Some(&record), true, false, at("2024-06-01T10:02:05Z"));
        assert_eq!(shown, 95);
    }

    #[test]
    fn test_paused_freezes_at_server_duration() {
        let record = activity("2024-06-01T10:00:00Z", 0.0, 600);
        let mut timer = ElapsedTimer::new();

        assert_eq!(timer.update(Some(&record), true, true, at("2024-06-01T11:00:00Z")), 600);
        // wall clock keeps moving, display does not
        assert_eq!(timer.update(Some(&record), true, true, at("2024-06-01T12:00:00Z")), 600);
    }

    #[test]
    fn test_no_activity_resets_to_zero() {
        let record = activity("2024-06-01T10:00:00Z", 0.0, 0);
        let mut timer = ElapsedTimer::new();

        timer.update(Some(&record), true, false, at("2024-06-01T10:05:00Z"));
        assert!(timer.current() > 0);

        assert_eq!(timer.update(None, false, false, at("2024-06-01T10:06:00Z")), 0);
        assert_eq!(timer.current(), 0);
    }

    #[test]
    fn test_monotonic_while_running() {
        let record = activity("2024-06-01T10:00:00Z", 0.0, 0);
        let mut timer = ElapsedTimer::new();

        timer.update(Some(&record), true, false, at("2024-06-01T10:02:05Z"));
        // a slightly earlier wall clock (drift/ntp step) must not move the display backwards
        let shown = timer.update(Some(&record), true, false, at("2024-06-01T10:02:04Z"));
        assert_eq!(shown, 125);
    }

    #[test]
    fn test_restart_recovers_without_local_state() {
        // fresh timer instance (process restart) re-derives from server state
        let record = activity("2024-06-01T10:00:00Z", 60.0, 0);
        let mut timer = ElapsedTimer::new();

        let shown = timer.update(Some(&record), true, false, at("2024-06-01T10:31:00Z"));
        assert_eq!(shown, 30 * 60);
    }

    #[test]
    fn test_unparseable_start_keeps_last_value() {
        let good = activity("2024-06-01T10:00:00Z", 0.0, 0);
        let mut bad = good.clone();
        bad.started_at = "not-a-timestamp".to_string();

        let mut timer = ElapsedTimer::new();
        timer.update(Some(&good), true, false, at("2024-06-01T10:01:00Z"));
        let shown = timer.update(Some(&bad), true, false, at("2024-06-01T10:02:00Z"));
        assert_eq!(shown, 60);
    }

    #[test]
    fn test_clock_before_anchor_clamps_to_zero() {
        let record = activity("2024-06-01T10:00:00Z", 0.0, 0);
        let mut timer = ElapsedTimer::new();

        let shown = timer.update(Some(&record), true, false, at("2024-06-01T09:59:00Z"));
        assert_eq!(shown, 0);
    }
}
