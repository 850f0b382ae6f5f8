//! One-shot distance milestone detection.
//!
//! Watches cumulative distance against a sorted threshold list and reports
//! each crossing exactly once per session. The consumer (haptics, banner)
//! lives UI-side; this module only owns the crossing state.

use crate::types::Milestone;
use log::debug;
use std::collections::HashSet;

/// Session-scoped milestone crossing detector.
///
/// Evaluated on every distance update, O(milestones) per call. Never
/// mutates the distance it is fed — the server aggregate stays
/// authoritative.
#[derive(Debug, Default)]
pub struct MilestoneDetector {
    /// Thresholds already reported, keyed by bit pattern for exact matching
    passed: HashSet<u64>,
}

impl MilestoneDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every milestone whose threshold is now covered and has not
    /// fired yet. Calling again with the same or a higher distance does
    /// not re-fire already-passed thresholds.
    pub fn on_distance_update(&mut self, distance: f64, milestones: &[Milestone]) -> Vec<Milestone> {
        let mut crossed = Vec::new();
        for milestone in milestones {
            if milestone.threshold_meters <= distance
                && self.passed.insert(milestone.threshold_meters.to_bits())
            {
                debug!(
                    "[milestones] crossed {:.0}m at distance {:.1}m",
                    milestone.threshold_meters, distance
                );
                crossed.push(milestone.clone());
            }
        }
        crossed
    }

    /// Clear crossing state when a new activity session begins.
    pub fn reset(&mut self) {
        self.passed.clear();
    }

    pub fn passed_count(&self) -> usize {
        self.passed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestones(thresholds: &[f64]) -> Vec<Milestone> {
        thresholds
            .iter()
            .map(|&threshold_meters| Milestone {
                sport_type: "Run".to_string(),
                threshold_meters,
            })
            .collect()
    }

    #[test]
    fn test_each_threshold_fires_exactly_once() {
        let config = milestones(&[1000.0, 5000.0]);
        let mut detector = MilestoneDetector::new();

        assert!(detector.on_distance_update(500.0, &config).is_empty());

        let first = detector.on_distance_update(1000.0, &config);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].threshold_meters, 1000.0);

        assert!(detector.on_distance_update(3000.0, &config).is_empty());

        let second = detector.on_distance_update(5000.0, &config);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].threshold_meters, 5000.0);

        // repeats at the same or higher distance stay silent
        assert!(detector.on_distance_update(5000.0, &config).is_empty());
        assert!(detector.on_distance_update(9000.0, &config).is_empty());
        assert_eq!(detector.passed_count(), 2);
    }

    #[test]
    fn test_jump_over_multiple_thresholds_fires_all() {
        let config = milestones(&[1000.0, 2000.0, 3000.0]);
        let mut detector = MilestoneDetector::new();

        let crossed = detector.on_distance_update(2500.0, &config);
        let fired: Vec<f64> = crossed.iter().map(|m| m.threshold_meters).collect();
        assert_eq!(fired, vec![1000.0, 2000.0]);
    }

    #[test]
    fn test_reset_clears_session_state() {
        let config = milestones(&[1000.0]);
        let mut detector = MilestoneDetector::new();

        assert_eq!(detector.on_distance_update(1500.0, &config).len(), 1);
        detector.reset();
        assert_eq!(detector.on_distance_update(1500.0, &config).len(), 1);
    }
}
