//! Tracksync - activity recording & background sync core
//!
//! This crate provides:
//! - Lossless in-memory buffering of captured GPS samples
//! - A UI-independent HTTP client for batched point uploads
//! - A flush scheduler with size/time/lifecycle triggers and backoff
//! - Server-anchored elapsed-time reconciliation for the display timer
//! - One-shot distance milestone detection
//! - Heart-rate adapters over platform health stores, with bounded
//!   downsampling
//! - SQLite-backed durable storage for tokens, locale and unsynced spill

pub mod buffer;
pub mod downsample;
pub mod error;
pub mod health;
pub mod http;
pub mod milestones;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod timer;
pub mod types;

pub use buffer::SampleBuffer;
pub use downsample::{downsample, DEFAULT_MAX_SAMPLES};
pub use error::{HealthError, SyncError};
pub use health::{HealthService, HealthStore, NullHealthStore, HEALTH_QUERY_TIMEOUT};
pub use http::{SyncClient, SYNC_TIMEOUT};
pub use milestones::MilestoneDetector;
pub use scheduler::{SyncConfig, SyncScheduler, SyncSnapshot};
pub use session::{default_stale_after, should_force_finish, RecordingSession};
pub use store::SyncStore;
pub use timer::ElapsedTimer;
pub use types::{
    ActivityRecord, ActivityStatus, HeartRateSample, LocationSample, Milestone, SampleBatch,
};

// FFI bindings for mobile platforms
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("tracksync"),
    );
}

/// Initialize logging for iOS
#[cfg(target_os = "ios")]
pub fn init_logging() {
    use oslog::OsLogger;

    let _ = OsLogger::new("com.tracksync.core")
        .level_filter(log::LevelFilter::Debug)
        .init();
}

/// No-op on non-mobile platforms (tests use env_logger)
#[cfg(not(any(target_os = "android", target_os = "ios")))]
pub fn init_logging() {}
