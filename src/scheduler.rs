//! Flush orchestration between the sample buffer and the sync client.
//!
//! An explicit, constructed instance owned by the recording session —
//! `start()`/`stop()` follow the session lifecycle, and anything that
//! needs the scheduler gets the instance passed in. The trigger loop runs
//! on the async runtime independently of any mounted UI, so flushing
//! continues while the app is backgrounded.
//!
//! Triggers: buffer size threshold, elapsed time since the last successful
//! flush, and an explicit best-effort flush when the app backgrounds. A
//! failed batch always goes back to the front of the buffer; consecutive
//! failures back off exponentially, never tighter than the per-call upload
//! timeout (retrying faster than requests can die only piles them up).

use crate::buffer::SampleBuffer;
use crate::http::SyncClient;
use crate::store::SyncStore;
use crate::types::{ActivityRecord, SampleBatch};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Scheduler tuning. Defaults match roughly one flush per 25 samples or
/// 30 seconds, whichever comes first.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Buffer length that triggers a flush before the interval elapses
    pub batch_threshold: usize,
    /// Max samples per upload attempt
    pub max_batch_size: usize,
    /// Time-based flush trigger since the last successful flush
    pub flush_interval: Duration,
    /// First backoff after a failure; doubles per consecutive failure.
    /// Must not be tighter than the upload timeout.
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
    /// Trigger re-evaluation cadence
    pub tick: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_threshold: 25,
            max_batch_size: 200,
            flush_interval: Duration::from_secs(30),
            initial_backoff: crate::http::SYNC_TIMEOUT,
            max_backoff: Duration::from_secs(300),
            tick: Duration::from_secs(1),
        }
    }
}

/// Read-side view published after every flush attempt.
///
/// UI code compares `last_synced_at` against what it already rendered to
/// decide whether a snapshot carries genuinely new data.
#[derive(Debug, Clone, Default)]
pub struct SyncSnapshot {
    /// Latest server aggregates; `None` before the first acknowledgment
    pub activity: Option<ActivityRecord>,
    /// Samples still waiting for upload
    pub pending: usize,
    /// Timestamp (epoch ms) of the newest acknowledged sample
    pub last_synced_at: Option<i64>,
    /// Token missing or expired; the host must re-authenticate
    pub needs_reauth: bool,
    pub consecutive_failures: u32,
}

struct FlushState {
    last_success: Instant,
    backoff_until: Option<Instant>,
    last_synced_at: Option<i64>,
    activity: Option<ActivityRecord>,
    needs_reauth: bool,
}

struct Inner {
    activity_id: String,
    buffer: Arc<SampleBuffer>,
    client: SyncClient,
    store: Arc<SyncStore>,
    config: SyncConfig,
    wake: Notify,
    stopping: AtomicBool,
    flush_requested: AtomicBool,
    failures: AtomicU32,
    state: Mutex<FlushState>,
    snapshot_tx: watch::Sender<SyncSnapshot>,
}

/// Drains the sample buffer and drives the sync client.
pub struct SyncScheduler {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    /// Build a scheduler for one activity. Samples spilled by a previous
    /// run of the same activity are reloaded ahead of new captures.
    pub fn new(
        activity_id: String,
        buffer: Arc<SampleBuffer>,
        client: SyncClient,
        store: Arc<SyncStore>,
        config: SyncConfig,
    ) -> Self {
        match store.take_spilled_samples(&activity_id) {
            Ok(samples) if !samples.is_empty() => {
                info!(
                    "[scheduler] reloaded {} spilled samples for {}",
                    samples.len(),
                    activity_id
                );
                buffer.requeue(SampleBatch { samples });
            }
            Ok(_) => {}
            Err(e) => warn!("[scheduler] spill reload failed for {}: {}", activity_id, e),
        }

        let (snapshot_tx, _) = watch::channel(SyncSnapshot::default());

        Self {
            inner: Arc::new(Inner {
                activity_id,
                buffer,
                client,
                store,
                config,
                wake: Notify::new(),
                stopping: AtomicBool::new(false),
                flush_requested: AtomicBool::new(false),
                failures: AtomicU32::new(0),
                state: Mutex::new(FlushState {
                    last_success: Instant::now(),
                    backoff_until: None,
                    last_synced_at: None,
                    activity: None,
                    needs_reauth: false,
                }),
                snapshot_tx,
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the trigger loop. Idempotent while running.
    pub fn start(&self) {
        let mut handle = lock_or_recover(&self.handle);
        if handle.is_some() {
            return;
        }

        self.inner.stopping.store(false, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        *handle = Some(tokio::spawn(async move {
            inner.run().await;
        }));
        info!(
            "[scheduler] started for activity {}",
            self.inner.activity_id
        );
    }

    /// Subscribe to flush results.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Best-effort immediate flush (app moving to background). Thresholds
    /// are bypassed; backoff is still honored.
    pub fn flush_now(&self) {
        self.inner.flush_requested.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    /// Stop the loop: one final best-effort flush, then spill whatever is
    /// still buffered so it survives a restart.
    pub async fn stop(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();

        let handle = lock_or_recover(&self.handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("[scheduler] loop task failed: {}", e);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.buffer.len()
    }
}

impl Inner {
    async fn run(&self) {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            // wait one tick, or until woken by flush_now()/stop()
            let _ = tokio::time::timeout(self.config.tick, self.wake.notified()).await;

            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            let forced = self.flush_requested.swap(false, Ordering::SeqCst);
            if forced || self.should_flush() {
                self.flush_once().await;
            }
        }

        // final best-effort flush before handing leftovers to the store
        self.flush_once().await;

        let leftover = self.buffer.drain(usize::MAX);
        if !leftover.is_empty() {
            let count = leftover.len();
            match self.store.spill_samples(&self.activity_id, &leftover.samples) {
                Ok(()) => info!("[scheduler] spilled {} unsynced samples on stop", count),
                Err(e) => {
                    warn!("[scheduler] spill failed, keeping samples in memory: {}", e);
                    self.buffer.requeue(leftover);
                }
            }
        }

        info!("[scheduler] stopped for activity {}", self.activity_id);
    }

    fn should_flush(&self) -> bool {
        let pending = self.buffer.len();
        if pending == 0 {
            return false;
        }

        let state = lock_or_recover(&self.state);
        if in_backoff(&state) {
            return false;
        }

        pending >= self.config.batch_threshold
            || state.last_success.elapsed() >= self.config.flush_interval
    }

    async fn flush_once(&self) {
        {
            let state = lock_or_recover(&self.state);
            if in_backoff(&state) {
                debug!("[scheduler] in backoff, skipping flush");
                return;
            }
        }

        let batch = self.buffer.drain(self.config.max_batch_size);
        if batch.is_empty() {
            return;
        }

        debug!(
            "[scheduler] uploading {} samples for {}",
            batch.len(),
            self.activity_id
        );

        match self.client.sync_points(&self.activity_id, &batch.samples).await {
            Ok(activity) => {
                let newest = batch.newest_timestamp();
                self.failures.store(0, Ordering::SeqCst);

                let mut state = lock_or_recover(&self.state);
                state.last_success = Instant::now();
                state.backoff_until = None;
                state.needs_reauth = false;
                if let Some(ts) = newest {
                    // marker only advances; requeued history never moves it back
                    if state.last_synced_at.map_or(true, |prev| ts > prev) {
                        state.last_synced_at = Some(ts);
                    }
                }
                state.activity = Some(activity);
                self.publish(&state);

                info!(
                    "[scheduler] flushed {} samples for {} ({} pending)",
                    batch.len(),
                    self.activity_id,
                    self.buffer.len()
                );
            }
            Err(e) => {
                // the whole batch goes back to the head: nothing is lost,
                // chronological order is preserved across retries
                let count = batch.len();
                self.buffer.requeue(batch);

                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                let backoff = backoff_for(failures, &self.config);

                let mut state = lock_or_recover(&self.state);
                state.backoff_until = Some(Instant::now() + backoff);
                if e.is_auth() {
                    state.needs_reauth = true;
                }
                self.publish(&state);

                warn!(
                    "[scheduler] flush of {} samples failed (attempt {}, retry in {:?}): {}",
                    count, failures, backoff, e
                );
            }
        }
    }

    fn publish(&self, state: &FlushState) {
        let _ = self.snapshot_tx.send(SyncSnapshot {
            activity: state.activity.clone(),
            pending: self.buffer.len(),
            last_synced_at: state.last_synced_at,
            needs_reauth: state.needs_reauth,
            consecutive_failures: self.failures.load(Ordering::SeqCst),
        });
    }
}

fn in_backoff(state: &FlushState) -> bool {
    state
        .backoff_until
        .map_or(false, |until| Instant::now() < until)
}

fn backoff_for(failures: u32, config: &SyncConfig) -> Duration {
    let shift = failures.saturating_sub(1).min(8);
    config
        .initial_backoff
        .saturating_mul(1u32 << shift)
        .min(config.max_backoff)
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
