//! Bounded-concurrency scan scheduler.
//!
//! A single control loop owns admission and retirement bookkeeping; jobs
//! execute on detached workers outside the state lock, so a slow scan never
//! blocks admission of its siblings.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::notification::{Notification, NotificationBus};
use crate::scanner::job::ScanJob;
use crate::scanner::settings::ScannerSettings;
use crate::types::AlbumId;

/// Notification key grouping all queue-level updates.
const QUEUE_KEY: &str = "scanner-queue";

/// Capability to submit scan jobs. Triggers depend on this rather than on
/// the concrete scheduler so tests can substitute a recording sink.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn enqueue(&self, job: ScanJob) -> Result<()>;
}

struct QueueState {
    pending: VecDeque<ScanJob>,
    /// Album identities currently in `pending`; kept alongside the deque so
    /// de-duplication is O(1).
    pending_ids: HashSet<AlbumId>,
    running: HashSet<AlbumId>,
    max_concurrent: usize,
    shutting_down: bool,
    /// True once the control loop has exited; late shutdown callers must
    /// not wait on it.
    stopped: bool,
    /// Set when a job is admitted, cleared when the queue drains, so the
    /// completion notification fires exactly once per busy period.
    was_busy: bool,
    drained: Vec<oneshot::Sender<()>>,
}

struct SchedulerInner {
    state: Mutex<QueueState>,
    /// Single-slot wakeup: redundant signals collapse into one pending
    /// permit, so the control loop can never miss or accumulate them.
    wakeup: Notify,
    bus: Arc<NotificationBus>,
    progress_interval: Duration,
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("scheduler state mutex poisoned")
    }
}

/// Admits, runs, and retires album scan jobs under a hot-reloadable
/// concurrency ceiling. Pending jobs are admitted in FIFO order; completion
/// order across running jobs is unspecified.
pub struct ScanScheduler {
    inner: Arc<SchedulerInner>,
}

impl ScanScheduler {
    /// Create the scheduler and spawn its control loop.
    pub fn start(bus: Arc<NotificationBus>, settings: &ScannerSettings) -> Arc<Self> {
        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                pending_ids: HashSet::new(),
                running: HashSet::new(),
                max_concurrent: settings.max_concurrent.max(1),
                shutting_down: false,
                stopped: false,
                was_busy: false,
                drained: Vec::new(),
            }),
            wakeup: Notify::new(),
            bus,
            progress_interval: settings.progress_interval,
        });
        tokio::spawn(control_loop(Arc::clone(&inner)));
        Arc::new(Self { inner })
    }

    /// Queue `job` unless a job for the same album is already pending or
    /// running (in which case this is a no-op). Fails once shutdown has
    /// been requested.
    pub fn enqueue(&self, job: ScanJob) -> Result<()> {
        {
            let mut state = self.inner.lock();
            if state.shutting_down {
                return Err(ScanError::ShuttingDown);
            }
            let album = job.album_id();
            if state.pending_ids.contains(&album) || state.running.contains(&album) {
                debug!(%album, "album already queued or running, skipping enqueue");
                return Ok(());
            }
            state.pending_ids.insert(album);
            state.pending.push_back(job);
        }
        self.inner.wakeup.notify_one();
        Ok(())
    }

    /// Hot-swap the concurrency ceiling (clamped to >= 1). Takes effect on
    /// the next admission pass; running jobs are never preempted.
    pub fn reconfigure(&self, max_concurrent: usize) {
        let clamped = max_concurrent.max(1);
        {
            let mut state = self.inner.lock();
            if state.max_concurrent == clamped {
                return;
            }
            info!(from = state.max_concurrent, to = clamped, "worker ceiling changed");
            state.max_concurrent = clamped;
        }
        self.inner.wakeup.notify_one();
    }

    /// Current `(running, pending)` queue depths.
    pub fn depths(&self) -> (usize, usize) {
        let state = self.inner.lock();
        (state.running.len(), state.pending.len())
    }

    /// Request shutdown and wait until both queues drain. Pending and
    /// running jobs are completed, not interrupted; new enqueues are
    /// rejected from this point on.
    pub async fn shutdown(&self) {
        let receiver = {
            let mut state = self.inner.lock();
            state.shutting_down = true;
            if state.stopped {
                return;
            }
            let (sender, receiver) = oneshot::channel();
            state.drained.push(sender);
            receiver
        };
        self.inner.wakeup.notify_one();
        // the control loop signals once drained; a closed channel means it
        // already stopped
        let _ = receiver.await;
    }
}

#[async_trait]
impl JobSink for ScanScheduler {
    async fn enqueue(&self, job: ScanJob) -> Result<()> {
        ScanScheduler::enqueue(self, job)
    }
}

impl fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ScanScheduler");
        match self.inner.state.try_lock() {
            Ok(state) => {
                debug
                    .field("pending", &state.pending.len())
                    .field("running", &state.running.len())
                    .field("max_concurrent", &state.max_concurrent)
                    .field("shutting_down", &state.shutting_down);
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

async fn control_loop(inner: Arc<SchedulerInner>) {
    let mut throttle = Throttle::new(inner.progress_interval);
    info!("scan scheduler started");
    loop {
        admit_ready(&inner);

        let (running, pending, completed, finish, waiters) = {
            let mut state = inner.lock();
            let running = state.running.len();
            let pending = state.pending.len();
            let idle = running == 0 && pending == 0;
            let completed = idle && state.was_busy;
            if completed {
                state.was_busy = false;
            }
            let finish = idle && state.shutting_down;
            let waiters = if finish {
                state.stopped = true;
                std::mem::take(&mut state.drained)
            } else {
                Vec::new()
            };
            (running, pending, completed, finish, waiters)
        };

        if completed {
            // completion is exempt from throttling
            inner
                .bus
                .broadcast(
                    Notification::message(QUEUE_KEY, "Scanner", "Scan complete")
                        .positive()
                        .with_timeout(Duration::from_secs(5)),
                )
                .await;
        } else if (running > 0 || pending > 0) && throttle.ready() {
            inner
                .bus
                .broadcast(Notification::message(
                    QUEUE_KEY,
                    "Scanner",
                    format!("{running} running, {pending} pending"),
                ))
                .await;
        }

        if finish {
            for waiter in waiters {
                let _ = waiter.send(());
            }
            info!("scan scheduler stopped");
            return;
        }

        inner.wakeup.notified().await;
    }
}

/// Move jobs from pending to running until the ceiling is reached, spawning
/// a detached worker per admitted job. Workers run outside the state lock.
fn admit_ready(inner: &Arc<SchedulerInner>) {
    let mut state = inner.lock();
    while state.running.len() < state.max_concurrent {
        let Some(job) = state.pending.pop_front() else {
            break;
        };
        let album = job.album_id();
        state.pending_ids.remove(&album);
        state.running.insert(album);
        state.was_busy = true;

        let worker_inner = Arc::clone(inner);
        tokio::spawn(async move {
            let summary = job.run().await;
            debug!(%album, ?summary, "job retired");
            worker_inner.lock().running.remove(&album);
            worker_inner.wakeup.notify_one();
        });
    }
}

/// Collapses bursts of events into at most one action per window.
struct Throttle {
    window: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Whether the caller may act now; a `true` answer consumes the window.
    fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn throttle_allows_one_action_per_window() {
        let mut throttle = Throttle::new(Duration::from_millis(500));
        assert!(throttle.ready());
        assert!(!throttle.ready());

        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(!throttle.ready());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(throttle.ready());
        assert!(!throttle.ready());
    }
}
