//! Interval-driven trigger enqueuing every user's albums.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ScanError};
use crate::scanner::cache::{ScanCache, directory_contains_media};
use crate::scanner::context::ScanEnvironment;
use crate::scanner::queue::JobSink;
use crate::types::User;

/// Periodic full-scan trigger. Disabled while the interval is `None`; armed
/// otherwise. Changing the interval atomically replaces the active timer —
/// a superseded timer can never fire.
pub struct PeriodicScanner {
    env: ScanEnvironment,
    sink: Arc<dyn JobSink>,
    interval: watch::Sender<Option<Duration>>,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl PeriodicScanner {
    /// Build the trigger with the interval from the environment's settings.
    pub fn new(env: ScanEnvironment, sink: Arc<dyn JobSink>) -> Self {
        let initial = env.settings.scan_interval.filter(|d| !d.is_zero());
        let (interval, _) = watch::channel(initial);
        Self {
            env,
            sink,
            interval,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the trigger loop. Starting twice is an error.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ScanError::AlreadyStarted("periodic scanner"));
        }

        let mut interval_rx = self.interval.subscribe();
        let env = self.env.clone();
        let sink = Arc::clone(&self.sink);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            info!("periodic scanner started");
            loop {
                let current = *interval_rx.borrow_and_update();
                match current {
                    None => {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            changed = interval_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(period) => {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            // replacing the interval drops this sleep, so a
                            // superseded timer cannot fire
                            _ = tokio::time::sleep(period) => {
                                run_pass(&env, sink.as_ref()).await;
                            }
                            changed = interval_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            info!("periodic scanner stopped");
        });

        Ok(())
    }

    /// Re-arm the timer at `interval`; `None` or a zero duration disables
    /// periodic scanning entirely.
    pub fn set_interval(&self, interval: Option<Duration>) {
        let normalized = interval.filter(|d| !d.is_zero());
        self.interval.send_replace(normalized);
        match normalized {
            Some(period) => info!(?period, "periodic scan interval updated"),
            None => info!("periodic scans disabled"),
        }
    }

    /// Run one full scan pass immediately, regardless of the timer.
    pub async fn scan_now(&self) {
        run_pass(&self.env, self.sink.as_ref()).await;
    }

    /// Stop the trigger loop. Idempotent.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for PeriodicScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicScanner")
            .field("interval", &*self.interval.borrow())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

/// One top-to-bottom scan pass: a fresh cache, every user, every album that
/// still holds media. Per-user failures are logged and do not abort the
/// pass.
async fn run_pass(env: &ScanEnvironment, sink: &dyn JobSink) {
    let users = match env.store.fetch_users().await {
        Ok(users) => users,
        Err(error) => {
            error!(%error, "cannot list users for scan pass");
            return;
        }
    };

    info!(users = users.len(), "starting full scan pass");
    let cache = Arc::new(ScanCache::new());
    for user in users {
        if let Err(error) = enqueue_user_albums(env, sink, &cache, &user).await {
            error!(user = %user.id, %error, "failed to enqueue albums");
        }
    }
}

async fn enqueue_user_albums(
    env: &ScanEnvironment,
    sink: &dyn JobSink,
    cache: &Arc<ScanCache>,
    user: &User,
) -> Result<()> {
    let albums = env.store.albums_for_user(user.id).await?;

    // root album paths bound ancestor marking for everything beneath them
    let roots: Vec<PathBuf> = albums
        .iter()
        .filter(|album| album.parent.is_none())
        .map(|album| album.path.clone())
        .collect();

    for album in albums {
        let scan_root = roots
            .iter()
            .find(|root| album.path.starts_with(root))
            .cloned()
            .unwrap_or_else(|| album.path.clone());

        match directory_contains_media(
            env.content_fs.as_ref(),
            cache,
            &album.path,
            &scan_root,
            &env.settings.skip_list,
        )
        .await
        {
            Ok(false) => {
                debug!(album = %album.id, "album holds no media, skipping");
                continue;
            }
            Ok(true) => {}
            Err(error) => {
                warn!(album = %album.id, %error, "contains-media probe failed, scanning anyway");
            }
        }

        sink.enqueue(env.job_for(album, cache, scan_root)).await?;
    }
    Ok(())
}
