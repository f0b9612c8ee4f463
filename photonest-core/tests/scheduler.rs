//! Scheduler behaviour: bounded concurrency, de-duplication, hot reload,
//! and drain-on-shutdown.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use photonest_core::scanner::{NoopProcessor, ScanCache, ScanScheduler, TaskPipeline};
use photonest_core::{
    Album, AlbumId, InMemoryFs, InMemoryStore, NotificationBus, ScanError, UserId,
};

use support::{BlockTask, GaugeTask, build_env, test_settings, wait_until};

fn album(id: i64, path: &str) -> Album {
    Album {
        id: AlbumId(id),
        owner: UserId(1),
        parent: None,
        title: format!("album-{id}"),
        path: path.into(),
    }
}

fn fs_with_albums(paths: &[&str]) -> Arc<InMemoryFs> {
    let fs = Arc::new(InMemoryFs::new());
    for path in paths {
        fs.add_file(format!("{path}/photo.jpg"), 64);
    }
    fs
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn running_set_never_exceeds_the_ceiling() {
    support::init_tracing();

    let paths: Vec<String> = (0..8).map(|i| format!("/photos/a{i}")).collect();
    let fs = fs_with_albums(&paths.iter().map(String::as_str).collect::<Vec<_>>());
    let gauge = GaugeTask::new(Duration::from_millis(50));
    let (active, peak, runs) = (
        Arc::clone(&gauge.active),
        Arc::clone(&gauge.peak),
        Arc::clone(&gauge.runs),
    );

    let bus = Arc::new(NotificationBus::new());
    let env = build_env(
        Arc::new(InMemoryStore::new()),
        fs,
        Arc::clone(&bus),
        test_settings(2),
        TaskPipeline::new().with(Arc::new(gauge)),
        Arc::new(NoopProcessor),
    );
    let scheduler = ScanScheduler::start(bus, env.settings.as_ref());

    let cache = Arc::new(ScanCache::new());
    for (index, path) in paths.iter().enumerate() {
        scheduler
            .enqueue(env.job_for(album(index as i64 + 1, path), &cache, path.into()))
            .expect("enqueue accepted");
    }

    assert!(
        wait_until(Duration::from_secs(10), || {
            runs.load(std::sync::atomic::Ordering::SeqCst) == 8
        })
        .await,
        "all jobs should retire"
    );

    assert_eq!(active.load(std::sync::atomic::Ordering::SeqCst), 0);
    let peak = peak.load(std::sync::atomic::Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak concurrency was {peak}");

    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_albums_are_not_enqueued_twice() {
    support::init_tracing();

    let fs = fs_with_albums(&["/photos/blocker", "/photos/a", "/photos/b", "/photos/c"]);
    let (block, gate) = BlockTask::new();

    let bus = Arc::new(NotificationBus::new());
    let env = build_env(
        Arc::new(InMemoryStore::new()),
        fs,
        Arc::clone(&bus),
        test_settings(1),
        TaskPipeline::new().with(Arc::new(block)),
        Arc::new(NoopProcessor),
    );
    let scheduler = ScanScheduler::start(bus, env.settings.as_ref());
    let cache = Arc::new(ScanCache::new());

    // occupy the single worker slot so everything else stays pending
    scheduler
        .enqueue(env.job_for(album(1, "/photos/blocker"), &cache, "/photos/blocker".into()))
        .expect("enqueue accepted");
    assert!(
        wait_until(Duration::from_secs(5), || scheduler.depths().0 == 1).await,
        "blocker should be running"
    );

    scheduler
        .enqueue(env.job_for(album(100, "/photos/a"), &cache, "/photos/a".into()))
        .expect("enqueue accepted");
    scheduler
        .enqueue(env.job_for(album(20, "/photos/b"), &cache, "/photos/b".into()))
        .expect("enqueue accepted");
    assert_eq!(scheduler.depths(), (1, 2));

    // same album again: silently de-duplicated
    scheduler
        .enqueue(env.job_for(album(20, "/photos/b"), &cache, "/photos/b".into()))
        .expect("duplicate enqueue is a no-op");
    assert_eq!(scheduler.depths(), (1, 2));

    scheduler
        .enqueue(env.job_for(album(42, "/photos/c"), &cache, "/photos/c".into()))
        .expect("enqueue accepted");
    assert_eq!(scheduler.depths(), (1, 3));

    // the running album is de-duplicated too
    scheduler
        .enqueue(env.job_for(album(1, "/photos/blocker"), &cache, "/photos/blocker".into()))
        .expect("duplicate of running album is a no-op");
    assert_eq!(scheduler.depths(), (1, 3));

    gate.add_permits(1_000);
    scheduler.shutdown().await;
    assert_eq!(scheduler.depths(), (0, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lowering_the_ceiling_does_not_preempt_running_jobs() {
    support::init_tracing();

    let paths = ["/p/a", "/p/b", "/p/c", "/p/d", "/p/e"];
    let fs = fs_with_albums(&paths);
    let (block, gate) = BlockTask::new();

    let bus = Arc::new(NotificationBus::new());
    let env = build_env(
        Arc::new(InMemoryStore::new()),
        fs,
        Arc::clone(&bus),
        test_settings(3),
        TaskPipeline::new().with(Arc::new(block)),
        Arc::new(NoopProcessor),
    );
    let scheduler = ScanScheduler::start(bus, env.settings.as_ref());
    let cache = Arc::new(ScanCache::new());

    for (index, path) in paths.iter().enumerate() {
        scheduler
            .enqueue(env.job_for(album(index as i64 + 1, path), &cache, (*path).into()))
            .expect("enqueue accepted");
    }
    assert!(
        wait_until(Duration::from_secs(5), || scheduler.depths() == (3, 2)).await,
        "three jobs should be running"
    );

    scheduler.reconfigure(1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    // still three running: the new ceiling only throttles future admission
    assert_eq!(scheduler.depths(), (3, 2));

    gate.add_permits(1_000);
    scheduler.shutdown().await;
    assert_eq!(scheduler.depths(), (0, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_drains_pending_work_and_rejects_new_jobs() {
    support::init_tracing();

    let paths = ["/p/a", "/p/b", "/p/c"];
    let fs = fs_with_albums(&paths);
    let gauge = GaugeTask::new(Duration::from_millis(20));
    let runs = Arc::clone(&gauge.runs);

    let bus = Arc::new(NotificationBus::new());
    let env = build_env(
        Arc::new(InMemoryStore::new()),
        fs,
        Arc::clone(&bus),
        test_settings(1),
        TaskPipeline::new().with(Arc::new(gauge)),
        Arc::new(NoopProcessor),
    );
    let scheduler = ScanScheduler::start(bus, env.settings.as_ref());
    let cache = Arc::new(ScanCache::new());

    for (index, path) in paths.iter().enumerate() {
        scheduler
            .enqueue(env.job_for(album(index as i64 + 1, path), &cache, (*path).into()))
            .expect("enqueue accepted");
    }

    scheduler.shutdown().await;

    // every queued job completed before shutdown resolved
    assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert_eq!(scheduler.depths(), (0, 0));

    let rejected = scheduler.enqueue(env.job_for(album(99, "/p/a"), &cache, "/p/a".into()));
    assert!(matches!(rejected, Err(ScanError::ShuttingDown)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queue_completion_is_announced() {
    support::init_tracing();

    let fs = fs_with_albums(&["/p/a"]);
    let bus = Arc::new(NotificationBus::new());
    let (tx, mut rx) = mpsc::channel(64);
    bus.register(UserId(1), tx).await;

    let env = build_env(
        Arc::new(InMemoryStore::new()),
        fs,
        Arc::clone(&bus),
        test_settings(1),
        TaskPipeline::new(),
        Arc::new(NoopProcessor),
    );
    let scheduler = ScanScheduler::start(Arc::clone(&bus), env.settings.as_ref());
    let cache = Arc::new(ScanCache::new());

    scheduler
        .enqueue(env.job_for(album(1, "/p/a"), &cache, "/p/a".into()))
        .expect("enqueue accepted");

    let mut saw_complete = false;
    let announced = wait_until(Duration::from_secs(5), || {
        while let Ok(notification) = rx.try_recv() {
            if notification.positive && notification.content.contains("complete") {
                saw_complete = true;
            }
        }
        saw_complete
    })
    .await;
    assert!(announced, "completion notification should be broadcast");

    scheduler.shutdown().await;
}
