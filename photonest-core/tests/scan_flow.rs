//! End-to-end scan pass over in-memory fakes: discovery filters, artifact
//! generation, cache-assisted pruning, and progress reporting.

mod support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use photonest_core::scanner::ScannerSettings;
use photonest_core::{
    FileSystem, InMemoryFs, InMemoryStore, MediaProcessor, MediaScanner, MediaStore, MediaType,
    NotificationKind, ScannerDeps, SkipList,
};

use support::{CountingProcessor, wait_until};

fn flow_settings() -> ScannerSettings {
    ScannerSettings {
        max_concurrent: 2,
        scan_interval: None,
        skip_list: SkipList::parse(".gpx, KML ; geojson"),
        progress_interval: Duration::from_millis(500),
        cache_root: "/cache".into(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_pass_discovers_processes_and_reports() {
    support::init_tracing();

    let fs = Arc::new(InMemoryFs::new());
    // root album: real media, denied/hidden/sidecar/unknown files, an
    // ignore file, a nested album, and an empty sibling
    fs.add_file("/photos/a.jpg", 100);
    fs.add_file("/photos/b.CR2", 2_000);
    fs.add_file("/photos/track.gpx", 10);
    fs.add_file("/photos/.hidden.jpg", 10);
    fs.add_file("/photos/edit.xmp", 10);
    fs.add_file("/photos/notes.txt", 10);
    fs.add_file("/photos/skipme.png", 10);
    fs.add_text_file("/photos/.scanignore", "skipme.*\n");
    fs.add_file("/photos/sub/d.jpg", 100);
    fs.add_dir("/photos/empty");

    let store = Arc::new(InMemoryStore::new());
    let user = store.add_user("alice");
    let root = store.add_album(user.id, None, "photos", "/photos");
    let sub = store.add_album(user.id, Some(root.id), "sub", "/photos/sub");
    let empty = store.add_album(user.id, Some(root.id), "empty", "/photos/empty");

    let processor = Arc::new(CountingProcessor::default());
    let scanner = MediaScanner::start(
        flow_settings(),
        ScannerDeps {
            store: Arc::clone(&store) as Arc<dyn MediaStore>,
            processor: Arc::clone(&processor) as Arc<dyn MediaProcessor>,
            content_fs: Arc::clone(&fs) as Arc<dyn FileSystem>,
            cache_fs: Arc::clone(&fs) as Arc<dyn FileSystem>,
        },
        false,
    )
    .await
    .expect("scanner starts");

    let (tx, mut rx) = mpsc::channel(256);
    scanner.notifications().register(user.id, tx).await;

    scanner.scan_all().await;

    assert!(
        wait_until(Duration::from_secs(10), || store.media_count() == 3).await,
        "three media files should be discovered, found {}",
        store.media_count()
    );

    let a = store
        .media_by_path(Path::new("/photos/a.jpg"))
        .await
        .expect("lookup")
        .expect("a.jpg discovered");
    assert_eq!(a.media_type, MediaType::Jpeg);
    assert_eq!(a.album, root.id);

    let raw = store
        .media_by_path(Path::new("/photos/b.CR2"))
        .await
        .expect("lookup")
        .expect("b.CR2 discovered");
    assert_eq!(raw.media_type, MediaType::Raw);

    let nested = store
        .media_by_path(Path::new("/photos/sub/d.jpg"))
        .await
        .expect("lookup")
        .expect("nested media discovered by the child album's job");
    assert_eq!(nested.album, sub.id);

    // filtered entries never became records
    for skipped in [
        "/photos/track.gpx",
        "/photos/.hidden.jpg",
        "/photos/edit.xmp",
        "/photos/notes.txt",
        "/photos/skipme.png",
    ] {
        assert!(
            store
                .media_by_path(Path::new(skipped))
                .await
                .expect("lookup")
                .is_none(),
            "{skipped} should have been filtered"
        );
    }

    // every discovered item went through the processor and kept a thumbnail
    assert!(
        wait_until(Duration::from_secs(10), || processor.count() == 3).await,
        "processor should run once per media item"
    );
    assert_eq!(store.artifacts_for(a.id).len(), 1);

    // progress plus a positive per-album summary reached the listener
    let mut saw_progress = false;
    let mut saw_summary = false;
    let observed = wait_until(Duration::from_secs(10), || {
        while let Ok(notification) = rx.try_recv() {
            match notification.kind {
                NotificationKind::Progress => saw_progress = true,
                NotificationKind::Message => {
                    if notification.positive && notification.content.contains("media found") {
                        saw_summary = true;
                    }
                }
            }
        }
        saw_progress && saw_summary
    })
    .await;
    assert!(observed, "progress and summary notifications expected");

    // second pass discovers nothing new
    scanner.scan_all().await;
    assert!(
        wait_until(Duration::from_secs(10), || {
            scanner.scheduler().depths() == (0, 0)
        })
        .await
    );
    assert_eq!(store.media_count(), 3);

    // the empty album was pruned by the contains-media probe, so it never
    // produced records or processor calls
    assert!(
        store
            .albums_for_user(user.id)
            .await
            .expect("albums")
            .iter()
            .any(|album| album.id == empty.id)
    );

    scanner.shutdown().await;
}
