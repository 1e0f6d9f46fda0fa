//! Client against a live server on an ephemeral port.

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use reqwest::StatusCode;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use treemirror::config::{ClientConfig, DestinationRoot};
use treemirror::relay::ignore::DEFAULT_IGNORE_PATTERNS;
use treemirror::relay::{
    relay_events, watch_and_relay, EventClassifier, IgnoreFilter, RelayClient, TransferStrategy,
};
use treemirror::{create_router, RouterConfig};
use treemirror_types::RelativePath;

const THRESHOLD: u64 = 10_000;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("treemirror=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Start a test server over `destination` and return its address.
async fn start_test_server(destination: &Path) -> SocketAddr {
    init_tracing();
    let app = create_router(RouterConfig {
        destination: DestinationRoot::new(destination).unwrap(),
        max_upload_bytes: 16 * 1024 * 1024,
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    addr
}

struct Mirror {
    _source_dir: TempDir,
    dest_dir: TempDir,
    root: PathBuf,
    client: RelayClient,
    classifier: EventClassifier,
}

impl Mirror {
    async fn new() -> Self {
        let source_dir = tempfile::tempdir().unwrap();
        let root = source_dir.path().join("watched");
        std::fs::create_dir(&root).unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let addr = start_test_server(dest_dir.path()).await;

        Self {
            _source_dir: source_dir,
            dest_dir,
            root,
            client: RelayClient::new(format!("http://{}", addr), THRESHOLD),
            classifier: EventClassifier::new("watched", IgnoreFilter::with_defaults().unwrap()),
        }
    }

    fn dest(&self, rel: &str) -> PathBuf {
        self.dest_dir.path().join(rel)
    }

    fn write_source(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }
}

fn content_of(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn rel(s: &str) -> RelativePath {
    RelativePath::parse(s).unwrap()
}

#[tokio::test]
async fn test_upload_round_trip_in_memory() {
    let mirror = Mirror::new().await;
    let content = content_of(9_000);
    assert_eq!(
        TransferStrategy::select(content.len() as u64, THRESHOLD),
        TransferStrategy::InMemory
    );
    let source = mirror.write_source("foo/bar.txt", &content);

    let outcome = mirror
        .client
        .upload_file(&rel("foo/bar.txt"), &source)
        .await
        .unwrap();

    assert_eq!(outcome.status, StatusCode::OK);
    assert!(outcome.body.contains("File 'bar.txt' uploaded successfully"));
    assert_eq!(std::fs::read(mirror.dest("foo/bar.txt")).unwrap(), content);
}

#[tokio::test]
async fn test_upload_round_trip_staged() {
    let mirror = Mirror::new().await;
    let content = content_of(250_000);
    assert_eq!(
        TransferStrategy::select(content.len() as u64, THRESHOLD),
        TransferStrategy::Staged
    );
    let source = mirror.write_source("big/blob.bin", &content);

    let outcome = mirror
        .client
        .upload_file(&rel("big/blob.bin"), &source)
        .await
        .unwrap();

    assert_eq!(outcome.status, StatusCode::OK);
    assert_eq!(std::fs::read(mirror.dest("big/blob.bin")).unwrap(), content);
}

#[tokio::test]
async fn test_upload_at_threshold_is_staged_and_intact() {
    let mirror = Mirror::new().await;
    let content = content_of(THRESHOLD as usize);
    let source = mirror.write_source("edge.bin", &content);

    let outcome = mirror
        .client
        .upload_file(&rel("edge.bin"), &source)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(std::fs::read(mirror.dest("edge.bin")).unwrap(), content);
}

#[tokio::test]
async fn test_directory_rename_cascade() {
    let mut mirror = Mirror::new().await;
    let content = content_of(9_000);

    // Create foo/bar.txt under the watched root.
    let foo = mirror.root.join("foo");
    std::fs::create_dir(&foo).unwrap();
    let bar = mirror.write_source("foo/bar.txt", &content);

    let mut outcomes = Vec::new();
    for event in [
        Event::new(EventKind::Create(CreateKind::Folder)).add_path(foo.clone()),
        Event::new(EventKind::Create(CreateKind::File)).add_path(bar.clone()),
    ] {
        for op in mirror.classifier.classify(&event) {
            outcomes.push(mirror.client.relay(&op).await.unwrap());
        }
    }
    assert!(outcomes.iter().all(|o| o.is_success()));
    assert_eq!(
        std::fs::metadata(mirror.dest("foo/bar.txt")).unwrap().len(),
        9_000
    );

    // Rename foo -> baz; the platform may also report each descendant.
    let baz = mirror.root.join("baz");
    std::fs::rename(&foo, &baz).unwrap();
    let parent = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
        .add_path(foo.clone())
        .add_path(baz.clone());
    let child = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
        .add_path(foo.join("bar.txt"))
        .add_path(baz.join("bar.txt"));

    let parent_ops = mirror.classifier.classify(&parent);
    assert_eq!(parent_ops.len(), 1);
    let parent_outcome = mirror.client.relay(&parent_ops[0]).await.unwrap();
    assert_eq!(parent_outcome.action, "rename directory");
    assert_eq!(parent_outcome.status, StatusCode::OK);

    let child_ops = mirror.classifier.classify(&child);
    assert_eq!(child_ops.len(), 1);
    let child_outcome = mirror.client.relay(&child_ops[0]).await.unwrap();
    assert_eq!(child_outcome.action, "rename file");
    assert_eq!(child_outcome.status, StatusCode::NOT_FOUND);
    assert!(child_outcome.body.contains("detail"));

    assert!(!mirror.dest("foo").exists());
    assert_eq!(std::fs::read(mirror.dest("baz/bar.txt")).unwrap(), content);

    // The server is still healthy afterwards.
    let resp = reqwest::get(format!("{}/health", mirror.client.server()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_relay_loop_survives_failed_operations() {
    let mirror = Mirror::new().await;
    let keep = mirror.write_source("keep.txt", b"kept");
    let scratch = mirror.write_source(".keep.txt.swp", b"swap");

    let (tx, rx) = mpsc::channel(16);
    let events = [
        // Never reached the server: 404, logged, loop continues.
        Event::new(EventKind::Remove(RemoveKind::File)).add_path(mirror.root.join("never.txt")),
        Event::new(EventKind::Create(CreateKind::File)).add_path(scratch),
        Event::new(EventKind::Create(CreateKind::File)).add_path(keep),
    ];
    for event in events {
        tx.send(Ok(event)).await.unwrap();
    }
    drop(tx);

    let stats = relay_events(
        rx,
        mirror.classifier.clone(),
        mirror.client.clone(),
        std::future::pending(),
    )
    .await;

    // The swap file is filtered before it is relayed.
    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.delivered, 2);
    assert_eq!(std::fs::read(mirror.dest("keep.txt")).unwrap(), b"kept");
    assert!(!mirror.dest(".keep.txt.swp").exists());
}

#[tokio::test]
async fn test_concurrent_uploads_to_distinct_paths() {
    let mirror = Mirror::new().await;
    let mut handles = Vec::new();
    for i in 0..8usize {
        let name = format!("dir{}/file{}.bin", i % 3, i);
        let content = content_of(1_000 + i * 5_000);
        let source = mirror.write_source(&name, &content);
        let client = mirror.client.clone();
        handles.push(tokio::spawn(async move {
            let outcome = client.upload_file(&rel(&name), &source).await.unwrap();
            (name, content, outcome)
        }));
    }

    for handle in handles {
        let (name, content, outcome) = handle.await.unwrap();
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(std::fs::read(mirror.dest(&name)).unwrap(), content);
    }
}

/// The server takes no lock per path: concurrent writers to one path all
/// succeed and the destination holds whatever the filesystem left behind.
#[tokio::test]
async fn test_concurrent_uploads_to_same_path_all_succeed() {
    let mirror = Mirror::new().await;
    let len = 20_000;
    let mut handles = Vec::new();
    for i in 0..6u8 {
        let source = mirror.write_source(&format!("writers/w{}.bin", i), &vec![i; len]);
        let client = mirror.client.clone();
        handles.push(tokio::spawn(async move {
            client.upload_file(&rel("shared.bin"), &source).await.unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().status, StatusCode::OK);
    }
    // Every writer sent the same length, so only the bytes are undetermined.
    assert_eq!(
        std::fs::metadata(mirror.dest("shared.bin")).unwrap().len(),
        len as u64
    );
}

async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn read_opt(path: PathBuf) -> Option<Vec<u8>> {
    std::fs::read(path).ok()
}

/// Drives the real platform watcher end to end, including moves across the
/// root boundary that only ever produce one rename half.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_watch_and_relay_mirrors_live_tree() {
    let mirror = Mirror::new().await;
    let outside = mirror._source_dir.path().join("outside");
    std::fs::create_dir(&outside).unwrap();

    let config = ClientConfig {
        root: mirror.root.canonicalize().unwrap(),
        root_name: "watched".to_string(),
        server_url: mirror.client.server().to_string(),
        threshold: THRESHOLD,
        ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
    };
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let relay = tokio::spawn(watch_and_relay(config, async {
        stop_rx.await.ok();
    }));
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Create, then modify.
    mirror.write_source("a.txt", b"hello");
    eventually("created file", || {
        read_opt(mirror.dest("a.txt")).as_deref() == Some(b"hello".as_slice())
    })
    .await;
    let large = content_of(40_000);
    std::fs::write(mirror.root.join("a.txt"), &large).unwrap();
    eventually("modified file", || {
        read_opt(mirror.dest("a.txt")).as_ref() == Some(&large)
    })
    .await;

    // Directory, then a file inside it once the directory is mirrored.
    std::fs::create_dir(mirror.root.join("dir")).unwrap();
    eventually("created directory", || mirror.dest("dir").is_dir()).await;
    mirror.write_source("dir/inner.txt", b"inner");
    eventually("file in new directory", || {
        read_opt(mirror.dest("dir/inner.txt")).as_deref() == Some(b"inner".as_slice())
    })
    .await;

    // Rename inside the root.
    std::fs::rename(mirror.root.join("a.txt"), mirror.root.join("b.txt")).unwrap();
    eventually("rename within root", || {
        !mirror.dest("a.txt").exists() && read_opt(mirror.dest("b.txt")).as_ref() == Some(&large)
    })
    .await;

    // Move in from outside the root.
    std::fs::write(outside.join("incoming.txt"), b"incoming").unwrap();
    std::fs::rename(outside.join("incoming.txt"), mirror.root.join("incoming.txt")).unwrap();
    eventually("move into root", || {
        read_opt(mirror.dest("incoming.txt")).as_deref() == Some(b"incoming".as_slice())
    })
    .await;

    // Move out of the root.
    std::fs::rename(mirror.root.join("b.txt"), outside.join("b.txt")).unwrap();
    eventually("move out of root", || !mirror.dest("b.txt").exists()).await;

    // Deletes.
    std::fs::remove_file(mirror.root.join("dir/inner.txt")).unwrap();
    eventually("deleted file", || !mirror.dest("dir/inner.txt").exists()).await;
    std::fs::remove_dir(mirror.root.join("dir")).unwrap();
    eventually("deleted directory", || !mirror.dest("dir").exists()).await;

    assert!(mirror.dest("incoming.txt").is_file());

    stop_tx.send(()).unwrap();
    relay.await.unwrap().unwrap();
}
