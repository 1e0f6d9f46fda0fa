//! Watch loop: notify events in, relayed operations out.
//!
//! Events are handled one at a time, including the network call. A slow
//! upload delays every event queued behind it; there is no other ordering
//! guarantee to maintain on the client.

use crate::config::ClientConfig;
use crate::relay::{EventClassifier, RelayClient, RelayError};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use treemirror_types::ChangeOperation;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Counts reported when the relay loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Operations a request was attempted for.
    pub attempted: usize,
    /// Operations the server answered, whatever the status.
    pub delivered: usize,
}

impl RelayStats {
    async fn relay_all(&mut self, client: &RelayClient, ops: Vec<ChangeOperation>) {
        for op in ops {
            self.attempted += 1;
            if client.relay(&op).await.is_some() {
                self.delivered += 1;
            }
        }
    }
}

async fn wait_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Classify and relay events from `rx` until the channel closes or
/// `shutdown` resolves.
///
/// Rename sources still waiting for a partner when the loop stops are
/// relayed as deletes before returning.
pub async fn relay_events<F>(
    mut rx: mpsc::Receiver<notify::Result<Event>>,
    mut classifier: EventClassifier,
    client: RelayClient,
    shutdown: F,
) -> RelayStats
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut stats = RelayStats::default();

    loop {
        let deadline = classifier.next_deadline();
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping relay");
                break;
            }
            _ = wait_until(deadline) => {
                // A partner may be queued behind a slow send; look before expiring.
                while let Ok(msg) = rx.try_recv() {
                    handle_message(msg, &mut classifier, &client, &mut stats).await;
                }
                let ops = classifier.expire_pending(std::time::Instant::now());
                stats.relay_all(&client, ops).await;
            }
            msg = rx.recv() => {
                match msg {
                    Some(msg) => handle_message(msg, &mut classifier, &client, &mut stats).await,
                    None => {
                        debug!("Event channel closed");
                        break;
                    }
                }
            }
        }
    }

    let ops = classifier.drain_pending();
    stats.relay_all(&client, ops).await;
    stats
}

async fn handle_message(
    msg: notify::Result<Event>,
    classifier: &mut EventClassifier,
    client: &RelayClient,
    stats: &mut RelayStats,
) {
    match msg {
        Ok(event) => {
            let ops = classifier.classify(&event);
            stats.relay_all(client, ops).await;
        }
        Err(e) => warn!("Watcher error: {}", e),
    }
}

/// Watch `config.root` recursively and relay every change until `shutdown`.
pub async fn watch_and_relay<F>(config: ClientConfig, shutdown: F) -> Result<(), RelayError>
where
    F: Future<Output = ()>,
{
    let classifier = EventClassifier::new(config.root_name.clone(), config.ignore_filter()?);
    let client = RelayClient::new(config.server_url.clone(), config.threshold);

    let (notify_tx, notify_rx) =
        mpsc::channel::<notify::Result<Event>>(EVENT_CHANNEL_CAPACITY);
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = notify_tx.blocking_send(res);
        },
        Config::default(),
    )?;
    watcher.watch(&config.root, RecursiveMode::Recursive)?;

    info!(
        "Watching {} and relaying to {}",
        config.root.display(),
        client.server()
    );

    let stats = relay_events(notify_rx, classifier, client, shutdown).await;
    drop(watcher);
    info!(
        "Relay stopped: {} of {} operations delivered",
        stats.delivered, stats.attempted
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::IgnoreFilter;
    use crate::relay::classify::RENAME_PAIR_WINDOW;
    use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};

    #[tokio::test]
    async fn test_relay_stops_when_channel_closes() {
        let (tx, rx) = mpsc::channel(4);
        drop(tx);
        let classifier = EventClassifier::new("root", IgnoreFilter::with_defaults().unwrap());
        let client = RelayClient::new("http://127.0.0.1:9", 10_000);
        let stats = relay_events(rx, classifier, client, std::future::pending()).await;
        assert_eq!(stats, RelayStats::default());
    }

    #[tokio::test]
    async fn test_relay_stops_on_shutdown() {
        let (tx, rx) = mpsc::channel(4);
        let classifier = EventClassifier::new("root", IgnoreFilter::with_defaults().unwrap());
        let client = RelayClient::new("http://127.0.0.1:9", 10_000);
        let stats = relay_events(rx, classifier, client, async {}).await;
        assert_eq!(stats.attempted, 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_failed_sends_do_not_stop_the_loop() {
        let (tx, rx) = mpsc::channel(4);
        let classifier = EventClassifier::new("root", IgnoreFilter::with_defaults().unwrap());
        // Nothing listens here; every send fails and is logged.
        let client = RelayClient::new("http://127.0.0.1:9", 10_000);

        tx.send(Err(notify::Error::generic("synthetic")))
            .await
            .unwrap();
        for name in ["a", "b"] {
            let event = Event::new(EventKind::Create(CreateKind::Folder))
                .add_path(format!("/srv/root/{}", name).into());
            tx.send(Ok(event)).await.unwrap();
        }
        drop(tx);

        let stats = relay_events(rx, classifier, client, std::future::pending()).await;
        assert_eq!(
            stats,
            RelayStats {
                attempted: 2,
                delivered: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_unpaired_rename_source_flushed_on_close() {
        let (tx, rx) = mpsc::channel(4);
        let classifier = EventClassifier::new("root", IgnoreFilter::with_defaults().unwrap());
        let client = RelayClient::new("http://127.0.0.1:9", 10_000);

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path("/srv/root/gone.txt".into())
            .set_tracker(42);
        tx.send(Ok(event)).await.unwrap();
        drop(tx);

        let stats = relay_events(rx, classifier, client, std::future::pending()).await;
        assert_eq!(stats.attempted, 1);
    }

    #[tokio::test]
    async fn test_unpaired_rename_source_expires_while_running() {
        let (tx, rx) = mpsc::channel(4);
        let classifier = EventClassifier::new("root", IgnoreFilter::with_defaults().unwrap());
        let client = RelayClient::new("http://127.0.0.1:9", 10_000);

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path("/srv/root/gone.txt".into());
        tx.send(Ok(event)).await.unwrap();

        // Keep the channel open past the pairing window, then stop.
        let shutdown = tokio::time::sleep(RENAME_PAIR_WINDOW * 4);
        let stats = relay_events(rx, classifier, client, shutdown).await;
        assert_eq!(stats.attempted, 1);
        drop(tx);
    }
}
