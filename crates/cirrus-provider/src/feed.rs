//! Change feed plumbing.
//!
//! A feed is a channel of full enumerations: the provider side re-enumerates
//! the tree whenever the local watcher fires (after a quiet window) and on a
//! periodic interval that catches remote-side changes the watcher cannot see.
//! The subscriber side always diffs against the newest enumeration available,
//! so a slow consumer sees coalesced state rather than a growing queue.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Enumeration;
use cirrus_core::DriveResult;

/// Subscriber end of a change feed.
pub struct ChangeFeed {
    rx: mpsc::Receiver<Enumeration>,
    cancel: CancellationToken,
}

/// Provider end of a change feed.
pub struct FeedHandle {
    tx: mpsc::Sender<Enumeration>,
    cancel: CancellationToken,
}

impl ChangeFeed {
    /// Create a connected handle/feed pair.
    pub fn channel(capacity: usize) -> (FeedHandle, ChangeFeed) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        (
            FeedHandle {
                tx,
                cancel: cancel.clone(),
            },
            ChangeFeed { rx, cancel },
        )
    }

    /// Next enumeration, or `None` once the provider side is gone.
    pub async fn recv(&mut self) -> Option<Enumeration> {
        self.rx.recv().await
    }

    /// Drain anything already queued behind `current`, keeping the newest.
    pub fn latest(&mut self, mut current: Enumeration) -> Enumeration {
        while let Ok(next) = self.rx.try_recv() {
            current = next;
        }
        current
    }

    /// Tear down the subscription. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl FeedHandle {
    /// Deliver an enumeration; returns false once the subscriber is gone.
    pub async fn send(&self, enumeration: Enumeration) -> bool {
        self.tx.send(enumeration).await.is_ok()
    }

    /// Resolves when the subscriber stops or drops the feed.
    pub async fn stopped(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// Spawn the provider-side feed task: one initial enumeration, then
/// re-enumeration on watcher events (debounced) and on every poll tick.
pub fn spawn_enumeration_feed<F, Fut>(
    watch_dir: PathBuf,
    poll_interval: Duration,
    debounce: Duration,
    capacity: usize,
    enumerate: F,
) -> ChangeFeed
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DriveResult<Enumeration>> + Send + 'static,
{
    let (handle, feed) = ChangeFeed::channel(capacity);
    tokio::spawn(run_feed(
        watch_dir,
        poll_interval,
        debounce,
        handle,
        enumerate,
    ));
    feed
}

async fn run_feed<F, Fut>(
    watch_dir: PathBuf,
    poll_interval: Duration,
    debounce: Duration,
    handle: FeedHandle,
    enumerate: F,
) where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = DriveResult<Enumeration>> + Send,
{
    // The watcher callback runs on notify's own thread; bridge into tokio.
    let (tx, mut events) = mpsc::channel::<notify::Event>(32);
    let mut watcher_alive = false;
    let _watcher: Option<RecommendedWatcher> = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        },
        notify::Config::default(),
    ) {
        Ok(mut watcher) => match watcher.watch(&watch_dir, RecursiveMode::Recursive) {
            Ok(()) => {
                watcher_alive = true;
                Some(watcher)
            }
            Err(e) => {
                warn!(dir = %watch_dir.display(), error = %e, "cannot watch tree; polling only");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "cannot create watcher; polling only");
            None
        }
    };

    // Initial enumeration seeds the subscriber's snapshot.
    match enumerate().await {
        Ok(entries) => {
            if !handle.send(entries).await {
                return;
            }
        }
        Err(e) => warn!(error = %e, "initial enumeration failed"),
    }

    let mut tick = interval_at(Instant::now() + poll_interval, poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = handle.stopped() => break,
            maybe = events.recv(), if watcher_alive => {
                match maybe {
                    Some(_) => {
                        // Quiet window: coalesce a burst of events into one pass.
                        tokio::time::sleep(debounce).await;
                        while events.try_recv().is_ok() {}
                        if !push(&handle, &enumerate).await {
                            break;
                        }
                    }
                    None => {
                        warn!(dir = %watch_dir.display(), "watcher channel closed; polling only");
                        watcher_alive = false;
                    }
                }
            }
            _ = tick.tick() => {
                if !push(&handle, &enumerate).await {
                    break;
                }
            }
        }
    }
    debug!(dir = %watch_dir.display(), "change feed stopped");
}

async fn push<F, Fut>(handle: &FeedHandle, enumerate: &F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = DriveResult<Enumeration>>,
{
    match enumerate().await {
        Ok(entries) => handle.send(entries).await,
        Err(e) => {
            warn!(error = %e, "enumeration failed; keeping previous state");
            !handle.is_stopped()
        }
    }
}
