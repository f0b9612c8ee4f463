//! Progress/status fan-out to registered listeners.
//!
//! The API layer registers a channel per connected client and forwards
//! whatever arrives; producers inside the scanner only ever talk to the bus.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::types::UserId;

/// Identifies one registered listener. Ids are strictly increasing and never
/// reused while the bus is alive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a notification should be rendered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum NotificationKind {
    Message,
    Progress,
}

/// Envelope delivered to every listener. `key` groups related updates so a
/// consumer can replace a prior message in place instead of appending.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub key: String,
    pub kind: NotificationKind,
    pub header: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    pub positive: bool,
    pub negative: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl Notification {
    pub fn message(
        key: impl Into<String>,
        header: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            kind: NotificationKind::Message,
            header: header.into(),
            content: content.into(),
            progress: None,
            positive: false,
            negative: false,
            timeout: None,
        }
    }

    pub fn progress(
        key: impl Into<String>,
        header: impl Into<String>,
        content: impl Into<String>,
        progress: f32,
    ) -> Self {
        Self {
            kind: NotificationKind::Progress,
            progress: Some(progress),
            ..Self::message(key, header, content)
        }
    }

    pub fn positive(mut self) -> Self {
        self.positive = true;
        self
    }

    pub fn negative(mut self) -> Self {
        self.negative = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug)]
struct Listener {
    id: ListenerId,
    #[allow(dead_code)]
    user: UserId,
    sender: mpsc::Sender<Notification>,
}

/// Thread-safe pub/sub fan-out of progress and status events.
///
/// Delivery is blocking per listener: a slow or unbuffered consumer stalls
/// the broadcaster, and transitively every producer waiting on the bus lock.
/// That trade-off keeps the bus trivial; consumers are expected to register
/// adequately buffered channels and to deregister before dropping them.
pub struct NotificationBus {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a delivery channel for `user`; the returned id is required
    /// for deregistration.
    pub async fn register(&self, user: UserId, sender: mpsc::Sender<Notification>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners.lock().await.push(Listener { id, user, sender });
        debug!(listener = %id, user = %user, "notification listener registered");
        id
    }

    /// Remove a listener. Order is not preserved (swap-remove).
    pub async fn deregister(&self, id: ListenerId) -> Result<()> {
        let mut listeners = self.listeners.lock().await;
        match listeners.iter().position(|listener| listener.id == id) {
            Some(index) => {
                listeners.swap_remove(index);
                Ok(())
            }
            None => Err(ScanError::ListenerNotFound(id.0)),
        }
    }

    /// Deliver `notification` to every registered listener, in registration
    /// order, holding the bus lock for the whole loop.
    pub async fn broadcast(&self, notification: Notification) {
        let listeners = self.listeners.lock().await;
        for listener in listeners.iter() {
            if listener.sender.send(notification.clone()).await.is_err() {
                debug!(
                    listener = %listener.id,
                    "listener channel closed, dropping notification"
                );
            }
        }
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.lock().await.len()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.try_lock().map(|guard| guard.len()).ok();
        f.debug_struct("NotificationBus")
            .field("listeners", &listeners)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_deregister_removes_exactly_that_listener() {
        let bus = NotificationBus::new();
        let (tx, _rx) = mpsc::channel(4);
        let first = bus.register(UserId(1), tx.clone()).await;
        let second = bus.register(UserId(1), tx).await;
        assert!(second.0 > first.0);

        bus.deregister(first).await.expect("deregister succeeds");
        assert_eq!(bus.listener_count().await, 1);

        let err = bus.deregister(first).await.expect_err("already removed");
        assert!(matches!(err, ScanError::ListenerNotFound(id) if id == first.0));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_listener_exactly_once() {
        let bus = NotificationBus::new();
        let mut receivers = Vec::new();
        for user in 1..=3 {
            let (tx, rx) = mpsc::channel(4);
            bus.register(UserId(user), tx).await;
            receivers.push(rx);
        }

        bus.broadcast(Notification::message("k", "header", "content"))
            .await;

        for rx in &mut receivers {
            let received = rx.try_recv().expect("one notification");
            assert_eq!(received.key, "k");
            assert!(rx.try_recv().is_err(), "no duplicate delivery");
        }
    }

    #[tokio::test]
    async fn broadcast_without_listeners_is_a_no_op() {
        let bus = NotificationBus::new();
        bus.broadcast(Notification::message("k", "h", "c")).await;
    }

    #[tokio::test]
    async fn closed_listener_channel_does_not_poison_the_bus() {
        let bus = NotificationBus::new();
        let (dead_tx, dead_rx) = mpsc::channel(1);
        drop(dead_rx);
        bus.register(UserId(1), dead_tx).await;

        let (tx, mut rx) = mpsc::channel(4);
        bus.register(UserId(2), tx).await;

        bus.broadcast(Notification::message("k", "h", "c")).await;
        assert!(rx.try_recv().is_ok());
    }
}
