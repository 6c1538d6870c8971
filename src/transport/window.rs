//! Window-like flavor: cross-context messaging addressed by target origin.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Channel, Inbound, MessageHandler, Subscribers, TransportStats, spawn_pump};
use crate::error::{TransportError, TransportResult};
use crate::value::Value;

/// Target origin that matches any receiver.
pub const WILDCARD_ORIGIN: &str = "*";

/// One delivered window message, tagged with the sender's origin.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEvent {
    pub data: Value,
    pub origin: String,
    pub transfer: Vec<Value>,
}

/// Anything shaped like a window: origin-addressed posting plus a closed flag.
#[async_trait]
pub trait WindowLike: Send + Sync + std::fmt::Debug + 'static {
    fn post_message(
        &self,
        message: Value,
        target_origin: &str,
        transfer: Vec<Value>,
    ) -> TransportResult<()>;

    /// Whether the target window has gone away.
    fn closed(&self) -> bool;

    async fn recv(&self) -> Option<WindowEvent>;
}

/// In-process window handle: posts to the peer context, receives for its own.
pub struct InProcessWindow {
    origin: String,
    peer_origin: String,
    sender: mpsc::UnboundedSender<WindowEvent>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<WindowEvent>>,
    own_closed: Arc<AtomicBool>,
    peer_closed: Arc<AtomicBool>,
}

impl InProcessWindow {
    /// Create two contexts with the given origins, each holding a handle to the other.
    pub fn pair(origin_a: impl Into<String>, origin_b: impl Into<String>) -> (Self, Self) {
        let origin_a = origin_a.into();
        let origin_b = origin_b.into();
        let (tx_to_b, rx_b) = mpsc::unbounded_channel();
        let (tx_to_a, rx_a) = mpsc::unbounded_channel();
        let closed_a = Arc::new(AtomicBool::new(false));
        let closed_b = Arc::new(AtomicBool::new(false));

        let a = Self {
            origin: origin_a.clone(),
            peer_origin: origin_b.clone(),
            sender: tx_to_b,
            receiver: tokio::sync::Mutex::new(rx_a),
            own_closed: closed_a.clone(),
            peer_closed: closed_b.clone(),
        };
        let b = Self {
            origin: origin_b,
            peer_origin: origin_a,
            sender: tx_to_a,
            receiver: tokio::sync::Mutex::new(rx_b),
            own_closed: closed_b,
            peer_closed: closed_a,
        };
        (a, b)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Close this context; the peer observes `closed() == true` from then on.
    pub fn close(&self) {
        self.own_closed.store(true, Ordering::Release);
    }
}

#[async_trait]
impl WindowLike for InProcessWindow {
    fn post_message(
        &self,
        message: Value,
        target_origin: &str,
        transfer: Vec<Value>,
    ) -> TransportResult<()> {
        if self.closed() {
            return Err(TransportError::Closed);
        }
        if target_origin != WILDCARD_ORIGIN && target_origin != self.peer_origin {
            // Mismatched origins are dropped without telling the sender.
            tracing::trace!(target_origin, peer = %self.peer_origin, "origin mismatch");
            return Ok(());
        }
        self.sender
            .send(WindowEvent {
                data: message,
                origin: self.origin.clone(),
                transfer,
            })
            .map_err(|_| TransportError::Closed)
    }

    fn closed(&self) -> bool {
        self.peer_closed.load(Ordering::Acquire)
    }

    async fn recv(&self) -> Option<WindowEvent> {
        if self.own_closed.load(Ordering::Acquire) {
            return None;
        }
        self.receiver.lock().await.recv().await
    }
}

impl std::fmt::Debug for InProcessWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessWindow")
            .field("origin", &self.origin)
            .field("peer_origin", &self.peer_origin)
            .field("closed", &self.closed())
            .finish()
    }
}

struct WindowInbound<W: WindowLike> {
    window: Arc<W>,
    stats: Arc<Mutex<TransportStats>>,
}

#[async_trait]
impl<W: WindowLike> Inbound for WindowInbound<W> {
    async fn next_message(&self) -> Option<Value> {
        let event = self.window.recv().await?;
        self.stats.lock().messages_received += 1;
        Some(event.data)
    }
}

/// Channel adapter for window-like endpoints. Always posts with the wildcard origin.
pub struct WindowChannel<W: WindowLike> {
    window: Arc<W>,
    subscribers: Arc<Subscribers>,
    pumping: AtomicBool,
    stats: Arc<Mutex<TransportStats>>,
    name: String,
}

impl<W: WindowLike> WindowChannel<W> {
    pub fn new(window: W) -> Self {
        Self {
            window: Arc::new(window),
            subscribers: Subscribers::new(),
            pumping: AtomicBool::new(false),
            stats: Arc::new(Mutex::new(TransportStats::default())),
            name: "window".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn window(&self) -> &W {
        &self.window
    }
}

#[async_trait]
impl<W: WindowLike> Channel for WindowChannel<W> {
    async fn send(&self, message: Value, transfer: Vec<Value>) -> TransportResult<()> {
        if self.window.closed() {
            return Err(TransportError::Closed);
        }
        let transferables = transfer.len() as u64;
        self.window
            .post_message(message, WILDCARD_ORIGIN, transfer)?;

        let mut stats = self.stats.lock();
        stats.messages_sent += 1;
        stats.transferables_sent += transferables;
        Ok(())
    }

    fn subscribe(&self, handler: MessageHandler, cancel: CancellationToken) {
        self.subscribers.add(handler, cancel);

        if !self.pumping.swap(true, Ordering::AcqRel) {
            let inbound = Arc::new(WindowInbound {
                window: self.window.clone(),
                stats: self.stats.clone(),
            });
            spawn_pump(&self.subscribers, inbound, self.name.clone());
        }
    }

    fn stats(&self) -> Option<TransportStats> {
        Some(self.stats.lock().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<W: WindowLike> std::fmt::Debug for WindowChannel<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowChannel")
            .field("name", &self.name)
            .field("window", &self.window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the target origin of every post.
    #[derive(Debug, Default)]
    struct RecordingWindow {
        origins: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WindowLike for RecordingWindow {
        fn post_message(
            &self,
            _message: Value,
            target_origin: &str,
            _transfer: Vec<Value>,
        ) -> TransportResult<()> {
            self.origins.lock().push(target_origin.to_string());
            Ok(())
        }

        fn closed(&self) -> bool {
            false
        }

        async fn recv(&self) -> Option<WindowEvent> {
            None
        }
    }

    #[tokio::test]
    async fn test_adapter_posts_with_wildcard_origin() {
        let channel = WindowChannel::new(RecordingWindow::default());
        channel.send(Value::from(1), Vec::new()).await.unwrap();
        assert_eq!(*channel.window().origins.lock(), vec!["*".to_string()]);
    }

    #[tokio::test]
    async fn test_origin_filtering() {
        let (a, b) = InProcessWindow::pair("https://a.test", "https://b.test");

        a.post_message(Value::from("wrong"), "https://evil.test", Vec::new())
            .unwrap();
        a.post_message(Value::from("right"), "https://b.test", Vec::new())
            .unwrap();

        let event = b.recv().await.unwrap();
        assert_eq!(event.data, Value::from("right"));
        assert_eq!(event.origin, "https://a.test");
    }

    #[tokio::test]
    async fn test_send_to_closed_window_fails() {
        let (a, b) = InProcessWindow::pair("https://a.test", "https://b.test");
        b.close();

        let channel = WindowChannel::new(a);
        assert!(channel.window().closed());
        let result = channel.send(Value::Null, Vec::new()).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_subscribe_receives_messages() {
        let (a, b) = InProcessWindow::pair("https://a.test", "https://b.test");
        let sender = WindowChannel::new(a);
        let receiver = WindowChannel::new(b);

        let (tx, mut rx) = mpsc::unbounded_channel();
        receiver.subscribe(
            Arc::new(move |msg| {
                let _ = tx.send(msg);
            }),
            CancellationToken::new(),
        );

        sender.send(Value::from("hi"), Vec::new()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Value::from("hi"));
        assert_eq!(receiver.stats().unwrap().messages_received, 1);
    }
}
