//! Port-like flavor: an in-process duplex port that carries structured
//! values plus a transfer list, optionally gated behind a `start` call.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use super::{Channel, Inbound, MessageHandler, Subscribers, TransportStats, spawn_pump};
use crate::error::{TransportError, TransportResult};
use crate::value::Value;

/// One delivered port message.
#[derive(Debug, Clone, PartialEq)]
pub struct PortEvent {
    pub data: Value,
    pub transfer: Vec<Value>,
}

/// Anything shaped like a message port.
#[async_trait]
pub trait PortLike: Send + Sync + std::fmt::Debug + 'static {
    /// Post a message; `transfer` lists the values whose ownership moves with it.
    fn post_message(&self, message: Value, transfer: Vec<Value>) -> TransportResult<()>;

    /// Next inbound message, `None` once the peer is gone.
    async fn recv(&self) -> Option<PortEvent>;

    /// Begin delivery. Ports that deliver from the outset keep the default.
    fn start(&self) {}
}

/// In-process message port. Inbound messages queue until [`PortLike::start`] is called.
pub struct MessagePort {
    sender: mpsc::UnboundedSender<PortEvent>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<PortEvent>>,
    started: AtomicBool,
    start_signal: Notify,
    start_calls: AtomicUsize,
    name: String,
}

impl MessagePort {
    /// Create a pair of entangled ports.
    pub fn pair(name: impl Into<String>) -> (Self, Self) {
        let name = name.into();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();

        let port1 = Self::new(tx1, rx2, format!("{}-1", name));
        let port2 = Self::new(tx2, rx1, format!("{}-2", name));
        (port1, port2)
    }

    fn new(
        sender: mpsc::UnboundedSender<PortEvent>,
        receiver: mpsc::UnboundedReceiver<PortEvent>,
        name: String,
    ) -> Self {
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            started: AtomicBool::new(false),
            start_signal: Notify::new(),
            start_calls: AtomicUsize::new(0),
            name,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// How many times `start` has been called on this port.
    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn wait_started(&self) {
        loop {
            let notified = self.start_signal.notified();
            if self.is_started() {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl PortLike for MessagePort {
    fn post_message(&self, message: Value, transfer: Vec<Value>) -> TransportResult<()> {
        self.sender
            .send(PortEvent {
                data: message,
                transfer,
            })
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Option<PortEvent> {
        self.wait_started().await;
        self.receiver.lock().await.recv().await
    }

    fn start(&self) {
        self.start_calls.fetch_add(1, Ordering::AcqRel);
        self.started.store(true, Ordering::Release);
        self.start_signal.notify_waiters();
    }
}

impl std::fmt::Debug for MessagePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePort")
            .field("name", &self.name)
            .field("started", &self.is_started())
            .finish()
    }
}

struct PortInbound<P: PortLike> {
    port: Arc<P>,
    stats: Arc<Mutex<TransportStats>>,
}

#[async_trait]
impl<P: PortLike> Inbound for PortInbound<P> {
    async fn next_message(&self) -> Option<Value> {
        let event = self.port.recv().await?;
        self.stats.lock().messages_received += 1;
        Some(event.data)
    }
}

/// Channel adapter for port-like endpoints.
pub struct PortChannel<P: PortLike> {
    port: Arc<P>,
    subscribers: Arc<Subscribers>,
    started: AtomicBool,
    stats: Arc<Mutex<TransportStats>>,
    name: String,
}

impl<P: PortLike> PortChannel<P> {
    pub fn new(port: P) -> Self {
        Self::from_arc(Arc::new(port))
    }

    pub fn from_arc(port: Arc<P>) -> Self {
        Self {
            port,
            subscribers: Subscribers::new(),
            started: AtomicBool::new(false),
            stats: Arc::new(Mutex::new(TransportStats::default())),
            name: "port".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

#[async_trait]
impl<P: PortLike> Channel for PortChannel<P> {
    async fn send(&self, message: Value, transfer: Vec<Value>) -> TransportResult<()> {
        let transferables = transfer.len() as u64;
        self.port.post_message(message, transfer)?;

        let mut stats = self.stats.lock();
        stats.messages_sent += 1;
        stats.transferables_sent += transferables;
        Ok(())
    }

    fn subscribe(&self, handler: MessageHandler, cancel: CancellationToken) {
        self.subscribers.add(handler, cancel);

        if !self.started.swap(true, Ordering::AcqRel) {
            self.port.start();
            let inbound = Arc::new(PortInbound {
                port: self.port.clone(),
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

impl<P: PortLike> std::fmt::Debug for PortChannel<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortChannel")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    fn forward_to(tx: mpsc::UnboundedSender<Value>) -> MessageHandler {
        Arc::new(move |msg| {
            let _ = tx.send(msg);
        })
    }

    #[tokio::test]
    async fn test_port_queues_until_started() {
        let (p1, p2) = MessagePort::pair("test");
        p1.post_message(Value::from("early"), Vec::new()).unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(50), p2.recv()).await;
        assert!(pending.is_err(), "port delivered before start");

        p2.start();
        let event = p2.recv().await.unwrap();
        assert_eq!(event.data, Value::from("early"));
    }

    #[tokio::test]
    async fn test_adapter_starts_port_exactly_once() {
        let (p1, p2) = MessagePort::pair("test");
        let sender = PortChannel::new(p1);
        let receiver = PortChannel::new(p2);

        let (tx, mut rx) = mpsc::unbounded_channel();
        receiver.subscribe(forward_to(tx.clone()), CancellationToken::new());
        receiver.subscribe(forward_to(tx), CancellationToken::new());
        assert_eq!(receiver.port().start_calls(), 1);

        sender.send(Value::from(1), Vec::new()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Value::from(1));
        assert_eq!(rx.recv().await.unwrap(), Value::from(1));
    }

    #[tokio::test]
    async fn test_transfer_list_is_passed_through() {
        let (p1, p2) = MessagePort::pair("test");
        let sender = PortChannel::new(p1);

        let payload = Bytes::from(vec![1u8; 1024]);
        sender
            .send(
                Value::Bytes(payload.clone()),
                vec![Value::Bytes(payload.clone())],
            )
            .await
            .unwrap();

        p2.start();
        let event = p2.recv().await.unwrap();
        let Some(Value::Bytes(moved)) = event.transfer.first() else {
            panic!("missing transferable");
        };
        assert_eq!(moved.as_ptr(), payload.as_ptr());
        assert_eq!(sender.stats().unwrap().transferables_sent, 1);
    }

    #[tokio::test]
    async fn test_send_to_dropped_peer_fails() {
        let (p1, p2) = MessagePort::pair("test");
        drop(p2);
        let channel = PortChannel::new(p1);
        let result = channel.send(Value::Null, Vec::new()).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
