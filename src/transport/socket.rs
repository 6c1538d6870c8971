//! Socket-like flavor: a text duplex. Envelopes are encoded to text before
//! sending and decoded on receipt; transfer lists are not supported, so
//! marked values travel by value.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Channel, Inbound, MessageHandler, Subscribers, TransportStats, spawn_pump};
use crate::codec::{Codec, JsonCodec};
use crate::error::{TransportError, TransportResult};
use crate::value::Value;

/// Anything shaped like a text socket.
#[async_trait]
pub trait SocketLike: Send + Sync + std::fmt::Debug + 'static {
    async fn send_text(&self, text: String) -> TransportResult<()>;

    /// Next inbound text frame, `None` once the socket is closed.
    async fn recv_text(&self) -> Option<String>;
}

/// In-process text socket, mainly for tests and demos.
pub struct MemorySocket {
    sender: mpsc::UnboundedSender<String>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    name: String,
}

impl MemorySocket {
    pub fn pair(name: impl Into<String>) -> (Self, Self) {
        let name = name.into();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();

        let s1 = Self {
            sender: tx1,
            receiver: tokio::sync::Mutex::new(rx2),
            name: format!("{}-client", name),
        };
        let s2 = Self {
            sender: tx2,
            receiver: tokio::sync::Mutex::new(rx1),
            name: format!("{}-server", name),
        };
        (s1, s2)
    }
}

#[async_trait]
impl SocketLike for MemorySocket {
    async fn send_text(&self, text: String) -> TransportResult<()> {
        self.sender.send(text).map_err(|_| TransportError::Closed)
    }

    async fn recv_text(&self) -> Option<String> {
        self.receiver.lock().await.recv().await
    }
}

impl std::fmt::Debug for MemorySocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySocket")
            .field("name", &self.name)
            .finish()
    }
}

struct SocketInbound<S: SocketLike, C: Codec> {
    socket: Arc<S>,
    codec: C,
    stats: Arc<Mutex<TransportStats>>,
    name: String,
}

#[async_trait]
impl<S: SocketLike, C: Codec> Inbound for SocketInbound<S, C> {
    async fn next_message(&self) -> Option<Value> {
        loop {
            let text = self.socket.recv_text().await?;
            match self.codec.decode::<Value>(&text) {
                Ok(message) => {
                    let mut stats = self.stats.lock();
                    stats.messages_received += 1;
                    stats.bytes_received += text.len() as u64;
                    return Some(message);
                }
                Err(e) => {
                    self.stats.lock().messages_dropped += 1;
                    tracing::debug!(channel = %self.name, error = %e, "dropping undecodable frame");
                }
            }
        }
    }
}

/// Channel adapter for text sockets.
pub struct SocketChannel<S: SocketLike, C: Codec = JsonCodec> {
    socket: Arc<S>,
    codec: C,
    subscribers: Arc<Subscribers>,
    pumping: AtomicBool,
    stats: Arc<Mutex<TransportStats>>,
    name: String,
}

impl<S: SocketLike> SocketChannel<S, JsonCodec> {
    /// Create a new adapter with the default JsonCodec.
    pub fn new(socket: S) -> Self {
        Self::with_codec(socket, JsonCodec)
    }
}

impl<S: SocketLike, C: Codec + Clone> SocketChannel<S, C> {
    /// Create a new adapter with a specific codec.
    pub fn with_codec(socket: S, codec: C) -> Self {
        Self {
            socket: Arc::new(socket),
            codec,
            subscribers: Subscribers::new(),
            pumping: AtomicBool::new(false),
            stats: Arc::new(Mutex::new(TransportStats::default())),
            name: "socket".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }
}

#[async_trait]
impl<S: SocketLike, C: Codec + Clone> Channel for SocketChannel<S, C> {
    async fn send(&self, message: Value, transfer: Vec<Value>) -> TransportResult<()> {
        if !transfer.is_empty() {
            tracing::trace!(
                channel = %self.name,
                count = transfer.len(),
                "socket carries transferables by value"
            );
        }

        let text = self
            .codec
            .encode(&message)
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        let len = text.len() as u64;
        self.socket.send_text(text).await?;

        let mut stats = self.stats.lock();
        stats.messages_sent += 1;
        stats.bytes_sent += len;
        Ok(())
    }

    fn subscribe(&self, handler: MessageHandler, cancel: CancellationToken) {
        self.subscribers.add(handler, cancel);

        if !self.pumping.swap(true, Ordering::AcqRel) {
            let inbound = Arc::new(SocketInbound {
                socket: self.socket.clone(),
                codec: self.codec.clone(),
                stats: self.stats.clone(),
                name: self.name.clone(),
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

impl<S: SocketLike, C: Codec> std::fmt::Debug for SocketChannel<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketChannel")
            .field("name", &self.name)
            .field("socket", &self.socket)
            .field("codec", &self.codec)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PrettyJsonCodec;
    use crate::transfer::transfer;
    use bytes::Bytes;

    fn collect(channel: &impl Channel) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        channel.subscribe(
            Arc::new(move |msg| {
                let _ = tx.send(msg);
            }),
            CancellationToken::new(),
        );
        rx
    }

    #[tokio::test]
    async fn test_send_encodes_text() {
        let (s1, s2) = MemorySocket::pair("test");
        let channel = SocketChannel::new(s1);

        channel
            .send(Value::record([("a", 1)]), Vec::new())
            .await
            .unwrap();
        assert_eq!(s2.recv_text().await.unwrap(), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_malformed_text_is_dropped() {
        let (s1, s2) = MemorySocket::pair("test");
        let receiver = SocketChannel::new(s2);
        let mut rx = collect(&receiver);

        s1.send_text("{broken".to_string()).await.unwrap();
        s1.send_text("[1,2]".to_string()).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            Value::Array(vec![Value::from(1), Value::from(2)])
        );
        let stats = receiver.stats().unwrap();
        assert_eq!(stats.messages_dropped, 1);
        assert_eq!(stats.messages_received, 1);
    }

    #[tokio::test]
    async fn test_transferables_travel_by_value() {
        let (s1, s2) = MemorySocket::pair("test");
        let sender = SocketChannel::new(s1);
        let receiver = SocketChannel::new(s2);
        let mut rx = collect(&receiver);

        let marked = transfer(Bytes::from_static(&[9, 8]));
        sender
            .send(Value::Array(vec![marked.clone()]), vec![marked])
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            Value::Array(vec![Value::Array(vec![Value::from(9), Value::from(8)])])
        );
        assert_eq!(sender.stats().unwrap().transferables_sent, 0);
    }

    #[tokio::test]
    async fn test_custom_codec() {
        let (s1, s2) = MemorySocket::pair("pretty");
        let sender = SocketChannel::with_codec(s1, PrettyJsonCodec);
        let receiver = SocketChannel::new(s2);
        let mut rx = collect(&receiver);

        let value = Value::record([("k", "v")]);
        sender.send(value.clone(), Vec::new()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), value);
    }
}
