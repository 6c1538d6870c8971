use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportResult;
use crate::value::Value;

pub mod port;
pub mod socket;
pub mod tcp;
pub mod utils;
pub mod window;

pub(crate) use utils::{Inbound, spawn_pump};

/// Callback invoked for every inbound message of a subscription.
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Duplex channel normalized to send/subscribe.
#[async_trait]
pub trait Channel: Send + Sync + Debug {
    /// Send a message together with the values whose ownership should move
    /// with it. Flavors without transfer support carry everything by value.
    async fn send(&self, message: Value, transfer: Vec<Value>) -> TransportResult<()>;

    /// Deliver every inbound message to `handler` until `cancel` fires.
    fn subscribe(&self, handler: MessageHandler, cancel: CancellationToken);

    /// Get transport statistics
    fn stats(&self) -> Option<TransportStats> {
        None
    }

    /// Get channel name/identifier
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Statistics collected by channel adapters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub transferables_sent: u64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: &TransportStats) {
        self.messages_sent += other.messages_sent;
        self.messages_received += other.messages_received;
        self.messages_dropped += other.messages_dropped;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
        self.transferables_sent += other.transferables_sent;
    }
}

impl std::fmt::Display for TransportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Transport Statistics:")?;
        writeln!(f, "  Messages sent:      {}", self.messages_sent)?;
        writeln!(f, "  Messages received:  {}", self.messages_received)?;
        writeln!(f, "  Messages dropped:   {}", self.messages_dropped)?;
        writeln!(f, "  Bytes sent:         {}", self.bytes_sent)?;
        writeln!(f, "  Bytes received:     {}", self.bytes_received)?;
        writeln!(f, "  Transferables sent: {}", self.transferables_sent)?;
        Ok(())
    }
}

struct Subscriber {
    handler: MessageHandler,
    cancel: CancellationToken,
}

/// Fan-out of inbound messages to every live subscription of one adapter.
#[derive(Default)]
pub(crate) struct Subscribers {
    entries: Mutex<Vec<Subscriber>>,
    // Fires when the owning adapter is dropped so its pump can exit.
    closed: CancellationToken,
}

impl Subscribers {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add(&self, handler: MessageHandler, cancel: CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        self.entries.lock().push(Subscriber { handler, cancel });
    }

    /// Hand `message` to every subscription that has not been cancelled.
    /// Returns the number of handlers that saw it.
    pub(crate) fn deliver(&self, message: Value) -> usize {
        let handlers: Vec<MessageHandler> = {
            let mut entries = self.entries.lock();
            entries.retain(|s| !s.cancel.is_cancelled());
            entries.iter().map(|s| s.handler.clone()).collect()
        };

        // Handlers run outside the lock so they may subscribe again.
        let count = handlers.len();
        if let Some((last, rest)) = handlers.split_last() {
            for handler in rest {
                handler(message.clone());
            }
            last(message);
        }
        count
    }

    pub(crate) fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub(crate) fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.retain(|s| !s.cancel.is_cancelled());
        entries.len()
    }
}

impl Drop for Subscribers {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.entries.lock().len())
            .finish()
    }
}

#[async_trait]
impl<T: Channel + ?Sized> Channel for Arc<T> {
    async fn send(&self, message: Value, transfer: Vec<Value>) -> TransportResult<()> {
        (**self).send(message, transfer).await
    }

    fn subscribe(&self, handler: MessageHandler, cancel: CancellationToken) {
        (**self).subscribe(handler, cancel)
    }

    fn stats(&self) -> Option<TransportStats> {
        (**self).stats()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T: Channel + ?Sized> Channel for Box<T> {
    async fn send(&self, message: Value, transfer: Vec<Value>) -> TransportResult<()> {
        (**self).send(message, transfer).await
    }

    fn subscribe(&self, handler: MessageHandler, cancel: CancellationToken) {
        (**self).subscribe(handler, cancel)
    }

    fn stats(&self) -> Option<TransportStats> {
        (**self).stats()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> MessageHandler {
        Arc::new(move |_msg| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_deliver_to_all_subscribers() {
        let subscribers = Subscribers::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        subscribers.add(counting_handler(a.clone()), CancellationToken::new());
        subscribers.add(counting_handler(b.clone()), CancellationToken::new());

        assert_eq!(subscribers.deliver(Value::from(1)), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancelled_subscription_stops_receiving() {
        let subscribers = Subscribers::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        subscribers.add(counting_handler(counter.clone()), cancel.clone());
        subscribers.deliver(Value::Null);
        cancel.cancel();
        subscribers.deliver(Value::Null);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(subscribers.len(), 0);
    }

    #[test]
    fn test_stats_merge() {
        let mut total = TransportStats::new();
        total.merge(&TransportStats {
            messages_sent: 2,
            bytes_sent: 10,
            ..Default::default()
        });
        total.merge(&TransportStats {
            messages_sent: 1,
            messages_dropped: 4,
            ..Default::default()
        });
        assert_eq!(total.messages_sent, 3);
        assert_eq!(total.bytes_sent, 10);
        assert_eq!(total.messages_dropped, 4);
    }
}
