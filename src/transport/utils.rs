use async_trait::async_trait;
use std::sync::{Arc, Weak};

use super::Subscribers;
use crate::value::Value;

/// Raw inbound side of a channel flavor. `None` means the source is closed.
#[async_trait]
pub(crate) trait Inbound: Send + Sync + 'static {
    async fn next_message(&self) -> Option<Value>;
}

/// Spawns the task that moves inbound messages to subscribers while the owner exists.
///
/// The task holds the owner weakly and also stops as soon as the owner is
/// dropped, even if the source never produces another message.
pub(crate) fn spawn_pump<S: Inbound>(owner: &Arc<Subscribers>, source: Arc<S>, name: String) {
    let closed = owner.closed();
    let owner: Weak<Subscribers> = Arc::downgrade(owner);
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = closed.cancelled() => break,
                message = source.next_message() => message,
            };
            let Some(message) = message else { break };

            if let Some(subscribers) = owner.upgrade() {
                let delivered = subscribers.deliver(message);
                tracing::trace!(channel = %name, delivered, "inbound message");
            } else {
                // Adapter dropped, stop the pump
                break;
            }
        }
        tracing::debug!(channel = %name, "inbound pump stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Source that never yields and records when the pump lets go of it.
    struct Silent {
        released: Arc<AtomicBool>,
    }

    impl Drop for Silent {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Inbound for Silent {
        async fn next_message(&self) -> Option<Value> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_pump_stops_when_owner_dropped_on_quiet_source() {
        let released = Arc::new(AtomicBool::new(false));
        let owner = Subscribers::new();
        spawn_pump(
            &owner,
            Arc::new(Silent {
                released: released.clone(),
            }),
            "quiet".to_string(),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!released.load(Ordering::SeqCst));

        drop(owner);
        for _ in 0..50 {
            if released.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(released.load(Ordering::SeqCst));
    }
}
