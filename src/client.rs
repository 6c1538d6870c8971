use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::commander::{Commander, Invoke};
use crate::error::{Result, RpcError};
use crate::message::Envelope;
use crate::message::types::{CallId, ReplyPayload, TopicPath};
use crate::pending::{PendingCalls, Settlement};
use crate::transfer::{Extracted, extract};
use crate::transport::Channel;
use crate::value::Value;

/// Calling-side configuration
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Give up on a call after this long. `None` waits forever.
    pub call_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// Calling endpoint bound to one channel.
#[derive(Clone)]
pub struct RpcClient {
    channel: Arc<dyn Channel>,
    pending: Arc<PendingCalls>,
    config: ClientConfig,
}

impl RpcClient {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self::with_config(channel, ClientConfig::default())
    }

    pub fn with_config(channel: Arc<dyn Channel>, config: ClientConfig) -> Self {
        Self {
            channel,
            pending: Arc::new(PendingCalls::new()),
            config,
        }
    }

    /// Subscribe to the channel and settle pending calls as replies arrive.
    ///
    /// Shutting the returned handle down stops reply handling only. Calls
    /// still waiting at that point stay pending unless a call timeout is
    /// configured.
    pub fn start(&self) -> ClientHandle {
        let cancel = CancellationToken::new();
        let pending = self.pending.clone();
        let channel_name = self.channel.name().to_string();

        self.channel.subscribe(
            Arc::new(move |message: Value| match Envelope::parse(message) {
                Ok(Envelope::Response { id, payload }) => match pending.free(id) {
                    Some(call) => {
                        tracing::trace!(channel = %channel_name, id = %id, "call resolved");
                        call.resolve(payload);
                    }
                    None => tracing::trace!(channel = %channel_name, id = %id, "reply for unknown id"),
                },
                Ok(Envelope::Error { id, error }) => match pending.free(id) {
                    Some(call) => {
                        tracing::trace!(channel = %channel_name, id = %id, "call rejected");
                        call.reject(error);
                    }
                    None => tracing::trace!(channel = %channel_name, id = %id, "error for unknown id"),
                },
                // Requests on a shared channel belong to an exposing endpoint.
                Ok(Envelope::Request { .. }) => {}
                Err(e) => {
                    tracing::debug!(channel = %channel_name, error = %e, "ignoring inbound message");
                }
            }),
            cancel.clone(),
        );

        ClientHandle { cancel }
    }

    /// Root call-path builder for this client.
    pub fn commander(&self) -> Commander {
        Commander::new(Arc::new(self.clone()))
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    async fn await_settlement(
        &self,
        id: CallId,
        rx: oneshot::Receiver<Settlement>,
    ) -> Result<ReplyPayload> {
        let settlement = match self.config.call_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(settlement) => settlement,
                Err(_) => {
                    self.pending.free(id);
                    return Err(RpcError::Timeout {
                        id,
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            },
            None => rx.await,
        };

        settlement
            .map_err(|_| RpcError::ConnectionClosed)?
            .map_err(RpcError::Remote)
    }
}

#[async_trait]
impl Invoke for RpcClient {
    async fn invoke(&self, topic: TopicPath, args: Vec<Value>) -> Result<ReplyPayload> {
        if topic.is_empty() {
            return Err(RpcError::EmptyTopicPath);
        }

        let Extracted {
            args,
            transferables,
        } = extract(&args);
        let (tx, rx) = oneshot::channel();
        let id = self.pending.register(tx);
        tracing::trace!(
            channel = %self.channel.name(),
            id = %id,
            topic = %topic,
            transferables = transferables.len(),
            "sending call"
        );

        let request = Envelope::request(id, topic, args).into_value();
        if let Err(e) = self.channel.send(request, transferables).await {
            self.pending.free(id);
            return Err(RpcError::Transport(e));
        }

        self.await_settlement(id, rx).await
    }
}

impl Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("channel", &self.channel.name())
            .field("pending_calls", &self.pending.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Subscription of a started [`RpcClient`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    cancel: CancellationToken,
}

impl ClientHandle {
    /// Stop handling replies on this subscription.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Start a client on `channel` and return its root call-path builder.
pub fn wrap(channel: Arc<dyn Channel>) -> Commander {
    let client = RpcClient::new(channel);
    client.start();
    client.commander()
}
