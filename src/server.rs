use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::dispatch::dispatch;
use crate::message::Envelope;
use crate::message::types::{CallId, CallPayload, NamespaceId};
use crate::methods::Methods;
use crate::references::RemoteReferences;
use crate::transfer::extract_value;
use crate::transport::Channel;
use crate::value::Value;

/// Exposing endpoint: answers calls against a method tree.
///
/// Each [`RpcServer::expose`] runs against its own remote reference
/// registry, so handles issued on one channel mean nothing on another.
#[derive(Clone)]
pub struct RpcServer {
    methods: Arc<Methods>,
    references: Arc<RemoteReferences>,
}

impl RpcServer {
    pub fn new(methods: Methods) -> Self {
        Self {
            methods: Arc::new(methods),
            references: Arc::new(RemoteReferences::new()),
        }
    }

    pub fn methods(&self) -> &Methods {
        &self.methods
    }

    pub fn references(&self) -> &RemoteReferences {
        &self.references
    }

    /// Answer one request. Never fails: every problem becomes an Error envelope.
    pub async fn handle_request(&self, id: CallId, payload: CallPayload) -> Envelope {
        let CallPayload { topic, args } = payload;
        match dispatch(&self.methods, &self.references, &topic, args).await {
            Ok(reply) => Envelope::response(id, reply),
            Err(error) => Envelope::error(id, error),
        }
    }

    /// Serve requests arriving on `channel` until the returned handle is shut down.
    pub fn expose(&self, channel: Arc<dyn Channel>) -> ServerHandle {
        let session = RpcServer {
            methods: self.methods.clone(),
            references: Arc::new(RemoteReferences::new()),
        };
        let references = session.references.clone();
        let cancel = CancellationToken::new();
        let replies = channel.clone();
        let channel_name = channel.name().to_string();

        channel.subscribe(
            Arc::new(move |message: Value| {
                let (id, payload) = match Envelope::parse(message) {
                    Ok(Envelope::Request { id, payload }) => (id, payload),
                    // Replies on a shared channel belong to a calling endpoint.
                    Ok(_) => return,
                    Err(e) => {
                        tracing::debug!(channel = %channel_name, error = %e, "ignoring inbound message");
                        return;
                    }
                };

                tracing::trace!(channel = %channel_name, id = %id, topic = %payload.topic, "handling call");
                let session = session.clone();
                let replies = replies.clone();
                let channel_name = channel_name.clone();
                tokio::spawn(async move {
                    let reply = session.handle_request(id, payload).await;
                    let (reply, transferables) = extract_value(&reply.into_value());
                    if let Err(e) = replies.send(reply, transferables).await {
                        tracing::warn!(channel = %channel_name, id = %id, error = %e, "failed to send reply");
                    }
                });
            }),
            cancel.clone(),
        );

        ServerHandle { cancel, references }
    }
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("methods", &self.methods.names().collect::<Vec<_>>())
            .field("references", &self.references.len())
            .finish()
    }
}

/// Expose `methods` on `channel`.
pub fn expose(methods: Methods, channel: Arc<dyn Channel>) -> ServerHandle {
    RpcServer::new(methods).expose(channel)
}

/// A running exposure. It stays active until [`ServerHandle::shutdown`];
/// dropping the handle does not stop it.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    cancel: CancellationToken,
    references: Arc<RemoteReferences>,
}

impl ServerHandle {
    /// Stop accepting requests. Calls already running still send their reply.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Forget a remote reference; later calls through it fail as unknown.
    pub fn release(&self, id: &NamespaceId) -> bool {
        self.references.release(id)
    }

    /// Ids of the remote references issued on this exposure and not yet released.
    pub fn live_references(&self) -> Vec<NamespaceId> {
        self.references.ids()
    }
}
