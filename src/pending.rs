//! Registry correlating in-flight calls with their eventual reply.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::message::types::{CallId, ReplyPayload};
use crate::value::Value;

/// How a call settles: the reply payload or the raw remote error value.
pub type Settlement = std::result::Result<ReplyPayload, Value>;

/// A call waiting for its reply.
#[derive(Debug)]
pub struct PendingCall {
    id: CallId,
    settle: oneshot::Sender<Settlement>,
}

impl PendingCall {
    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn resolve(self, payload: ReplyPayload) {
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.settle.send(Ok(payload));
    }

    pub fn reject(self, error: Value) {
        let _ = self.settle.send(Err(error));
    }
}

#[derive(Debug, Default)]
struct Slots {
    next_id: u64,
    calls: HashMap<CallId, PendingCall>,
}

/// Id-keyed table of outstanding calls for one calling endpoint.
#[derive(Debug, Default)]
pub struct PendingCalls {
    slots: Mutex<Slots>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a settlement sender under the next unused id.
    pub fn register(&self, settle: oneshot::Sender<Settlement>) -> CallId {
        let mut slots = self.slots.lock();
        let id = loop {
            let candidate = CallId(slots.next_id);
            slots.next_id = slots.next_id.wrapping_add(1);
            if !slots.calls.contains_key(&candidate) {
                break candidate;
            }
        };
        slots.calls.insert(id, PendingCall { id, settle });
        id
    }

    /// Remove and return the entry for `id`; `None` for ids that are not outstanding.
    pub fn free(&self, id: CallId) -> Option<PendingCall> {
        self.slots.lock().calls.remove(&id)
    }

    pub fn contains(&self, id: CallId) -> bool {
        self.slots.lock().calls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
