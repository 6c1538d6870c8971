//! Registry of objects handed out as remote references.
//!
//! Every exposing endpoint owns one registry. Ids come from a counter that
//! only moves forward, so a released id is never handed out again.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::message::types::NamespaceId;
use crate::methods::Methods;

#[derive(Debug, Default)]
struct Entries {
    next: u64,
    objects: HashMap<NamespaceId, Arc<Methods>>,
}

#[derive(Debug, Default)]
pub struct RemoteReferences {
    entries: RwLock<Entries>,
}

impl RemoteReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object under a fresh id.
    pub fn insert(&self, methods: Methods) -> NamespaceId {
        let mut entries = self.entries.write();
        let id = NamespaceId::from_sequence(entries.next);
        entries.next += 1;
        entries.objects.insert(id.clone(), Arc::new(methods));
        id
    }

    pub fn get(&self, id: &NamespaceId) -> Option<Arc<Methods>> {
        self.entries.read().objects.get(id).cloned()
    }

    /// Drop the object behind `id`. Calls already running against it finish normally.
    pub fn release(&self, id: &NamespaceId) -> bool {
        self.entries.write().objects.remove(id).is_some()
    }

    pub fn ids(&self) -> Vec<NamespaceId> {
        self.entries.read().objects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
