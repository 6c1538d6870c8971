use std::fmt;

use crate::value::Value;

pub const REQUEST_ID_KEY: &str = "rpcRequestId";
pub const RESPONSE_ID_KEY: &str = "rpcResponseId";
pub const ERROR_ID_KEY: &str = "rpcErrorId";

pub const PAYLOAD_KEY: &str = "payload";
pub const ERROR_KEY: &str = "error";
pub const KIND_KEY: &str = "kind";
pub const TOPICS_KEY: &str = "topics";
pub const ARGS_KEY: &str = "args";
pub const NAMESPACE_ID_KEY: &str = "namespaceId";

pub const RPC_CALL_KIND: &str = "rpc-call";
pub const REMOTE_HANDLE_KIND: &str = "remote-handle";

/// Leading topic segments starting with this prefix address a remote reference.
pub const NAMESPACE_PREFIX: &str = "__rpc_handle_";

/// Correlation id of one outstanding call, unique per calling endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

impl CallId {
    pub fn from_raw(id: u64) -> Self {
        CallId(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an object handed out as a remote reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(String);

impl NamespaceId {
    pub(crate) fn from_sequence(n: u64) -> Self {
        NamespaceId(format!("{}{}", NAMESPACE_PREFIX, n))
    }

    /// Accepts only strings carrying the reserved prefix plus a non-empty suffix.
    /// Inbound topic paths route on the prefix alone, see [`TopicPath::from_topics`].
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.strip_prefix(NAMESPACE_PREFIX) {
            Some(rest) if !rest.is_empty() => Some(NamespaceId(raw.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a topic path starts resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Root,
    Namespace(NamespaceId),
}

/// Method address: a scope plus the member names walked from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPath {
    pub scope: Scope,
    pub path: Vec<String>,
}

impl TopicPath {
    pub fn root<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scope: Scope::Root,
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    pub fn scoped<I, S>(namespace: NamespaceId, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scope: Scope::Namespace(namespace),
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from wire topics. The leading segment decides the scope; every
    /// segment must be non-empty and there must be at least one.
    pub fn from_topics(topics: Vec<String>) -> Option<Self> {
        if topics.is_empty() || topics.iter().any(String::is_empty) {
            return None;
        }

        let mut topics = topics.into_iter();
        let first = topics.next()?;
        // Anything carrying the prefix is looked up as a reference, even the
        // bare prefix, which then fails as unknown.
        if first.starts_with(NAMESPACE_PREFIX) {
            Some(Self::scoped(NamespaceId(first), topics))
        } else {
            Some(Self {
                scope: Scope::Root,
                path: std::iter::once(first).chain(topics).collect(),
            })
        }
    }

    pub fn to_topics(&self) -> Vec<String> {
        let mut topics = Vec::with_capacity(self.path.len() + 1);
        if let Scope::Namespace(namespace) = &self.scope {
            topics.push(namespace.as_str().to_string());
        }
        topics.extend(self.path.iter().cloned());
        topics
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_topics().join("."))
    }
}

/// Body of a Request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPayload {
    pub topic: TopicPath,
    pub args: Vec<Value>,
}

/// Wire stand-in for an object created on the exposing side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHandle {
    pub namespace_id: NamespaceId,
}

/// Body of a Response envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPayload {
    Value(Value),
    Handle(RemoteHandle),
}

impl From<Value> for ReplyPayload {
    fn from(value: Value) -> Self {
        ReplyPayload::Value(value)
    }
}
