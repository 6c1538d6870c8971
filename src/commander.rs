//! Caller-side call-path builder.
//!
//! A [`Commander`] accumulates member names into a topic path without side
//! effects; [`Commander::call`] sends the path plus arguments through an
//! [`Invoke`] implementation. Builders are immutable values, so every chain
//! starts from a clean path and a builder can be reused for any number of
//! independent calls.
//!
//! ```ignore
//! let sum = commander.get("math")?.get("add")?.call(args![2, 3]).await?;
//! let counter = commander.call_method("init", args![10]).await?.into_object()?;
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::error::{Result, RpcError};
use crate::message::types::{NamespaceId, ReplyPayload, Scope, TopicPath};
use crate::value::Value;

/// Name probed by await-style coordination to decide whether something can
/// be awaited. It is never treated as a member name.
pub const AWAITABLE_PROBE: &str = "then";

/// Sends one call and waits for its settlement.
#[async_trait]
pub trait Invoke: Send + Sync {
    async fn invoke(&self, topic: TopicPath, args: Vec<Value>) -> Result<ReplyPayload>;
}

/// Build an argument list from anything convertible to [`Value`].
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::Value>::new() };
    ($($arg:expr),+ $(,)?) => { ::std::vec![$($crate::Value::from($arg)),+] };
}

/// Settled result of a remote call.
#[derive(Debug, Clone)]
pub enum Remote {
    Value(Value),
    /// The far side handed out an object; calls on it go through this commander.
    Object(Commander),
}

impl Remote {
    pub fn into_value(self) -> Result<Value> {
        match self {
            Remote::Value(value) => Ok(value),
            Remote::Object(commander) => Err(RpcError::UnexpectedReply(format!(
                "expected a value, got a remote reference to {}",
                commander.scope_label()
            ))),
        }
    }

    pub fn into_object(self) -> Result<Commander> {
        match self {
            Remote::Object(commander) => Ok(commander),
            Remote::Value(value) => Err(RpcError::UnexpectedReply(format!(
                "expected a remote reference, got {}",
                value
            ))),
        }
    }
}

#[derive(Clone)]
pub struct Commander {
    invoker: Arc<dyn Invoke>,
    scope: Scope,
    path: Vec<String>,
}

impl Commander {
    /// Root builder: paths resolve against the exposed tree.
    pub fn new(invoker: Arc<dyn Invoke>) -> Self {
        Self {
            invoker,
            scope: Scope::Root,
            path: Vec::new(),
        }
    }

    /// Builder whose paths are prefixed with a remote reference.
    pub fn scoped(invoker: Arc<dyn Invoke>, namespace: NamespaceId) -> Self {
        Self {
            invoker,
            scope: Scope::Namespace(namespace),
            path: Vec::new(),
        }
    }

    /// Extend the path by one member. Returns `None` for the awaitable probe.
    pub fn get(&self, name: &str) -> Option<Self> {
        if name == AWAITABLE_PROBE {
            return None;
        }
        let mut next = self.clone();
        next.path.push(name.to_string());
        Some(next)
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn topic(&self) -> TopicPath {
        TopicPath {
            scope: self.scope.clone(),
            path: self.path.clone(),
        }
    }

    /// Call the accumulated path with `args`.
    pub async fn call(&self, args: Vec<Value>) -> Result<Remote> {
        if self.path.is_empty() {
            return Err(RpcError::EmptyTopicPath);
        }

        match self.invoker.invoke(self.topic(), args).await? {
            ReplyPayload::Value(value) => Ok(Remote::Value(value)),
            ReplyPayload::Handle(handle) => Ok(Remote::Object(Commander::scoped(
                self.invoker.clone(),
                handle.namespace_id,
            ))),
        }
    }

    /// `get(name)` followed by `call(args)`.
    pub async fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Remote> {
        let target = self
            .get(name)
            .ok_or_else(|| RpcError::ReservedName(name.to_string()))?;
        target.call(args).await
    }

    /// Call and decode the resulting value into `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, args: Vec<Value>) -> Result<T> {
        self.call(args).await?.into_value()?.decode()
    }

    fn scope_label(&self) -> String {
        match &self.scope {
            Scope::Root => "the root object".to_string(),
            Scope::Namespace(namespace) => namespace.to_string(),
        }
    }
}

impl std::fmt::Debug for Commander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commander")
            .field("scope", &self.scope)
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::types::RemoteHandle;
    use parking_lot::Mutex;

    /// Records every invocation and answers from a fixed script.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(TopicPath, Vec<Value>)>>,
        handle_for: Option<String>,
    }

    #[async_trait]
    impl Invoke for Recorder {
        async fn invoke(&self, topic: TopicPath, args: Vec<Value>) -> Result<ReplyPayload> {
            let reply = match (&self.handle_for, topic.path.last()) {
                (Some(name), Some(last)) if name == last => ReplyPayload::Handle(RemoteHandle {
                    namespace_id: NamespaceId::parse("__rpc_handle_7").unwrap(),
                }),
                _ => ReplyPayload::Value(Value::from(topic.path.len() as i64)),
            };
            self.calls.lock().push((topic, args));
            Ok(reply)
        }
    }

    #[tokio::test]
    async fn test_path_accumulates_without_side_effects() {
        let recorder = Arc::new(Recorder::default());
        let root = Commander::new(recorder.clone());

        let add = root.get("math").unwrap().get("add").unwrap();
        assert_eq!(add.path(), ["math", "add"]);
        assert!(recorder.calls.lock().is_empty());

        add.call(args![2, 3]).await.unwrap();
        let calls = recorder.calls.lock();
        assert_eq!(calls[0].0, TopicPath::root(["math", "add"]));
        assert_eq!(calls[0].1, vec![Value::from(2), Value::from(3)]);
    }

    #[tokio::test]
    async fn test_chains_are_independent() {
        let recorder = Arc::new(Recorder::default());
        let root = Commander::new(recorder.clone());

        root.call_method("first", args![]).await.unwrap();
        root.call_method("second", args![]).await.unwrap();

        let calls = recorder.calls.lock();
        assert_eq!(calls[0].0.path, vec!["first"]);
        assert_eq!(calls[1].0.path, vec!["second"]);
        assert!(root.path().is_empty());
    }

    #[tokio::test]
    async fn test_awaitable_probe_is_not_a_member() {
        let root = Commander::new(Arc::new(Recorder::default()));
        assert!(root.get(AWAITABLE_PROBE).is_none());
        assert!(root.get("math").unwrap().get("then").is_none());

        let err = root.call_method("then", args![]).await.unwrap_err();
        assert!(matches!(err, RpcError::ReservedName(_)));
    }

    #[tokio::test]
    async fn test_empty_path_is_rejected() {
        let root = Commander::new(Arc::new(Recorder::default()));
        assert!(matches!(
            root.call(args![]).await,
            Err(RpcError::EmptyTopicPath)
        ));
    }

    #[tokio::test]
    async fn test_handle_becomes_scoped_commander() {
        let recorder = Arc::new(Recorder {
            handle_for: Some("init".to_string()),
            ..Default::default()
        });
        let root = Commander::new(recorder.clone());

        let counter = root
            .call_method("init", args![10])
            .await
            .unwrap()
            .into_object()
            .unwrap();
        counter.call_method("multiply", args![5]).await.unwrap();

        let calls = recorder.calls.lock();
        assert_eq!(
            calls[1].0.to_topics(),
            vec!["__rpc_handle_7".to_string(), "multiply".to_string()]
        );
    }

    #[tokio::test]
    async fn test_call_as_decodes_value() {
        let root = Commander::new(Arc::new(Recorder::default()));
        let depth: u32 = root.get("a").unwrap().get("b").unwrap().call_as(args![]).await.unwrap();
        assert_eq!(depth, 2);

        let err = root
            .call_method("x", args![])
            .await
            .unwrap()
            .into_object()
            .unwrap_err();
        assert!(matches!(err, RpcError::UnexpectedReply(_)));
    }
}
