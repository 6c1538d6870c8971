//! Call dispatch on the exposing side: resolve a topic path to a method,
//! run it, and turn its outcome into a reply payload.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

use crate::message::types::{RemoteHandle, ReplyPayload, Scope, TopicPath};
use crate::methods::{Member, Method, Methods, Outcome};
use crate::references::RemoteReferences;
use crate::value::Value;

/// Error `name` carried by dispatch failures, so callers can tell them
/// apart from errors raised by the methods themselves.
pub const DISPATCH_ERROR_NAME: &str = "DispatchError";
pub const PANIC_ERROR_NAME: &str = "Panic";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Unresolvable topic path: {path}")]
    UnresolvablePath { path: String },

    #[error("Unknown remote reference: {namespace}")]
    UnknownReference { namespace: String },
}

impl DispatchError {
    /// Error record sent back to the caller.
    pub fn to_value(&self) -> Value {
        Value::named_error(DISPATCH_ERROR_NAME, self.to_string())
    }
}

/// Walk `path` through nested namespaces; the last segment must name a method.
pub fn resolve(methods: &Methods, path: &[String]) -> Result<Arc<dyn Method>, DispatchError> {
    let unresolvable = || DispatchError::UnresolvablePath {
        path: path.join("."),
    };

    let (last, parents) = path.split_last().ok_or_else(unresolvable)?;
    let mut current = methods;
    for segment in parents {
        match current.get(segment) {
            Some(Member::Namespace(inner)) => current = inner,
            _ => return Err(unresolvable()),
        }
    }

    match current.get(last) {
        Some(Member::Method(method)) => Ok(method.clone()),
        _ => Err(unresolvable()),
    }
}

/// Route a call to the root tree or to a referenced object, run it and
/// post-process the outcome. Every failure comes back as an error value.
pub async fn dispatch(
    root: &Methods,
    references: &RemoteReferences,
    topic: &TopicPath,
    args: Vec<Value>,
) -> Result<ReplyPayload, Value> {
    let method = match &topic.scope {
        Scope::Root => resolve(root, &topic.path),
        Scope::Namespace(namespace) => match references.get(namespace) {
            Some(object) => resolve(&object, &topic.path).map_err(|_| {
                DispatchError::UnresolvablePath {
                    path: topic.to_string(),
                }
            }),
            None => Err(DispatchError::UnknownReference {
                namespace: namespace.to_string(),
            }),
        },
    }
    .map_err(|e| {
        tracing::debug!(topic = %topic, error = %e, "dispatch failed");
        e.to_value()
    })?;

    let outcome = match AssertUnwindSafe(method.call(args)).catch_unwind().await {
        Ok(result) => result?,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!(topic = %topic, panic = %message, "exposed method panicked");
            return Err(Value::named_error(PANIC_ERROR_NAME, message));
        }
    };

    Ok(match outcome {
        Outcome::Value(value) => ReplyPayload::Value(value),
        Outcome::Remote(methods) => {
            let namespace_id = references.insert(methods);
            tracing::trace!(topic = %topic, namespace = %namespace_id, "issued remote reference");
            ReplyPayload::Handle(RemoteHandle { namespace_id })
        }
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "exposed method panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::types::NamespaceId;
    use crate::methods::remote;
    use parking_lot::Mutex;

    fn path(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn counter_object() -> Methods {
        Methods::new().method_sync("getValue", |_| Ok(42))
    }

    #[tokio::test]
    async fn test_nested_path_receives_args_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let root = Methods::new().namespace(
            "a",
            Methods::new().namespace(
                "b",
                Methods::new().method_sync("c", move |args| {
                    *recorder.lock() = args;
                    Ok(())
                }),
            ),
        );

        let topic = TopicPath::root(["a", "b", "c"]);
        let args = vec![Value::from(1), Value::from("two"), Value::from(3.0)];
        let reply = dispatch(&root, &RemoteReferences::new(), &topic, args.clone()).await;

        assert_eq!(reply, Ok(ReplyPayload::Value(Value::Null)));
        assert_eq!(*seen.lock(), args);
    }

    #[test]
    fn test_non_method_is_unresolvable() {
        let root = Methods::new()
            .property("version", "1.0")
            .namespace("math", Methods::new());

        let cases: [&[&str]; 5] = [&["version"], &["math"], &["math", "add"], &["missing"], &[]];
        for raw in cases {
            let err = resolve(&root, &path(raw)).err().unwrap();
            assert!(matches!(err, DispatchError::UnresolvablePath { .. }));
        }
    }

    #[tokio::test]
    async fn test_unresolvable_error_names_the_path() {
        let root = Methods::new().property("a", Value::record([("b", 1)]));
        let topic = TopicPath::root(["a", "b", "c"]);

        let err = dispatch(&root, &RemoteReferences::new(), &topic, Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.get("name").and_then(Value::as_str), Some(DISPATCH_ERROR_NAME));
        assert_eq!(err.error_message(), Some("Unresolvable topic path: a.b.c"));
    }

    #[tokio::test]
    async fn test_handle_then_call_through_namespace() {
        let root = Methods::new().method_sync("open", |_| Ok(remote(counter_object())));
        let refs = RemoteReferences::new();

        let reply = dispatch(&root, &refs, &TopicPath::root(["open"]), Vec::new())
            .await
            .unwrap();
        let handle = match reply {
            ReplyPayload::Handle(handle) => handle,
            other => panic!("expected a handle, got {:?}", other),
        };
        assert_eq!(refs.len(), 1);

        let topic = TopicPath::scoped(handle.namespace_id, ["getValue"]);
        let value = dispatch(&root, &refs, &topic, Vec::new()).await;
        assert_eq!(value, Ok(ReplyPayload::Value(Value::from(42))));
    }

    #[tokio::test]
    async fn test_unknown_reference_is_reported() {
        let root = counter_object();
        let topic = TopicPath::scoped(NamespaceId::parse("__rpc_handle_999").unwrap(), ["getValue"]);

        let err = dispatch(&root, &RemoteReferences::new(), &topic, Vec::new())
            .await
            .unwrap_err();
        let message = err.error_message().unwrap();
        assert!(message.contains("Unknown remote reference"));
        assert!(message.contains("__rpc_handle_999"));
    }

    #[tokio::test]
    async fn test_bare_prefix_is_an_unknown_reference() {
        let root = counter_object();
        let topic = TopicPath::from_topics(path(&["__rpc_handle_", "getValue"])).unwrap();

        let err = dispatch(&root, &RemoteReferences::new(), &topic, Vec::new())
            .await
            .unwrap_err();
        assert!(err.error_message().unwrap().contains("Unknown remote reference"));
    }

    #[tokio::test]
    async fn test_nested_handles() {
        let root = Methods::new().method_sync("outer", |_| {
            Ok(remote(Methods::new().method_sync("inner", |_| {
                Ok(remote(counter_object()))
            })))
        });
        let refs = RemoteReferences::new();

        let Ok(ReplyPayload::Handle(outer)) =
            dispatch(&root, &refs, &TopicPath::root(["outer"]), Vec::new()).await
        else {
            panic!("outer did not return a handle");
        };
        let inner_topic = TopicPath::scoped(outer.namespace_id.clone(), ["inner"]);
        let Ok(ReplyPayload::Handle(inner)) = dispatch(&root, &refs, &inner_topic, Vec::new()).await
        else {
            panic!("inner did not return a handle");
        };
        assert_ne!(outer.namespace_id, inner.namespace_id);

        let topic = TopicPath::scoped(inner.namespace_id, ["getValue"]);
        assert_eq!(
            dispatch(&root, &refs, &topic, Vec::new()).await,
            Ok(ReplyPayload::Value(Value::from(42)))
        );
    }

    #[tokio::test]
    async fn test_method_error_is_forwarded_untouched() {
        let custom = Value::record([("code", Value::from(7)), ("detail", Value::from("nope"))]);
        let raised = custom.clone();
        let root = Methods::new().method_sync("fail", move |_| Err::<(), _>(raised.clone()));

        let err = dispatch(&root, &RemoteReferences::new(), &TopicPath::root(["fail"]), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err, custom);
    }

    #[tokio::test]
    async fn test_panic_becomes_error_value() {
        let root = Methods::new().method_sync("explode", |_| -> Result<(), Value> {
            panic!("kaboom")
        });

        let err = dispatch(&root, &RemoteReferences::new(), &TopicPath::root(["explode"]), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.get("name").and_then(Value::as_str), Some(PANIC_ERROR_NAME));
        assert_eq!(err.error_message(), Some("kaboom"));
    }
}
