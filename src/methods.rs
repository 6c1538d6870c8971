//! The exposed method tree.
//!
//! An exposing endpoint publishes a [`Methods`] tree: named members that
//! are either callable methods, nested namespaces or plain properties. A
//! method settles with an [`Outcome`]: a value to send back, or a new
//! [`Methods`] tree to hand out as a remote reference. Outcomes only come
//! from code running on the exposing side; nothing on the wire can produce
//! one.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::value::{Record, Value};

/// What a method settles with; the error side is forwarded opaquely.
pub type MethodResult = std::result::Result<Outcome, Value>;

/// Successful result of a method.
#[derive(Clone)]
pub enum Outcome {
    Value(Value),
    /// Make the wrapped tree independently callable from the far side.
    Remote(Methods),
}

/// Wrap a method tree so the caller receives a remote reference to it.
pub fn remote(methods: Methods) -> Outcome {
    Outcome::Remote(methods)
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Outcome::Remote(methods) => f.debug_tuple("Remote").field(methods).finish(),
        }
    }
}

impl From<Methods> for Outcome {
    fn from(methods: Methods) -> Self {
        Outcome::Remote(methods)
    }
}

macro_rules! impl_outcome_from_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Outcome {
            fn from(v: $ty) -> Self {
                Outcome::Value(Value::from(v))
            }
        })*
    };
}

impl_outcome_from_value!(
    Value, (), bool, i8, i16, i32, i64, u8, u16, u32, f32, f64, String, &str, Bytes, Vec<Value>,
    Record
);

#[async_trait]
pub trait Method: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> MethodResult;
}

/// Method backed by an async closure over the raw argument list.
pub struct FnMethod<F> {
    func: F,
}

impl<F> FnMethod<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut, O> Method for FnMethod<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<O, Value>> + Send + 'static,
    O: Into<Outcome> + 'static,
{
    async fn call(&self, args: Vec<Value>) -> MethodResult {
        (self.func)(args).await.map(Into::into)
    }
}

/// Method whose argument list is decoded into `Req` and whose result is encoded from `Resp`.
pub struct TypedMethod<Req, Resp, F> {
    func: F,
    _phantom: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp, F> TypedMethod<Req, Resp, F> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<Req, Resp, F, Fut> Method for TypedMethod<Req, Resp, F>
where
    Req: for<'de> Deserialize<'de> + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Resp, Value>> + Send + 'static,
{
    async fn call(&self, args: Vec<Value>) -> MethodResult {
        let req: Req = Value::Array(args)
            .decode()
            .map_err(|e| Value::named_error("TypeError", e.to_string()))?;
        let resp = (self.func)(req).await?;
        Value::from_serde(&resp)
            .map(Outcome::Value)
            .map_err(|e| Value::named_error("TypeError", e.to_string()))
    }
}

/// One named entry of a method tree.
#[derive(Clone)]
pub enum Member {
    Method(Arc<dyn Method>),
    Namespace(Methods),
    Property(Value),
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Member::Method(_) => f.write_str("Method"),
            Member::Namespace(methods) => f.debug_tuple("Namespace").field(methods).finish(),
            Member::Property(value) => f.debug_tuple("Property").field(value).finish(),
        }
    }
}

/// Tree of exposed members, built with the chaining methods below.
#[derive(Clone, Default)]
pub struct Methods {
    members: BTreeMap<String, Member>,
}

impl Methods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an async method over the raw argument list.
    pub fn method<F, Fut, O>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, Value>> + Send + 'static,
        O: Into<Outcome> + 'static,
    {
        self.member(name, Member::Method(Arc::new(FnMethod::new(func))))
    }

    /// Add a synchronous method over the raw argument list.
    pub fn method_sync<F, O>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> std::result::Result<O, Value> + Send + Sync + 'static,
        O: Into<Outcome> + Send + 'static,
    {
        let func = Arc::new(func);
        self.method(name, move |args| {
            let func = func.clone();
            async move { func(args) }
        })
    }

    /// Add a method with serde-typed arguments and result. The argument list
    /// is decoded as a whole, so `Req` is usually a tuple.
    pub fn typed<Req, Resp, F, Fut>(self, name: impl Into<String>, func: F) -> Self
    where
        Req: for<'de> Deserialize<'de> + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Resp, Value>> + Send + 'static,
    {
        self.member(name, Member::Method(Arc::new(TypedMethod::new(func))))
    }

    pub fn namespace(self, name: impl Into<String>, methods: Methods) -> Self {
        self.member(name, Member::Namespace(methods))
    }

    pub fn property(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.member(name, Member::Property(value.into()))
    }

    pub fn member(mut self, name: impl Into<String>, member: Member) -> Self {
        self.insert(name, member);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, member: Member) -> Option<Member> {
        self.members.insert(name.into(), member)
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl std::fmt::Debug for Methods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.members.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call(methods: &Methods, name: &str, args: Vec<Value>) -> MethodResult {
        match methods.get(name) {
            Some(Member::Method(method)) => method.call(args).await,
            other => panic!("{} is not a method: {:?}", name, other),
        }
    }

    #[tokio::test]
    async fn test_async_and_sync_methods() {
        let methods = Methods::new()
            .method("double", |args: Vec<Value>| async move {
                let n = args[0].as_i64().ok_or_else(|| Value::error("not a number"))?;
                Ok::<_, Value>(n * 2)
            })
            .method_sync("hello", |_args| Ok("world"));

        let doubled = call(&methods, "double", vec![Value::from(21)]).await.unwrap();
        assert!(matches!(doubled, Outcome::Value(Value::Int(42))));

        let hello = call(&methods, "hello", Vec::new()).await.unwrap();
        assert!(matches!(hello, Outcome::Value(Value::String(ref s)) if s == "world"));
    }

    #[tokio::test]
    async fn test_typed_method() {
        let methods = Methods::new().typed("add", |(a, b): (i64, i64)| async move {
            Ok::<_, Value>(a + b)
        });

        let sum = call(&methods, "add", vec![Value::from(2), Value::from(3)])
            .await
            .unwrap();
        assert!(matches!(sum, Outcome::Value(Value::Int(5))));

        let err = call(&methods, "add", vec![Value::from("x")]).await.unwrap_err();
        assert_eq!(err.get("name").and_then(Value::as_str), Some("TypeError"));
    }

    #[tokio::test]
    async fn test_remote_outcome() {
        let methods = Methods::new().method_sync("open", |_args| {
            Ok(remote(Methods::new().method_sync("getValue", |_| Ok(42))))
        });

        match call(&methods, "open", Vec::new()).await.unwrap() {
            Outcome::Remote(inner) => assert_eq!(inner.names().collect::<Vec<_>>(), ["getValue"]),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_tree_building() {
        let methods = Methods::new()
            .property("version", "1.0")
            .namespace("math", Methods::new().method_sync("zero", |_| Ok(0)));

        assert_eq!(methods.len(), 2);
        assert!(matches!(methods.get("math"), Some(Member::Namespace(_))));
        assert!(matches!(methods.get("version"), Some(Member::Property(_))));
    }
}
