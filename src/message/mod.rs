pub mod types;

use self::types::{
    ARGS_KEY, CallId, CallPayload, ERROR_ID_KEY, ERROR_KEY, KIND_KEY, NAMESPACE_ID_KEY,
    NamespaceId, PAYLOAD_KEY, REMOTE_HANDLE_KIND, REQUEST_ID_KEY, RESPONSE_ID_KEY, RPC_CALL_KIND,
    RemoteHandle, ReplyPayload, TOPICS_KEY, TopicPath,
};
use crate::error::{Result, RpcError};
use crate::value::{Record, Value};

/// Outermost wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request { id: CallId, payload: CallPayload },
    Response { id: CallId, payload: ReplyPayload },
    Error { id: CallId, error: Value },
}

impl Envelope {
    pub fn request(id: CallId, topic: TopicPath, args: Vec<Value>) -> Self {
        Envelope::Request {
            id,
            payload: CallPayload { topic, args },
        }
    }

    pub fn response(id: CallId, payload: impl Into<ReplyPayload>) -> Self {
        Envelope::Response {
            id,
            payload: payload.into(),
        }
    }

    pub fn error(id: CallId, error: Value) -> Self {
        Envelope::Error { id, error }
    }

    pub fn id(&self) -> CallId {
        match self {
            Envelope::Request { id, .. }
            | Envelope::Response { id, .. }
            | Envelope::Error { id, .. } => *id,
        }
    }

    /// Assemble the wire record. Nothing else in the crate builds envelopes.
    pub fn into_value(self) -> Value {
        let mut fields = Record::new();
        match self {
            Envelope::Request { id, payload } => {
                fields.insert(REQUEST_ID_KEY.into(), id_value(id));
                fields.insert(PAYLOAD_KEY.into(), call_payload_value(payload));
            }
            Envelope::Response { id, payload } => {
                fields.insert(RESPONSE_ID_KEY.into(), id_value(id));
                let payload = match payload {
                    ReplyPayload::Value(value) => value,
                    ReplyPayload::Handle(handle) => handle_value(handle),
                };
                fields.insert(PAYLOAD_KEY.into(), payload);
            }
            Envelope::Error { id, error } => {
                fields.insert(ERROR_ID_KEY.into(), id_value(id));
                fields.insert(ERROR_KEY.into(), error);
            }
        }
        Value::Record(fields)
    }

    /// Parse an inbound message, rejecting anything that is not exactly one
    /// of the three envelope kinds.
    pub fn parse(message: Value) -> Result<Self> {
        let Value::Record(mut fields) = message.unmarked() else {
            return Err(invalid("message is not a record"));
        };

        let request_id = take_id(&mut fields, REQUEST_ID_KEY)?;
        let response_id = take_id(&mut fields, RESPONSE_ID_KEY)?;
        let error_id = take_id(&mut fields, ERROR_ID_KEY)?;

        match (request_id, response_id, error_id) {
            (Some(id), None, None) => {
                let payload = fields
                    .remove(PAYLOAD_KEY)
                    .ok_or_else(|| invalid("request without payload"))?;
                Ok(Envelope::Request {
                    id,
                    payload: parse_call_payload(payload)?,
                })
            }
            (None, Some(id), None) => {
                let payload = fields.remove(PAYLOAD_KEY).unwrap_or(Value::Null);
                Ok(Envelope::Response {
                    id,
                    payload: parse_reply_payload(payload)?,
                })
            }
            (None, None, Some(id)) => Ok(Envelope::Error {
                id,
                error: fields.remove(ERROR_KEY).unwrap_or(Value::Null),
            }),
            (None, None, None) => Err(invalid("no envelope id field")),
            _ => Err(invalid("more than one envelope id field")),
        }
    }

    pub fn validate(message: &Value) -> bool {
        Self::parse(message.clone()).is_ok()
    }
}

fn invalid(reason: &str) -> RpcError {
    RpcError::InvalidMessage(reason.to_string())
}

fn id_value(id: CallId) -> Value {
    // Ids stay far below i64::MAX; saturate rather than wrap if they ever don't.
    Value::Int(i64::try_from(id.raw()).unwrap_or(i64::MAX))
}

fn take_id(fields: &mut Record, key: &str) -> Result<Option<CallId>> {
    match fields.remove(key) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .map(|n| Some(CallId(n)))
            .ok_or_else(|| RpcError::InvalidMessage(format!("{} is not an id", key))),
    }
}

fn call_payload_value(payload: CallPayload) -> Value {
    let topics = payload
        .topic
        .to_topics()
        .into_iter()
        .map(Value::String)
        .collect();
    Value::record([
        (KIND_KEY, Value::from(RPC_CALL_KIND)),
        (TOPICS_KEY, Value::Array(topics)),
        (ARGS_KEY, Value::Array(payload.args)),
    ])
}

fn handle_value(handle: RemoteHandle) -> Value {
    Value::record([
        (KIND_KEY, Value::from(REMOTE_HANDLE_KIND)),
        (NAMESPACE_ID_KEY, Value::from(handle.namespace_id.as_str())),
    ])
}

fn parse_call_payload(payload: Value) -> Result<CallPayload> {
    let Value::Record(mut fields) = payload.unmarked() else {
        return Err(invalid("request payload is not a record"));
    };

    if fields.get(KIND_KEY).and_then(Value::as_str) != Some(RPC_CALL_KIND) {
        return Err(invalid("request payload is not an rpc-call"));
    }

    let topics = match fields.remove(TOPICS_KEY).map(Value::unmarked) {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item.unmarked() {
                Value::String(s) => Ok(s),
                _ => Err(invalid("topic is not a string")),
            })
            .collect::<Result<Vec<_>>>()?,
        _ => return Err(invalid("rpc-call without topics")),
    };
    let topic = TopicPath::from_topics(topics).ok_or_else(|| invalid("empty topic path"))?;

    let args = match fields.remove(ARGS_KEY).map(Value::unmarked) {
        Some(Value::Array(items)) => items,
        _ => return Err(invalid("rpc-call without args")),
    };

    Ok(CallPayload { topic, args })
}

/// Only a remote-handle record with a prefixed namespace id is a handle;
/// anything else a method returned is carried as a plain value.
fn parse_reply_payload(payload: Value) -> Result<ReplyPayload> {
    if payload.get(KIND_KEY).and_then(Value::as_str) != Some(REMOTE_HANDLE_KIND) {
        return Ok(ReplyPayload::Value(payload));
    }

    let namespace_id = payload
        .get(NAMESPACE_ID_KEY)
        .and_then(Value::as_str)
        .and_then(NamespaceId::parse);
    Ok(match namespace_id {
        Some(namespace_id) => ReplyPayload::Handle(RemoteHandle { namespace_id }),
        None => ReplyPayload::Value(payload),
    })
}
