//! Transferable marking and extraction.
//!
//! A value wrapped with [`transfer`] is moved to the far side instead of
//! being structurally copied where the channel supports it. Before a call
//! or reply is sent, [`extract`] walks the value tree, collects every
//! marked value into an ordered transfer list and returns a marker-free
//! copy of the tree. Only arrays and records are walked; every other value
//! is a leaf and is never looked into.

use crate::value::Value;

/// Flag a value for ownership transfer. Marking an already marked value is a no-op.
pub fn transfer(value: impl Into<Value>) -> Value {
    match value.into() {
        marked @ Value::Transfer(_) => marked,
        other => Value::Transfer(Box::new(other)),
    }
}

/// Result of [`extract`]: the marker-free argument tree and the values to transfer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub args: Vec<Value>,
    pub transferables: Vec<Value>,
}

/// Split an argument list into a structurally equal, marker-free copy and
/// the ordered list of marked values. The input is left untouched.
pub fn extract(args: &[Value]) -> Extracted {
    let mut transferables = Vec::new();
    let args = args
        .iter()
        .map(|arg| visit(arg, &mut transferables))
        .collect();
    Extracted {
        args,
        transferables,
    }
}

/// Same traversal as [`extract`], for a single value such as a method result.
pub fn extract_value(value: &Value) -> (Value, Vec<Value>) {
    let mut transferables = Vec::new();
    let value = visit(value, &mut transferables);
    (value, transferables)
}

fn visit(value: &Value, transferables: &mut Vec<Value>) -> Value {
    match value {
        Value::Transfer(inner) => {
            let inner = inner.as_ref().clone();
            transferables.push(inner.clone());
            inner
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| visit(item, transferables))
                .collect(),
        ),
        Value::Record(fields) => Value::Record(
            fields
                .iter()
                .map(|(key, field)| (key.clone(), visit(field, transferables)))
                .collect(),
        ),
        leaf => leaf.clone(),
    }
}
