use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Trait for encoding and decoding messages carried over text-oriented channels
pub trait Codec: Send + Sync + std::fmt::Debug + 'static {
    /// Encode a serializable value into text
    fn encode<T: Serialize>(&self, data: &T) -> Result<String>;

    /// Decode text into a deserializable value
    fn decode<T: for<'de> Deserialize<'de>>(&self, text: &str) -> Result<T>;
}

/// Default codec (compact JSON)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, data: &T) -> Result<String> {
        Ok(serde_json::to_string(data)?)
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, text: &str) -> Result<T> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Indented JSON, easier to read in packet captures and logs
#[derive(Debug, Clone, Copy, Default)]
pub struct PrettyJsonCodec;

impl Codec for PrettyJsonCodec {
    fn encode<T: Serialize>(&self, data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, text: &str) -> Result<T> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::value::Value;

    #[test]
    fn test_json_codec() {
        let value = Value::record([("a", 1)]);
        let text = JsonCodec.encode(&value).unwrap();
        assert_eq!(text, "{\"a\":1}");

        let decoded: Value = JsonCodec.decode(&text).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_pretty_codec_is_decodable_by_json() {
        let value = Value::record([("a", Value::Array(vec![Value::from(1), Value::Null]))]);
        let text = PrettyJsonCodec.encode(&value).unwrap();
        assert!(text.contains('\n'));

        let decoded: Value = JsonCodec.decode(&text).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_malformed_text() {
        let result: Result<Value> = JsonCodec.decode("{not json");
        assert!(matches!(result, Err(RpcError::Serialization(_))));
    }
}
