//! Row decoders.

use std::error::Error as StdError;
use std::fmt;

/// Error type returned by a [`Decoder`].
pub type DecodeError = Box<dyn StdError + Send + Sync>;

/// Turns the raw bytes of one row into a JSON value.
///
/// The default is [`JsonDecoder`]. A custom decoder can be set per cluster
/// through the cluster options or per query through
/// [`QueryOptions::decoder`](crate::QueryOptions::decoder).
pub trait Decoder: Send + Sync + fmt::Debug {
    /// Decode one row.
    fn decode(&self, row: &[u8]) -> Result<serde_json::Value, DecodeError>;
}

/// Decodes rows as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, row: &[u8]) -> Result<serde_json::Value, DecodeError> {
        Ok(serde_json::from_slice(row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_decoder() {
        let value = JsonDecoder.decode(br#"{"name":"frank","age":42}"#).unwrap();
        assert_eq!(value["name"], "frank");
        assert_eq!(value["age"], 42);

        assert!(JsonDecoder.decode(b"{not json").is_err());
    }
}
