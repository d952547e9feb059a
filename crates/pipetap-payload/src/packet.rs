use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::Value;

/// Command name used when a payload does not start with a string.
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";

/// One frame's payload, reduced to a command and its argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedPacket {
    pub channel: u64,
    pub command: String,
    pub argument: Value,
    /// Set when the payload could not be decoded and `argument` holds the raw
    /// payload as text instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

impl DecodedPacket {
    /// Decode a frame payload. Never fails: undecodable payloads fall back to
    /// [`UNKNOWN_COMMAND`] with the payload rendered as lossy UTF-8 text.
    pub fn decode(channel: u64, payload: &[u8]) -> Self {
        match decode_payload(payload) {
            Ok((command, argument)) => Self {
                channel,
                command,
                argument,
                decode_error: None,
            },
            Err(err) => {
                tracing::debug!(
                    channel,
                    size = payload.len(),
                    error = %err,
                    "payload kept as raw text"
                );
                Self {
                    channel,
                    command: UNKNOWN_COMMAND.to_string(),
                    argument: Value::String(String::from_utf8_lossy(payload).into_owned()),
                    decode_error: Some(err.to_string()),
                }
            }
        }
    }

    /// Whether the raw-text fallback was taken.
    pub fn is_raw_fallback(&self) -> bool {
        self.decode_error.is_some()
    }
}

/// Decode a payload into `(command, argument)`.
///
/// The top-level sequence is either a single MessagePack array or, when the
/// payload holds several concatenated values, those values in order. A lone
/// non-array value yields [`UNKNOWN_COMMAND`] with that value as argument.
pub fn decode_payload(bytes: &[u8]) -> Result<(String, Value)> {
    let values = decode_values(bytes)?;
    Ok(split_command(values))
}

/// Decode every MessagePack value in `bytes`, which must be consumed exactly.
pub fn decode_values(bytes: &[u8]) -> Result<Vec<Value>> {
    let mut rest = bytes;
    let mut values = Vec::new();
    while !rest.is_empty() {
        let mut de = rmp_serde::Deserializer::new(&mut rest);
        values.push(Value::deserialize(&mut de)?);
    }
    Ok(values)
}

fn split_command(values: Vec<Value>) -> (String, Value) {
    let items = match into_sequence(values) {
        Ok(items) => items,
        Err(lone) => return (UNKNOWN_COMMAND.to_string(), lone),
    };

    let mut items = items.into_iter();
    let command = match items.next() {
        Some(Value::String(name)) => name,
        _ => UNKNOWN_COMMAND.to_string(),
    };
    let argument = items.next().unwrap_or_default();
    (command, argument)
}

fn into_sequence(mut values: Vec<Value>) -> std::result::Result<Vec<Value>, Value> {
    if values.len() != 1 {
        return Ok(values);
    }
    match values.pop() {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(other),
        None => Ok(Vec::new()),
    }
}
