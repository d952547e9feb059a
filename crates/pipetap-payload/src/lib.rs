//! Payload decoding for tapped frames.
//!
//! Payloads are MessagePack. A decoded payload is reduced to a command name
//! (the leading string of the top-level sequence) and a single argument value.
//! Decoding is total at the [`DecodedPacket`] level: anything that does not
//! parse is kept as lossy text so every frame still yields a packet.

pub mod error;
pub mod packet;
pub mod value;

pub use error::{DecodeError, Result};
pub use packet::{decode_payload, decode_values, DecodedPacket, UNKNOWN_COMMAND};
pub use value::Value;
