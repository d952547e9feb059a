/// Errors that can occur while decoding a frame payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not a well-formed sequence of MessagePack values.
    #[error("msgpack decode error: {0}")]
    MessagePack(#[from] rmp_serde::decode::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
