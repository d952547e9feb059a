//! Length-prefixed message framing with channel multiplexing.
//!
//! Every message on a tapped stream is framed with:
//! - An 8-byte little-endian channel ID for multiplexing
//! - A 4-byte little-endian payload length
//!
//! There is no magic number, checksum or version field, so a reader cannot
//! resynchronise inside a stream: a frame cut short ends the stream.
//! Frames keep the exact bytes they were read from so they can be forwarded
//! without re-encoding.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, FrameHeader, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
