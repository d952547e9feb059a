use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: channel (8) + length (4) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// Default maximum payload size: anything the 32-bit length field can declare.
pub const DEFAULT_MAX_PAYLOAD: usize = u32::MAX as usize;

/// A framed message with its channel and the exact bytes it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    channel: u64,
    raw: Bytes,
}

impl Frame {
    /// Create a new frame by encoding `payload` on `channel`.
    pub fn new(channel: u64, payload: impl AsRef<[u8]>) -> Result<Self> {
        let mut buf = BytesMut::new();
        encode_frame(channel, payload.as_ref(), &mut buf)?;
        Ok(Self {
            channel,
            raw: buf.freeze(),
        })
    }

    /// The channel this message belongs to.
    pub fn channel(&self) -> u64 {
        self.channel
    }

    /// The message payload, a view into [`Frame::raw`].
    pub fn payload(&self) -> Bytes {
        self.raw.slice(HEADER_SIZE..)
    }

    /// Header and payload exactly as they appeared on the wire.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        self.raw.len()
    }
}

/// Parsed fixed-width frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub channel: u64,
    pub payload_len: usize,
}

impl FrameHeader {
    /// Parse a header from the first [`HEADER_SIZE`] bytes of `src`.
    ///
    /// Returns `None` if fewer bytes are available.
    pub fn parse(src: &[u8]) -> Option<Self> {
        let header: &[u8; HEADER_SIZE] = src.get(..HEADER_SIZE)?.try_into().ok()?;
        let (channel, len) = header.split_at(8);
        Some(Self {
            channel: u64::from_le_bytes(channel.try_into().ok()?),
            payload_len: u32::from_le_bytes(len.try_into().ok()?) as usize,
        })
    }

    /// Header plus declared payload.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────────────┬────────────────┬────────────────┐
/// │ Channel (8B LE) │ Length (4B LE) │ Payload        │
/// │                 │                │ (Length bytes) │
/// └─────────────────┴────────────────┴────────────────┘
/// ```
pub fn encode_frame(channel: u64, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u64_le(channel);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(header) = FrameHeader::parse(src) else {
        return Ok(None); // Need more data
    };

    if header.payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: header.payload_len,
            max: max_payload,
        });
    }

    if src.len() < header.frame_len() {
        return Ok(None); // Need more data
    }

    let raw = src.split_to(header.frame_len()).freeze();
    Ok(Some(Frame {
        channel: header.channel,
        raw,
    }))
}

/// Configuration for the frame reader and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: `u32::MAX`.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
