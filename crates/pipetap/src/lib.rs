//! Transparent stdio proxy with protocol logging.
//!
//! pipetap sits between a parent process and the worker it launches, passes
//! every byte through unchanged, and writes a decoded copy of the framed
//! MessagePack traffic to a log file.
//!
//! # Crate Structure
//!
//! - [`frame`]: channel-multiplexed, length-prefixed frame reader and writer
//! - [`payload`]: MessagePack payload decoding into command and argument
//! - [`proxy`]: stream taps, packet log and child process supervision

/// Re-export frame types.
pub mod frame {
    pub use pipetap_frame::*;
}

/// Re-export payload types.
pub mod payload {
    pub use pipetap_payload::*;
}

/// Re-export proxy types.
pub mod proxy {
    pub use pipetap_proxy::*;
}
