//! Transparent stdio interception for a child process.
//!
//! The supervisor launches the child with piped standard streams and runs one
//! stream tap per direction. Each tap forwards the exact bytes it reads and
//! writes a decoded copy of every frame to the shared packet log. Nothing a
//! tap logs or fails to decode changes what reaches the other side.

pub mod config;
pub mod direction;
pub mod error;
pub mod interceptor;
pub mod logger;
#[cfg(unix)]
pub mod signal;
pub mod supervisor;

pub use config::{ProxyConfig, DEFAULT_DRAIN_TIMEOUT, DEFAULT_LOG_FILE, DEFAULT_TARGET};
pub use direction::Direction;
pub use error::{ProxyError, Result};
pub use interceptor::{StreamInterceptor, StreamMode, StreamOutcome, StreamReport};
pub use logger::{FileSink, LogSink, MemorySink, PacketLogger};
#[cfg(unix)]
pub use signal::{SignalRelay, DEFAULT_SIGNALS};
pub use supervisor::{ChildExit, Supervisor};
