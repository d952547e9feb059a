use std::path::PathBuf;

/// Errors that stop the proxy before or while supervising the child.
///
/// Per-frame and per-stream failures never surface here; they are written to
/// the packet log and end only the affected stream.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The packet log could not be opened.
    #[error("failed to open log file {path}: {source}")]
    LogSink {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The child process could not be started.
    #[error("failed to start {path}: {source}")]
    Launch {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A standard stream of the child was not piped.
    #[error("child {0} was not captured")]
    MissingPipe(&'static str),

    /// Waiting for the child failed.
    #[error("failed to wait for child: {0}")]
    Wait(std::io::Error),

    /// A stream thread could not be started.
    #[error("failed to spawn {direction} thread: {source}")]
    Thread {
        direction: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProxyError>;
