use std::fmt;
use std::io;

use pipetap_frame::FrameError;
use pipetap_proxy::ProxyError;

// Exit codes follow sysexits and shell conventions.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const LOG_SINK_FAILED: i32 = 74;
pub const INTERNAL: i32 = 125;
pub const LAUNCH_FAILED: i32 = 126;
pub const LAUNCH_NOT_FOUND: i32 = 127;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Truncated { .. } | FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn proxy_error(err: ProxyError) -> CliError {
    let code = match &err {
        ProxyError::LogSink { .. } => LOG_SINK_FAILED,
        ProxyError::Launch { source, .. } => match source.kind() {
            io::ErrorKind::NotFound => LAUNCH_NOT_FOUND,
            _ => LAUNCH_FAILED,
        },
        _ => INTERNAL,
    };
    CliError::new(code, err.to_string())
}
