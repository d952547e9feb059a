use std::path::PathBuf;
use std::time::Duration;

use pipetap_frame::FrameConfig;

use crate::direction::Direction;
use crate::interceptor::StreamMode;

/// Build service binary that Xcode normally launches.
pub const DEFAULT_TARGET: &str = concat!(
    "/Applications/Xcode.app/Contents/SharedFrameworks/XCBuild.framework",
    "/PlugIns/XCBBuildService.bundle/Contents/MacOS/XCBBuildService"
);

/// Packet log used when none is configured.
pub const DEFAULT_LOG_FILE: &str = "/tmp/xcode_xcbbuildservice.log";

/// How long output taps may keep running once the child has exited.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// What to launch and how to tap its streams.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Executable started as the child.
    pub target: PathBuf,
    /// Arguments passed to the child.
    pub args: Vec<String>,
    pub stdin_mode: StreamMode,
    pub stdout_mode: StreamMode,
    pub stderr_mode: StreamMode,
    /// Frame bounds applied to framed streams.
    pub frame: FrameConfig,
    /// Signals relayed to the child (unix only). Empty disables the relay.
    pub relay_signals: Vec<i32>,
    /// Upper bound on waiting for stdout/stderr to close after the child
    /// exits. Descendants that inherited the pipes can hold them open.
    pub drain_timeout: Duration,
}

impl ProxyConfig {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(&self, direction: Direction) -> StreamMode {
        match direction {
            Direction::ParentToChild => self.stdin_mode,
            Direction::ChildStdout => self.stdout_mode,
            Direction::ChildStderr => self.stderr_mode,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            target: PathBuf::from(DEFAULT_TARGET),
            args: Vec::new(),
            stdin_mode: StreamMode::Framed,
            stdout_mode: StreamMode::Framed,
            stderr_mode: StreamMode::Framed,
            frame: FrameConfig::default(),
            relay_signals: default_relay_signals(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

#[cfg(unix)]
fn default_relay_signals() -> Vec<i32> {
    crate::signal::DEFAULT_SIGNALS.to_vec()
}

#[cfg(not(unix))]
fn default_relay_signals() -> Vec<i32> {
    Vec::new()
}
