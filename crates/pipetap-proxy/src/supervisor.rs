//! Child process lifecycle: launch, tap all three streams, wait, report.

use std::fmt;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ProxyConfig;
use crate::direction::Direction;
use crate::error::{ProxyError, Result};
use crate::interceptor::{StreamInterceptor, StreamReport};
use crate::logger::PacketLogger;

/// How the child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Exited normally with this code.
    Code(i32),
    /// Terminated by this signal.
    Signal(i32),
}

impl ChildExit {
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ChildExit::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ChildExit::Signal(signal);
            }
        }
        ChildExit::Code(1)
    }

    pub fn success(self) -> bool {
        self == ChildExit::Code(0)
    }

    /// Exit code the proxy itself should return (shell convention for
    /// signals).
    pub fn exit_code(self) -> i32 {
        match self {
            ChildExit::Code(code) => code,
            ChildExit::Signal(signal) => 128 + signal,
        }
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildExit::Code(0) => f.write_str("exited cleanly"),
            ChildExit::Code(code) => write!(f, "exited with code {code}"),
            ChildExit::Signal(signal) => {
                write!(f, "terminated by {} ({signal})", signal_label(*signal))
            }
        }
    }
}

#[cfg(unix)]
fn signal_label(signal: i32) -> &'static str {
    crate::signal::signal_name(signal)
}

#[cfg(not(unix))]
fn signal_label(_signal: i32) -> &'static str {
    "signal"
}

/// Launches the child and runs one stream tap per standard stream.
#[derive(Debug)]
pub struct Supervisor {
    config: ProxyConfig,
    logger: Arc<PacketLogger>,
}

impl Supervisor {
    pub fn new(config: ProxyConfig, logger: Arc<PacketLogger>) -> Self {
        Self { config, logger }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn logger(&self) -> &Arc<PacketLogger> {
        &self.logger
    }

    /// Proxy the current process's stdio to the child until it exits.
    pub fn run(&self) -> Result<ChildExit> {
        self.run_with_stdio(io::stdin(), io::stdout(), io::stderr())
    }

    /// Proxy caller-provided endpoints to the child until it exits.
    ///
    /// The stdout and stderr taps are drained for at most the configured
    /// drain timeout before this returns; taps still running after that, and
    /// the stdin tap, are left detached.
    pub fn run_with_stdio<I, O, E>(&self, stdin: I, stdout: O, stderr: E) -> Result<ChildExit>
    where
        I: Read + Send + 'static,
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        let mut child = self.spawn_child()?;
        let pid = child.id();
        tracing::info!(pid, target = %self.config.target.display(), "child started");
        self.event(format_args!(
            "started {} (pid {pid})",
            self.config.target.display()
        ));

        let relay = RelayGuard::install(pid, &self.config.relay_signals, &self.logger);

        let taps = match self.start_taps(&mut child, stdin, stdout, stderr) {
            Ok(taps) => taps,
            Err(err) => {
                tracing::error!(pid, error = %err, "stream setup failed; stopping child");
                abandon(&mut child);
                relay.child_exited();
                return Err(err);
            }
        };

        // Stop relaying while the exited child is still a zombie, so its pid
        // cannot have been reused by the time the relay shuts down.
        #[cfg(unix)]
        if let Err(err) = wait_exited_unreaped(pid) {
            tracing::debug!(pid, error = %err, "non-reaping wait failed");
        }
        relay.child_exited();
        let exit = ChildExit::from_status(child.wait().map_err(ProxyError::Wait)?);

        if exit.success() {
            tracing::info!(pid, "child exited cleanly");
        } else {
            tracing::warn!(pid, exit_code = exit.exit_code(), "child {exit}");
        }
        self.event(format_args!("child pid {pid} {exit}"));

        let undrained = taps.drain_outputs(self.config.drain_timeout);
        if undrained > 0 {
            tracing::warn!(
                pid,
                undrained,
                timeout_ms = self.config.drain_timeout.as_millis() as u64,
                "output streams still open after child exit; detaching"
            );
            self.event(format_args!(
                "{undrained} output stream(s) still open after child exit; detached"
            ));
        }
        Ok(exit)
    }

    fn spawn_child(&self) -> Result<Child> {
        Command::new(&self.config.target)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProxyError::Launch {
                path: self.config.target.clone(),
                source,
            })
    }

    fn start_taps<I, O, E>(
        &self,
        child: &mut Child,
        stdin: I,
        stdout: O,
        stderr: E,
    ) -> Result<Taps>
    where
        I: Read + Send + 'static,
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        let child_stdin = child.stdin.take().ok_or(ProxyError::MissingPipe("stdin"))?;
        let child_stdout = child
            .stdout
            .take()
            .ok_or(ProxyError::MissingPipe("stdout"))?;
        let child_stderr = child
            .stderr
            .take()
            .ok_or(ProxyError::MissingPipe("stderr"))?;

        let (done, reports) = mpsc::channel();
        self.spawn_tap(Direction::ParentToChild, stdin, child_stdin, None)?;
        self.spawn_tap(
            Direction::ChildStdout,
            child_stdout,
            stdout,
            Some(done.clone()),
        )?;
        self.spawn_tap(Direction::ChildStderr, child_stderr, stderr, Some(done))?;

        Ok(Taps {
            reports,
            pending: 2,
        })
    }

    fn spawn_tap<R, W>(
        &self,
        direction: Direction,
        source: R,
        destination: W,
        done: Option<Sender<StreamReport>>,
    ) -> Result<()>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let interceptor =
            StreamInterceptor::new(direction, source, destination, Arc::clone(&self.logger))
                .with_mode(self.config.mode(direction))
                .with_frame_config(self.config.frame.clone());

        std::thread::Builder::new()
            .name(format!("pipetap-{}", direction.stream_name()))
            .spawn(move || {
                let report = interceptor.run();
                if let Some(done) = done {
                    let _ = done.send(report);
                }
            })
            .map(drop)
            .map_err(|source| ProxyError::Thread {
                direction: direction.stream_name(),
                source,
            })
    }

    fn event(&self, message: fmt::Arguments<'_>) {
        if let Err(err) = self.logger.log_event(&message) {
            tracing::warn!(error = %err, "packet log append failed");
        }
    }
}

/// Output taps that report back when their stream ends.
struct Taps {
    reports: Receiver<StreamReport>,
    pending: usize,
}

impl Taps {
    /// Wait up to `timeout` for the output taps to finish. Returns how many
    /// are still running.
    fn drain_outputs(mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        while self.pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.reports.recv_timeout(remaining) {
                Ok(report) => {
                    self.pending -= 1;
                    tracing::debug!(
                        direction = %report.direction,
                        outcome = ?report.outcome,
                        frames = report.frames,
                        bytes = report.bytes,
                        "output stream drained"
                    );
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!(pending = self.pending, "stream tap ended without a report");
                    return 0;
                }
            }
        }
        self.pending
    }
}

fn abandon(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "kill failed");
    }
    match child.wait() {
        Ok(status) => tracing::debug!(%status, "abandoned child reaped"),
        Err(err) => tracing::debug!(error = %err, "abandoned child not reaped"),
    }
}

/// Block until `pid` has exited without reaping it.
#[cfg(unix)]
fn wait_exited_unreaped(pid: u32) -> io::Result<()> {
    let id = libc::id_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    loop {
        let mut info = std::mem::MaybeUninit::<libc::siginfo_t>::zeroed();
        // SAFETY: `info` is a valid, zeroed out-pointer; WNOWAIT leaves the
        // child waitable for the reaping `Child::wait` that follows.
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                id,
                info.as_mut_ptr(),
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Signal relay for the lifetime of one child, where the platform has one.
struct RelayGuard {
    #[cfg(unix)]
    relay: Option<crate::signal::SignalRelay>,
}

impl RelayGuard {
    #[cfg(unix)]
    fn install(pid: u32, signals: &[i32], logger: &Arc<PacketLogger>) -> Self {
        if signals.is_empty() {
            return Self { relay: None };
        }
        match crate::signal::SignalRelay::install(pid, signals, Arc::clone(logger)) {
            Ok(relay) => Self { relay: Some(relay) },
            Err(err) => {
                tracing::warn!(pid, error = %err, "signal relay unavailable");
                Self { relay: None }
            }
        }
    }

    #[cfg(not(unix))]
    fn install(_pid: u32, _signals: &[i32], _logger: &Arc<PacketLogger>) -> Self {
        Self {}
    }

    fn child_exited(self) {
        #[cfg(unix)]
        if let Some(relay) = self.relay {
            relay.child_exited();
        }
    }
}
