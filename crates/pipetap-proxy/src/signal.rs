//! Relay of termination signals from the proxy to the child.
//!
//! The relay blocks its signal set on the calling thread and waits for them
//! synchronously on a dedicated thread. Threads started afterwards inherit
//! the mask, so every delivery of a relayed signal lands in `sigwait`.
//! Install it after the child is spawned: the mask is inherited across exec.

use std::io;
use std::mem::MaybeUninit;
use std::os::unix::thread::JoinHandleExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::logger::PacketLogger;

/// Signals relayed when the caller does not choose a set.
pub const DEFAULT_SIGNALS: &[libc::c_int] = &[libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

/// Running signal relay for one child process.
pub struct SignalRelay {
    thread: Option<JoinHandle<()>>,
    child_exited: Arc<AtomicBool>,
    wake_signal: libc::c_int,
    previous_mask: libc::sigset_t,
}

impl SignalRelay {
    /// Block `signals` on the calling thread and start relaying them to `pid`.
    pub fn install(
        pid: u32,
        signals: &[libc::c_int],
        logger: Arc<PacketLogger>,
    ) -> io::Result<Self> {
        let Some(&wake_signal) = signals.first() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no signals to relay",
            ));
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        let set = signal_set(signals)?;
        let previous_mask = block(&set)?;

        let child_exited = Arc::new(AtomicBool::new(false));
        let exited = Arc::clone(&child_exited);
        let announce = Arc::clone(&logger);
        let spawned = std::thread::Builder::new()
            .name("pipetap-signals".to_string())
            .spawn(move || relay_loop(set, pid, &exited, &logger));

        match spawned {
            Ok(thread) => {
                let names: Vec<_> = signals.iter().map(|&s| signal_name(s)).collect();
                let names = names.join(", ");
                tracing::debug!(pid, signals = %names, "signal relay installed");
                let event = format!("relaying {names} to child pid {pid}");
                if let Err(err) = announce.log_event(&event) {
                    tracing::warn!(error = %err, "packet log append failed");
                }
                Ok(Self {
                    thread: Some(thread),
                    child_exited,
                    wake_signal,
                    previous_mask,
                })
            }
            Err(err) => {
                restore(&previous_mask);
                Err(err)
            }
        }
    }

    /// Stop relaying. Call once the child has exited and before it is reaped,
    /// after which its pid may be reused.
    pub fn child_exited(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.child_exited.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            // SAFETY: the handle refers to a thread that has not been joined,
            // so its pthread_t is still valid.
            let rc = unsafe { libc::pthread_kill(thread.as_pthread_t() as _, self.wake_signal) };
            if rc == 0 {
                let _ = thread.join();
            } else {
                tracing::debug!(rc, "signal relay thread not woken; leaving it detached");
            }
        }
        restore(&self.previous_mask);
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

fn relay_loop(
    set: libc::sigset_t,
    pid: libc::pid_t,
    child_exited: &AtomicBool,
    logger: &PacketLogger,
) {
    loop {
        let mut signal: libc::c_int = 0;
        // SAFETY: `set` is an initialised signal set and `signal` is a valid
        // out-pointer for the duration of the call.
        let rc = unsafe { libc::sigwait(&set, &mut signal) };
        if rc != 0 {
            tracing::warn!(rc, "sigwait failed; signal relay stopped");
            return;
        }
        if child_exited.load(Ordering::SeqCst) {
            return;
        }

        let name = signal_name(signal);
        // SAFETY: kill has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            tracing::info!(signal = name, pid, "relayed signal to child");
            if let Err(err) = logger.log_event(&format_args!("relayed {name} to child pid {pid}")) {
                tracing::warn!(error = %err, "packet log append failed");
            }
        } else {
            tracing::debug!(
                signal = name,
                pid,
                error = %io::Error::last_os_error(),
                "signal not delivered to child"
            );
        }
    }
}

fn signal_set(signals: &[libc::c_int]) -> io::Result<libc::sigset_t> {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    // SAFETY: sigemptyset initialises the set before any other use.
    unsafe {
        if libc::sigemptyset(set.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        for &signal in signals {
            if libc::sigaddset(set.as_mut_ptr(), signal) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(set.assume_init())
    }
}

fn block(set: &libc::sigset_t) -> io::Result<libc::sigset_t> {
    let mut previous = MaybeUninit::<libc::sigset_t>::uninit();
    // SAFETY: both pointers are valid; pthread_sigmask fills `previous` on
    // success.
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, set, previous.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    // SAFETY: initialised by the successful call above.
    Ok(unsafe { previous.assume_init() })
}

fn restore(previous: &libc::sigset_t) {
    // SAFETY: `previous` was produced by pthread_sigmask.
    let rc =
        unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, previous, std::ptr::null_mut()) };
    if rc != 0 {
        tracing::debug!(rc, "failed to restore signal mask");
    }
}

/// Conventional name of a signal number, for log records.
pub fn signal_name(signal: libc::c_int) -> &'static str {
    match signal {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGABRT => "SIGABRT",
        libc::SIGKILL => "SIGKILL",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGALRM => "SIGALRM",
        libc::SIGTERM => "SIGTERM",
        libc::SIGUSR1 => "SIGUSR1",
        libc::SIGUSR2 => "SIGUSR2",
        _ => "signal",
    }
}
