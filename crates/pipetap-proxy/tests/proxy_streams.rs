#![cfg(unix)]

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use pipetap_frame::encode_frame;
use pipetap_proxy::{
    ChildExit, Direction, MemorySink, PacketLogger, ProxyConfig, StreamInterceptor, StreamMode,
    StreamOutcome, Supervisor,
};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn command_payload(command: &str, key: &str, value: &str) -> Vec<u8> {
    let mut argument = BTreeMap::new();
    argument.insert(key.to_string(), value.to_string());
    rmp_serde::to_vec(&(command, argument)).unwrap()
}

fn framed(frames: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let mut wire = BytesMut::new();
    for (channel, payload) in frames {
        encode_frame(*channel, payload, &mut wire).unwrap();
    }
    wire.to_vec()
}

fn quiet_config(target: &str) -> ProxyConfig {
    let mut config = ProxyConfig::new(target);
    config.relay_signals.clear();
    config
}

#[test]
fn cat_child_echoes_frames_unchanged() {
    let wire = framed(&[
        (1, command_payload("build", "target", "App")),
        (2, b"\xC1 not msgpack".to_vec()),
        (1, command_payload("cancel", "reason", "user")),
    ]);
    let sink = MemorySink::new();
    let logger = Arc::new(PacketLogger::new(sink.clone()));
    let stdout = Captured::default();
    let stderr = Captured::default();

    let exit = Supervisor::new(quiet_config("/bin/cat"), logger)
        .run_with_stdio(Cursor::new(wire.clone()), stdout.clone(), stderr.clone())
        .unwrap();

    assert_eq!(exit, ChildExit::Code(0));
    assert_eq!(stdout.bytes(), wire);
    assert!(stderr.bytes().is_empty());

    let log = sink.contents();
    assert!(log.contains("[parent→child] packet channel=1 command=build"));
    assert!(log.contains("[child→parent stdout] packet channel=1 command=build"));
    assert!(log.contains("[child→parent stdout] packet (raw payload) channel=2"));
    assert!(log.contains("command=cancel"));
    assert!(log.contains("[proxy] started /bin/cat"));
    assert!(log.contains("exited cleanly"));
}

#[test]
fn exit_code_and_raw_stderr_pass_through() {
    let mut config = quiet_config("/bin/sh")
        .with_args(["-c", "printf 'warning: low disk\\n' >&2; exit 3"]);
    config.stderr_mode = StreamMode::Raw;
    let sink = MemorySink::new();
    let logger = Arc::new(PacketLogger::new(sink.clone()));
    let stdout = Captured::default();
    let stderr = Captured::default();

    let exit = Supervisor::new(config, logger)
        .run_with_stdio(std::io::empty(), stdout.clone(), stderr.clone())
        .unwrap();

    assert_eq!(exit, ChildExit::Code(3));
    assert_eq!(exit.exit_code(), 3);
    assert_eq!(stderr.bytes(), b"warning: low disk\n");
    assert!(stdout.bytes().is_empty());

    let log = sink.contents();
    assert!(log.contains("[child→parent stderr] raw 18 bytes\nwarning: low disk\n"));
    assert!(log.contains("exited with code 3"));
}

#[test]
fn signalled_child_maps_to_shell_exit_code() {
    let config = quiet_config("/bin/sh").with_args(["-c", "kill -TERM $$"]);
    let sink = MemorySink::new();
    let logger = Arc::new(PacketLogger::new(sink.clone()));

    let exit = Supervisor::new(config, logger)
        .run_with_stdio(std::io::empty(), std::io::sink(), std::io::sink())
        .unwrap();

    assert_eq!(exit, ChildExit::Signal(libc::SIGTERM));
    assert_eq!(exit.exit_code(), 128 + libc::SIGTERM);
    assert!(sink.contents().contains("terminated by SIGTERM"));
}

#[test]
fn three_streams_progress_independently() {
    let sink = MemorySink::new();
    let logger = Arc::new(PacketLogger::new(sink.clone()));

    let inputs: Vec<(Direction, Vec<u8>)> = Direction::ALL
        .into_iter()
        .enumerate()
        .map(|(i, direction)| {
            let frames: Vec<_> = (0..40u64)
                .map(|n| (n, command_payload("step", "stream", &i.to_string())))
                .collect();
            (direction, framed(&frames))
        })
        .collect();

    let handles: Vec<_> = inputs
        .iter()
        .cloned()
        .map(|(direction, input)| {
            let logger = Arc::clone(&logger);
            let out = Captured::default();
            let captured = out.clone();
            let handle = thread::spawn(move || {
                StreamInterceptor::new(direction, Cursor::new(input), out, logger).run()
            });
            (handle, captured)
        })
        .collect();

    for ((handle, captured), (direction, input)) in handles.into_iter().zip(inputs) {
        let report = handle.join().unwrap();
        assert_eq!(report.direction, direction);
        assert_eq!(report.outcome, StreamOutcome::Closed);
        assert_eq!(report.frames, 40);
        assert_eq!(captured.bytes(), input);
    }

    let records = sink.records();
    assert_eq!(records.len(), 120);
    for direction in Direction::ALL {
        let count = records
            .iter()
            .filter(|r| r.contains(&format!("[{}] packet", direction.label())))
            .count();
        assert_eq!(count, 40);
    }
    assert!(records.iter().all(|r| r.ends_with("}\n")));
}

#[test]
fn truncated_stdout_does_not_stop_the_child() {
    // Header declares 100 payload bytes, only 4 follow.
    let script = concat!(
        "printf '\\001\\000\\000\\000\\000\\000\\000\\000",
        "\\144\\000\\000\\000abcd'; exit 0"
    );
    let config = quiet_config("/bin/sh").with_args(["-c", script]);
    let sink = MemorySink::new();
    let logger = Arc::new(PacketLogger::new(sink.clone()));
    let stdout = Captured::default();

    let exit = Supervisor::new(config, logger)
        .run_with_stdio(std::io::empty(), stdout.clone(), std::io::sink())
        .unwrap();

    assert_eq!(exit, ChildExit::Code(0));
    assert!(stdout.bytes().is_empty());
    let log = sink.contents();
    assert!(log.contains("[child→parent stdout] error: read failed: truncated frame"));
    assert!(log.contains("expected 112 bytes, received 16"));
}

#[test]
fn background_descendant_does_not_hold_the_proxy() {
    let mut config = quiet_config("/bin/sh").with_args(["-c", "sleep 8 & exit 0"]);
    config.drain_timeout = Duration::from_millis(200);
    let sink = MemorySink::new();
    let logger = Arc::new(PacketLogger::new(sink.clone()));

    let started = Instant::now();
    let exit = Supervisor::new(config, logger)
        .run_with_stdio(std::io::empty(), std::io::sink(), std::io::sink())
        .unwrap();

    assert_eq!(exit, ChildExit::Code(0));
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "took {:?}",
        started.elapsed()
    );
    assert!(sink
        .contents()
        .contains("2 output stream(s) still open after child exit; detached"));
}

#[test]
fn relay_is_announced_in_the_log() {
    let config = ProxyConfig::new("/bin/sh").with_args(["-c", "exit 0"]);
    let sink = MemorySink::new();
    let logger = Arc::new(PacketLogger::new(sink.clone()));

    let exit = Supervisor::new(config, logger)
        .run_with_stdio(std::io::empty(), std::io::sink(), std::io::sink())
        .unwrap();

    assert_eq!(exit, ChildExit::Code(0));
    assert!(sink
        .contents()
        .contains("relaying SIGINT, SIGTERM, SIGHUP to child pid"));
}
