//! One directional stream tap: frame, decode, log, forward unchanged.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use pipetap_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use pipetap_payload::DecodedPacket;

use crate::direction::Direction;
use crate::logger::PacketLogger;

const RAW_CHUNK_SIZE: usize = 8 * 1024;

/// How a stream's bytes are interpreted while they are forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Split into frames, decode and log each packet.
    #[default]
    Framed,
    /// Forward chunks as read and log them as text.
    Raw,
}

/// Why a stream tap stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The source ended on a frame boundary.
    Closed,
    /// The source ended inside a frame, or declared an oversized payload.
    Truncated,
    /// Reading from the source failed.
    ReadFailed,
    /// Writing to the destination failed.
    ForwardFailed,
}

/// Summary of one finished stream tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    pub direction: Direction,
    pub outcome: StreamOutcome,
    /// Frames (or raw chunks) forwarded.
    pub frames: u64,
    /// Bytes forwarded.
    pub bytes: u64,
}

impl StreamReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            outcome: StreamOutcome::Closed,
            frames: 0,
            bytes: 0,
        }
    }

    fn forwarded(&mut self, bytes: usize) {
        self.frames += 1;
        self.bytes += bytes as u64;
    }

    fn finish(mut self, outcome: StreamOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Reads one stream, logs what it carries, and forwards the original bytes.
///
/// Failures end only this stream; the destination is dropped when `run`
/// returns so the reading side observes end of stream.
pub struct StreamInterceptor<R, W> {
    direction: Direction,
    source: R,
    destination: W,
    logger: Arc<PacketLogger>,
    mode: StreamMode,
    frame_config: FrameConfig,
}

impl<R: Read, W: Write> StreamInterceptor<R, W> {
    pub fn new(
        direction: Direction,
        source: R,
        destination: W,
        logger: Arc<PacketLogger>,
    ) -> Self {
        Self {
            direction,
            source,
            destination,
            logger,
            mode: StreamMode::default(),
            frame_config: FrameConfig::default(),
        }
    }

    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Run until the source closes or the stream fails (blocking).
    pub fn run(self) -> StreamReport {
        let direction = self.direction;
        tracing::debug!(%direction, mode = ?self.mode, "stream tap started");

        let report = match self.mode {
            StreamMode::Framed => self.run_framed(),
            StreamMode::Raw => self.run_raw(),
        };

        tracing::debug!(
            %direction,
            outcome = ?report.outcome,
            frames = report.frames,
            bytes = report.bytes,
            "stream tap finished"
        );
        report
    }

    fn run_framed(self) -> StreamReport {
        let Self {
            direction,
            source,
            destination,
            logger,
            frame_config,
            ..
        } = self;
        let mut reader = FrameReader::with_config(source, frame_config);
        let mut writer = FrameWriter::new(destination);
        let mut report = StreamReport::new(direction);

        loop {
            let frame = match reader.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return report.finish(StreamOutcome::Closed),
                Err(err) => {
                    let outcome = match err {
                        FrameError::Io(_) => StreamOutcome::ReadFailed,
                        _ => StreamOutcome::Truncated,
                    };
                    soft(
                        direction,
                        logger.log_error(direction, &format_args!("read failed: {err}")),
                    );
                    return report.finish(outcome);
                }
            };

            let packet = DecodedPacket::decode(frame.channel(), &frame.payload());
            tracing::trace!(
                %direction,
                channel = packet.channel,
                command = %packet.command,
                size = frame.wire_size(),
                "frame"
            );
            soft(direction, logger.log_packet(direction, &packet));

            if let Err(err) = writer.write_frame(&frame) {
                soft(
                    direction,
                    logger.log_error(direction, &format_args!("forward failed: {err}")),
                );
                return report.finish(StreamOutcome::ForwardFailed);
            }
            report.forwarded(frame.wire_size());
        }
    }

    fn run_raw(self) -> StreamReport {
        let Self {
            direction,
            mut source,
            destination,
            logger,
            ..
        } = self;
        let mut writer = FrameWriter::new(destination);
        let mut report = StreamReport::new(direction);
        let mut chunk = vec![0u8; RAW_CHUNK_SIZE];

        loop {
            let read = match source.read(&mut chunk) {
                Ok(0) => return report.finish(StreamOutcome::Closed),
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    soft(
                        direction,
                        logger.log_error(direction, &format_args!("read failed: {err}")),
                    );
                    return report.finish(StreamOutcome::ReadFailed);
                }
            };

            soft(direction, logger.log_raw(direction, &chunk[..read]));

            if let Err(err) = writer.write_raw(&chunk[..read]) {
                soft(
                    direction,
                    logger.log_error(direction, &format_args!("forward failed: {err}")),
                );
                return report.finish(StreamOutcome::ForwardFailed);
            }
            report.forwarded(read);
        }
    }
}

/// Log appends are best effort once the proxy is running.
fn soft(direction: Direction, result: std::io::Result<()>) {
    if let Err(err) = result {
        tracing::warn!(%direction, error = %err, "packet log append failed");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use std::sync::Mutex;

    use bytes::{BufMut, BytesMut};
    use pipetap_frame::encode_frame;
    use pipetap_payload::UNKNOWN_COMMAND;

    use super::*;
    use crate::logger::{LogSink, MemorySink};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn bytes(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn build_payload() -> Vec<u8> {
        let mut argument = BTreeMap::new();
        argument.insert("target", "App");
        rmp_serde::to_vec(&("build", argument)).unwrap()
    }

    fn tap(direction: Direction, input: Vec<u8>) -> (StreamReport, Vec<u8>, MemorySink) {
        let sink = MemorySink::new();
        let logger = Arc::new(PacketLogger::new(sink.clone()));
        let out = SharedBuffer::default();

        let report =
            StreamInterceptor::new(direction, Cursor::new(input), out.clone(), logger).run();
        (report, out.bytes(), sink)
    }

    #[test]
    fn build_scenario_is_decoded_and_forwarded_verbatim() {
        let payload = build_payload();
        let mut wire = BytesMut::new();
        encode_frame(1, &payload, &mut wire).unwrap();

        let (report, forwarded, sink) = tap(Direction::ParentToChild, wire.to_vec());

        assert_eq!(report.outcome, StreamOutcome::Closed);
        assert_eq!(report.frames, 1);
        assert_eq!(forwarded, wire.to_vec());
        let log = sink.contents();
        assert!(log.contains("[parent→child] packet channel=1 command=build"));
        assert!(log.contains("\"target\": \"App\""));
    }

    #[test]
    fn undecodable_payload_is_logged_and_still_forwarded() {
        let mut wire = BytesMut::new();
        encode_frame(5, b"\xC1plain text", &mut wire).unwrap();
        encode_frame(6, &build_payload(), &mut wire).unwrap();

        let (report, forwarded, sink) = tap(Direction::ChildStdout, wire.to_vec());

        assert_eq!(report.outcome, StreamOutcome::Closed);
        assert_eq!(report.frames, 2);
        assert_eq!(forwarded, wire.to_vec());

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].contains(&format!("command={UNKNOWN_COMMAND}")));
        assert!(records[0].contains("plain text"));
        assert!(records[1].contains("command=build"));
    }

    #[test]
    fn truncated_payload_is_logged_and_not_forwarded() {
        let mut wire = BytesMut::new();
        encode_frame(1, &build_payload(), &mut wire).unwrap();
        let complete = wire.to_vec();
        wire.put_u64_le(2);
        wire.put_u32_le(100);
        wire.put_slice(&[0u8; 40]);

        let (report, forwarded, sink) = tap(Direction::ChildStdout, wire.to_vec());

        assert_eq!(report.outcome, StreamOutcome::Truncated);
        assert_eq!(report.frames, 1);
        assert_eq!(forwarded, complete);
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records[1].contains("error: read failed: truncated frame"));
    }

    #[test]
    fn truncated_header_forwards_nothing() {
        let (report, forwarded, sink) = tap(Direction::ParentToChild, vec![1, 0, 0, 0, 0, 0]);

        assert_eq!(report.outcome, StreamOutcome::Truncated);
        assert!(forwarded.is_empty());
        assert!(sink.contents().contains("truncated frame"));
    }

    #[test]
    fn clean_close_logs_nothing() {
        let (report, forwarded, sink) = tap(Direction::ParentToChild, Vec::new());

        assert_eq!(report.outcome, StreamOutcome::Closed);
        assert!(forwarded.is_empty());
        assert!(sink.records().is_empty());
    }

    #[test]
    fn forward_failure_ends_stream() {
        let mut wire = BytesMut::new();
        encode_frame(1, b"\x91\xA4ping", &mut wire).unwrap();
        encode_frame(1, b"\x91\xA4pong", &mut wire).unwrap();

        let sink = MemorySink::new();
        let logger = Arc::new(PacketLogger::new(sink.clone()));
        let report = StreamInterceptor::new(
            Direction::ParentToChild,
            Cursor::new(wire.to_vec()),
            BrokenPipe,
            logger,
        )
        .run();

        assert_eq!(report.outcome, StreamOutcome::ForwardFailed);
        assert_eq!(report.frames, 0);
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].contains("command=ping"));
        assert!(records[1].contains("error: forward failed"));
    }

    #[test]
    fn log_failure_does_not_stop_forwarding() {
        let mut wire = BytesMut::new();
        encode_frame(1, &build_payload(), &mut wire).unwrap();
        encode_frame(2, &build_payload(), &mut wire).unwrap();

        let logger = Arc::new(PacketLogger::new(FailingSink));
        let out = SharedBuffer::default();
        let report = StreamInterceptor::new(
            Direction::ChildStdout,
            Cursor::new(wire.to_vec()),
            out.clone(),
            logger,
        )
        .run();

        assert_eq!(report.outcome, StreamOutcome::Closed);
        assert_eq!(out.bytes(), wire.to_vec());
    }

    #[test]
    fn oversized_payload_is_treated_as_truncation() {
        let mut wire = BytesMut::new();
        encode_frame(1, &[0u8; 64], &mut wire).unwrap();

        let sink = MemorySink::new();
        let logger = Arc::new(PacketLogger::new(sink.clone()));
        let out = SharedBuffer::default();
        let report = StreamInterceptor::new(
            Direction::ChildStdout,
            Cursor::new(wire.to_vec()),
            out.clone(),
            logger,
        )
        .with_frame_config(FrameConfig {
            max_payload_size: 16,
        })
        .run();

        assert_eq!(report.outcome, StreamOutcome::Truncated);
        assert!(out.bytes().is_empty());
        assert!(sink.contents().contains("payload too large"));
    }

    #[test]
    fn raw_mode_passes_text_through() {
        let text = b"warning: something happened\nnot framed at all\n".to_vec();

        let sink = MemorySink::new();
        let logger = Arc::new(PacketLogger::new(sink.clone()));
        let out = SharedBuffer::default();
        let report = StreamInterceptor::new(
            Direction::ChildStderr,
            Cursor::new(text.clone()),
            out.clone(),
            logger,
        )
        .with_mode(StreamMode::Raw)
        .run();

        assert_eq!(report.outcome, StreamOutcome::Closed);
        assert_eq!(report.bytes, text.len() as u64);
        assert_eq!(out.bytes(), text);
        let log = sink.contents();
        assert!(log.contains("[child→parent stderr] raw"));
        assert!(log.contains("not framed at all"));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FailingSink;

    impl LogSink for FailingSink {
        fn append(&mut self, _record: &[u8]) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }
}
