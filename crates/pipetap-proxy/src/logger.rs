//! Append-only packet log shared by all stream taps.
//!
//! Every record is rendered completely before it is handed to the sink, and
//! the sink is locked for exactly one append, so records from different
//! streams may interleave but never split.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use pipetap_payload::DecodedPacket;

use crate::direction::Direction;
use crate::error::{ProxyError, Result};

/// Label used for records that are not tied to a stream.
const PROXY_LABEL: &str = "proxy";

/// Longest raw chunk rendered into a single record.
const RAW_PREVIEW_LIMIT: usize = 4 * 1024;

/// Destination for rendered log records.
pub trait LogSink: Send {
    /// Append one complete record. The record must reach the sink as a unit
    /// and be durable when this returns.
    fn append(&mut self, record: &[u8]) -> io::Result<()>;
}

/// Log file opened for appending; every record is synced to disk.
#[derive(Debug)]
pub struct FileSink {
    file: File,
    path: PathBuf,
}

impl FileSink {
    /// Open (creating if needed) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ProxyError::LogSink {
                path: path.clone(),
                source,
            })?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A second append handle on the same file, for diagnostics output.
    pub fn try_clone_file(&self) -> io::Result<File> {
        self.file.try_clone()
    }
}

impl LogSink for FileSink {
    fn append(&mut self, record: &[u8]) -> io::Result<()> {
        self.file.write_all(record)?;
        self.file.sync_data()
    }
}

/// In-memory sink; clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records appended so far, in append order.
    pub fn records(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All records concatenated.
    pub fn contents(&self) -> String {
        self.records().concat()
    }
}

impl LogSink for MemorySink {
    fn append(&mut self, record: &[u8]) -> io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(String::from_utf8_lossy(record).into_owned());
        Ok(())
    }
}

/// Renders packets, errors and lifecycle events into the log sink.
pub struct PacketLogger {
    sink: Mutex<Box<dyn LogSink>>,
}

impl PacketLogger {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
        }
    }

    /// Log a decoded packet as an indented JSON document.
    pub fn log_packet(&self, direction: Direction, packet: &DecodedPacket) -> io::Result<()> {
        let body = serde_json::to_string_pretty(packet)
            .unwrap_or_else(|err| format!("<unrenderable packet: {err}>"));
        let kind = if packet.is_raw_fallback() {
            "packet (raw payload)"
        } else {
            "packet"
        };
        self.append(format!(
            "{} {kind} channel={} command={}\n{body}\n",
            record_prefix(direction.label()),
            packet.channel,
            packet.command,
        ))
    }

    /// Log a stream-level error.
    pub fn log_error(&self, direction: Direction, error: &dyn fmt::Display) -> io::Result<()> {
        self.append(format!(
            "{} error: {error}\n",
            record_prefix(direction.label())
        ))
    }

    /// Log bytes of a stream that is passed through without framing.
    pub fn log_raw(&self, direction: Direction, bytes: &[u8]) -> io::Result<()> {
        let shown = &bytes[..bytes.len().min(RAW_PREVIEW_LIMIT)];
        let elided = bytes.len() - shown.len();
        let mut record = format!(
            "{} raw {} bytes\n{}",
            record_prefix(direction.label()),
            bytes.len(),
            String::from_utf8_lossy(shown)
        );
        if elided > 0 {
            record.push_str(&format!("\n… {elided} more bytes"));
        }
        if !record.ends_with('\n') {
            record.push('\n');
        }
        self.append(record)
    }

    /// Log a proxy lifecycle event (child start, exit, relayed signals).
    pub fn log_event(&self, message: &dyn fmt::Display) -> io::Result<()> {
        self.append(format!("{} {message}\n", record_prefix(PROXY_LABEL)))
    }

    fn append(&self, record: String) -> io::Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.append(record.as_bytes())
    }
}

impl fmt::Debug for PacketLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketLogger").finish_non_exhaustive()
    }
}

fn record_prefix(label: &str) -> String {
    format!("[{}] [{label}]", now_unix_timestamp())
}

fn now_unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| format!("{}.{:03}", d.as_secs(), d.subsec_millis()))
        .unwrap_or_else(|_| "0.000".to_string())
}

#[cfg(test)]
mod tests {
    use pipetap_payload::{Value, UNKNOWN_COMMAND};

    use super::*;

    fn packet() -> DecodedPacket {
        DecodedPacket {
            channel: 1,
            command: "build".to_string(),
            argument: Value::Map(vec![("target".to_string(), Value::from("App"))]),
            decode_error: None,
        }
    }

    #[test]
    fn packet_record_is_tagged_and_indented() {
        let sink = MemorySink::new();
        let logger = PacketLogger::new(sink.clone());

        logger.log_packet(Direction::ParentToChild, &packet()).unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.starts_with('['));
        assert!(record.contains("] [parent→child] packet channel=1 command=build\n"));
        assert!(record.contains("  \"command\": \"build\""));
        assert!(record.contains("    \"target\": \"App\""));
        assert!(record.ends_with("}\n"));
    }

    #[test]
    fn fallback_packet_is_marked() {
        let sink = MemorySink::new();
        let logger = PacketLogger::new(sink.clone());
        let packet = DecodedPacket::decode(4, b"\xC1oops");

        logger.log_packet(Direction::ChildStdout, &packet).unwrap();

        let record = sink.contents();
        assert!(record.contains("[child→parent stdout] packet (raw payload) channel=4"));
        assert!(record.contains(UNKNOWN_COMMAND));
        assert!(record.contains("\"decode_error\""));
    }

    #[test]
    fn error_and_event_records_are_single_lines() {
        let sink = MemorySink::new();
        let logger = PacketLogger::new(sink.clone());

        logger
            .log_error(Direction::ChildStderr, &"truncated frame")
            .unwrap();
        logger.log_event(&"child exited cleanly").unwrap();

        let records = sink.records();
        assert!(records[0].ends_with("[child→parent stderr] error: truncated frame\n"));
        assert!(records[1].ends_with("[proxy] child exited cleanly\n"));
        assert!(records.iter().all(|r| r.matches('\n').count() == 1));
    }

    #[test]
    fn raw_records_are_bounded() {
        let sink = MemorySink::new();
        let logger = PacketLogger::new(sink.clone());

        logger
            .log_raw(Direction::ChildStderr, &vec![b'x'; RAW_PREVIEW_LIMIT + 10])
            .unwrap();

        let record = sink.contents();
        assert!(record.contains(&format!("raw {} bytes", RAW_PREVIEW_LIMIT + 10)));
        assert!(record.ends_with("… 10 more bytes\n"));
    }

    #[test]
    fn file_sink_appends_records() {
        let dir = std::env::temp_dir().join(format!(
            "pipetap-logger-file-sink-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("packets.log");
        std::fs::write(&path, "existing\n").unwrap();

        let sink = FileSink::open(&path).unwrap();
        assert_eq!(sink.path(), path.as_path());
        let logger = PacketLogger::new(sink);
        logger.log_event(&"appended").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("existing\n"));
        assert!(contents.ends_with("[proxy] appended\n"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_sink_open_failure_names_path() {
        let err = FileSink::open("/nonexistent-dir/pipetap/packets.log").unwrap_err();
        assert!(matches!(err, ProxyError::LogSink { .. }));
        assert!(err.to_string().contains("/nonexistent-dir/pipetap/packets.log"));
    }

    #[test]
    fn concurrent_appends_never_split_records() {
        let sink = MemorySink::new();
        let logger = Arc::new(PacketLogger::new(sink.clone()));

        let threads: Vec<_> = Direction::ALL
            .into_iter()
            .map(|direction| {
                let logger = Arc::clone(&logger);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        logger.log_packet(direction, &packet()).unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let records = sink.records();
        assert_eq!(records.len(), 150);
        for record in records {
            assert_eq!(record.matches("packet channel=1").count(), 1);
            assert!(record.ends_with("}\n"));
        }
    }
}
