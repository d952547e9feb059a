use std::sync::Arc;
use std::time::Duration;

use pipetap_frame::FrameConfig;
use pipetap_proxy::{FileSink, PacketLogger, ProxyConfig, StreamMode, Supervisor};

use crate::cmd::RunArgs;
use crate::exit::{proxy_error, CliResult};
use crate::logging::{init_logging, LogDestination, LogSettings};

pub fn run(args: RunArgs, log: LogSettings) -> CliResult<i32> {
    let sink = match FileSink::open(&args.log_file) {
        Ok(sink) => sink,
        Err(err) => {
            init_logging(log, LogDestination::Stderr);
            return Err(proxy_error(err));
        }
    };

    // The child owns stdout and stderr, so diagnostics share the packet log.
    match sink.try_clone_file() {
        Ok(file) => init_logging(log, LogDestination::File(file)),
        Err(err) => {
            init_logging(log, LogDestination::Stderr);
            tracing::warn!(error = %err, "diagnostics fall back to stderr");
        }
    }

    let config = proxy_config(args);
    let logger = Arc::new(PacketLogger::new(sink));
    let supervisor = Supervisor::new(config, Arc::clone(&logger));

    match supervisor.run() {
        Ok(exit) => Ok(exit.exit_code()),
        Err(err) => {
            tracing::error!(error = %err, "proxy failed");
            if let Err(log_err) = logger.log_event(&format_args!("error: {err}")) {
                tracing::warn!(error = %log_err, "packet log append failed");
            }
            Err(proxy_error(err))
        }
    }
}

fn proxy_config(args: RunArgs) -> ProxyConfig {
    let mut config = ProxyConfig::new(args.target).with_args(args.child_args);
    if args.raw_stdout {
        config.stdout_mode = StreamMode::Raw;
    }
    if args.raw_stderr {
        config.stderr_mode = StreamMode::Raw;
    }
    if let Some(max_payload_size) = args.max_payload {
        config.frame = FrameConfig { max_payload_size };
    }
    if args.no_signal_relay {
        config.relay_signals.clear();
    }
    if let Some(ms) = args.drain_timeout_ms {
        config.drain_timeout = Duration::from_millis(ms);
    }
    config
}
