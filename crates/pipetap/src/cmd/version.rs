use pipetap_proxy::{DEFAULT_LOG_FILE, DEFAULT_TARGET};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::logging::{init_logging, LogDestination, LogSettings};

pub fn run(args: VersionArgs, log: LogSettings) -> CliResult<i32> {
    init_logging(log, LogDestination::Stderr);

    if !args.extended {
        println!("pipetap {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: pipetap");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("PIPETAP_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("signal_relay: {}", cfg!(unix));
    println!("default_target: {DEFAULT_TARGET}");
    println!("default_log_file: {DEFAULT_LOG_FILE}");

    Ok(SUCCESS)
}
