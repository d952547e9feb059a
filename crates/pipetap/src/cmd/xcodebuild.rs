use std::process::Command;

use pipetap_proxy::{ChildExit, ProxyError};

use crate::cmd::XcodebuildArgs;
use crate::exit::{io_error, proxy_error, CliResult};
use crate::logging::{init_logging, LogDestination, LogSettings};

/// Environment variable xcodebuild reads to locate its build service.
pub const BUILD_SERVICE_ENV: &str = "XCBBUILDSERVICE_PATH";

pub fn run(args: XcodebuildArgs, log: LogSettings) -> CliResult<i32> {
    init_logging(log, LogDestination::Stderr);

    let exe = std::env::current_exe()
        .map_err(|err| io_error("failed to locate pipetap executable", err))?;
    tracing::info!(
        xcrun = %args.xcrun.display(),
        build_service = %exe.display(),
        "launching xcodebuild"
    );

    let status = Command::new(&args.xcrun)
        .arg("xcodebuild")
        .args(&args.args)
        .env(BUILD_SERVICE_ENV, &exe)
        .status()
        .map_err(|source| {
            proxy_error(ProxyError::Launch {
                path: args.xcrun.clone(),
                source,
            })
        })?;

    let exit = ChildExit::from_status(status);
    if exit.success() {
        tracing::info!("xcodebuild exited cleanly");
    } else {
        tracing::warn!(exit_code = exit.exit_code(), "xcodebuild {exit}");
    }
    Ok(exit.exit_code())
}
