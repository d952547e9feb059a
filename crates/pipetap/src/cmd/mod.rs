use clap::{Args, Subcommand};
use std::path::PathBuf;

use pipetap_proxy::{DEFAULT_LOG_FILE, DEFAULT_TARGET};

use crate::exit::CliResult;
use crate::logging::LogSettings;
use crate::output::OutputFormat;

const XCRUN: &str = "/usr/bin/xcrun";

pub mod decode;
pub mod run;
pub mod version;
pub mod xcodebuild;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch the target and proxy its stdio (default when no subcommand is given).
    Run(RunArgs),
    /// Decode a captured framed byte stream.
    Decode(DecodeArgs),
    /// Run xcodebuild with this proxy standing in for the build service.
    Xcodebuild(XcodebuildArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, log: LogSettings) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, log),
        Command::Decode(args) => decode::run(args, log),
        Command::Xcodebuild(args) => xcodebuild::run(args, log),
        Command::Version(args) => version::run(args, log),
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Executable to launch as the proxied child.
    #[arg(
        long,
        env = "PIPETAP_TARGET",
        value_name = "PATH",
        default_value = DEFAULT_TARGET
    )]
    pub target: PathBuf,
    /// Append-only packet log.
    #[arg(
        long,
        env = "PIPETAP_LOG_FILE",
        value_name = "PATH",
        default_value = DEFAULT_LOG_FILE
    )]
    pub log_file: PathBuf,
    /// Pass the child's stdout through without framing.
    #[arg(long, env = "PIPETAP_RAW_STDOUT")]
    pub raw_stdout: bool,
    /// Pass the child's stderr through without framing.
    #[arg(long, env = "PIPETAP_RAW_STDERR")]
    pub raw_stderr: bool,
    /// Largest payload accepted on a framed stream, in bytes.
    #[arg(long, env = "PIPETAP_MAX_PAYLOAD", value_name = "BYTES")]
    pub max_payload: Option<usize>,
    /// Do not relay termination signals to the child.
    #[arg(long)]
    pub no_signal_relay: bool,
    /// How long to wait for stdout/stderr to close after the child exits.
    #[arg(long, env = "PIPETAP_DRAIN_TIMEOUT_MS", value_name = "MS")]
    pub drain_timeout_ms: Option<u64>,
    /// Arguments passed to the child.
    #[arg(last = true, value_name = "ARGS")]
    pub child_args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Captured stream to decode ("-" reads stdin).
    pub input: PathBuf,
    /// Output format.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,
    /// Largest payload accepted, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct XcodebuildArgs {
    /// Tool used to locate xcodebuild.
    #[arg(long, env = "PIPETAP_XCRUN", value_name = "PATH", default_value = XCRUN)]
    pub xcrun: PathBuf,
    /// Arguments passed to xcodebuild.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
