mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, RunArgs};
use crate::logging::{LogFormat, LogLevel, LogSettings};

/// With no subcommand the proxy runs with settings from the environment, which
/// is how a parent that only knows the worker's path will start it.
#[derive(Parser, Debug)]
#[command(
    name = "pipetap",
    version,
    about = "Transparent stdio proxy with protocol logging",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Log output format.
    #[arg(
        long,
        value_name = "FORMAT",
        env = "PIPETAP_LOG_FORMAT",
        default_value = "text",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level.
    #[arg(
        long,
        value_name = "LEVEL",
        env = "PIPETAP_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let log = LogSettings {
        format: cli.log_format,
        level: cli.log_level,
    };
    let command = cli.command.unwrap_or(Command::Run(cli.run));

    match cmd::run(command, log) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
