mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "linewire", version, about = "Line-oriented TCP message routing")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "67e55044-10b1-426f-9247-bb680e5fe0c8";

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "linewire",
            "serve",
            "--bind",
            "127.0.0.1:4500",
            "--idle-timeout",
            "30s",
            "--count",
            "2",
        ])
        .expect("serve args should parse");

        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.bind, "127.0.0.1:4500");
                assert_eq!(args.count, Some(2));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_direct_send() {
        let cli = Cli::try_parse_from(["linewire", "send", "127.0.0.1:4500", "--to", ID, "-m", "hi"])
            .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.to.map(|id| id.to_string()).as_deref(), Some(ID));
                assert_eq!(args.message, "hi");
                assert!(!args.global);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn send_rejects_malformed_target() {
        let err = Cli::try_parse_from(["linewire", "send", "--to", "bob", "-m", "hi"])
            .expect_err("non-uuid target should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn rejects_direct_and_global_together() {
        let err = Cli::try_parse_from(["linewire", "send", "--to", ID, "--global", "-m", "hi"])
            .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_info_with_global_flags() {
        let cli = Cli::try_parse_from([
            "linewire",
            "info",
            "10.0.0.5:4000",
            "--format",
            "json",
            "--log-level",
            "warn",
        ])
        .expect("info args should parse");
        assert!(matches!(cli.command, Command::Info(_)));
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }
}
