use std::time::Duration;

use clap::{Args, Subcommand};
use linewire_peer::{ClientConfig, ClientId};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod chat;
pub mod info;
pub mod send;
pub mod serve;
pub mod version;

const DEFAULT_ADDR: &str = "127.0.0.1:4000";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a routing server.
    Serve(ServeArgs),
    /// Connect, send one message and disconnect.
    Send(SendArgs),
    /// Interactive session: lines from stdin are sent, received lines are printed.
    Chat(ChatArgs),
    /// Connect and print the identity assigned by the server.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Chat(args) => chat::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "LINEWIRE_BIND", default_value = "0.0.0.0:4000")]
    pub bind: String,
    /// Close clients that stay silent this long (e.g. 30s). Default: never.
    #[arg(long, value_name = "DURATION")]
    pub idle_timeout: Option<String>,
    /// Maximum line length in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_line_length: Option<usize>,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

/// Connection options shared by client-side commands.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server address (host:port).
    #[arg(env = "LINEWIRE_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,
    /// Connection attempts before giving up.
    #[arg(long, default_value = "3")]
    pub retries: u32,
    /// Delay between attempts (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub retry_delay: String,
    /// Time allowed for the identity handshake.
    #[arg(long, default_value = "5s")]
    pub handshake_timeout: String,
}

impl ConnectArgs {
    pub fn client_config(&self) -> CliResult<ClientConfig> {
        Ok(ClientConfig {
            max_retries: self.retries,
            retry_delay: parse_duration(&self.retry_delay)?,
            handshake_timeout: parse_duration(&self.handshake_timeout)?,
            ..ClientConfig::new(self.addr.clone())
        })
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Message text.
    #[arg(long, short = 'm')]
    pub message: String,
    /// Send as a direct message to this client id.
    #[arg(long, value_name = "UUID", conflicts_with = "global")]
    pub to: Option<ClientId>,
    /// Send as a broadcast to every other client.
    #[arg(long)]
    pub global: bool,
    /// Wait for one line from the server and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `250ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
        assert_eq!(parse_duration("1m").unwrap_err().code, USAGE);
    }

    #[test]
    fn connect_args_map_onto_client_config() {
        let args = ConnectArgs {
            addr: "10.0.0.1:9".to_string(),
            retries: 5,
            retry_delay: "200ms".to_string(),
            handshake_timeout: "2s".to_string(),
        };
        let config = args.client_config().unwrap();
        assert_eq!(config.addr, "10.0.0.1:9");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(200));
        assert_eq!(config.handshake_timeout, Duration::from_secs(2));
    }
}
