use std::sync::mpsc;

use linewire_frame::DEFAULT_MAX_LINE_LENGTH;
use linewire_peer::{ClientId, Server, ServerConfig};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, Event, OutputFormat};

/// Everything the main thread reacts to while serving.
enum Signal {
    Connected(ClientId),
    Disconnected(ClientId),
    Message(ClientId, String),
    Interrupted,
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = server_config(&args)?;
    let server = Server::new(config);
    let (tx, rx) = mpsc::channel();

    let events = tx.clone();
    server.on_client_connect(move |id| {
        let _ = events.send(Signal::Connected(id));
    });
    let events = tx.clone();
    server.on_client_disconnect(move |id| {
        let _ = events.send(Signal::Disconnected(id));
    });
    let events = tx.clone();
    server.subscribe(move |id, line| {
        let _ = events.send(Signal::Message(id, line.to_string()));
    });
    install_ctrlc_handler(tx)?;

    let accept_loop = server
        .spawn()
        .map_err(|err| peer_error("bind failed", err))?;

    let mut printed = 0usize;
    for signal in rx {
        let event = match &signal {
            Signal::Connected(id) => Event::Connected(*id),
            Signal::Disconnected(id) => Event::Disconnected(*id),
            Signal::Message(from, line) => Event::Message { from: *from, line },
            Signal::Interrupted => break,
        };
        print_event(&event, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    server.stop();
    if accept_loop.join().is_err() {
        tracing::warn!("accept loop panicked");
    }
    Ok(SUCCESS)
}

fn server_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    let read_timeout = args
        .idle_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    Ok(ServerConfig {
        bind_addr: args.bind.clone(),
        read_timeout,
        max_line_length: args.max_line_length.unwrap_or(DEFAULT_MAX_LINE_LENGTH),
        ..ServerConfig::default()
    })
}

fn install_ctrlc_handler(tx: mpsc::Sender<Signal>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = tx.send(Signal::Interrupted);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn idle_timeout_maps_to_read_timeout() {
        let args = ServeArgs {
            bind: "127.0.0.1:0".to_string(),
            idle_timeout: Some("250ms".to_string()),
            max_line_length: Some(64),
            count: None,
        };
        let config = server_config(&args).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:0");
        assert_eq!(config.read_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.max_line_length, 64);
    }

    #[test]
    fn no_idle_timeout_by_default() {
        let args = ServeArgs {
            bind: "0.0.0.0:4000".to_string(),
            idle_timeout: None,
            max_line_length: None,
            count: Some(1),
        };
        let config = server_config(&args).unwrap();
        assert!(config.read_timeout.is_none());
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
    }
}
