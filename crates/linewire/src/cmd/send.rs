use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use linewire_peer::{Client, KICK};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_event, Event, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let client = Client::new(args.connect.client_config()?);

    let (tx, rx) = mpsc::channel();
    if args.wait {
        let lines = tx.clone();
        client.subscribe(move |line| {
            let _ = lines.send(line.to_string());
        });
        client.on_kick(move || {
            let _ = tx.send(KICK.to_string());
        });
    }

    client
        .connect()
        .map_err(|err| peer_error("connect failed", err))?;

    let sent = match args.to {
        Some(target) => client.send_message_to_client(target, &args.message),
        None if args.global => client.send_broadcast_message(&args.message),
        None => client.send_message(&args.message),
    };
    if let Err(err) = sent {
        let _ = client.disconnect();
        return Err(peer_error("send failed", err));
    }

    let waited = if args.wait {
        wait_for_line(&rx, wait_timeout).map(|line| print_event(&Event::Received(&line), format))
    } else {
        Ok(())
    };

    client
        .disconnect()
        .map_err(|err| peer_error("disconnect failed", err))?;
    waited.map(|()| SUCCESS)
}

fn wait_for_line(rx: &Receiver<String>, timeout: Duration) -> CliResult<String> {
    match rx.recv_timeout(timeout) {
        Ok(line) => Ok(line),
        Err(RecvTimeoutError::Timeout) => Err(CliError::new(
            TIMEOUT,
            format!("no line received within {timeout:?}"),
        )),
        Err(RecvTimeoutError::Disconnected) => {
            Err(CliError::new(FAILURE, "connection closed before a reply"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_returns_first_line() {
        let (tx, rx) = mpsc::channel();
        tx.send("pong".to_string()).unwrap();
        tx.send("later".to_string()).unwrap();
        assert_eq!(wait_for_line(&rx, Duration::from_millis(10)).unwrap(), "pong");
    }

    #[test]
    fn wait_times_out_with_124() {
        let (_tx, rx) = mpsc::channel::<String>();
        let err = wait_for_line(&rx, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn wait_on_dropped_sender_fails() {
        let (tx, rx) = mpsc::channel::<String>();
        drop(tx);
        let err = wait_for_line(&rx, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code, FAILURE);
    }
}
