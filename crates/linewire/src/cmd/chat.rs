use std::io::{self, BufRead};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use linewire_peer::{Client, ClientId, KICK};

use crate::cmd::ChatArgs;
use crate::exit::{io_error, peer_error, CliResult, SUCCESS};
use crate::output::{print_event, Event, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One line typed by the user.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Quit,
    Direct(ClientId, &'a str),
    Broadcast(&'a str),
    Raw(&'a str),
    Invalid(String),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Raw(line);
    };

    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    match name {
        "quit" | "exit" => Input::Quit,
        "all" => Input::Broadcast(rest.trim()),
        "to" => {
            let (target, text) = rest.trim_start().split_once(' ').unwrap_or((rest, ""));
            match target.trim().parse() {
                Ok(id) => Input::Direct(id, text.trim()),
                Err(err) => Input::Invalid(format!("{err}")),
            }
        }
        other => Input::Invalid(format!("unknown command '/{other}' (try /to, /all, /quit)")),
    }
}

pub fn run(args: ChatArgs, format: OutputFormat) -> CliResult<i32> {
    let client = Client::new(args.connect.client_config()?);
    client.subscribe(move |line| print_event(&Event::Received(line), format));
    client.on_kick(move || print_event(&Event::Received(KICK), format));

    let id = client
        .connect()
        .map_err(|err| peer_error("connect failed", err))?;
    eprintln!("connected as {id}. /to <id> <text>, /all <text>, /quit");

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("linewire-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let stop = line.is_err();
                if tx.send(line).is_err() || stop {
                    break;
                }
            }
        })
        .map_err(|err| io_error("failed to spawn stdin reader", err))?;

    while client.is_connected() {
        let line = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => line.map_err(|err| io_error("stdin read failed", err))?,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let sent = match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Invalid(message) => {
                eprintln!("{message}");
                continue;
            }
            Input::Direct(target, text) => client.send_message_to_client(target, text),
            Input::Broadcast(text) => client.send_broadcast_message(text),
            Input::Raw(text) => client.send_message(text),
        };
        sent.map_err(|err| peer_error("send failed", err))?;
    }

    client
        .disconnect()
        .map_err(|err| peer_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "67e55044-10b1-426f-9247-bb680e5fe0c8";

    #[test]
    fn plain_lines_are_raw() {
        assert_eq!(parse_input("status ping"), Input::Raw("status ping"));
        assert_eq!(parse_input("GLOBAL: typed by hand"), Input::Raw("GLOBAL: typed by hand"));
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/all hello there"), Input::Broadcast("hello there"));
        assert_eq!(
            parse_input(&format!("/to {ID} psst, over here")),
            Input::Direct(ID.parse().unwrap(), "psst, over here")
        );
    }

    #[test]
    fn bad_commands_are_reported_locally() {
        assert!(matches!(parse_input("/to nobody hi"), Input::Invalid(_)));
        assert!(matches!(parse_input("/kick someone"), Input::Invalid(_)));
    }
}
