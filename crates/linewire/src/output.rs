use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use linewire_peer::{ClientId, Notice};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Something worth printing: a server-side lifecycle event or a line a
/// client received.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    Connected(ClientId),
    Disconnected(ClientId),
    /// Application line a client sent to the server.
    Message { from: ClientId, line: &'a str },
    /// Line received from the server.
    Received(&'a str),
}

#[derive(Serialize, Debug)]
struct EventOutput<'a> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<&'a str>,
    timestamp: String,
}

impl<'a> Event<'a> {
    fn describe(&self) -> EventOutput<'a> {
        let (event, client_id, payload, raw) = match *self {
            Event::Connected(id) => ("connected", Some(id), None, None),
            Event::Disconnected(id) => ("disconnected", Some(id), None, None),
            Event::Message { from, line } => ("message", Some(from), Some(line), Some(line)),
            Event::Received(line) => match Notice::parse(line) {
                Notice::Kick => ("kick", None, None, Some(line)),
                Notice::InvalidTarget => ("invalid-target", None, None, Some(line)),
                Notice::Direct { from, payload } => ("direct", Some(from), Some(payload), Some(line)),
                Notice::Broadcast { from, payload } => {
                    ("broadcast", Some(from), Some(payload), Some(line))
                }
                Notice::Other(text) => ("line", None, Some(text), Some(line)),
            },
        };
        EventOutput {
            event,
            client_id: client_id.map(|id| id.to_string()),
            payload,
            raw,
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_event(event: &Event<'_>, format: OutputFormat) {
    let out = event.describe();
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "CLIENT", "PAYLOAD"])
                .add_row(vec![
                    out.event.to_string(),
                    out.client_id.clone().unwrap_or_default(),
                    out.payload.unwrap_or_default().to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", pretty(&out)),
        OutputFormat::Raw => {
            if let Some(raw) = out.raw {
                print_raw_line(raw);
            }
        }
    }
}

fn pretty(out: &EventOutput<'_>) -> String {
    let mut text = out.event.to_string();
    if let Some(id) = &out.client_id {
        text.push_str(&format!(" client={id}"));
    }
    if let Some(payload) = out.payload {
        text.push_str(&format!(" payload={payload}"));
    }
    text
}

pub fn print_raw_line(line: &str) {
    let mut out = std::io::stdout();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
