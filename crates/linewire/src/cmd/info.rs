use std::time::Instant;

use comfy_table::{presets::UTF8_FULL, Table};
use linewire_peer::Client;
use serde::Serialize;

use crate::cmd::InfoArgs;
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize, Debug)]
struct InfoOutput {
    client_id: String,
    server: String,
    connect_ms: f64,
    max_line_length: usize,
    connected: bool,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.connect.client_config()?;
    let max_line_length = config.max_line_length;
    let client = Client::new(config);

    let start = Instant::now();
    let id = client
        .connect()
        .map_err(|err| peer_error("connect failed", err))?;
    let elapsed = start.elapsed();

    let out = InfoOutput {
        client_id: id.to_string(),
        server: args.connect.addr.clone(),
        connect_ms: round_millis(elapsed.as_secs_f64() * 1000.0),
        max_line_length,
        connected: client.is_connected(),
    };

    client
        .disconnect()
        .map_err(|err| peer_error("disconnect failed", err))?;

    print_info(&out, format);
    Ok(SUCCESS)
}

fn round_millis(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["FIELD", "VALUE"]);
            table.add_row(vec!["client id".to_string(), out.client_id.clone()]);
            table.add_row(vec!["server".to_string(), out.server.clone()]);
            table.add_row(vec!["connect".to_string(), format!("{:.2}ms", out.connect_ms)]);
            table.add_row(vec!["max line".to_string(), format!("{} bytes", out.max_line_length)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Connection Info:");
            println!("  Client ID:   {}", out.client_id);
            println!("  Server:      {}", out.server);
            println!("  Connect:     {:.2}ms", out.connect_ms);
            println!("  Max line:    {} bytes", out.max_line_length);
        }
        OutputFormat::Raw => {
            println!("{}", out.client_id);
        }
    }
}
