//! Connects to a chat server, says hello to everyone and prints what comes back.
//!
//! Run with:
//!   cargo run --example chat-server
//!   cargo run --example chat-client

use std::time::Duration;

use linewire::peer::{Client, ClientConfig, Notice};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new(ClientConfig::new("127.0.0.1:4000"));

    client.subscribe(|line| match Notice::parse(line) {
        Notice::Direct { from, payload } => println!("[dm {from}] {payload}"),
        Notice::Broadcast { from, payload } => println!("[all {from}] {payload}"),
        Notice::InvalidTarget => println!("[server] invalid target"),
        Notice::Kick | Notice::Other(_) => println!("{line}"),
    });
    client.on_kick(|| eprintln!("Kicked by server"));

    let id = client.connect()?;
    eprintln!("Connected as {id}");

    client.send_broadcast_message("hello everyone")?;
    client.send_message("ping")?;

    if !client.wait_closed(Duration::from_secs(5)) {
        client.disconnect()?;
    }
    Ok(())
}
