//! Chat server on 127.0.0.1:4000 that answers `ping` with `pong`.
//!
//! Run with:
//!   cargo run --example chat-server
//!
//! In other terminals:
//!   cargo run --features cli -- chat 127.0.0.1:4000

use linewire::peer::{Server, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::new(ServerConfig {
        bind_addr: "127.0.0.1:4000".to_string(),
        ..ServerConfig::default()
    });

    server.on_client_connect(|id| eprintln!("+ {id}"));
    server.on_client_disconnect(|id| eprintln!("- {id}"));

    let replier = server.clone();
    server.subscribe(move |id, line| {
        eprintln!("{id}: {line}");
        if line.trim() == "ping" {
            replier.send_to_client(id, "pong");
        }
    });

    eprintln!("Listening on 127.0.0.1:4000 (Ctrl-C to quit)");
    server.start()?;
    Ok(())
}
