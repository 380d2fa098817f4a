//! Line echo server driven by tokio and the `LineCodec`.
//!
//! Run with:
//!   cargo run --example async-line-echo --features async
//!
//! Then: `nc 127.0.0.1 4100`

use futures_util::{SinkExt, StreamExt};
use linewire::frame::LineCodec;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:4100").await?;
    eprintln!("Listening on {}", listener.local_addr()?);

    loop {
        let (socket, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let mut lines = Framed::new(socket, LineCodec::new());
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        eprintln!("{peer}: {err}");
                        break;
                    }
                };
                if lines.send(line.as_str()).await.is_err() {
                    break;
                }
            }
            eprintln!("{peer} disconnected");
        });
    }
}
