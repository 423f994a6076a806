//! Watch a device for state and connectivity changes for a minute.
//!
//! Usage: cargo run --example subscribe -- <host>

use std::time::Duration;
use streammagic::{Event, StreamMagicClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host = std::env::args()
        .nth(1)
        .expect("usage: subscribe <host>");

    let client = StreamMagicClient::new(host);
    let watcher = client.clone();
    client
        .register_observer(move |event| {
            let watcher = watcher.clone();
            async move {
                match event {
                    Event::StateChanged => {
                        if let Some(play_state) = watcher.play_state() {
                            println!(
                                "play state: {} (track: {})",
                                play_state.state,
                                play_state.metadata.title.as_deref().unwrap_or("-")
                            );
                        }
                    }
                    Event::ConnectionChanged(state) => {
                        println!("connection: {:?}", state);
                    }
                }
            }
        })
        .await;

    client.connect().await?;

    // Play media from the unit's front controls or the StreamMagic app
    tokio::time::sleep(Duration::from_secs(60)).await;

    client.disconnect().await;
    Ok(())
}
