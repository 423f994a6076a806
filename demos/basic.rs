//! Connect to a device, print its info and sources, and disconnect.
//!
//! Usage: cargo run --example basic -- <host>

use streammagic::StreamMagicClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host = std::env::args()
        .nth(1)
        .expect("usage: basic <host>");

    let client = StreamMagicClient::new(host);
    client.connect().await?;

    if let Some(info) = client.info() {
        println!("Model: {}", info.model);
        println!("Name:  {}", info.name);
        println!("API:   {}", info.api_version);
    }
    for source in client.sources() {
        println!("Source: {} ({})", source.name, source.id);
    }

    client.disconnect().await;
    Ok(())
}
