//! Relay server binary.
//!
//! Serves the static client bundle over HTTP and bridges WebSocket
//! connections into the room relay.

use roomcast::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    log();
    kys();
    hosting::Server::run().await
}
