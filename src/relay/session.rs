use super::*;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;

/// Per-connection lifecycle: registration, the bidirectional bridge, and
/// teardown.
///
/// The registry only ever sees an UnboundedSender; this loop drains the
/// paired receiver into the WebSocket, so registry operations never block
/// on network I/O. Whichever way the connection dies (client close, write
/// error, stream end), teardown funnels through the same idempotent
/// disconnect.
pub struct Session;

impl Session {
    pub async fn run(
        registry: Arc<Registry>,
        mut session: actix_ws::Session,
        mut stream: actix_ws::MessageStream,
    ) {
        let (tx, mut rx) = unbounded_channel::<String>();
        let id = registry.connect(tx).await;
        'sesh: loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Some(json) => if session.text(json).await.is_err() { break 'sesh },
                    None => break 'sesh,
                },
                msg = stream.next() => match msg {
                    Some(Ok(actix_ws::Message::Text(text))) => Handler::dispatch(&registry, id, &text).await,
                    Some(Ok(actix_ws::Message::Close(_))) => break 'sesh,
                    Some(Err(_)) => break 'sesh,
                    None => break 'sesh,
                    _ => continue 'sesh,
                },
            }
        }
        registry.disconnect(id).await;
    }
}
