use super::*;

/// Applies one inbound frame against the registry.
///
/// Local-recovery policy: a frame that fails to parse, names a stale
/// identity, or carries an empty display name is dropped and the
/// connection stays open. Nothing here may take the process down.
pub struct Handler;

impl Handler {
    pub async fn dispatch(registry: &Registry, id: PlayerId, frame: &str) {
        match ClientMessage::decode(frame) {
            Ok(ClientMessage::Position { pos }) => registry.update_position(id, pos).await,
            Ok(ClientMessage::Join { room, name }) => {
                if name.is_empty() {
                    log::debug!("dropping join with empty name from {}", id);
                    return;
                }
                if let Some(ack) = registry.join_room(id, room, name).await {
                    if let Err(e) = registry.unicast(id, &ServerMessage::Joined(ack)).await {
                        log::warn!("failed join ack to {}: {}", id, e);
                    }
                }
            }
            Err(e) => log::debug!("dropping malformed frame from {}: {}", id, e),
        }
    }
}
