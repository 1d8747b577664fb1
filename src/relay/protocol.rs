use super::*;
use crate::Coord;
use crate::RoomId;
use serde::Deserialize;
use serde::Serialize;

/// Inbound frames, parsed once into a closed set of shapes.
///
/// The wire carries no explicit type tag; the two payloads are disjoint by
/// field set, so untagged deserialization classifies each frame exactly
/// once. Anything matching neither variant is rejected at parse time and
/// dropped by the handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// `{ "pos": { x, y, z, direction, isRunning } }`
    Position { pos: PositionUpdate },
    /// `{ "room": string, "name": string }`
    Join { room: RoomId, name: String },
}

impl ClientMessage {
    pub fn decode(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}

/// Position/orientation/motion report. Last write wins; no bounds checks.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PositionUpdate {
    pub x: Coord,
    pub y: Coord,
    pub z: Coord,
    pub direction: Coord,
    #[serde(rename = "isRunning")]
    pub is_running: bool,
}

/// Outbound frames. Untagged: the join ack is a bare object, the periodic
/// snapshot carries its own `type` discriminator.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Joined(JoinAck),
    Snapshot(Snapshot),
}

/// Acknowledgment for a join that changed membership: `{ roomid, id }`.
#[derive(Debug, Clone, Serialize)]
pub struct JoinAck {
    pub roomid: RoomId,
    pub id: PlayerId,
}

/// Periodic room snapshot: `{ "type": "others", "players": [..] }`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Snapshot {
    Others { players: Vec<OtherPlayer> },
}
