use super::*;
use crate::Coord;
use crate::ID;
use crate::RoomId;
use crate::SPAWN_X;
use crate::SPAWN_Y;
use crate::SPAWN_Z;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Opaque connection identity, unique for the process lifetime.
pub type PlayerId = ID<Player>;

/// Mutable per-connection state, owned exclusively by the Registry.
///
/// Position, heading, and the motion flag may be overwritten at any time,
/// but are only relayed once the player is ready (joined a room). The
/// outbound channel handle lives and dies with the connection and is never
/// serialized.
#[derive(Debug)]
pub struct Player {
    pub name: Option<String>,
    pub x: Coord,
    pub y: Coord,
    pub z: Coord,
    pub direction: Coord,
    pub is_running: bool,
    pub room: Option<RoomId>,
    pub ready: bool,
    pub(crate) tx: UnboundedSender<String>,
}

impl Player {
    /// Fresh player at the spawn point: not ready, no room, no name.
    pub fn spawn(tx: UnboundedSender<String>) -> Self {
        Self {
            name: None,
            x: SPAWN_X,
            y: SPAWN_Y,
            z: SPAWN_Z,
            direction: 0.0,
            is_running: false,
            room: None,
            ready: false,
            tx,
        }
    }

    /// Unconditional last-write-wins overwrite from an inbound report.
    pub fn apply(&mut self, pos: PositionUpdate) {
        self.x = pos.x;
        self.y = pos.y;
        self.z = pos.z;
        self.direction = pos.direction;
        self.is_running = pos.is_running;
    }

    /// Projects this player into the wire shape seen by roommates.
    pub fn project(&self, id: PlayerId) -> OtherPlayer {
        OtherPlayer {
            id,
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            z: self.z,
            dir: self.direction,
            is_running: self.is_running,
        }
    }
}

/// One roommate's state as it appears inside an "others" snapshot.
/// The name is omitted entirely until the player has announced one.
#[derive(Debug, Clone, Serialize)]
pub struct OtherPlayer {
    pub id: PlayerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub x: Coord,
    pub y: Coord,
    pub z: Coord,
    pub dir: Coord,
    #[serde(rename = "isRunning")]
    pub is_running: bool,
}
