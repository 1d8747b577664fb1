use super::*;
use crate::RoomId;
use std::collections::BTreeSet;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::sync::mpsc::UnboundedSender;

type Tx = UnboundedSender<String>;

/// Single source of truth for connections and rooms.
///
/// Owns the Connection Registry (identity -> Player) and the Room Directory
/// (room id -> member identities) behind one lock, so every operation sees
/// both maps atomically. One instance lives for the process and is passed
/// by reference into the handler, the session loop, and the scheduler.
///
/// Invariants:
/// - a player is ready iff its room is set and that room contains it
/// - no room with an empty member set survives any membership change
///
/// Cross-operation races (a room vanishing between a lookup and a send) are
/// expected and tolerated; nothing here is allowed to take the process down.
#[derive(Default)]
pub struct Registry {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    players: HashMap<PlayerId, Player>,
    rooms: HashMap<RoomId, BTreeSet<PlayerId>>,
}

impl Registry {
    /// Registers a new connection at the spawn point and returns its
    /// identity. Invisible to other players until a room join.
    pub async fn connect(&self, tx: Tx) -> PlayerId {
        let id = PlayerId::default();
        self.state.write().await.players.insert(id, Player::spawn(tx));
        log::info!("player {} connected", id);
        id
    }

    /// Removes a connection and sweeps it out of every room, dropping any
    /// room left empty. Idempotent: closing twice is a no-op.
    pub async fn disconnect(&self, id: PlayerId) {
        let mut state = self.state.write().await;
        let known = state.players.remove(&id).is_some();
        state.rooms.retain(|room, members| {
            members.remove(&id);
            if members.is_empty() {
                log::info!("closed room {}", room);
                false
            } else {
                true
            }
        });
        if known {
            log::info!("player {} disconnected", id);
        }
    }

    /// Overwrites a player's position, heading, and motion flag. A stale
    /// identity means the frame raced the close; it is dropped silently.
    pub async fn update_position(&self, id: PlayerId, pos: PositionUpdate) {
        if let Some(player) = self.state.write().await.players.get_mut(&id) {
            player.apply(pos);
        }
    }

    /// Joins a player to the named room, creating the room under that name
    /// if absent. Returns the ack to push down the joiner's channel, or
    /// None when nothing changed (stale identity, or idempotent re-join).
    ///
    /// Creation-when-absent is what keeps live room ids collision-free:
    /// the requested identifier is only ever adopted when no live room
    /// holds it.
    pub async fn join_room(&self, id: PlayerId, room: RoomId, name: String) -> Option<JoinAck> {
        let mut guard = self.state.write().await;
        let State { players, rooms } = &mut *guard;
        let player = players.get_mut(&id)?;
        player.name = Some(name);
        let members = rooms.entry(room.clone()).or_insert_with(|| {
            log::info!("opened room {}", room);
            BTreeSet::new()
        });
        if !members.insert(id) {
            return None;
        }
        player.room = Some(room.clone());
        player.ready = true;
        log::info!("player {} joined room {}", id, room);
        Some(JoinAck { roomid: room, id })
    }

    /// Sends one message to one player's channel.
    pub async fn unicast(&self, id: PlayerId, message: &ServerMessage) -> anyhow::Result<()> {
        let json = serde_json::to_string(message)?;
        self.state
            .read()
            .await
            .players
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown player {}", id))?
            .tx
            .send(json)
            .map_err(|_| anyhow::anyhow!("channel closed for player {}", id))
    }

    /// One broadcast tick: every ready player receives the projected state
    /// of every other member of its room. Members that vanished since the
    /// room lookup are skipped; a send failure is logged per recipient and
    /// never aborts the rest of the tick. Cleanup stays with the close
    /// event, not with send failures.
    pub async fn fanout(&self) {
        let state = self.state.read().await;
        for (id, player) in state.players.iter().filter(|(_, p)| p.ready) {
            let Some(room) = player.room.as_ref() else {
                continue;
            };
            let Some(members) = state.rooms.get(room) else {
                continue; // room raced away, skip this player this tick
            };
            let players = members
                .iter()
                .filter(|other| *other != id)
                .filter_map(|other| state.players.get(other).map(|p| p.project(*other)))
                .collect();
            match serde_json::to_string(&ServerMessage::Snapshot(Snapshot::Others { players })) {
                Ok(json) => {
                    if player.tx.send(json).is_err() {
                        log::warn!("failed broadcast to player {}", id);
                    }
                }
                Err(e) => log::warn!("failed to serialize snapshot for {}: {}", id, e),
            }
        }
    }

    /// Live room ids, for operator visibility and tests.
    pub async fn rooms(&self) -> Vec<RoomId> {
        self.state.read().await.rooms.keys().cloned().collect()
    }

    /// Member identities of a room, if it is live.
    pub async fn members(&self, room: &str) -> Option<BTreeSet<PlayerId>> {
        self.state.read().await.rooms.get(room).cloned()
    }

    /// Whether an identity is still registered.
    pub async fn contains(&self, id: PlayerId) -> bool {
        self.state.read().await.players.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::mpsc::unbounded_channel;

    async fn connect(registry: &Registry) -> (PlayerId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        (registry.connect(tx).await, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(json) = rx.try_recv() {
            out.push(serde_json::from_str(&json).expect("valid outbound json"));
        }
        out
    }

    #[tokio::test]
    async fn joins_with_same_id_share_one_room() {
        let registry = Registry::default();
        let (a, _) = connect(&registry).await;
        let (b, _) = connect(&registry).await;
        let (c, _) = connect(&registry).await;
        for id in [a, b, c] {
            assert!(registry.join_room(id, "lobby".into(), "p".into()).await.is_some());
        }
        let members = registry.members("lobby").await.expect("room exists");
        assert_eq!(members, BTreeSet::from([a, b, c]));
        assert_eq!(registry.rooms().await, vec!["lobby".to_string()]);
    }

    #[tokio::test]
    async fn rejoin_is_idempotent() {
        let registry = Registry::default();
        let (a, _) = connect(&registry).await;
        assert!(registry.join_room(a, "abc".into(), "Al".into()).await.is_some());
        assert!(registry.join_room(a, "abc".into(), "Al".into()).await.is_none());
        assert_eq!(registry.members("abc").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn absent_room_is_created_under_requested_id() {
        let registry = Registry::default();
        let (a, _) = connect(&registry).await;
        let ack = registry
            .join_room(a, "abc".into(), "Al".into())
            .await
            .expect("first join changes membership");
        assert_eq!(ack.roomid, "abc");
        assert_eq!(ack.id, a);
        assert_eq!(registry.members("abc").await.unwrap(), BTreeSet::from([a]));
    }

    #[tokio::test]
    async fn distinct_first_joins_never_collide() {
        let registry = Registry::default();
        let (a, _) = connect(&registry).await;
        let (b, _) = connect(&registry).await;
        let ack_a = registry.join_room(a, "room-a".into(), "A".into()).await.unwrap();
        let ack_b = registry.join_room(b, "room-b".into(), "B".into()).await.unwrap();
        assert_ne!(ack_a.roomid, ack_b.roomid);
        assert_eq!(registry.members("room-a").await.unwrap(), BTreeSet::from([a]));
        assert_eq!(registry.members("room-b").await.unwrap(), BTreeSet::from([b]));
    }

    #[tokio::test]
    async fn empty_room_id_is_accepted_as_given() {
        let registry = Registry::default();
        let (a, _) = connect(&registry).await;
        let ack = registry.join_room(a, "".into(), "Al".into()).await.unwrap();
        assert_eq!(ack.roomid, "");
        assert!(registry.members("").await.is_some());
    }

    #[tokio::test]
    async fn disconnect_sweeps_rooms_and_drops_empty_ones() {
        let registry = Registry::default();
        let (a, _) = connect(&registry).await;
        let (b, _) = connect(&registry).await;
        registry.join_room(a, "abc".into(), "Al".into()).await;
        registry.join_room(b, "abc".into(), "Bo".into()).await;

        registry.disconnect(a).await;
        assert!(!registry.contains(a).await);
        assert_eq!(registry.members("abc").await.unwrap(), BTreeSet::from([b]));

        registry.disconnect(b).await;
        assert!(registry.members("abc").await.is_none());
        assert!(registry.rooms().await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let registry = Registry::default();
        let (a, _) = connect(&registry).await;
        registry.join_room(a, "abc".into(), "Al".into()).await;
        registry.disconnect(a).await;
        registry.disconnect(a).await;
        assert!(!registry.contains(a).await);
        assert!(registry.rooms().await.is_empty());
    }

    #[tokio::test]
    async fn stale_operations_are_silent_noops() {
        let registry = Registry::default();
        let (a, _) = connect(&registry).await;
        registry.disconnect(a).await;
        let pos = PositionUpdate {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            direction: 4.0,
            is_running: true,
        };
        registry.update_position(a, pos).await;
        assert!(registry.join_room(a, "abc".into(), "Al".into()).await.is_none());
        assert!(registry.rooms().await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_excludes_self_and_includes_roommates() {
        let registry = Registry::default();
        let (a, mut rx_a) = connect(&registry).await;
        let (b, mut rx_b) = connect(&registry).await;
        registry.join_room(a, "abc".into(), "Al".into()).await;
        registry.join_room(b, "abc".into(), "Bo".into()).await;

        registry.fanout().await;

        let snaps_a = drain(&mut rx_a);
        assert_eq!(snaps_a.len(), 1);
        assert_eq!(
            snaps_a[0],
            serde_json::json!({
                "type": "others",
                "players": [{
                    "id": b.to_string(),
                    "name": "Bo",
                    "x": 500.0, "y": 500.0, "z": 0.0,
                    "dir": 0.0,
                    "isRunning": false,
                }],
            })
        );
        let snaps_b = drain(&mut rx_b);
        assert_eq!(snaps_b.len(), 1);
        assert_eq!(snaps_b[0]["players"][0]["id"], a.to_string());
    }

    #[tokio::test]
    async fn non_ready_player_receives_nothing() {
        let registry = Registry::default();
        let (_a, mut rx_a) = connect(&registry).await;
        let (b, _rx_b) = connect(&registry).await;
        registry.join_room(b, "abc".into(), "Bo".into()).await;
        registry.fanout().await;
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn position_before_join_is_stored_but_invisible() {
        let registry = Registry::default();
        let (a, mut rx_a) = connect(&registry).await;
        let pos = PositionUpdate {
            x: 10.0,
            y: 20.0,
            z: 30.0,
            direction: 45.0,
            is_running: true,
        };
        registry.update_position(a, pos).await;

        // not ready yet: the update produces no visible effect
        registry.fanout().await;
        assert!(drain(&mut rx_a).is_empty());

        // once both are in the room, the stored state surfaces
        let (b, mut rx_b) = connect(&registry).await;
        registry.join_room(a, "abc".into(), "Al".into()).await;
        registry.join_room(b, "abc".into(), "Bo".into()).await;
        registry.fanout().await;
        let snaps = drain(&mut rx_b);
        assert_eq!(snaps[0]["players"][0]["x"], 10.0);
        assert_eq!(snaps[0]["players"][0]["dir"], 45.0);
        assert_eq!(snaps[0]["players"][0]["isRunning"], true);
    }

    #[tokio::test]
    async fn disconnect_mid_room_leaves_empty_others_list() {
        let registry = Registry::default();
        let (a, _rx_a) = connect(&registry).await;
        let (b, mut rx_b) = connect(&registry).await;
        registry.join_room(a, "abc".into(), "Al".into()).await;
        registry.join_room(b, "abc".into(), "Bo".into()).await;

        registry.disconnect(a).await;
        registry.fanout().await;
        let snaps = drain(&mut rx_b);
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0], serde_json::json!({ "type": "others", "players": [] }));
    }

    #[tokio::test]
    async fn broken_channel_does_not_abort_the_tick() {
        let registry = Registry::default();
        let (a, rx_a) = connect(&registry).await;
        let (b, mut rx_b) = connect(&registry).await;
        registry.join_room(a, "abc".into(), "Al".into()).await;
        registry.join_room(b, "abc".into(), "Bo".into()).await;

        drop(rx_a); // a's transport is broken but no close event arrived yet
        registry.fanout().await;

        // b is still served, and a is still registered (cleanup is driven
        // by the close notification, not by send failure)
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(registry.contains(a).await);
    }

    #[tokio::test]
    async fn unicast_to_unknown_player_errors() {
        let registry = Registry::default();
        let (a, _rx) = connect(&registry).await;
        registry.disconnect(a).await;
        let msg = ServerMessage::Snapshot(Snapshot::Others { players: vec![] });
        assert!(registry.unicast(a, &msg).await.is_err());
    }
}
