//! Broadcast hub for dispatching room events to connected sessions.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connected session
//! subscribes and filters events locally by room membership. Delivery to one
//! receiver never blocks or aborts delivery to the others, so a connection
//! that died mid-send is invisible to the rest of the room.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::models::room::RoomId;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip events (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// An event addressed to every session joined to one room.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub room_id: RoomId,
    /// The dispatch event name (e.g. "MESSAGE_RECEIVED").
    pub event_name: String,
    /// Serialized event data (serde_json::Value).
    pub data: Value,
}

/// The broadcast hub. Cloneable — store in AppState and hand to anything
/// that needs to reach a room's members.
#[derive(Clone)]
pub struct RoomBroadcast {
    sender: broadcast::Sender<Arc<RoomEvent>>,
}

impl RoomBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the broadcast channel. Each gateway session should call
    /// this once to get its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RoomEvent>> {
        self.sender.subscribe()
    }

    /// Dispatch an event to every session currently joined to the room.
    /// Sessions not yet joined never see it; there is no backlog replay.
    pub fn broadcast_to_room(&self, room_id: RoomId, event_name: &str, data: Value) {
        // send() returns Err if there are no receivers — that's fine.
        let _ = self.sender.send(Arc::new(RoomEvent {
            room_id,
            event_name: event_name.to_string(),
            data,
        }));
    }
}

impl Default for RoomBroadcast {
    fn default() -> Self {
        Self::new()
    }
}
