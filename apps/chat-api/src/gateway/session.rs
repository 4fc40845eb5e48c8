//! Per-connection gateway session state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::models::room::RoomId;

/// State for a single WebSocket connection.
///
/// Room membership lives here and dies with the connection: disconnecting
/// removes the member from every room it had joined, and has no effect on
/// buffered or durable data.
pub struct GatewaySession {
    /// Unique session identifier (`gw_` prefixed ULID).
    pub session_id: String,
    /// Authenticated member ID.
    pub user_id: String,
    /// Display name shown to other room members (cached at IDENTIFY time).
    pub display_name: String,
    /// Rooms this connection has joined.
    joined: Mutex<HashSet<RoomId>>,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl GatewaySession {
    pub fn new(session_id: String, user_id: String, display_name: String) -> Self {
        Self {
            session_id,
            user_id,
            display_name,
            joined: Mutex::new(HashSet::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Get the next sequence number for a dispatch event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Add the connection to a room's broadcast group. Rejoining is a no-op;
    /// there is no uniqueness constraint across reconnects.
    pub fn join_room(&self, room_id: RoomId) {
        self.joined.lock().insert(room_id);
    }

    /// Whether this session should receive events for a given room.
    pub fn is_joined(&self, room_id: &RoomId) -> bool {
        self.joined.lock().contains(room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GatewaySession {
        GatewaySession::new(
            "gw_test".to_string(),
            "usr_1".to_string(),
            "Ada".to_string(),
        )
    }

    #[test]
    fn join_makes_the_session_receive_room_events() {
        let session = session();
        let room = RoomId::from("trip_1");

        assert!(!session.is_joined(&room));
        session.join_room(room.clone());
        assert!(session.is_joined(&room));
        assert!(!session.is_joined(&RoomId::from("trip_2")));
    }

    #[test]
    fn rejoining_is_a_noop() {
        let session = session();
        let room = RoomId::from("trip_1");

        session.join_room(room.clone());
        session.join_room(room.clone());
        assert!(session.is_joined(&room));
    }

    #[test]
    fn next_seq_is_monotonic() {
        let session = session();
        assert_eq!(session.next_seq(), 1);
        assert_eq!(session.next_seq(), 2);
        assert_eq!(session.next_seq(), 3);
    }
}
