//! IDENTIFY handling: ticket verification and session construction.

use tripline_common::id::{prefix, prefixed_ulid};

use crate::AppState;

use super::events::{EventName, GatewayMessage, IdentifyPayload};
use super::session::GatewaySession;

/// Heartbeat interval sent to clients in the READY payload (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 41250;

/// Process an IDENTIFY opcode. Returns a (`GatewaySession`, READY message)
/// on success.
pub async fn handle_identify(
    state: &AppState,
    payload: IdentifyPayload,
) -> Result<(GatewaySession, GatewayMessage), &'static str> {
    // Consume the ticket (single-use).
    let identity = state
        .tickets
        .consume(&payload.ticket)
        .await
        .ok_or("Invalid or expired ticket")?;

    let session_id = prefixed_ulid(prefix::SESSION);
    let session = GatewaySession::new(
        session_id.clone(),
        identity.user_id.clone(),
        identity.display_name.clone(),
    );

    let ready_data = serde_json::json!({
        "session_id": session_id,
        "user": {
            "id": identity.user_id,
            "display_name": identity.display_name,
        },
        "heartbeat_interval": HEARTBEAT_INTERVAL_MS,
    });

    let seq = session.next_seq();
    let ready_msg = GatewayMessage::dispatch(EventName::READY, seq, ready_data);

    Ok((session, ready_msg))
}
