//! Connection-layer authentication boundary.
//!
//! The gateway consumes an already-authenticated identity; issuing and
//! verifying who a ticket belongs to is the account service's job. The
//! in-memory store backs local development and tests.

use async_trait::async_trait;
use dashmap::DashMap;

use tripline_common::id::{prefix, prefixed_ulid};

/// An authenticated member identity attached to a gateway session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

/// Verifies single-use gateway tickets issued at login.
#[async_trait]
pub trait TicketVerifier: Send + Sync {
    /// Consume a ticket. Returns the identity it was issued for, or `None`
    /// if the ticket is unknown, expired, or already used. A verifier that
    /// cannot reach its backing service treats the ticket as invalid.
    async fn consume(&self, ticket: &str) -> Option<Identity>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and single-process development)
// ---------------------------------------------------------------------------

pub struct MemoryTicketStore {
    tickets: DashMap<String, Identity>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self {
            tickets: DashMap::new(),
        }
    }

    /// Issue a fresh single-use ticket for an identity.
    pub fn issue(&self, identity: Identity) -> String {
        let ticket = prefixed_ulid(prefix::TICKET);
        self.tickets.insert(ticket.clone(), identity);
        ticket
    }
}

impl Default for MemoryTicketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketVerifier for MemoryTicketStore {
    async fn consume(&self, ticket: &str) -> Option<Identity> {
        self.tickets.remove(ticket).map(|(_, identity)| identity)
    }
}
