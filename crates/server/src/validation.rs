//! Intent validation for the server edge.
//!
//! Every rejection here is a silent drop from the client's point of view:
//! it is logged and counted, never answered, and never fatal.
//! - Undecodable or non-finite payload: DROP
//! - Unknown connection: DROP
//! - Non-join intent before join: DROP
//! - Rate limit exceeded: DROP

use lumberyard_sim::{Command, SessionId};
use lumberyard_wire::{ClientMessage, WireError};
use thiserror::Error;

use crate::intent_queue::{EnqueueResult, IntentQueue};
use crate::session::{ConnectionRegistry, ConnectionState};

/// Why an intent was dropped at the edge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("malformed intent: {0}")]
    Malformed(#[from] WireError),
    #[error("unknown connection {0}")]
    UnknownSession(SessionId),
    #[error("connection {0} has not joined")]
    NotJoined(SessionId),
    #[error("connection {0} exceeded {1} intents this tick")]
    RateLimited(SessionId, u32),
}

/// Result of intent validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// Intent accepted and queued.
    Accepted,
    /// Dropped: payload did not map onto a command.
    DroppedMalformed(WireError),
    /// Dropped: no such connection.
    DroppedUnknownSession,
    /// Dropped: connection has not joined yet.
    DroppedNotJoined,
    /// Dropped: rate limit exceeded.
    DroppedRateLimit,
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl From<&RejectReason> for ValidationResult {
    fn from(reason: &RejectReason) -> Self {
        match reason {
            RejectReason::Malformed(e) => Self::DroppedMalformed(e.clone()),
            RejectReason::UnknownSession(_) => Self::DroppedUnknownSession,
            RejectReason::NotJoined(_) => Self::DroppedNotJoined,
            RejectReason::RateLimited(..) => Self::DroppedRateLimit,
        }
    }
}

/// Validate an intent and queue it.
///
/// # Arguments
/// * `origin` - Connection the message arrived on (bound by the edge, not
///   taken from the payload)
/// * `message` - The decoded client message
/// * `registry` - Connection registry, advanced to `Joining` on a join
/// * `queue` - The intent queue, which also enforces the rate limit
pub fn validate_intent(
    origin: SessionId,
    message: &ClientMessage,
    registry: &mut ConnectionRegistry,
    queue: &mut IntentQueue,
) -> Result<(), RejectReason> {
    let connection = registry
        .get(origin)
        .ok_or(RejectReason::UnknownSession(origin))?;

    let command = Command::try_from(message)?;
    let is_join = matches!(command, Command::Join { .. });
    if !is_join && !connection.may_send() {
        return Err(RejectReason::NotJoined(origin));
    }

    match queue.try_push(origin, command) {
        EnqueueResult::Queued => {
            if is_join {
                registry.advance(origin, ConnectionState::Joining);
            }
            Ok(())
        }
        EnqueueResult::RateLimited => Err(RejectReason::RateLimited(
            origin,
            queue.per_tick_limit(),
        )),
    }
}
