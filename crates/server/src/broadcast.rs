//! Outbound fan-out.
//!
//! Every accepted event becomes one [`Outbound`] addressed by a
//! [`Recipients`] rule. Rules resolve against joined sessions only, at the
//! moment of sending.

use lumberyard_sim::{Event, SessionId};
use lumberyard_wire::ServerMessage;

/// Who an outbound message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    /// Every joined session.
    All,
    /// Every joined session except one, usually the origin.
    AllExcept(SessionId),
    /// One joined session.
    Only(SessionId),
}

impl Recipients {
    pub fn includes(&self, session_id: SessionId) -> bool {
        match *self {
            Self::All => true,
            Self::AllExcept(excluded) => session_id != excluded,
            Self::Only(target) => session_id == target,
        }
    }

    /// Audience of an accepted event.
    ///
    /// Self-authoritative updates skip their origin, which already shows
    /// its own state. Private economy results go to the affected session
    /// only.
    pub fn for_event(event: &Event) -> Self {
        match event {
            Event::SessionJoined(session) => Self::AllExcept(session.id),
            Event::SessionMoved { session_id, .. } => Self::AllExcept(*session_id),
            Event::VehicleMoved { driver, .. } => Self::AllExcept(*driver),
            Event::Payment { session_id, .. } | Event::PlacementDenied { session_id, .. } => {
                Self::Only(*session_id)
            }
            Event::SessionLeft { .. }
            | Event::ControllerChanged { .. }
            | Event::ResourceAdded(_)
            | Event::ResourceMatured(_)
            | Event::ResourceDamaged { .. }
            | Event::ResourceRemoved { .. }
            | Event::WalletUpdated { .. } => Self::All,
        }
    }
}

/// One message to fan out.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Recipients,
    pub message: ServerMessage,
}

impl From<&Event> for Outbound {
    fn from(event: &Event) -> Self {
        Self {
            to: Recipients::for_event(event),
            message: event.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumberyard_sim::{Transform, VehiclePose};

    #[test]
    fn test_movement_skips_origin() {
        let moved = Event::SessionMoved {
            session_id: 3,
            transform: Transform::new(0.0, 0.0, 0.0, 0.0),
        };
        assert_eq!(Recipients::for_event(&moved), Recipients::AllExcept(3));

        let driven = Event::VehicleMoved {
            driver: 4,
            pose: VehiclePose {
                position: [0.0, 0.0],
                heading: 0.0,
                lift_height: 0.0,
            },
        };
        assert_eq!(Recipients::for_event(&driven), Recipients::AllExcept(4));
    }

    #[test]
    fn test_lock_transitions_reach_everyone() {
        let released = Event::ControllerChanged { controller: None };
        assert_eq!(Recipients::for_event(&released), Recipients::All);
        assert!(Recipients::All.includes(1));
    }

    #[test]
    fn test_payment_is_private() {
        let paid = Event::Payment {
            session_id: 2,
            amount: 10,
            wallet: 110,
        };
        let to = Recipients::for_event(&paid);
        assert!(to.includes(2));
        assert!(!to.includes(1));
    }
}
