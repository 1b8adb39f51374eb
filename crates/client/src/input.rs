//! Outbound intents from the local player.

use lumberyard_sim::{Transform, VehiclePose};
use lumberyard_wire::client_message::Intent;
use lumberyard_wire::{ClientMessage, JoinRequest, LeaveSeat, RequestDrive};

/// Ground distance a player must move before a new `move` is sent.
pub const SEND_THRESHOLD: f64 = 0.1;

/// How close to the vehicle a player must stand to ask for the seat.
pub const DRIVE_PROXIMITY: f64 = 5.0;

pub fn join(display_name: &str) -> ClientMessage {
    ClientMessage::new(Intent::Join(JoinRequest {
        display_name: display_name.to_string(),
    }))
}

/// Throttles self-reported movement.
///
/// A transform is sent only once it has drifted more than the threshold
/// on either ground axis from the last one sent.
#[derive(Debug, Clone)]
pub struct MovementReporter {
    threshold: f64,
    last_sent: Option<Transform>,
}

impl Default for MovementReporter {
    fn default() -> Self {
        Self::new(SEND_THRESHOLD)
    }
}

impl MovementReporter {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_sent: None,
        }
    }

    pub fn report(&mut self, transform: Transform) -> Option<ClientMessage> {
        if !transform.is_finite() {
            return None;
        }
        if let Some(last) = self.last_sent {
            let dx = (transform.position[0] - last.position[0]).abs();
            let dz = (transform.position[2] - last.position[2]).abs();
            if dx <= self.threshold && dz <= self.threshold {
                return None;
            }
        }
        self.last_sent = Some(transform);
        Some(ClientMessage::new(Intent::Move((&transform).into())))
    }

    /// Forget the last sent transform so the next report always goes out.
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

/// Toggle the driver's seat.
///
/// While driving this leaves the seat. Otherwise it asks for the seat if
/// the player stands within `DRIVE_PROXIMITY` of the vehicle; the server
/// decides who actually gets it.
pub fn toggle_drive(
    driving: bool,
    player: &Transform,
    vehicle: &VehiclePose,
) -> Option<ClientMessage> {
    if driving {
        return Some(ClientMessage::new(Intent::LeaveSeat(LeaveSeat {})));
    }
    let dx = player.position[0] - vehicle.position[0];
    let dz = player.position[2] - vehicle.position[1];
    if dx.hypot(dz) < DRIVE_PROXIMITY {
        Some(ClientMessage::new(Intent::RequestDrive(RequestDrive {})))
    } else {
        None
    }
}
