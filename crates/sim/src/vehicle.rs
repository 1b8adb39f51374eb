//! Exclusive control of the shared vehicle.
//!
//! Control is a check-and-set over the vehicle's controller field:
//!
//! ```text
//! Free --request(s)--> Owned(s)
//! Owned(s) --release(s)--> Free
//! Owned(s) --disconnect(s)--> Free
//! ```
//!
//! A request while owned by anyone, or a release by a non-owner, changes
//! nothing. There is no pending or queued request state.

use crate::store::{VehiclePose, WorldStateStore};
use crate::SessionId;

/// Optional gate layered on top of the lock.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrivePolicy {
    /// When set, a session must stand within this ground distance of the
    /// vehicle to take control.
    pub max_distance: Option<f64>,
}

/// Try to take control. Returns true if the controller changed to
/// `session_id`.
pub fn request_control(
    store: &mut WorldStateStore,
    policy: &DrivePolicy,
    session_id: SessionId,
) -> bool {
    if store.vehicle().controller.is_some() {
        return false;
    }
    let Some(session) = store.session(session_id) else {
        return false;
    };

    if let Some(max_distance) = policy.max_distance {
        let vehicle = store.vehicle().pose.position;
        let dx = session.transform.position[0] - vehicle[0];
        let dz = session.transform.position[2] - vehicle[1];
        if dx * dx + dz * dz > max_distance * max_distance {
            return false;
        }
    }

    store.set_vehicle_controller(Some(session_id))
}

/// Give up control. Returns true if `session_id` was the controller.
pub fn release_control(store: &mut WorldStateStore, session_id: SessionId) -> bool {
    if store.vehicle().controller != Some(session_id) {
        return false;
    }
    store.set_vehicle_controller(None)
}

/// Apply a pose reported by `session_id`. Accepted only from the current
/// controller; the lift height is clamped to `[0, lift_max]`.
///
/// Returns the pose as stored, or `None` when rejected.
pub fn move_vehicle(
    store: &mut WorldStateStore,
    session_id: SessionId,
    pose: VehiclePose,
    lift_max: f64,
) -> Option<VehiclePose> {
    if store.vehicle().controller != Some(session_id) || !pose.is_finite() {
        return None;
    }
    let pose = VehiclePose {
        lift_height: pose.lift_height.clamp(0.0, lift_max),
        ..pose
    };
    store.set_vehicle_pose(pose);
    Some(pose)
}
