//! Exponential smoothing of remote entities.
//!
//! Remote updates arrive at irregular intervals. Each frame the rendered
//! value moves a fixed fraction of the way toward the last received
//! target, so motion looks continuous without any server correction.

use std::f64::consts::{PI, TAU};

use lumberyard_sim::{Transform, VehiclePose};

/// Fraction of the remaining distance covered per frame.
pub const SMOOTHING_FACTOR: f64 = 0.2;

/// Below this distance the rendered value snaps onto the target.
const SNAP_EPSILON: f64 = 1e-4;

/// A value that can be blended toward a target.
pub trait Blend: Copy {
    /// Move `factor` of the way from `self` to `target`.
    fn blend(&self, target: &Self, factor: f64) -> Self;
}

fn lerp(from: f64, to: f64, factor: f64) -> f64 {
    let next = from + (to - from) * factor;
    if (to - next).abs() < SNAP_EPSILON { to } else { next }
}

/// Blend angles along the shorter arc.
pub fn lerp_angle(from: f64, to: f64, factor: f64) -> f64 {
    let mut delta = (to - from).rem_euclid(TAU);
    if delta > PI {
        delta -= TAU;
    }
    if delta.abs() < SNAP_EPSILON {
        return to;
    }
    from + delta * factor
}

impl Blend for Transform {
    fn blend(&self, target: &Self, factor: f64) -> Self {
        Transform {
            position: [
                lerp(self.position[0], target.position[0], factor),
                lerp(self.position[1], target.position[1], factor),
                lerp(self.position[2], target.position[2], factor),
            ],
            heading: lerp_angle(self.heading, target.heading, factor),
        }
    }
}

impl Blend for VehiclePose {
    fn blend(&self, target: &Self, factor: f64) -> Self {
        VehiclePose {
            position: [
                lerp(self.position[0], target.position[0], factor),
                lerp(self.position[1], target.position[1], factor),
            ],
            heading: lerp_angle(self.heading, target.heading, factor),
            lift_height: lerp(self.lift_height, target.lift_height, factor),
        }
    }
}

/// Last received value plus what is currently on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothed<T> {
    pub target: T,
    pub rendered: T,
}

impl<T: Blend> Smoothed<T> {
    /// Start at `value` with nothing to catch up on.
    pub fn snapped(value: T) -> Self {
        Self {
            target: value,
            rendered: value,
        }
    }

    pub fn retarget(&mut self, target: T) {
        self.target = target;
    }

    /// Jump straight to `value`, e.g. when the local client takes over.
    pub fn snap(&mut self, value: T) {
        self.target = value;
        self.rendered = value;
    }

    pub fn step(&mut self, factor: f64) {
        let factor = factor.clamp(0.0, 1.0);
        self.rendered = self.rendered.blend(&self.target, factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converges_geometrically() {
        let mut s = Smoothed::snapped(Transform::new(0.0, 0.0, 0.0, 0.0));
        s.retarget(Transform::new(10.0, 0.0, 0.0, 0.0));

        s.step(SMOOTHING_FACTOR);
        assert!((s.rendered.position[0] - 2.0).abs() < 1e-9);
        s.step(SMOOTHING_FACTOR);
        assert!((s.rendered.position[0] - 3.6).abs() < 1e-9);

        for _ in 0..200 {
            s.step(SMOOTHING_FACTOR);
        }
        assert_eq!(s.rendered, s.target);
    }

    #[test]
    fn test_heading_takes_short_way_round() {
        let from = 170f64.to_radians();
        let to = -170f64.to_radians();
        let next = lerp_angle(from, to, 0.5);
        // Halfway along the 20 degree arc, through 180
        assert!((next - 180f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn test_factor_is_clamped() {
        let mut s = Smoothed::snapped(VehiclePose {
            position: [0.0, 0.0],
            heading: 0.0,
            lift_height: 0.0,
        });
        let target = VehiclePose {
            position: [4.0, -4.0],
            heading: 0.0,
            lift_height: 2.0,
        };
        s.retarget(target);
        s.step(7.0);
        assert_eq!(s.rendered, target);
    }
}
