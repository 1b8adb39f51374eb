//! Lumberyard World Core
//!
//! This crate holds the single canonical representation of the shared
//! world: every joined session, every harvestable resource, and the one
//! drivable vehicle. It is the authoritative source of truth; clients only
//! ever see deltas and snapshots derived from it.
//!
//! # Architecture Constraints
//!
//! The world core MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time (time is counted in lifecycle ticks)
//! - Use ambient/unseeded randomness
//!
//! All mutation goes through [`World::apply`] and [`World::advance`], which
//! return the [`Event`]s the server edge fans out to connections.
//!
//! # Modules
//!
//! - [`store`]: the world state store and its narrow mutator API
//! - [`vehicle`]: exclusive control of the shared vehicle
//! - [`lifecycle`]: resource growth, harvesting, placement and the economy
//! - [`world`]: the command/event facade used by the server and replay

#![deny(unsafe_code)]

pub mod lifecycle;
pub mod rng;
pub mod store;
pub mod vehicle;
pub mod world;

pub use lifecycle::{HarvestOutcome, LifecycleConfig, PlacementError, Sale};
pub use store::{
    EntityKey, EntityRef, Resource, ResourceState, Session, SessionSnapshot, Transform, Vehicle,
    VehiclePose, WorldSnapshot, WorldStateStore,
};
pub use vehicle::DrivePolicy;
pub use world::{Command, Event, World, WorldConfig};

// ============================================================================
// Type Aliases
// ============================================================================

/// A single lifecycle step; the unit of world time.
pub type Tick = u64;

/// Opaque session identifier. Equals the transport connection id.
pub type SessionId = u64;

/// Resource identifier, unique for the lifetime of the process.
pub type ResourceId = u64;

// ============================================================================
// StateDigest
// ============================================================================

/// StateDigest algorithm identifier.
pub const STATE_DIGEST_ALGO_ID: &str = "statedigest-v1-fnv1a64-le-f64canon-sid-rid-vehicle";

/// FNV-1a 64-bit offset basis.
const FNV1A_OFFSET_BASIS: u64 = 0xcbf29ce484222325;

/// FNV-1a 64-bit prime.
const FNV1A_PRIME: u64 = 0x100000001b3;

/// FNV-1a 64-bit hasher for StateDigest computation.
#[derive(Debug, Clone)]
pub(crate) struct Fnv1a64 {
    state: u64,
}

impl Fnv1a64 {
    pub(crate) fn new() -> Self {
        Self {
            state: FNV1A_OFFSET_BASIS,
        }
    }

    pub(crate) fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV1A_PRIME);
        }
    }

    pub(crate) fn update_u64(&mut self, value: u64) {
        self.update(&value.to_le_bytes());
    }

    pub(crate) fn update_f64(&mut self, value: f64) {
        self.update(&canonicalize_f64(value).to_le_bytes());
    }

    pub(crate) fn finish(self) -> u64 {
        self.state
    }
}

/// Canonicalize an f64 value for deterministic hashing.
///
/// - `-0.0` → `+0.0`
/// - Any NaN → quiet NaN bit pattern `0x7ff8000000000000`
fn canonicalize_f64(value: f64) -> u64 {
    const QUIET_NAN_BITS: u64 = 0x7ff8000000000000;

    if value.is_nan() {
        QUIET_NAN_BITS
    } else if value == 0.0 {
        0u64
    } else {
        value.to_bits()
    }
}
