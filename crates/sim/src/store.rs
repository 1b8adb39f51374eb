//! The canonical in-memory world state.
//!
//! Every mutator checks that its target exists and is a silent no-op when it
//! does not. A harvest arriving after another client already felled the tree
//! is an expected race, not an error, so mutators report what happened through
//! their return value instead of failing.

use std::collections::BTreeMap;

use crate::{Fnv1a64, ResourceId, SessionId, Tick};

// ============================================================================
// Entity Types
// ============================================================================

/// Position and yaw of a session's avatar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: [f64; 3],
    pub heading: f64,
}

impl Transform {
    pub fn new(x: f64, y: f64, z: f64, heading: f64) -> Self {
        Self {
            position: [x, y, z],
            heading,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite()) && self.heading.is_finite()
    }
}

/// Ground pose of the shared vehicle plus the height of its lift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehiclePose {
    pub position: [f64; 2],
    pub heading: f64,
    pub lift_height: f64,
}

impl VehiclePose {
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.heading.is_finite()
            && self.lift_height.is_finite()
    }
}

/// Server-side record of one joined client.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub display_name: String,
    /// Cosmetic 0xRRGGBB color.
    pub color_tag: u32,
    pub transform: Transform,
    pub wallet: u64,
    /// Logs carried, sold for coins.
    pub lumber: u32,
}

/// Growth stage of a resource. A depleted resource is removed from the
/// store, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Growing,
    Mature,
}

/// A harvestable world object (a tree).
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub position: [f64; 2],
    /// Visual scale, derived from age while growing.
    pub size: f64,
    pub state: ResourceState,
    pub spawned_at: Tick,
    /// Hits left before the resource is felled. Only meaningful while mature.
    pub remaining_yield: u32,
}

impl Resource {
    pub fn is_mature(&self) -> bool {
        self.state == ResourceState::Mature
    }
}

/// The singleton drivable vehicle.
///
/// The controller is held by id only; sessions and the vehicle can be
/// destroyed independently.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub pose: VehiclePose,
    pub controller: Option<SessionId>,
}

// ============================================================================
// Snapshots
// ============================================================================

/// Deep copy of the whole world, sent to newly joined clients.
///
/// sessions and resources are sorted by id ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub sessions: Vec<Session>,
    pub resources: Vec<Resource>,
    pub vehicle: Vehicle,
    pub digest: u64,
}

/// A joiner's own record together with the world it joined.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session: Session,
    pub world: WorldSnapshot,
}

/// Key for [`WorldStateStore::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKey {
    Session(SessionId),
    Resource(ResourceId),
    Vehicle,
}

/// Borrowed view returned by [`WorldStateStore::get`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRef<'a> {
    Session(&'a Session),
    Resource(&'a Resource),
    Vehicle(&'a Vehicle),
}

// ============================================================================
// Store
// ============================================================================

/// The single owned world state. Constructed per server (or per test); there
/// is no ambient instance.
#[derive(Debug, Clone)]
pub struct WorldStateStore {
    tick: Tick,
    sessions: BTreeMap<SessionId, Session>,
    resources: BTreeMap<ResourceId, Resource>,
    vehicle: Vehicle,
    next_resource_id: ResourceId,
}

impl WorldStateStore {
    /// Create an empty store with the vehicle parked at `parked`.
    pub fn new(parked: VehiclePose) -> Self {
        Self {
            tick: 0,
            sessions: BTreeMap::new(),
            resources: BTreeMap::new(),
            vehicle: Vehicle {
                pose: parked,
                controller: None,
            },
            next_resource_id: 1,
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub(crate) fn advance_tick(&mut self) -> Tick {
        self.tick += 1;
        self.tick
    }

    // ------------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------------

    /// Deep, independent copy of the current state.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            sessions: self.sessions.values().cloned().collect(),
            resources: self.resources.values().cloned().collect(),
            vehicle: self.vehicle.clone(),
            digest: self.state_digest(),
        }
    }

    pub fn get(&self, key: EntityKey) -> Option<EntityRef<'_>> {
        match key {
            EntityKey::Session(id) => self.sessions.get(&id).map(EntityRef::Session),
            EntityKey::Resource(id) => self.resources.get(&id).map(EntityRef::Resource),
            EntityKey::Vehicle => Some(EntityRef::Vehicle(&self.vehicle)),
        }
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    // ------------------------------------------------------------------------
    // Session mutators
    // ------------------------------------------------------------------------

    /// Insert or overwrite a session. Returns true if the id was new.
    pub fn insert_session(&mut self, session: Session) -> bool {
        self.sessions.insert(session.id, session).is_none()
    }

    pub fn remove_session(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Returns false if the session is gone.
    pub fn set_session_transform(&mut self, id: SessionId, transform: Transform) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.transform = transform;
                true
            }
            None => false,
        }
    }

    /// Add coins to a wallet. Returns the new balance.
    pub fn credit_wallet(&mut self, id: SessionId, amount: u64) -> Option<u64> {
        let session = self.sessions.get_mut(&id)?;
        session.wallet = session.wallet.saturating_add(amount);
        Some(session.wallet)
    }

    /// Remove coins from a wallet. Returns the new balance, or `None` if the
    /// session is gone or cannot afford it; the wallet is untouched then.
    pub fn debit_wallet(&mut self, id: SessionId, amount: u64) -> Option<u64> {
        let session = self.sessions.get_mut(&id)?;
        session.wallet = session.wallet.checked_sub(amount)?;
        Some(session.wallet)
    }

    /// Add logs to a session's stock. Returns the new stock.
    pub fn add_lumber(&mut self, id: SessionId, logs: u32) -> Option<u32> {
        let session = self.sessions.get_mut(&id)?;
        session.lumber = session.lumber.saturating_add(logs);
        Some(session.lumber)
    }

    /// Empty a session's log stock, returning what it held.
    pub fn take_lumber(&mut self, id: SessionId) -> Option<u32> {
        let session = self.sessions.get_mut(&id)?;
        Some(std::mem::take(&mut session.lumber))
    }

    // ------------------------------------------------------------------------
    // Resource mutators
    // ------------------------------------------------------------------------

    /// Reserve a fresh resource id. Ids are never reused.
    pub fn allocate_resource_id(&mut self) -> ResourceId {
        let id = self.next_resource_id;
        self.next_resource_id += 1;
        id
    }

    /// Insert or replace a resource by id.
    pub fn upsert_resource(&mut self, resource: Resource) {
        if resource.id >= self.next_resource_id {
            self.next_resource_id = resource.id + 1;
        }
        self.resources.insert(resource.id, resource);
    }

    pub fn remove_resource(&mut self, id: ResourceId) -> Option<Resource> {
        self.resources.remove(&id)
    }

    /// Subtract from a resource's yield, stopping at zero. Returns the new
    /// remaining yield, or `None` if the resource is gone.
    pub fn decrement_yield(&mut self, id: ResourceId, amount: u32) -> Option<u32> {
        let resource = self.resources.get_mut(&id)?;
        resource.remaining_yield = resource.remaining_yield.saturating_sub(amount);
        Some(resource.remaining_yield)
    }

    pub(crate) fn resources_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    // ------------------------------------------------------------------------
    // Vehicle mutators
    // ------------------------------------------------------------------------

    pub fn set_vehicle_pose(&mut self, pose: VehiclePose) {
        self.vehicle.pose = pose;
    }

    /// Set or clear the controller. Setting an id with no live session is a
    /// no-op that returns false.
    pub fn set_vehicle_controller(&mut self, controller: Option<SessionId>) -> bool {
        if let Some(id) = controller
            && !self.sessions.contains_key(&id)
        {
            return false;
        }
        self.vehicle.controller = controller;
        true
    }

    // ------------------------------------------------------------------------
    // Digest
    // ------------------------------------------------------------------------

    /// FNV-1a digest over tick, sessions by id, resources by id, and vehicle.
    pub fn state_digest(&self) -> u64 {
        let mut hasher = Fnv1a64::new();
        hasher.update_u64(self.tick);

        for session in self.sessions.values() {
            hasher.update_u64(session.id);
            hasher.update_u64(session.display_name.len() as u64);
            hasher.update(session.display_name.as_bytes());
            hasher.update_u64(u64::from(session.color_tag));
            for v in session.transform.position {
                hasher.update_f64(v);
            }
            hasher.update_f64(session.transform.heading);
            hasher.update_u64(session.wallet);
            hasher.update_u64(u64::from(session.lumber));
        }

        for resource in self.resources.values() {
            hasher.update_u64(resource.id);
            hasher.update_f64(resource.position[0]);
            hasher.update_f64(resource.position[1]);
            hasher.update_f64(resource.size);
            hasher.update(&[match resource.state {
                ResourceState::Growing => 0,
                ResourceState::Mature => 1,
            }]);
            hasher.update_u64(resource.spawned_at);
            hasher.update_u64(u64::from(resource.remaining_yield));
        }

        let pose = &self.vehicle.pose;
        hasher.update_f64(pose.position[0]);
        hasher.update_f64(pose.position[1]);
        hasher.update_f64(pose.heading);
        hasher.update_f64(pose.lift_height);
        match self.vehicle.controller {
            Some(id) => {
                hasher.update(&[1]);
                hasher.update_u64(id);
            }
            None => hasher.update(&[0]),
        }

        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parked() -> VehiclePose {
        VehiclePose {
            position: [-10.0, -10.0],
            heading: 0.0,
            lift_height: 0.5,
        }
    }

    fn session(id: SessionId) -> Session {
        Session {
            id,
            display_name: format!("p{id}"),
            color_tag: 0xff0000,
            transform: Transform::new(0.0, 5.0, 0.0, 0.0),
            wallet: 100,
            lumber: 0,
        }
    }

    fn tree(id: ResourceId, remaining_yield: u32) -> Resource {
        Resource {
            id,
            position: [1.0, 2.0],
            size: 3.0,
            state: ResourceState::Mature,
            spawned_at: 0,
            remaining_yield,
        }
    }

    #[test]
    fn test_mutators_on_missing_entities_are_noops() {
        let mut store = WorldStateStore::new(parked());
        let digest = store.state_digest();

        assert!(!store.set_session_transform(9, Transform::new(1.0, 1.0, 1.0, 0.0)));
        assert_eq!(store.decrement_yield(9, 1), None);
        assert_eq!(store.remove_resource(9), None);
        assert_eq!(store.credit_wallet(9, 10), None);
        assert!(!store.set_vehicle_controller(Some(9)));

        assert_eq!(store.state_digest(), digest);
    }

    #[test]
    fn test_decrement_yield_never_negative() {
        let mut store = WorldStateStore::new(parked());
        store.upsert_resource(tree(1, 2));

        assert_eq!(store.decrement_yield(1, 1), Some(1));
        assert_eq!(store.decrement_yield(1, 5), Some(0));
        assert_eq!(store.resource(1).map(|r| r.remaining_yield), Some(0));
    }

    #[test]
    fn test_debit_wallet_is_all_or_nothing() {
        let mut store = WorldStateStore::new(parked());
        store.insert_session(Session {
            wallet: 15,
            ..session(1)
        });

        assert_eq!(store.debit_wallet(1, 20), None);
        assert_eq!(store.session(1).map(|s| s.wallet), Some(15));
        assert_eq!(store.debit_wallet(1, 15), Some(0));
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut store = WorldStateStore::new(parked());
        store.insert_session(session(1));
        store.upsert_resource(tree(1, 3));

        let snapshot = store.snapshot();
        store.remove_resource(1);
        store.set_session_transform(1, Transform::new(9.0, 9.0, 9.0, 1.0));

        assert_eq!(snapshot.resources.len(), 1);
        assert_eq!(snapshot.sessions[0].transform.position, [0.0, 5.0, 0.0]);
        assert_ne!(snapshot.digest, store.state_digest());
    }

    #[test]
    fn test_get_by_kind() {
        let mut store = WorldStateStore::new(parked());
        store.insert_session(session(4));
        store.upsert_resource(tree(7, 3));

        assert!(matches!(
            store.get(EntityKey::Session(4)),
            Some(EntityRef::Session(s)) if s.id == 4
        ));
        assert!(matches!(
            store.get(EntityKey::Resource(7)),
            Some(EntityRef::Resource(r)) if r.id == 7
        ));
        assert!(store.get(EntityKey::Resource(8)).is_none());
        assert!(matches!(
            store.get(EntityKey::Vehicle),
            Some(EntityRef::Vehicle(_))
        ));
    }

    #[test]
    fn test_upsert_keeps_ids_unique() {
        let mut store = WorldStateStore::new(parked());
        store.upsert_resource(tree(10, 3));
        let next = store.allocate_resource_id();
        assert!(next > 10);
    }

    #[test]
    fn test_digest_tracks_controller() {
        let mut store = WorldStateStore::new(parked());
        store.insert_session(session(1));
        let free = store.state_digest();
        assert!(store.set_vehicle_controller(Some(1)));
        assert_ne!(store.state_digest(), free);
        assert!(store.set_vehicle_controller(None));
        assert_eq!(store.state_digest(), free);
    }
}
