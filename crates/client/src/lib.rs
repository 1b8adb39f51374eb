//! Lumberyard Client Mirror
//!
//! A client's local copy of the shared world, rebuilt from the join
//! snapshot and kept current by applying server deltas in arrival order.
//! Remote entities are smoothed toward their last reported state; the
//! local player and, while driving, the vehicle are never corrected.
//!
//! - [`ClientMirror`]: applies server messages, exposes render state
//! - [`smoothing`]: per-frame blending of remote entities
//! - [`input`]: throttled movement and seat intents

#![deny(unsafe_code)]

pub mod input;
pub mod smoothing;

use std::collections::BTreeMap;

use log::debug;
use lumberyard_sim::{
    LifecycleConfig, Resource, ResourceId, Session, SessionId, Tick, Transform, VehiclePose,
};
use lumberyard_wire::client_message::Intent;
use lumberyard_wire::server_message::Event as WireEvent;
use lumberyard_wire::{ClientMessage, InitWorld, ServerMessage, WireError};

use smoothing::{SMOOTHING_FACTOR, Smoothed};

/// A placement the server refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denial {
    pub cost: u64,
    pub wallet: u64,
}

/// Client-side world state.
#[derive(Debug, Clone)]
pub struct ClientMirror {
    local: Option<SessionId>,
    tick: Tick,
    sessions: BTreeMap<SessionId, Session>,
    /// Remote sessions only.
    motion: BTreeMap<SessionId, Smoothed<Transform>>,
    resources: BTreeMap<ResourceId, Resource>,
    /// Growth curve from the join snapshot.
    growth: LifecycleConfig,
    vehicle: Smoothed<VehiclePose>,
    controller: Option<SessionId>,
    last_payment: Option<u64>,
    last_denial: Option<Denial>,
}

impl Default for ClientMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientMirror {
    /// An empty mirror waiting for its join snapshot.
    pub fn new() -> Self {
        Self {
            local: None,
            tick: 0,
            sessions: BTreeMap::new(),
            motion: BTreeMap::new(),
            resources: BTreeMap::new(),
            growth: LifecycleConfig::default(),
            vehicle: Smoothed::snapped(VehiclePose {
                position: [0.0, 0.0],
                heading: 0.0,
                lift_height: 0.0,
            }),
            controller: None,
            last_payment: None,
            last_denial: None,
        }
    }

    pub fn local_session(&self) -> Option<SessionId> {
        self.local
    }

    /// Tick of the join snapshot.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn controller(&self) -> Option<SessionId> {
        self.controller
    }

    /// Whether the local player holds the vehicle.
    pub fn is_driving(&self) -> bool {
        self.local.is_some() && self.controller == self.local
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Where a remote session is drawn this frame.
    pub fn rendered_transform(&self, id: SessionId) -> Option<Transform> {
        self.motion.get(&id).map(|m| m.rendered)
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn growth(&self) -> &LifecycleConfig {
        &self.growth
    }

    /// Visual scale of a resource at tick `now`.
    ///
    /// Growth is not broadcast, so a growing resource is scaled from its
    /// age on the snapshot's growth curve. Mature resources keep the size
    /// the server sent.
    pub fn resource_scale(&self, id: ResourceId, now: Tick) -> Option<f64> {
        let resource = self.resources.get(&id)?;
        if resource.is_mature() {
            return Some(resource.size);
        }
        Some(self.growth.size_at(now.saturating_sub(resource.spawned_at)))
    }

    /// Where the vehicle is drawn this frame.
    pub fn vehicle_pose(&self) -> VehiclePose {
        self.vehicle.rendered
    }

    pub fn wallet(&self) -> u64 {
        self.local_record().map_or(0, |s| s.wallet)
    }

    pub fn lumber(&self) -> u32 {
        self.local_record().map_or(0, |s| s.lumber)
    }

    /// Amount of the most recent payment received, if any.
    pub fn last_payment(&self) -> Option<u64> {
        self.last_payment
    }

    pub fn last_denial(&self) -> Option<Denial> {
        self.last_denial
    }

    fn local_record(&self) -> Option<&Session> {
        self.local.and_then(|id| self.sessions.get(&id))
    }

    // ------------------------------------------------------------------------
    // Server messages
    // ------------------------------------------------------------------------

    /// Apply one server message.
    ///
    /// Deltas that arrive before the join snapshot are ignored. A message
    /// that fails to convert leaves the mirror untouched.
    pub fn apply(&mut self, message: &ServerMessage) -> Result<(), WireError> {
        let event = message.event.as_ref().ok_or(WireError::Empty)?;
        if let WireEvent::InitWorld(init) = event {
            return self.load(init);
        }
        if self.local.is_none() {
            debug!("{} before init-world ignored", message.name());
            return Ok(());
        }

        match event {
            WireEvent::InitWorld(_) => {}
            WireEvent::PlayerJoined(joined) => {
                let session = joined
                    .session
                    .as_ref()
                    .ok_or(WireError::MissingField("session"))?;
                let session = Session::try_from(session)?;
                self.upsert_session(session);
            }
            WireEvent::PlayerMoved(moved) => {
                let transform = moved
                    .transform
                    .as_ref()
                    .ok_or(WireError::MissingField("transform"))?;
                let transform = Transform::try_from(transform)?;
                if Some(moved.session_id) == self.local {
                    return Ok(());
                }
                if let Some(session) = self.sessions.get_mut(&moved.session_id) {
                    session.transform = transform;
                    self.motion
                        .entry(moved.session_id)
                        .or_insert_with(|| Smoothed::snapped(transform))
                        .retarget(transform);
                }
            }
            WireEvent::PlayerLeft(left) => {
                self.sessions.remove(&left.session_id);
                self.motion.remove(&left.session_id);
            }
            WireEvent::DriverStatus(status) => {
                let was_driving = self.is_driving();
                self.controller = status.controlling_session_id;
                if was_driving != self.is_driving() {
                    debug!("local driving: {}", self.is_driving());
                }
            }
            WireEvent::ForkliftMoved(moved) => {
                let pose = moved.pose.as_ref().ok_or(WireError::MissingField("pose"))?;
                let pose = VehiclePose::try_from(pose)?;
                // The local driver's own pose is authoritative on screen
                if !self.is_driving() {
                    self.vehicle.retarget(pose);
                }
            }
            WireEvent::TreeAdded(added) => {
                let resource = added
                    .resource
                    .as_ref()
                    .ok_or(WireError::MissingField("resource"))?;
                let resource = Resource::try_from(resource)?;
                self.resources.insert(resource.id, resource);
            }
            WireEvent::TreeMatured(matured) => {
                let resource = matured
                    .resource
                    .as_ref()
                    .ok_or(WireError::MissingField("resource"))?;
                let resource = Resource::try_from(resource)?;
                self.resources.insert(resource.id, resource);
            }
            WireEvent::TreeDamaged(damaged) => {
                if let Some(resource) = self.resources.get_mut(&damaged.resource_id) {
                    resource.remaining_yield = damaged.remaining_yield;
                }
            }
            WireEvent::TreeRemoved(removed) => {
                self.resources.remove(&removed.resource_id);
            }
            WireEvent::Payment(payment) => {
                self.last_payment = Some(payment.amount);
                if let Some(session) = self.local.and_then(|id| self.sessions.get_mut(&id)) {
                    session.wallet = payment.wallet;
                }
            }
            WireEvent::WalletUpdated(update) => {
                if let Some(session) = self.sessions.get_mut(&update.session_id) {
                    session.wallet = update.wallet;
                    session.lumber = update.lumber;
                }
            }
            WireEvent::PlacementDenied(denied) => {
                self.last_denial = Some(Denial {
                    cost: denied.cost,
                    wallet: denied.wallet,
                });
            }
        }
        Ok(())
    }

    /// Replace everything with a join snapshot.
    fn load(&mut self, init: &InitWorld) -> Result<(), WireError> {
        let sessions = init
            .sessions
            .iter()
            .map(Session::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let resources = init
            .resources
            .iter()
            .map(Resource::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let vehicle = init
            .vehicle
            .as_ref()
            .ok_or(WireError::MissingField("vehicle"))?;
        let vehicle = lumberyard_sim::Vehicle::try_from(vehicle)?;

        self.local = Some(init.session_id);
        self.tick = init.tick;
        self.sessions.clear();
        self.motion.clear();
        for session in sessions {
            self.upsert_session(session);
        }
        self.resources = resources.into_iter().map(|r| (r.id, r)).collect();
        self.growth = init.growth(&self.growth);
        self.vehicle = Smoothed::snapped(vehicle.pose);
        self.controller = vehicle.controller;
        debug!(
            "loaded world at tick {}: {} sessions, {} resources",
            init.tick,
            self.sessions.len(),
            self.resources.len()
        );
        Ok(())
    }

    fn upsert_session(&mut self, session: Session) {
        if Some(session.id) != self.local {
            self.motion
                .entry(session.id)
                .or_insert_with(|| Smoothed::snapped(session.transform))
                .retarget(session.transform);
        }
        self.sessions.insert(session.id, session);
    }

    // ------------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------------

    /// Advance remote rendering one frame by `factor`.
    pub fn smooth(&mut self, factor: f64) {
        for motion in self.motion.values_mut() {
            motion.step(factor);
        }
        if !self.is_driving() {
            self.vehicle.step(factor);
        }
    }

    /// [`smooth`](Self::smooth) with the default factor.
    pub fn smooth_frame(&mut self) {
        self.smooth(SMOOTHING_FACTOR);
    }

    /// Move the vehicle locally while driving and produce the intent that
    /// reports it. `None` when not driving.
    pub fn drive(&mut self, pose: VehiclePose) -> Option<ClientMessage> {
        if !self.is_driving() || !pose.is_finite() {
            return None;
        }
        self.vehicle.snap(pose);
        Some(ClientMessage::new(Intent::MoveForklift((&pose).into())))
    }
}
