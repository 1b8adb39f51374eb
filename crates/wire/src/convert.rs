//! Conversions between wire messages and world core types.
//!
//! Outbound conversions are infallible. Inbound conversions check for
//! missing submessages, non-finite numbers and unknown enum values, which
//! is everything a malformed client message can get wrong.

use lumberyard_sim::{
    Command, Event, LifecycleConfig, Resource, ResourceState, Session, SessionSnapshot,
    Transform, Vehicle, VehiclePose,
};
use thiserror::Error;

use crate::client_message::Intent;
use crate::journal_entry_proto::Entry;
use crate::server_message::Event as WireEvent;
use crate::*;

/// A wire message that does not map onto a world type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    #[error("message carries no payload")]
    Empty,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("non-finite value in `{0}`")]
    NonFinite(&'static str),
    #[error("unknown resource state {0}")]
    UnknownResourceState(i32),
    #[error("command has no wire form")]
    NoWireForm,
}

fn finite(value: f64, field: &'static str) -> Result<f64, WireError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(WireError::NonFinite(field))
    }
}

// ============================================================================
// Entities
// ============================================================================

impl From<&Transform> for TransformProto {
    fn from(t: &Transform) -> Self {
        Self {
            x: t.position[0],
            y: t.position[1],
            z: t.position[2],
            heading: t.heading,
        }
    }
}

impl TryFrom<&TransformProto> for Transform {
    type Error = WireError;

    fn try_from(t: &TransformProto) -> Result<Self, Self::Error> {
        Ok(Transform::new(
            finite(t.x, "x")?,
            finite(t.y, "y")?,
            finite(t.z, "z")?,
            finite(t.heading, "heading")?,
        ))
    }
}

impl From<&VehiclePose> for VehiclePoseProto {
    fn from(p: &VehiclePose) -> Self {
        Self {
            x: p.position[0],
            z: p.position[1],
            heading: p.heading,
            lift_height: p.lift_height,
        }
    }
}

impl TryFrom<&VehiclePoseProto> for VehiclePose {
    type Error = WireError;

    fn try_from(p: &VehiclePoseProto) -> Result<Self, Self::Error> {
        Ok(VehiclePose {
            position: [finite(p.x, "x")?, finite(p.z, "z")?],
            heading: finite(p.heading, "heading")?,
            lift_height: finite(p.lift_height, "lift_height")?,
        })
    }
}

impl From<&Session> for SessionProto {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.id,
            display_name: s.display_name.clone(),
            color_tag: s.color_tag,
            transform: Some((&s.transform).into()),
            wallet: s.wallet,
            lumber: s.lumber,
        }
    }
}

impl TryFrom<&SessionProto> for Session {
    type Error = WireError;

    fn try_from(s: &SessionProto) -> Result<Self, Self::Error> {
        let transform = s
            .transform
            .as_ref()
            .ok_or(WireError::MissingField("transform"))?;
        Ok(Session {
            id: s.session_id,
            display_name: s.display_name.clone(),
            color_tag: s.color_tag,
            transform: transform.try_into()?,
            wallet: s.wallet,
            lumber: s.lumber,
        })
    }
}

impl From<&Resource> for ResourceProto {
    fn from(r: &Resource) -> Self {
        let state = match r.state {
            ResourceState::Growing => ResourceStateProto::Growing,
            ResourceState::Mature => ResourceStateProto::Mature,
        };
        Self {
            resource_id: r.id,
            x: r.position[0],
            z: r.position[1],
            size: r.size,
            state: state as i32,
            spawned_at: r.spawned_at,
            remaining_yield: r.remaining_yield,
        }
    }
}

impl TryFrom<&ResourceProto> for Resource {
    type Error = WireError;

    fn try_from(r: &ResourceProto) -> Result<Self, Self::Error> {
        let state = match ResourceStateProto::try_from(r.state) {
            Ok(ResourceStateProto::Growing) => ResourceState::Growing,
            Ok(ResourceStateProto::Mature) => ResourceState::Mature,
            _ => return Err(WireError::UnknownResourceState(r.state)),
        };
        Ok(Resource {
            id: r.resource_id,
            position: [finite(r.x, "x")?, finite(r.z, "z")?],
            size: finite(r.size, "size")?,
            state,
            spawned_at: r.spawned_at,
            remaining_yield: r.remaining_yield,
        })
    }
}

impl From<&Vehicle> for VehicleProto {
    fn from(v: &Vehicle) -> Self {
        Self {
            pose: Some((&v.pose).into()),
            controlling_session_id: v.controller,
        }
    }
}

impl TryFrom<&VehicleProto> for Vehicle {
    type Error = WireError;

    fn try_from(v: &VehicleProto) -> Result<Self, Self::Error> {
        let pose = v.pose.as_ref().ok_or(WireError::MissingField("pose"))?;
        Ok(Vehicle {
            pose: pose.try_into()?,
            controller: v.controlling_session_id,
        })
    }
}

// ============================================================================
// Snapshot
// ============================================================================

impl From<&SessionSnapshot> for InitWorld {
    fn from(s: &SessionSnapshot) -> Self {
        Self {
            session_id: s.session.id,
            tick: s.world.tick,
            sessions: s.world.sessions.iter().map(Into::into).collect(),
            resources: s.world.resources.iter().map(Into::into).collect(),
            vehicle: Some((&s.world.vehicle).into()),
            digest: s.world.digest,
            maturation_ticks: 0,
            sapling_size: 0.0,
            mature_size: 0.0,
        }
    }
}

impl InitWorld {
    /// Attach the growth curve the world runs with.
    pub fn with_growth(mut self, lifecycle: &LifecycleConfig) -> Self {
        self.maturation_ticks = lifecycle.maturation_ticks;
        self.sapling_size = lifecycle.sapling_size;
        self.mature_size = lifecycle.mature_size;
        self
    }

    /// The growth curve carried by this snapshot, on top of `base`.
    ///
    /// Sizes that are not finite fall back to `base`.
    pub fn growth(&self, base: &LifecycleConfig) -> LifecycleConfig {
        let pick = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };
        LifecycleConfig {
            maturation_ticks: self.maturation_ticks,
            sapling_size: pick(self.sapling_size, base.sapling_size),
            mature_size: pick(self.mature_size, base.mature_size),
            ..base.clone()
        }
    }
}

// ============================================================================
// Intents
// ============================================================================

impl TryFrom<&ClientMessage> for Command {
    type Error = WireError;

    fn try_from(msg: &ClientMessage) -> Result<Self, Self::Error> {
        let intent = msg.intent.as_ref().ok_or(WireError::Empty)?;
        Ok(match intent {
            Intent::Join(join) => Command::Join {
                display_name: join.display_name.clone(),
            },
            Intent::Move(transform) => Command::Move(transform.try_into()?),
            Intent::RequestDrive(_) => Command::RequestDrive,
            Intent::LeaveSeat(_) => Command::LeaveSeat,
            Intent::MoveForklift(pose) => Command::MoveVehicle(pose.try_into()?),
            Intent::Harvest(harvest) => Command::Harvest {
                resource_id: harvest.resource_id,
            },
            Intent::PlaceTree(place) => Command::PlaceResource {
                position: [finite(place.x, "x")?, finite(place.z, "z")?],
            },
            Intent::SellLumber(_) => Command::SellLumber,
        })
    }
}

impl TryFrom<&Command> for ClientMessage {
    type Error = WireError;

    fn try_from(command: &Command) -> Result<Self, Self::Error> {
        let intent = match command {
            Command::Join { display_name } => Intent::Join(JoinRequest {
                display_name: display_name.clone(),
            }),
            Command::Move(transform) => Intent::Move(transform.into()),
            Command::RequestDrive => Intent::RequestDrive(RequestDrive {}),
            Command::LeaveSeat => Intent::LeaveSeat(LeaveSeat {}),
            Command::MoveVehicle(pose) => Intent::MoveForklift(pose.into()),
            Command::Harvest { resource_id } => Intent::Harvest(HarvestRequest {
                resource_id: *resource_id,
            }),
            Command::PlaceResource { position } => Intent::PlaceTree(PlaceTree {
                x: position[0],
                z: position[1],
            }),
            Command::SellLumber => Intent::SellLumber(SellLumber {}),
            Command::Leave => return Err(WireError::NoWireForm),
        };
        Ok(ClientMessage::new(intent))
    }
}

// ============================================================================
// Events
// ============================================================================

impl From<&Event> for ServerMessage {
    fn from(event: &Event) -> Self {
        let event = match event {
            Event::SessionJoined(session) => WireEvent::PlayerJoined(PlayerJoined {
                session: Some(session.into()),
            }),
            Event::SessionMoved {
                session_id,
                transform,
            } => WireEvent::PlayerMoved(PlayerMoved {
                session_id: *session_id,
                transform: Some(transform.into()),
            }),
            Event::SessionLeft { session_id } => WireEvent::PlayerLeft(PlayerLeft {
                session_id: *session_id,
            }),
            Event::ControllerChanged { controller } => WireEvent::DriverStatus(DriverStatus {
                controlling_session_id: *controller,
            }),
            Event::VehicleMoved { driver, pose } => WireEvent::ForkliftMoved(ForkliftMoved {
                pose: Some(pose.into()),
                driver_session_id: *driver,
            }),
            Event::ResourceAdded(resource) => WireEvent::TreeAdded(TreeAdded {
                resource: Some(resource.into()),
            }),
            Event::ResourceMatured(resource) => WireEvent::TreeMatured(TreeMatured {
                resource: Some(resource.into()),
            }),
            Event::ResourceDamaged {
                resource_id,
                remaining_yield,
            } => WireEvent::TreeDamaged(TreeDamaged {
                resource_id: *resource_id,
                remaining_yield: *remaining_yield,
            }),
            Event::ResourceRemoved { resource_id } => WireEvent::TreeRemoved(TreeRemoved {
                resource_id: *resource_id,
            }),
            Event::Payment { amount, wallet, .. } => WireEvent::Payment(Payment {
                amount: *amount,
                wallet: *wallet,
            }),
            Event::WalletUpdated {
                session_id,
                wallet,
                lumber,
            } => WireEvent::WalletUpdated(WalletUpdated {
                session_id: *session_id,
                wallet: *wallet,
                lumber: *lumber,
            }),
            Event::PlacementDenied { cost, wallet, .. } => {
                WireEvent::PlacementDenied(PlacementDenied {
                    cost: *cost,
                    wallet: *wallet,
                })
            }
        };
        ServerMessage::new(event)
    }
}

// ============================================================================
// Journal
// ============================================================================

impl JournalEntryProto {
    pub fn applied(tick: Tick, origin: SessionId, intent: ClientMessage) -> Self {
        Self {
            tick,
            entry: Some(Entry::Applied(AppliedCommandProto {
                origin,
                intent: Some(intent),
            })),
        }
    }

    pub fn disconnect(tick: Tick, origin: SessionId) -> Self {
        Self {
            tick,
            entry: Some(Entry::Disconnect(DisconnectProto { origin })),
        }
    }

    pub fn advance(tick: Tick) -> Self {
        Self {
            tick,
            entry: Some(Entry::Advance(AdvanceProto {})),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_move_with_nan_is_rejected() {
        let msg = ClientMessage::new(Intent::Move(TransformProto {
            x: f64::NAN,
            y: 0.0,
            z: 0.0,
            heading: 0.0,
        }));
        assert_eq!(Command::try_from(&msg), Err(WireError::NonFinite("x")));
    }

    #[test]
    fn test_place_tree_with_infinity_is_rejected() {
        let msg = ClientMessage::new(Intent::PlaceTree(PlaceTree {
            x: 0.0,
            z: f64::INFINITY,
        }));
        assert_eq!(Command::try_from(&msg), Err(WireError::NonFinite("z")));
    }

    #[test]
    fn test_empty_intent_is_rejected() {
        assert_eq!(
            Command::try_from(&ClientMessage { intent: None }),
            Err(WireError::Empty)
        );
    }

    #[test]
    fn test_leave_has_no_wire_form() {
        assert_eq!(
            ClientMessage::try_from(&Command::Leave),
            Err(WireError::NoWireForm)
        );
    }

    #[test]
    fn test_forklift_intent_maps_ground_axes() {
        let msg = ClientMessage::new(Intent::MoveForklift(VehiclePoseProto {
            x: 1.0,
            z: 2.0,
            heading: 0.5,
            lift_height: 1.5,
        }));
        assert_eq!(
            Command::try_from(&msg),
            Ok(Command::MoveVehicle(VehiclePose {
                position: [1.0, 2.0],
                heading: 0.5,
                lift_height: 1.5,
            }))
        );
    }

    #[test]
    fn test_unknown_resource_state_is_rejected() {
        let proto = ResourceProto {
            resource_id: 1,
            x: 0.0,
            z: 0.0,
            size: 1.0,
            state: 42,
            spawned_at: 0,
            remaining_yield: 3,
        };
        assert_eq!(
            Resource::try_from(&proto),
            Err(WireError::UnknownResourceState(42))
        );

        let unspecified = ResourceProto { state: 0, ..proto };
        assert_eq!(
            Resource::try_from(&unspecified),
            Err(WireError::UnknownResourceState(0))
        );
    }

    #[test]
    fn test_session_without_transform_is_rejected() {
        let proto = SessionProto {
            session_id: 1,
            display_name: "a".to_string(),
            color_tag: 0,
            transform: None,
            wallet: 0,
            lumber: 0,
        };
        assert_eq!(
            Session::try_from(&proto),
            Err(WireError::MissingField("transform"))
        );
    }

    #[test]
    fn test_payment_event_drops_session_id() {
        let msg = ServerMessage::from(&Event::Payment {
            session_id: 7,
            amount: 10,
            wallet: 110,
        });
        assert_eq!(
            msg.event,
            Some(WireEvent::Payment(Payment {
                amount: 10,
                wallet: 110
            }))
        );
    }

    #[test]
    fn test_init_world_carries_joiner_id_and_vehicle() {
        let mut world = lumberyard_sim::World::new(lumberyard_sim::WorldConfig {
            seeded_resources: 2,
            ..Default::default()
        });
        world.apply(5, &Command::Join {
            display_name: "x".to_string(),
        });
        let snapshot = world.session_snapshot(5).unwrap();

        let init = InitWorld::from(&snapshot);
        assert_eq!(init.session_id, 5);
        assert_eq!(init.sessions.len(), 1);
        assert_eq!(init.resources.len(), 2);
        assert_eq!(init.digest, snapshot.world.digest);
        assert_eq!(
            init.vehicle.as_ref().and_then(|v| v.controlling_session_id),
            None
        );
    }

    #[test]
    fn test_init_world_carries_growth_curve() {
        let lifecycle = LifecycleConfig {
            maturation_ticks: 12,
            sapling_size: 0.25,
            mature_size: 4.0,
            ..Default::default()
        };
        let mut world = lumberyard_sim::World::new(lumberyard_sim::WorldConfig {
            lifecycle: lifecycle.clone(),
            ..Default::default()
        });
        world.apply(1, &Command::Join {
            display_name: "x".to_string(),
        });
        let init = InitWorld::from(&world.session_snapshot(1).unwrap()).with_growth(&lifecycle);

        assert_eq!(init.maturation_ticks, 12);
        let decoded = InitWorld::decode(init.encode_to_vec().as_slice()).unwrap();
        let growth = decoded.growth(&LifecycleConfig::default());
        assert_eq!(growth.maturation_ticks, 12);
        assert_eq!(growth.sapling_size, 0.25);
        assert_eq!(growth.mature_size, 4.0);
        assert_eq!(growth.size_at(6), 0.25 + (4.0 - 0.25) * 0.5);
    }
}
