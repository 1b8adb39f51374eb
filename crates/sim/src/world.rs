//! Command/event facade over the world state store.
//!
//! [`World::apply`] is the single entry point for client intents and
//! [`World::advance`] for the lifecycle tick. Both are total: a stale or
//! unauthorized command yields no events and leaves the store untouched.

use crate::lifecycle::{self, HarvestOutcome, LifecycleConfig, PlacementError};
use crate::rng::SeededRng;
use crate::store::{
    Resource, ResourceState, Session, SessionSnapshot, Transform, VehiclePose, WorldSnapshot,
    WorldStateStore,
};
use crate::vehicle::{self, DrivePolicy};
use crate::{ResourceId, SessionId, Tick};

/// Display name used when a joiner sends an empty one.
pub const DEFAULT_DISPLAY_NAME: &str = "Player";

/// Cosmetic colors handed out by session id.
pub const COLOR_PALETTE: [u32; 8] = [
    0xe6194b, 0x3cb44b, 0xffe119, 0x4363d8, 0xf58231, 0x911eb4, 0x42d4f4, 0xf032e6,
];

// ============================================================================
// Configuration
// ============================================================================

/// World construction and rules.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    /// Seed for resource scattering.
    pub seed: u64,
    /// Mature resources scattered at world start.
    pub seeded_resources: usize,
    /// Seeded resources land in `[-extent, extent)` on both ground axes.
    pub seed_extent: f64,
    /// Size range of seeded resources.
    pub seeded_size: (f64, f64),
    /// Transform given to every joiner.
    pub spawn: Transform,
    pub starting_wallet: u64,
    pub parked_vehicle: VehiclePose,
    pub lift_max: f64,
    pub drive_policy: DrivePolicy,
    pub max_display_name_len: usize,
    pub lifecycle: LifecycleConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            seeded_resources: 30,
            seed_extent: 50.0,
            seeded_size: (2.0, 4.0),
            spawn: Transform::new(0.0, 5.0, 0.0, 0.0),
            starting_wallet: 100,
            parked_vehicle: VehiclePose {
                position: [-10.0, -10.0],
                heading: 0.0,
                lift_height: 0.5,
            },
            lift_max: 2.5,
            drive_policy: DrivePolicy::default(),
            max_display_name_len: 24,
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Every rule parameter except the seed, sorted by key. Recorded in
    /// replay artifacts. An ungated drive policy is recorded as infinity.
    pub fn tuning_parameters(&self) -> Vec<(&'static str, f64)> {
        let lc = &self.lifecycle;
        let parked = &self.parked_vehicle;
        let spawn = &self.spawn;
        vec![
            (
                "drive_max_distance",
                self.drive_policy.max_distance.unwrap_or(f64::INFINITY),
            ),
            ("fell_reward", lc.fell_reward as f64),
            ("initial_yield", f64::from(lc.initial_yield)),
            ("lift_max", self.lift_max),
            ("logs_per_tree", f64::from(lc.logs_per_tree)),
            ("lumber_price", lc.lumber_price as f64),
            ("maturation_ticks", lc.maturation_ticks as f64),
            ("mature_size", lc.mature_size),
            ("max_display_name_len", self.max_display_name_len as f64),
            ("parked_heading", parked.heading),
            ("parked_lift_height", parked.lift_height),
            ("parked_x", parked.position[0]),
            ("parked_z", parked.position[1]),
            ("placement_cost", lc.placement_cost as f64),
            ("sapling_size", lc.sapling_size),
            ("seed_extent", self.seed_extent),
            ("seeded_resources", self.seeded_resources as f64),
            ("seeded_size_max", self.seeded_size.1),
            ("seeded_size_min", self.seeded_size.0),
            ("spawn_heading", spawn.heading),
            ("spawn_x", spawn.position[0]),
            ("spawn_y", spawn.position[1]),
            ("spawn_z", spawn.position[2]),
            ("starting_wallet", self.starting_wallet as f64),
        ]
    }
}

// ============================================================================
// Commands and Events
// ============================================================================

/// A validated client intent, bound to its origin session by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join { display_name: String },
    Move(Transform),
    RequestDrive,
    LeaveSeat,
    MoveVehicle(VehiclePose),
    Harvest { resource_id: ResourceId },
    PlaceResource { position: [f64; 2] },
    SellLumber,
    /// Disconnect. Not sent by clients; issued by the server edge.
    Leave,
}

/// One accepted state change, in the order it was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SessionJoined(Session),
    SessionMoved {
        session_id: SessionId,
        transform: Transform,
    },
    SessionLeft {
        session_id: SessionId,
    },
    ControllerChanged {
        controller: Option<SessionId>,
    },
    VehicleMoved {
        driver: SessionId,
        pose: VehiclePose,
    },
    ResourceAdded(Resource),
    ResourceMatured(Resource),
    ResourceDamaged {
        resource_id: ResourceId,
        remaining_yield: u32,
    },
    ResourceRemoved {
        resource_id: ResourceId,
    },
    Payment {
        session_id: SessionId,
        amount: u64,
        wallet: u64,
    },
    WalletUpdated {
        session_id: SessionId,
        wallet: u64,
        lumber: u32,
    },
    PlacementDenied {
        session_id: SessionId,
        cost: u64,
        wallet: u64,
    },
}

// ============================================================================
// World
// ============================================================================

/// The authoritative world: a store plus the rules that mutate it.
#[derive(Debug, Clone)]
pub struct World {
    config: WorldConfig,
    store: WorldStateStore,
}

impl World {
    /// Build a world at tick 0 with its seeded resources.
    pub fn new(config: WorldConfig) -> Self {
        let mut store = WorldStateStore::new(config.parked_vehicle);
        let mut rng = SeededRng::new(config.seed);
        let (min_size, max_size) = config.seeded_size;

        for _ in 0..config.seeded_resources {
            let x = rng.next_range(-config.seed_extent, config.seed_extent);
            let z = rng.next_range(-config.seed_extent, config.seed_extent);
            let size = rng.next_range(min_size, max_size);
            let id = store.allocate_resource_id();
            store.upsert_resource(Resource {
                id,
                position: [x, z],
                size,
                state: ResourceState::Mature,
                spawned_at: 0,
                remaining_yield: config.lifecycle.initial_yield,
            });
        }

        Self { config, store }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn store(&self) -> &WorldStateStore {
        &self.store
    }

    pub fn tick(&self) -> Tick {
        self.store.tick()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.store.snapshot()
    }

    pub fn state_digest(&self) -> u64 {
        self.store.state_digest()
    }

    /// A session's own record plus the full world, for the join handshake.
    pub fn session_snapshot(&self, session_id: SessionId) -> Option<SessionSnapshot> {
        let session = self.store.session(session_id)?.clone();
        Some(SessionSnapshot {
            session,
            world: self.store.snapshot(),
        })
    }

    /// Apply one command from `origin`.
    pub fn apply(&mut self, origin: SessionId, command: &Command) -> Vec<Event> {
        match command {
            Command::Join { display_name } => self.join(origin, display_name),
            Command::Move(transform) => self.report_transform(origin, *transform),
            Command::RequestDrive => {
                if vehicle::request_control(&mut self.store, &self.config.drive_policy, origin) {
                    vec![Event::ControllerChanged {
                        controller: Some(origin),
                    }]
                } else {
                    Vec::new()
                }
            }
            Command::LeaveSeat => {
                if vehicle::release_control(&mut self.store, origin) {
                    vec![Event::ControllerChanged { controller: None }]
                } else {
                    Vec::new()
                }
            }
            Command::MoveVehicle(pose) => {
                vehicle::move_vehicle(&mut self.store, origin, *pose, self.config.lift_max)
                    .map(|pose| {
                        vec![Event::VehicleMoved {
                            driver: origin,
                            pose,
                        }]
                    })
                    .unwrap_or_default()
            }
            Command::Harvest { resource_id } => self.harvest(origin, *resource_id),
            Command::PlaceResource { position } => self.place_resource(origin, *position),
            Command::SellLumber => {
                lifecycle::sell_lumber(&mut self.store, &self.config.lifecycle, origin)
                    .map(|sale| {
                        let lumber = self.lumber_of(origin);
                        vec![
                            Event::Payment {
                                session_id: origin,
                                amount: sale.amount,
                                wallet: sale.wallet,
                            },
                            Event::WalletUpdated {
                                session_id: origin,
                                wallet: sale.wallet,
                                lumber,
                            },
                        ]
                    })
                    .unwrap_or_default()
            }
            Command::Leave => self.leave(origin),
        }
    }

    /// Run one lifecycle tick.
    pub fn advance(&mut self) -> Vec<Event> {
        let now = self.store.advance_tick();
        lifecycle::grow(&mut self.store, &self.config.lifecycle, now)
            .into_iter()
            .filter_map(|id| self.store.resource(id).cloned())
            .map(Event::ResourceMatured)
            .collect()
    }

    // ------------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------------

    /// Join, or re-join as an overwrite of the display name.
    fn join(&mut self, session_id: SessionId, display_name: &str) -> Vec<Event> {
        let display_name = sanitize_display_name(display_name, self.config.max_display_name_len);
        let session = match self.store.session(session_id) {
            Some(existing) => Session {
                display_name,
                ..existing.clone()
            },
            None => Session {
                id: session_id,
                display_name,
                color_tag: COLOR_PALETTE[(session_id % COLOR_PALETTE.len() as u64) as usize],
                transform: self.config.spawn,
                wallet: self.config.starting_wallet,
                lumber: 0,
            },
        };
        self.store.insert_session(session.clone());
        vec![Event::SessionJoined(session)]
    }

    /// Self-authoritative movement: accepted as reported, no validation
    /// beyond the value being finite.
    fn report_transform(&mut self, session_id: SessionId, transform: Transform) -> Vec<Event> {
        if !transform.is_finite() || !self.store.set_session_transform(session_id, transform) {
            return Vec::new();
        }
        vec![Event::SessionMoved {
            session_id,
            transform,
        }]
    }

    fn harvest(&mut self, session_id: SessionId, resource_id: ResourceId) -> Vec<Event> {
        let Some(outcome) =
            lifecycle::harvest(&mut self.store, &self.config.lifecycle, resource_id, session_id)
        else {
            return Vec::new();
        };
        match outcome {
            HarvestOutcome::Damaged {
                resource_id,
                remaining_yield,
            } => vec![Event::ResourceDamaged {
                resource_id,
                remaining_yield,
            }],
            HarvestOutcome::Felled {
                resource_id,
                reward,
                wallet,
                lumber,
            } => vec![
                Event::ResourceRemoved { resource_id },
                Event::Payment {
                    session_id,
                    amount: reward,
                    wallet,
                },
                Event::WalletUpdated {
                    session_id,
                    wallet,
                    lumber,
                },
            ],
        }
    }

    fn place_resource(&mut self, session_id: SessionId, position: [f64; 2]) -> Vec<Event> {
        if !position.iter().all(|v| v.is_finite()) {
            return Vec::new();
        }
        match lifecycle::place(&mut self.store, &self.config.lifecycle, session_id, position) {
            Ok(resource) => {
                let lumber = self.lumber_of(session_id);
                let wallet = self.store.session(session_id).map_or(0, |s| s.wallet);
                vec![
                    Event::ResourceAdded(resource),
                    Event::WalletUpdated {
                        session_id,
                        wallet,
                        lumber,
                    },
                ]
            }
            Err(PlacementError::InsufficientFunds { cost, wallet }) => {
                vec![Event::PlacementDenied {
                    session_id,
                    cost,
                    wallet,
                }]
            }
            Err(PlacementError::UnknownSession) => Vec::new(),
        }
    }

    /// Remove a session. A held vehicle is released first, so the
    /// controller change is ordered before the departure.
    fn leave(&mut self, session_id: SessionId) -> Vec<Event> {
        let mut events = Vec::new();
        if vehicle::release_control(&mut self.store, session_id) {
            events.push(Event::ControllerChanged { controller: None });
        }
        if self.store.remove_session(session_id).is_some() {
            events.push(Event::SessionLeft { session_id });
        }
        events
    }

    fn lumber_of(&self, session_id: SessionId) -> u32 {
        self.store.session(session_id).map_or(0, |s| s.lumber)
    }
}

/// Trim, default when empty, and cap at `max_len` characters.
pub fn sanitize_display_name(name: &str, max_len: usize) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return DEFAULT_DISPLAY_NAME.to_string();
    }
    trimmed.chars().take(max_len).collect()
}
