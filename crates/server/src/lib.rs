//! Lumberyard Server Edge
//!
//! The server edge mediates between client connections and the world. It
//! owns:
//! - The connection registry and the join handshake
//! - Intent validation and the single intent queue
//! - Dispatch of queued intents into the world, one at a time
//! - The lifecycle tick
//! - Audience resolution for outbound events
//! - Session journaling
//!
//! # Architecture
//!
//! All mutation flows through one owned [`World`]. Transport tasks never
//! touch it; they hand decoded messages to [`Server::receive`] and collect
//! [`Outbound`] messages from [`Server::process_pending`] and
//! [`Server::step`]. [`runtime::run`] is the async loop that does exactly
//! that.

#![deny(unsafe_code)]

pub mod broadcast;
pub mod intent_queue;
pub mod runtime;
pub mod session;
pub mod validation;

use log::{debug, info, warn};
use lumberyard_replay::{JournalEntry, ReplayRecorder};
use lumberyard_sim::{Command, Event, SessionId, Tick, World, WorldConfig};
use lumberyard_wire::server_message::Event as WireEvent;
use lumberyard_wire::{ClientMessage, InitWorld, ReplayArtifact, ServerMessage};

pub use broadcast::{Outbound, Recipients};
use intent_queue::{IntentQueue, QueuedIntent};
use session::{ConnectionRegistry, ConnectionState};
use validation::{RejectReason, ValidationResult, validate_intent};

// ============================================================================
// Parameters
// ============================================================================

/// Lifecycle tick period in milliseconds.
pub const LIFECYCLE_INTERVAL_MS: u64 = 1000;

/// Intents accepted per connection per lifecycle tick.
pub const MAX_INTENTS_PER_TICK: u32 = 64;

// ============================================================================
// Server State
// ============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub world: WorldConfig,
    pub lifecycle_interval_ms: u64,
    pub max_intents_per_tick: u32,
    /// Keep a session journal for [`Server::finalize`]. Grows without bound.
    pub record_journal: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            lifecycle_interval_ms: LIFECYCLE_INTERVAL_MS,
            max_intents_per_tick: MAX_INTENTS_PER_TICK,
            record_journal: false,
        }
    }
}

/// Server state for one shared world.
pub struct Server {
    config: ServerConfig,
    world: World,
    registry: ConnectionRegistry,
    queue: IntentQueue,
    recorder: Option<ReplayRecorder>,
    /// Intents dropped at the edge since start.
    dropped: u64,
}

impl Server {
    /// Create a server with a freshly seeded world.
    pub fn new(config: ServerConfig) -> Self {
        let world = World::new(config.world.clone());
        let recorder = config
            .record_journal
            .then(|| ReplayRecorder::new(&config.world, world.state_digest()));
        info!(
            "world seeded with {} resources (seed {})",
            world.store().resource_count(),
            config.world.seed
        );

        Self {
            world,
            registry: ConnectionRegistry::new(),
            queue: IntentQueue::new(config.max_intents_per_tick),
            recorder,
            dropped: 0,
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn current_tick(&self) -> Tick {
        self.world.tick()
    }

    /// Open connections, joined or not.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn joined_count(&self) -> usize {
        self.registry.joined().count()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    // ------------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------------

    /// Accept a new connection. It receives nothing until it joins.
    pub fn on_connect(&mut self) -> SessionId {
        let id = self.registry.connect();
        info!("connection {id} opened");
        id
    }

    /// Admit a connection into the world.
    ///
    /// The joiner gets the full snapshot first; everyone else gets
    /// `player-joined`. A repeated join renames the session and repeats
    /// both messages. Unknown connections are ignored.
    pub fn on_join(&mut self, session_id: SessionId, display_name: &str) -> Vec<Outbound> {
        if self.registry.get(session_id).is_none() {
            debug!("join from unknown connection {session_id} ignored");
            return Vec::new();
        }

        let mut outbound = self.apply(session_id, &Command::Join {
            display_name: display_name.to_string(),
        });
        self.registry.advance(session_id, ConnectionState::Joined);

        if let Some(init) = self.snapshot_proto(session_id) {
            info!(
                "session {session_id} joined as {:?} ({} sessions)",
                init.sessions
                    .iter()
                    .find(|s| s.session_id == session_id)
                    .map_or("", |s| s.display_name.as_str()),
                init.sessions.len()
            );
            outbound.insert(0, Outbound {
                to: Recipients::Only(session_id),
                message: ServerMessage::new(WireEvent::InitWorld(init)),
            });
        }
        outbound
    }

    /// Close a connection.
    ///
    /// Queued intents from it are discarded. If it had joined, a held
    /// vehicle is released and broadcast before `player-left`, and both go
    /// out before any other queued intent is dispatched.
    pub fn on_disconnect(&mut self, session_id: SessionId) -> Vec<Outbound> {
        let Some(connection) = self.registry.remove(session_id) else {
            return Vec::new();
        };
        let purged = self.queue.purge(session_id);
        info!("connection {session_id} closed ({purged} queued intents discarded)");

        if !connection.is_joined() {
            return Vec::new();
        }

        let tick = self.world.tick();
        let events = self.world.apply(session_id, &Command::Leave);
        self.record(JournalEntry::Disconnect {
            tick,
            origin: session_id,
        });
        self.fan_out(&events)
    }

    // ------------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------------

    /// Validate and queue one client message.
    pub fn receive(&mut self, session_id: SessionId, message: &ClientMessage) -> ValidationResult {
        match validate_intent(session_id, message, &mut self.registry, &mut self.queue) {
            Ok(()) => ValidationResult::Accepted,
            Err(reason) => {
                self.dropped += 1;
                match &reason {
                    RejectReason::RateLimited(..) => warn!("{reason}"),
                    _ => debug!("dropped {}: {reason}", message_name(message)),
                }
                ValidationResult::from(&reason)
            }
        }
    }

    /// Dispatch every queued intent in arrival order.
    pub fn process_pending(&mut self) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        while let Some(QueuedIntent { origin, command }) = self.queue.pop() {
            match &command {
                Command::Join { display_name } => {
                    outbound.extend(self.on_join(origin, display_name));
                }
                _ => outbound.extend(self.apply(origin, &command)),
            }
        }
        outbound
    }

    /// Run one lifecycle tick.
    ///
    /// Pending intents are dispatched first so nothing queued before the
    /// tick observes the world after it. Opens a new rate window.
    pub fn step(&mut self) -> Vec<Outbound> {
        let mut outbound = self.process_pending();

        let events = self.world.advance();
        let tick = self.world.tick();
        self.record(JournalEntry::Advance { tick });
        self.queue.reset_window();

        if !events.is_empty() {
            debug!("tick {tick}: {} resources matured", events.len());
        }
        outbound.extend(self.fan_out(&events));
        outbound
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Resolve an audience to joined session ids, ascending.
    pub fn recipients(&self, to: &Recipients) -> Vec<SessionId> {
        self.registry.joined().filter(|id| to.includes(*id)).collect()
    }

    /// The full snapshot a joined session would receive on join, with the
    /// growth curve clients need to scale growing resources.
    pub fn snapshot_proto(&self, session_id: SessionId) -> Option<InitWorld> {
        let lifecycle = &self.config.world.lifecycle;
        self.world
            .session_snapshot(session_id)
            .map(|snapshot| InitWorld::from(&snapshot).with_growth(lifecycle))
    }

    /// Finalize the session journal, if one was kept.
    pub fn finalize(self) -> Option<ReplayArtifact> {
        let final_digest = self.world.state_digest();
        let checkpoint_tick = self.world.tick();
        self.recorder
            .map(|recorder| recorder.finalize(final_digest, checkpoint_tick))
    }

    // ------------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------------

    fn apply(&mut self, origin: SessionId, command: &Command) -> Vec<Outbound> {
        let tick = self.world.tick();
        let events = self.world.apply(origin, command);
        if events.is_empty() {
            debug!("intent {command:?} from {origin} had no effect");
            return Vec::new();
        }

        self.record(JournalEntry::Applied {
            tick,
            origin,
            command: command.clone(),
        });
        self.fan_out(&events)
    }

    fn fan_out(&self, events: &[Event]) -> Vec<Outbound> {
        for event in events {
            if let Event::ControllerChanged { controller } = event {
                match controller {
                    Some(id) => info!("vehicle taken by session {id}"),
                    None => info!("vehicle released"),
                }
            }
        }
        events.iter().map(Outbound::from).collect()
    }

    fn record(&mut self, entry: JournalEntry) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(&entry);
        }
    }
}

fn message_name(message: &ClientMessage) -> &'static str {
    use lumberyard_wire::client_message::Intent;
    match &message.intent {
        Some(Intent::Join(_)) => "join",
        Some(Intent::Move(_)) => "move",
        Some(Intent::RequestDrive(_)) => "request-drive",
        Some(Intent::LeaveSeat(_)) => "leave-seat",
        Some(Intent::MoveForklift(_)) => "move-forklift",
        Some(Intent::Harvest(_)) => "harvest",
        Some(Intent::PlaceTree(_)) => "place-tree",
        Some(Intent::SellLumber(_)) => "sell-lumber",
        None => "empty message",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lumberyard_replay::{VerifyOptions, verify_replay};
    use lumberyard_sim::LifecycleConfig;
    use lumberyard_wire::client_message::Intent;
    use lumberyard_wire::{
        HarvestRequest, JoinRequest, LeaveSeat, PlaceTree, RequestDrive, TransformProto,
        VehiclePoseProto,
    };

    fn join_msg(name: &str) -> ClientMessage {
        ClientMessage::new(Intent::Join(JoinRequest {
            display_name: name.to_string(),
        }))
    }

    fn drive_msg() -> ClientMessage {
        ClientMessage::new(Intent::RequestDrive(RequestDrive {}))
    }

    fn forklift_msg(x: f64, z: f64) -> ClientMessage {
        ClientMessage::new(Intent::MoveForklift(VehiclePoseProto {
            x,
            z,
            heading: 0.5,
            lift_height: 1.0,
        }))
    }

    fn harvest_msg(resource_id: u64) -> ClientMessage {
        ClientMessage::new(Intent::Harvest(HarvestRequest { resource_id }))
    }

    fn names(outbound: &[Outbound]) -> Vec<&'static str> {
        outbound.iter().map(|o| o.message.name()).collect()
    }

    /// Server with `n` joined sessions and no seeded resources.
    fn server_with(n: usize, config: ServerConfig) -> (Server, Vec<SessionId>) {
        let mut server = Server::new(config);
        let ids: Vec<_> = (0..n)
            .map(|i| {
                let id = server.on_connect();
                server.on_join(id, &format!("p{i}"));
                id
            })
            .collect();
        (server, ids)
    }

    fn empty_world() -> ServerConfig {
        ServerConfig {
            world: WorldConfig {
                seeded_resources: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_join_handshake() {
        let mut server = Server::new(ServerConfig::default());
        let a = server.on_connect();
        server.on_join(a, "alice");
        let b = server.on_connect();

        let outbound = server.on_join(b, "bob");
        assert_eq!(names(&outbound), vec!["init-world", "player-joined"]);
        assert_eq!(outbound[0].to, Recipients::Only(b));
        assert_eq!(outbound[1].to, Recipients::AllExcept(b));
        assert_eq!(server.recipients(&outbound[1].to), vec![a]);

        let Some(WireEvent::InitWorld(init)) = &outbound[0].message.event else {
            panic!("expected init-world");
        };
        assert_eq!(init.session_id, b);
        assert_eq!(init.sessions.len(), 2);
        assert_eq!(init.resources.len(), 30);
        assert!(init.vehicle.is_some());
        assert_eq!(init.digest, server.world().state_digest());
    }

    #[test]
    fn test_join_snapshot_carries_growth_curve() {
        let mut config = empty_world();
        config.world.lifecycle.maturation_ticks = 7;
        let mut server = Server::new(config);
        let a = server.on_connect();

        let outbound = server.on_join(a, "alice");
        let Some(WireEvent::InitWorld(init)) = &outbound[0].message.event else {
            panic!("expected init-world");
        };
        let lifecycle = &server.config().world.lifecycle;
        assert_eq!(init.maturation_ticks, 7);
        assert_eq!(init.sapling_size, lifecycle.sapling_size);
        assert_eq!(init.mature_size, lifecycle.mature_size);
    }

    #[test]
    fn test_join_through_queue() {
        let mut server = Server::new(empty_world());
        let a = server.on_connect();

        assert!(server.receive(a, &join_msg("alice")).is_accepted());
        assert!(server.receive(a, &drive_msg()).is_accepted());
        let outbound = server.process_pending();

        assert_eq!(
            names(&outbound),
            vec!["init-world", "player-joined", "driver-status"]
        );
        assert_eq!(server.world().store().vehicle().controller, Some(a));
    }

    #[test]
    fn test_unjoined_connection_receives_nothing() {
        let (mut server, ids) = server_with(1, empty_world());
        let lurker = server.on_connect();

        assert_eq!(server.recipients(&Recipients::All), ids);
        assert_eq!(
            server.receive(lurker, &drive_msg()),
            ValidationResult::DroppedNotJoined
        );
        assert_eq!(server.dropped_count(), 1);
        assert!(server.on_join(999, "ghost").is_empty());
    }

    #[test]
    fn test_two_driver_race() {
        let (mut server, ids) = server_with(2, empty_world());
        let (a, b) = (ids[0], ids[1]);

        server.receive(a, &drive_msg());
        server.receive(b, &drive_msg());
        let outbound = server.process_pending();

        assert_eq!(names(&outbound), vec!["driver-status"]);
        assert_eq!(outbound[0].to, Recipients::All);
        assert_eq!(server.world().store().vehicle().controller, Some(a));
    }

    #[test]
    fn test_forklift_move_from_non_controller_is_noop() {
        let (mut server, ids) = server_with(2, empty_world());
        let (a, b) = (ids[0], ids[1]);
        server.receive(a, &drive_msg());
        server.process_pending();
        let before = server.world().store().vehicle().pose;

        server.receive(b, &forklift_msg(30.0, 30.0));
        assert!(server.process_pending().is_empty());
        assert_eq!(server.world().store().vehicle().pose, before);

        server.receive(a, &forklift_msg(3.0, 4.0));
        let outbound = server.process_pending();
        assert_eq!(names(&outbound), vec!["forklift-moved"]);
        assert_eq!(server.recipients(&outbound[0].to), vec![b]);
    }

    #[test]
    fn test_driver_disconnect_releases_before_next_request() {
        let (mut server, ids) = server_with(2, empty_world());
        let (a, b) = (ids[0], ids[1]);
        server.receive(a, &drive_msg());
        server.process_pending();

        // b's request is already queued when a drops
        server.receive(b, &drive_msg());
        let mut outbound = server.on_disconnect(a);
        outbound.extend(server.process_pending());

        assert_eq!(
            names(&outbound),
            vec!["driver-status", "player-left", "driver-status"]
        );
        let Some(WireEvent::DriverStatus(released)) = &outbound[0].message.event else {
            panic!("expected driver-status");
        };
        assert_eq!(released.controlling_session_id, None);
        assert_eq!(server.recipients(&outbound[0].to), vec![b]);
        assert_eq!(server.world().store().vehicle().controller, Some(b));
    }

    #[test]
    fn test_disconnect_discards_queued_intents() {
        let (mut server, ids) = server_with(2, empty_world());
        let (a, b) = (ids[0], ids[1]);
        server.receive(a, &drive_msg());
        server.receive(b, &drive_msg());

        server.on_disconnect(a);
        server.process_pending();
        assert_eq!(server.world().store().vehicle().controller, Some(b));
        assert!(server.on_disconnect(a).is_empty());
    }

    #[test]
    fn test_leave_seat_broadcasts_release() {
        let (mut server, ids) = server_with(2, empty_world());
        server.receive(ids[0], &drive_msg());
        server.process_pending();

        server.receive(
            ids[0],
            &ClientMessage::new(Intent::LeaveSeat(LeaveSeat {})),
        );
        let outbound = server.process_pending();
        assert_eq!(names(&outbound), vec!["driver-status"]);
        assert_eq!(server.world().store().vehicle().controller, None);
    }

    #[test]
    fn test_movement_rebroadcast_skips_origin() {
        let (mut server, ids) = server_with(3, empty_world());
        server.receive(
            ids[1],
            &ClientMessage::new(Intent::Move(TransformProto {
                x: 1.0,
                y: 1.6,
                z: 2.0,
                heading: 0.1,
            })),
        );
        let outbound = server.process_pending();
        assert_eq!(names(&outbound), vec!["player-moved"]);
        assert_eq!(server.recipients(&outbound[0].to), vec![ids[0], ids[2]]);
    }

    #[test]
    fn test_yield_one_harvest_race() {
        let config = ServerConfig {
            world: WorldConfig {
                seeded_resources: 1,
                lifecycle: LifecycleConfig {
                    initial_yield: 1,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        let (mut server, ids) = server_with(2, config);
        let (a, b) = (ids[0], ids[1]);
        let tree = server.world().store().resources().next().unwrap().id;

        server.receive(a, &harvest_msg(tree));
        server.receive(b, &harvest_msg(tree));
        let outbound = server.process_pending();

        assert_eq!(
            names(&outbound),
            vec!["tree-removed", "payment", "wallet-updated"]
        );
        assert_eq!(outbound[1].to, Recipients::Only(a));
        assert_eq!(server.world().store().session(a).unwrap().wallet, 110);
        assert_eq!(server.world().store().session(b).unwrap().wallet, 100);
        assert!(server.snapshot_proto(b).unwrap().resources.is_empty());
    }

    #[test]
    fn test_placement_denied_goes_to_requester() {
        let config = ServerConfig {
            world: WorldConfig {
                seeded_resources: 0,
                starting_wallet: 15,
                ..Default::default()
            },
            ..Default::default()
        };
        let (mut server, ids) = server_with(2, config);

        server.receive(
            ids[0],
            &ClientMessage::new(Intent::PlaceTree(PlaceTree { x: 1.0, z: 1.0 })),
        );
        let outbound = server.process_pending();
        assert_eq!(names(&outbound), vec!["placement-denied"]);
        assert_eq!(server.recipients(&outbound[0].to), vec![ids[0]]);
        assert_eq!(server.world().store().resource_count(), 0);
    }

    #[test]
    fn test_step_matures_placed_tree() {
        let config = ServerConfig {
            world: WorldConfig {
                seeded_resources: 0,
                lifecycle: LifecycleConfig {
                    maturation_ticks: 2,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        let (mut server, ids) = server_with(1, config);
        server.receive(
            ids[0],
            &ClientMessage::new(Intent::PlaceTree(PlaceTree { x: 1.0, z: 1.0 })),
        );

        let first = server.step();
        assert_eq!(names(&first), vec!["tree-added", "wallet-updated"]);
        let second = server.step();
        assert_eq!(names(&second), vec!["tree-matured"]);
        assert_eq!(server.current_tick(), 2);
    }

    #[test]
    fn test_step_resets_rate_window() {
        let config = ServerConfig {
            max_intents_per_tick: 1,
            ..empty_world()
        };
        let (mut server, ids) = server_with(1, config);

        assert!(server.receive(ids[0], &drive_msg()).is_accepted());
        assert_eq!(
            server.receive(ids[0], &drive_msg()),
            ValidationResult::DroppedRateLimit
        );
        server.step();
        assert!(server.receive(ids[0], &drive_msg()).is_accepted());
    }

    #[test]
    fn test_finalize_without_journal() {
        let server = Server::new(empty_world());
        assert!(server.finalize().is_none());
    }

    #[test]
    fn test_journal_replays_to_same_state() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = ServerConfig {
            world: WorldConfig {
                seed: 7,
                seeded_resources: 5,
                ..Default::default()
            },
            record_journal: true,
            ..Default::default()
        };
        let world_config = config.world.clone();
        let (mut server, ids) = server_with(3, config);
        let tree = server.world().store().resources().next().unwrap().id;

        server.receive(ids[0], &drive_msg());
        server.receive(ids[0], &forklift_msg(-4.0, 2.0));
        server.receive(ids[1], &harvest_msg(tree));
        server.receive(
            ids[2],
            &ClientMessage::new(Intent::PlaceTree(PlaceTree { x: 9.0, z: 9.0 })),
        );
        server.step();
        server.on_disconnect(ids[0]);
        server.receive(ids[1], &drive_msg());
        for _ in 0..3 {
            server.step();
        }

        let digest = server.world().state_digest();
        let artifact = server.finalize().unwrap();
        assert_eq!(artifact.final_digest, digest);
        assert_eq!(artifact.checkpoint_tick, 4);

        let result = verify_replay(&artifact, &VerifyOptions {
            config: world_config,
        });
        assert!(result.is_ok(), "journal did not replay: {result:?}");
    }
}
