//! Lumberyard Wire Protocol Types
//!
//! This crate defines the Protobuf messages exchanged between game clients
//! and the server edge. Every event name is one variant of a tagged union
//! ([`ClientMessage`] inbound, [`ServerMessage`] outbound), so payloads are
//! validated once at the boundary before anything reaches the world.
//!
//! # Message Categories
//!
//! - **Intents** (client → server): join, move, request-drive, leave-seat,
//!   move-forklift, harvest, place-tree, sell-lumber
//! - **Snapshot** (server → joiner): init-world, sent once per join
//! - **Deltas** (server → sessions): one entity per message
//! - **Journal** (replay artifacts, never sent over the network)

#![deny(unsafe_code)]

mod convert;

pub use convert::WireError;

use prost::Message;

// ============================================================================
// Type Aliases (matching world core)
// ============================================================================

pub type Tick = u64;

pub type SessionId = u64;

pub type ResourceId = u64;

// ============================================================================
// Shared Entity Messages
// ============================================================================

/// Avatar position and yaw.
#[derive(Clone, PartialEq, Message)]
pub struct TransformProto {
    #[prost(double, tag = "1")]
    pub x: f64,

    #[prost(double, tag = "2")]
    pub y: f64,

    #[prost(double, tag = "3")]
    pub z: f64,

    #[prost(double, tag = "4")]
    pub heading: f64,
}

/// Vehicle ground pose and lift height.
#[derive(Clone, PartialEq, Message)]
pub struct VehiclePoseProto {
    #[prost(double, tag = "1")]
    pub x: f64,

    #[prost(double, tag = "2")]
    pub z: f64,

    #[prost(double, tag = "3")]
    pub heading: f64,

    #[prost(double, tag = "4")]
    pub lift_height: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct SessionProto {
    #[prost(uint64, tag = "1")]
    pub session_id: SessionId,

    #[prost(string, tag = "2")]
    pub display_name: String,

    /// 0xRRGGBB.
    #[prost(uint32, tag = "3")]
    pub color_tag: u32,

    #[prost(message, optional, tag = "4")]
    pub transform: Option<TransformProto>,

    #[prost(uint64, tag = "5")]
    pub wallet: u64,

    #[prost(uint32, tag = "6")]
    pub lumber: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ResourceStateProto {
    Unspecified = 0,
    Growing = 1,
    Mature = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct ResourceProto {
    #[prost(uint64, tag = "1")]
    pub resource_id: ResourceId,

    #[prost(double, tag = "2")]
    pub x: f64,

    #[prost(double, tag = "3")]
    pub z: f64,

    #[prost(double, tag = "4")]
    pub size: f64,

    #[prost(enumeration = "ResourceStateProto", tag = "5")]
    pub state: i32,

    #[prost(uint64, tag = "6")]
    pub spawned_at: Tick,

    #[prost(uint32, tag = "7")]
    pub remaining_yield: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct VehicleProto {
    #[prost(message, optional, tag = "1")]
    pub pose: Option<VehiclePoseProto>,

    /// Absent when the vehicle is parked.
    #[prost(uint64, optional, tag = "2")]
    pub controlling_session_id: Option<SessionId>,
}

// ============================================================================
// Client → Server
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct JoinRequest {
    #[prost(string, tag = "1")]
    pub display_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct RequestDrive {}

#[derive(Clone, PartialEq, Message)]
pub struct LeaveSeat {}

#[derive(Clone, PartialEq, Message)]
pub struct HarvestRequest {
    #[prost(uint64, tag = "1")]
    pub resource_id: ResourceId,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlaceTree {
    #[prost(double, tag = "1")]
    pub x: f64,

    #[prost(double, tag = "2")]
    pub z: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct SellLumber {}

/// Every client intent, one variant per event name.
#[derive(Clone, PartialEq, Message)]
pub struct ClientMessage {
    #[prost(oneof = "client_message::Intent", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub intent: Option<client_message::Intent>,
}

pub mod client_message {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Intent {
        #[prost(message, tag = "1")]
        Join(super::JoinRequest),

        #[prost(message, tag = "2")]
        Move(super::TransformProto),

        #[prost(message, tag = "3")]
        RequestDrive(super::RequestDrive),

        #[prost(message, tag = "4")]
        LeaveSeat(super::LeaveSeat),

        #[prost(message, tag = "5")]
        MoveForklift(super::VehiclePoseProto),

        #[prost(message, tag = "6")]
        Harvest(super::HarvestRequest),

        #[prost(message, tag = "7")]
        PlaceTree(super::PlaceTree),

        #[prost(message, tag = "8")]
        SellLumber(super::SellLumber),
    }
}

// ============================================================================
// Server → Client
// ============================================================================

/// Full world snapshot, sent once to a joiner.
#[derive(Clone, PartialEq, Message)]
pub struct InitWorld {
    /// The receiving client's own session id.
    #[prost(uint64, tag = "1")]
    pub session_id: SessionId,

    #[prost(uint64, tag = "2")]
    pub tick: Tick,

    /// Sorted by session_id ascending.
    #[prost(message, repeated, tag = "3")]
    pub sessions: Vec<SessionProto>,

    /// Sorted by resource_id ascending.
    #[prost(message, repeated, tag = "4")]
    pub resources: Vec<ResourceProto>,

    #[prost(message, optional, tag = "5")]
    pub vehicle: Option<VehicleProto>,

    /// StateDigest of the snapshot.
    #[prost(uint64, tag = "6")]
    pub digest: u64,

    /// Growth curve, so clients can scale a growing resource from its age.
    #[prost(uint64, tag = "7")]
    pub maturation_ticks: u64,

    #[prost(double, tag = "8")]
    pub sapling_size: f64,

    #[prost(double, tag = "9")]
    pub mature_size: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlayerJoined {
    #[prost(message, optional, tag = "1")]
    pub session: Option<SessionProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlayerMoved {
    #[prost(uint64, tag = "1")]
    pub session_id: SessionId,

    #[prost(message, optional, tag = "2")]
    pub transform: Option<TransformProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlayerLeft {
    #[prost(uint64, tag = "1")]
    pub session_id: SessionId,
}

/// Vehicle lock state. Absent id means nobody drives.
#[derive(Clone, PartialEq, Message)]
pub struct DriverStatus {
    #[prost(uint64, optional, tag = "1")]
    pub controlling_session_id: Option<SessionId>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ForkliftMoved {
    #[prost(message, optional, tag = "1")]
    pub pose: Option<VehiclePoseProto>,

    #[prost(uint64, tag = "2")]
    pub driver_session_id: SessionId,
}

#[derive(Clone, PartialEq, Message)]
pub struct TreeAdded {
    #[prost(message, optional, tag = "1")]
    pub resource: Option<ResourceProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TreeMatured {
    #[prost(message, optional, tag = "1")]
    pub resource: Option<ResourceProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TreeDamaged {
    #[prost(uint64, tag = "1")]
    pub resource_id: ResourceId,

    #[prost(uint32, tag = "2")]
    pub remaining_yield: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct TreeRemoved {
    #[prost(uint64, tag = "1")]
    pub resource_id: ResourceId,
}

/// Coins credited to the receiving session.
#[derive(Clone, PartialEq, Message)]
pub struct Payment {
    #[prost(uint64, tag = "1")]
    pub amount: u64,

    #[prost(uint64, tag = "2")]
    pub wallet: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct WalletUpdated {
    #[prost(uint64, tag = "1")]
    pub session_id: SessionId,

    #[prost(uint64, tag = "2")]
    pub wallet: u64,

    #[prost(uint32, tag = "3")]
    pub lumber: u32,
}

/// The receiving session could not afford a placement.
#[derive(Clone, PartialEq, Message)]
pub struct PlacementDenied {
    #[prost(uint64, tag = "1")]
    pub cost: u64,

    #[prost(uint64, tag = "2")]
    pub wallet: u64,
}

/// Every server event, one variant per event name.
#[derive(Clone, PartialEq, Message)]
pub struct ServerMessage {
    #[prost(
        oneof = "server_message::Event",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13"
    )]
    pub event: Option<server_message::Event>,
}

pub mod server_message {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "1")]
        InitWorld(super::InitWorld),

        #[prost(message, tag = "2")]
        PlayerJoined(super::PlayerJoined),

        #[prost(message, tag = "3")]
        PlayerMoved(super::PlayerMoved),

        #[prost(message, tag = "4")]
        PlayerLeft(super::PlayerLeft),

        #[prost(message, tag = "5")]
        DriverStatus(super::DriverStatus),

        #[prost(message, tag = "6")]
        ForkliftMoved(super::ForkliftMoved),

        #[prost(message, tag = "7")]
        TreeAdded(super::TreeAdded),

        #[prost(message, tag = "8")]
        TreeMatured(super::TreeMatured),

        #[prost(message, tag = "9")]
        TreeDamaged(super::TreeDamaged),

        #[prost(message, tag = "10")]
        TreeRemoved(super::TreeRemoved),

        #[prost(message, tag = "11")]
        Payment(super::Payment),

        #[prost(message, tag = "12")]
        WalletUpdated(super::WalletUpdated),

        #[prost(message, tag = "13")]
        PlacementDenied(super::PlacementDenied),
    }
}

// ============================================================================
// Replay Artifact Types
// ============================================================================

/// A command applied on behalf of `origin`.
#[derive(Clone, PartialEq, Message)]
pub struct AppliedCommandProto {
    #[prost(uint64, tag = "1")]
    pub origin: SessionId,

    #[prost(message, optional, tag = "2")]
    pub intent: Option<ClientMessage>,
}

/// A joined session's connection closed.
#[derive(Clone, PartialEq, Message)]
pub struct DisconnectProto {
    #[prost(uint64, tag = "1")]
    pub origin: SessionId,
}

/// One lifecycle tick.
#[derive(Clone, PartialEq, Message)]
pub struct AdvanceProto {}

/// One journal entry, stamped with the tick it was applied at.
#[derive(Clone, PartialEq, Message)]
pub struct JournalEntryProto {
    #[prost(uint64, tag = "1")]
    pub tick: Tick,

    #[prost(oneof = "journal_entry_proto::Entry", tags = "2, 3, 4")]
    pub entry: Option<journal_entry_proto::Entry>,
}

pub mod journal_entry_proto {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Entry {
        #[prost(message, tag = "2")]
        Applied(super::AppliedCommandProto),

        #[prost(message, tag = "3")]
        Disconnect(super::DisconnectProto),

        #[prost(message, tag = "4")]
        Advance(super::AdvanceProto),
    }
}

/// Tuning parameter key-value pair.
#[derive(Clone, PartialEq, Message)]
pub struct TuningParameter {
    #[prost(string, tag = "1")]
    pub key: String,

    #[prost(double, tag = "2")]
    pub value: f64,
}

/// Complete session journal.
#[derive(Clone, PartialEq, Message)]
pub struct ReplayArtifact {
    /// Schema version (starts at 1).
    #[prost(uint32, tag = "1")]
    pub replay_format_version: u32,

    /// World seed.
    #[prost(uint64, tag = "2")]
    pub seed: u64,

    #[prost(string, tag = "3")]
    pub state_digest_algo_id: String,

    /// Rule parameters (sorted by key).
    #[prost(message, repeated, tag = "4")]
    pub tuning_parameters: Vec<TuningParameter>,

    /// StateDigest of the freshly built world.
    #[prost(uint64, tag = "5")]
    pub initial_digest: u64,

    #[prost(message, repeated, tag = "6")]
    pub journal: Vec<JournalEntryProto>,

    /// Lowercase hex SHA-256 over the length-delimited journal entries.
    #[prost(string, tag = "7")]
    pub journal_sha256: String,

    /// StateDigest at checkpoint_tick.
    #[prost(uint64, tag = "8")]
    pub final_digest: u64,

    #[prost(uint64, tag = "9")]
    pub checkpoint_tick: Tick,
}

// ============================================================================
// Helpers
// ============================================================================

impl ClientMessage {
    pub fn new(intent: client_message::Intent) -> Self {
        Self {
            intent: Some(intent),
        }
    }
}

impl ServerMessage {
    pub fn new(event: server_message::Event) -> Self {
        Self { event: Some(event) }
    }

    /// Wire event name, for logging.
    pub fn name(&self) -> &'static str {
        use server_message::Event;
        match &self.event {
            Some(Event::InitWorld(_)) => "init-world",
            Some(Event::PlayerJoined(_)) => "player-joined",
            Some(Event::PlayerMoved(_)) => "player-moved",
            Some(Event::PlayerLeft(_)) => "player-left",
            Some(Event::DriverStatus(_)) => "driver-status",
            Some(Event::ForkliftMoved(_)) => "forklift-moved",
            Some(Event::TreeAdded(_)) => "tree-added",
            Some(Event::TreeMatured(_)) => "tree-matured",
            Some(Event::TreeDamaged(_)) => "tree-damaged",
            Some(Event::TreeRemoved(_)) => "tree-removed",
            Some(Event::Payment(_)) => "payment",
            Some(Event::WalletUpdated(_)) => "wallet-updated",
            Some(Event::PlacementDenied(_)) => "placement-denied",
            None => "empty",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
