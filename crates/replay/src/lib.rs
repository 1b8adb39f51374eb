//! Lumberyard Session Journal
//!
//! The world is deterministic given its seed and the ordered stream of
//! applied commands and lifecycle ticks. This crate records that stream
//! while the server runs and verifies that replaying it against a fresh
//! world reproduces the recorded outcome.
//!
//! - [`ReplayRecorder`]: collects journal entries during a run
//! - [`verify_replay`]: rebuilds the world and checks every anchor

#![deny(unsafe_code)]

use log::debug;
use lumberyard_sim::{Command, STATE_DIGEST_ALGO_ID, SessionId, Tick, World, WorldConfig};
use lumberyard_wire::journal_entry_proto::Entry;
use lumberyard_wire::{ClientMessage, JournalEntryProto, ReplayArtifact, TuningParameter};
use prost::Message;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Current artifact schema version.
pub const REPLAY_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Journal Entry
// ============================================================================

/// One step of world history.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    /// A command applied at `tick` on behalf of `origin`.
    Applied {
        tick: Tick,
        origin: SessionId,
        command: Command,
    },
    /// A joined session disconnected at `tick`.
    Disconnect { tick: Tick, origin: SessionId },
    /// A lifecycle tick that moved the world to `tick`.
    Advance { tick: Tick },
}

impl JournalEntry {
    fn to_proto(&self) -> Option<JournalEntryProto> {
        match self {
            Self::Applied {
                tick,
                origin,
                command: Command::Leave,
            }
            | Self::Disconnect { tick, origin } => {
                Some(JournalEntryProto::disconnect(*tick, *origin))
            }
            Self::Applied {
                tick,
                origin,
                command,
            } => ClientMessage::try_from(command)
                .ok()
                .map(|intent| JournalEntryProto::applied(*tick, *origin, intent)),
            Self::Advance { tick } => Some(JournalEntryProto::advance(*tick)),
        }
    }
}

impl TryFrom<&JournalEntryProto> for JournalEntry {
    type Error = VerifyError;

    fn try_from(proto: &JournalEntryProto) -> Result<Self, Self::Error> {
        let tick = proto.tick;
        match &proto.entry {
            Some(Entry::Applied(applied)) => {
                let intent = applied.intent.as_ref().ok_or(VerifyError::InvalidFormat {
                    reason: format!("applied entry at tick {tick} has no intent"),
                })?;
                let command =
                    Command::try_from(intent).map_err(|e| VerifyError::InvalidFormat {
                        reason: format!("entry at tick {tick}: {e}"),
                    })?;
                Ok(Self::Applied {
                    tick,
                    origin: applied.origin,
                    command,
                })
            }
            Some(Entry::Disconnect(disconnect)) => Ok(Self::Disconnect {
                tick,
                origin: disconnect.origin,
            }),
            Some(Entry::Advance(_)) => Ok(Self::Advance { tick }),
            None => Err(VerifyError::InvalidFormat {
                reason: format!("empty journal entry at tick {tick}"),
            }),
        }
    }
}

// ============================================================================
// Replay Recorder
// ============================================================================

/// Records world history for artifact generation.
pub struct ReplayRecorder {
    seed: u64,
    tuning_parameters: Vec<TuningParameter>,
    initial_digest: u64,
    journal: Vec<JournalEntryProto>,
}

impl ReplayRecorder {
    /// Start recording a world that was just built from `config`.
    pub fn new(config: &WorldConfig, initial_digest: u64) -> Self {
        Self {
            seed: config.seed,
            tuning_parameters: tuning_parameters(config),
            initial_digest,
            journal: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: &JournalEntry) {
        if let Some(proto) = entry.to_proto() {
            self.journal.push(proto);
        }
    }

    pub fn len(&self) -> usize {
        self.journal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.journal.is_empty()
    }

    /// Finalize the replay artifact.
    pub fn finalize(self, final_digest: u64, checkpoint_tick: Tick) -> ReplayArtifact {
        let journal_sha256 = journal_checksum(&self.journal);
        ReplayArtifact {
            replay_format_version: REPLAY_FORMAT_VERSION,
            seed: self.seed,
            state_digest_algo_id: STATE_DIGEST_ALGO_ID.to_string(),
            tuning_parameters: self.tuning_parameters,
            initial_digest: self.initial_digest,
            journal: self.journal,
            journal_sha256,
            final_digest,
            checkpoint_tick,
        }
    }
}

fn tuning_parameters(config: &WorldConfig) -> Vec<TuningParameter> {
    config
        .tuning_parameters()
        .into_iter()
        .map(|(key, value)| TuningParameter {
            key: key.to_string(),
            value,
        })
        .collect()
}

/// Lowercase hex SHA-256 over the length-delimited encoding of each entry.
pub fn journal_checksum(journal: &[JournalEntryProto]) -> String {
    let mut hasher = Sha256::new();
    for entry in journal {
        hasher.update(entry.encode_length_delimited_to_vec());
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Replay Verification
// ============================================================================

/// Replay verification error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    #[error("unsupported replay format version {0}")]
    UnsupportedVersion(u32),
    #[error("journal checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("state digest algorithm mismatch: expected {expected}, got {actual}")]
    DigestAlgorithmMismatch { expected: String, actual: String },
    #[error("tuning parameter `{key}` mismatch: recorded {recorded}, configured {configured}")]
    TuningMismatch {
        key: String,
        recorded: f64,
        configured: f64,
    },
    #[error("initialization anchor mismatch: expected {expected:#x}, got {actual:#x}")]
    InitializationAnchorMismatch { expected: u64, actual: u64 },
    #[error(
        "journal out of order at entry {index}: entry tick {entry_tick}, world tick {world_tick}"
    )]
    JournalOutOfOrder {
        index: usize,
        entry_tick: Tick,
        world_tick: Tick,
    },
    #[error("checkpoint tick mismatch: expected {expected}, got {actual}")]
    CheckpointTickMismatch { expected: Tick, actual: Tick },
    #[error("final digest mismatch: expected {expected:#x}, got {actual:#x}")]
    FinalDigestMismatch { expected: u64, actual: u64 },
    #[error("invalid replay format: {reason}")]
    InvalidFormat { reason: String },
}

/// Options for replay verification.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// World rules to replay under. The seed is taken from the artifact.
    pub config: WorldConfig,
}

/// Verify a replay artifact produces the recorded outcome.
///
/// 1. Check format version, digest algorithm and journal checksum
/// 2. Check the recorded tuning parameters against the configured rules
/// 3. Build a fresh world from the recorded seed; check the initial digest
/// 4. Re-apply the journal in order, checking every entry's tick
/// 5. Check the checkpoint tick and final digest
pub fn verify_replay(
    artifact: &ReplayArtifact,
    options: &VerifyOptions,
) -> Result<(), VerifyError> {
    if artifact.replay_format_version != REPLAY_FORMAT_VERSION {
        return Err(VerifyError::UnsupportedVersion(
            artifact.replay_format_version,
        ));
    }
    if artifact.state_digest_algo_id != STATE_DIGEST_ALGO_ID {
        return Err(VerifyError::DigestAlgorithmMismatch {
            expected: STATE_DIGEST_ALGO_ID.to_string(),
            actual: artifact.state_digest_algo_id.clone(),
        });
    }
    let actual_checksum = journal_checksum(&artifact.journal);
    if actual_checksum != artifact.journal_sha256 {
        return Err(VerifyError::ChecksumMismatch {
            expected: artifact.journal_sha256.clone(),
            actual: actual_checksum,
        });
    }

    let config = WorldConfig {
        seed: artifact.seed,
        ..options.config.clone()
    };
    check_tuning(&artifact.tuning_parameters, &config)?;

    let mut world = World::new(config);
    let initial_digest = world.state_digest();
    if initial_digest != artifact.initial_digest {
        return Err(VerifyError::InitializationAnchorMismatch {
            expected: artifact.initial_digest,
            actual: initial_digest,
        });
    }

    for (index, proto) in artifact.journal.iter().enumerate() {
        let out_of_order = |world: &World| VerifyError::JournalOutOfOrder {
            index,
            entry_tick: proto.tick,
            world_tick: world.tick(),
        };
        match JournalEntry::try_from(proto)? {
            JournalEntry::Applied {
                tick,
                origin,
                command,
            } => {
                if tick != world.tick() {
                    return Err(out_of_order(&world));
                }
                world.apply(origin, &command);
            }
            JournalEntry::Disconnect { tick, origin } => {
                if tick != world.tick() {
                    return Err(out_of_order(&world));
                }
                world.apply(origin, &Command::Leave);
            }
            JournalEntry::Advance { tick } => {
                world.advance();
                if tick != world.tick() {
                    return Err(out_of_order(&world));
                }
            }
        }
    }
    debug!(
        "replayed {} journal entries to tick {}",
        artifact.journal.len(),
        world.tick()
    );

    if world.tick() != artifact.checkpoint_tick {
        return Err(VerifyError::CheckpointTickMismatch {
            expected: artifact.checkpoint_tick,
            actual: world.tick(),
        });
    }

    let actual_digest = world.state_digest();
    if actual_digest != artifact.final_digest {
        return Err(VerifyError::FinalDigestMismatch {
            expected: artifact.final_digest,
            actual: actual_digest,
        });
    }

    Ok(())
}

fn check_tuning(recorded: &[TuningParameter], config: &WorldConfig) -> Result<(), VerifyError> {
    for (key, configured) in config.tuning_parameters() {
        let Some(param) = recorded.iter().find(|p| p.key == key) else {
            return Err(VerifyError::InvalidFormat {
                reason: format!("missing tuning parameter `{key}`"),
            });
        };
        if param.value != configured {
            return Err(VerifyError::TuningMismatch {
                key: key.to_string(),
                recorded: param.value,
                configured,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lumberyard_sim::{Transform, VehiclePose};

    fn small_config() -> WorldConfig {
        WorldConfig {
            seed: 42,
            seeded_resources: 4,
            ..Default::default()
        }
    }

    /// Drive a world and a recorder side by side, like the server does.
    fn record_session() -> ReplayArtifact {
        let config = small_config();
        let mut world = World::new(config.clone());
        let mut recorder = ReplayRecorder::new(&config, world.state_digest());

        let mut apply = |world: &mut World, origin: SessionId, command: Command| {
            recorder.record(&JournalEntry::Applied {
                tick: world.tick(),
                origin,
                command: command.clone(),
            });
            world.apply(origin, &command);
        };

        apply(&mut world, 1, Command::Join {
            display_name: "a".to_string(),
        });
        apply(&mut world, 2, Command::Join {
            display_name: "b".to_string(),
        });
        apply(&mut world, 1, Command::Move(Transform::new(3.0, 1.6, 4.0, 0.2)));
        apply(&mut world, 2, Command::RequestDrive);
        apply(
            &mut world,
            2,
            Command::MoveVehicle(VehiclePose {
                position: [-8.0, -9.0],
                heading: 1.0,
                lift_height: 1.2,
            }),
        );
        let first = world.store().resources().next().map(|r| r.id).unwrap();
        for _ in 0..3 {
            apply(&mut world, 1, Command::Harvest { resource_id: first });
        }
        apply(&mut world, 1, Command::PlaceResource {
            position: [5.0, 5.0],
        });
        apply(&mut world, 2, Command::Leave);

        for _ in 0..3 {
            world.advance();
            recorder.record(&JournalEntry::Advance { tick: world.tick() });
        }

        recorder.finalize(world.state_digest(), world.tick())
    }

    fn options() -> VerifyOptions {
        VerifyOptions {
            config: small_config(),
        }
    }

    #[test]
    fn test_artifact_has_required_fields() {
        let artifact = record_session();

        assert_eq!(artifact.replay_format_version, REPLAY_FORMAT_VERSION);
        assert_eq!(artifact.seed, 42);
        assert_eq!(artifact.state_digest_algo_id, STATE_DIGEST_ALGO_ID);
        assert!(!artifact.tuning_parameters.is_empty());
        // 10 commands (Leave recorded as a disconnect) + 3 advances
        assert_eq!(artifact.journal.len(), 13);
        assert_eq!(artifact.checkpoint_tick, 3);
        assert_eq!(artifact.journal_sha256.len(), 64);
    }

    #[test]
    fn test_replay_verification_passes() {
        let artifact = record_session();
        let result = verify_replay(&artifact, &options());
        assert!(result.is_ok(), "Replay verification failed: {result:?}");
    }

    #[test]
    fn test_tampered_journal_fails_checksum() {
        let mut artifact = record_session();
        artifact.journal.pop();

        assert!(matches!(
            verify_replay(&artifact, &options()),
            Err(VerifyError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_initialization_anchor_failure() {
        let mut artifact = record_session();
        artifact.initial_digest ^= 0xDEADBEEF;

        assert!(matches!(
            verify_replay(&artifact, &options()),
            Err(VerifyError::InitializationAnchorMismatch { .. })
        ));
    }

    #[test]
    fn test_final_digest_failure() {
        let mut artifact = record_session();
        artifact.final_digest ^= 1;

        assert!(matches!(
            verify_replay(&artifact, &options()),
            Err(VerifyError::FinalDigestMismatch { .. })
        ));
    }

    #[test]
    fn test_tuning_mismatch() {
        let artifact = record_session();
        let mut options = options();
        options.config.lifecycle.placement_cost = 99;

        assert!(matches!(
            verify_replay(&artifact, &options),
            Err(VerifyError::TuningMismatch { key, .. }) if key == "placement_cost"
        ));
    }

    #[test]
    fn test_out_of_order_entry_detected() {
        let mut artifact = record_session();
        // Stamp the first command as if applied after a tick, then re-seal
        artifact.journal[0].tick = 7;
        artifact.journal_sha256 = journal_checksum(&artifact.journal);

        assert!(matches!(
            verify_replay(&artifact, &options()),
            Err(VerifyError::JournalOutOfOrder { index: 0, .. })
        ));
    }

    #[test]
    fn test_empty_entry_is_invalid() {
        let mut artifact = record_session();
        artifact.journal.insert(0, JournalEntryProto {
            tick: 0,
            entry: None,
        });
        artifact.journal_sha256 = journal_checksum(&artifact.journal);

        assert!(matches!(
            verify_replay(&artifact, &options()),
            Err(VerifyError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_world_layout_mismatch_is_a_tuning_mismatch() {
        let artifact = record_session();

        let mut options = options();
        options.config.spawn = Transform::new(0.0, 8.0, 0.0, 0.0);
        assert!(matches!(
            verify_replay(&artifact, &options),
            Err(VerifyError::TuningMismatch { key, .. }) if key == "spawn_y"
        ));

        let mut options = self::options();
        options.config.seed_extent = 20.0;
        assert!(matches!(
            verify_replay(&artifact, &options),
            Err(VerifyError::TuningMismatch { key, .. }) if key == "seed_extent"
        ));

        let mut options = self::options();
        options.config.drive_policy.max_distance = Some(5.0);
        assert!(matches!(
            verify_replay(&artifact, &options),
            Err(VerifyError::TuningMismatch { key, .. }) if key == "drive_max_distance"
        ));
    }
}
