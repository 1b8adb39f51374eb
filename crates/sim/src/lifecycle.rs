//! Resource lifecycle and the economy around it.
//!
//! ```text
//! (placed) --> Growing --age >= maturation--> Mature --yield hits 0--> (removed)
//! ```
//!
//! Seeded resources start out mature. Growth runs from [`grow`] on every
//! lifecycle tick; harvesting, placement and selling run on client intent.

use crate::store::{Resource, ResourceState, WorldStateStore};
use crate::{ResourceId, SessionId, Tick};

/// Lifecycle and economy tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    /// Age in ticks at which a growing resource becomes mature.
    pub maturation_ticks: Tick,
    /// Hits a freshly matured resource can take.
    pub initial_yield: u32,
    /// Size of a resource at age zero.
    pub sapling_size: f64,
    /// Size reached at maturation.
    pub mature_size: f64,
    /// Coins charged to place a resource.
    pub placement_cost: u64,
    /// Coins paid for felling a resource.
    pub fell_reward: u64,
    /// Logs granted for felling a resource.
    pub logs_per_tree: u32,
    /// Coins paid per log sold.
    pub lumber_price: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            maturation_ticks: 30,
            initial_yield: 3,
            sapling_size: 0.5,
            mature_size: 3.0,
            placement_cost: 20,
            fell_reward: 10,
            logs_per_tree: 1,
            lumber_price: 5,
        }
    }
}

impl LifecycleConfig {
    /// Size of a growing resource at `age` ticks.
    pub fn size_at(&self, age: Tick) -> f64 {
        if self.maturation_ticks == 0 {
            return self.mature_size;
        }
        let progress = (age as f64 / self.maturation_ticks as f64).min(1.0);
        self.sapling_size + (self.mature_size - self.sapling_size) * progress
    }
}

/// Result of a successful harvest hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// The resource took a hit and still stands.
    Damaged {
        resource_id: ResourceId,
        remaining_yield: u32,
    },
    /// The last hit landed: the resource is gone and the harvester was paid.
    Felled {
        resource_id: ResourceId,
        reward: u64,
        wallet: u64,
        lumber: u32,
    },
}

/// Why a placement was refused. Nothing is mutated in either case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementError {
    UnknownSession,
    InsufficientFunds { cost: u64, wallet: u64 },
}

/// Result of selling a session's whole log stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sale {
    pub logs: u32,
    pub amount: u64,
    pub wallet: u64,
}

/// Advance growth at `now`. Growing resources are rescaled by age; those
/// that reach maturation become mature with a full yield.
///
/// Returns the ids that matured this call, in id order.
pub fn grow(store: &mut WorldStateStore, config: &LifecycleConfig, now: Tick) -> Vec<ResourceId> {
    let mut matured = Vec::new();
    for resource in store.resources_mut() {
        if resource.state != ResourceState::Growing {
            continue;
        }
        let age = now.saturating_sub(resource.spawned_at);
        resource.size = config.size_at(age);
        if age >= config.maturation_ticks {
            resource.state = ResourceState::Mature;
            resource.remaining_yield = config.initial_yield;
            matured.push(resource.id);
        }
    }
    matured
}

/// One harvest hit on `resource_id` by `session_id`.
///
/// Rejected (`None`) if the resource is missing or still growing, or the
/// harvester is not a live session.
pub fn harvest(
    store: &mut WorldStateStore,
    config: &LifecycleConfig,
    resource_id: ResourceId,
    session_id: SessionId,
) -> Option<HarvestOutcome> {
    if !store.resource(resource_id)?.is_mature() || store.session(session_id).is_none() {
        return None;
    }

    let remaining_yield = store.decrement_yield(resource_id, 1)?;
    if remaining_yield > 0 {
        return Some(HarvestOutcome::Damaged {
            resource_id,
            remaining_yield,
        });
    }

    store.remove_resource(resource_id);
    let wallet = store.credit_wallet(session_id, config.fell_reward)?;
    let lumber = store.add_lumber(session_id, config.logs_per_tree)?;
    Some(HarvestOutcome::Felled {
        resource_id,
        reward: config.fell_reward,
        wallet,
        lumber,
    })
}

/// Plant a new growing resource at `position`, paid for by `session_id`.
///
/// The debit and the insertion happen together or not at all.
pub fn place(
    store: &mut WorldStateStore,
    config: &LifecycleConfig,
    session_id: SessionId,
    position: [f64; 2],
) -> Result<Resource, PlacementError> {
    let wallet = store
        .session(session_id)
        .ok_or(PlacementError::UnknownSession)?
        .wallet;
    if store.debit_wallet(session_id, config.placement_cost).is_none() {
        return Err(PlacementError::InsufficientFunds {
            cost: config.placement_cost,
            wallet,
        });
    }

    let resource = Resource {
        id: store.allocate_resource_id(),
        position,
        size: config.sapling_size,
        state: ResourceState::Growing,
        spawned_at: store.tick(),
        remaining_yield: 0,
    };
    store.upsert_resource(resource.clone());
    Ok(resource)
}

/// Sell every log `session_id` carries. `None` if the session is gone or
/// carries nothing.
pub fn sell_lumber(
    store: &mut WorldStateStore,
    config: &LifecycleConfig,
    session_id: SessionId,
) -> Option<Sale> {
    if store.session(session_id)?.lumber == 0 {
        return None;
    }
    let logs = store.take_lumber(session_id)?;
    let amount = u64::from(logs) * config.lumber_price;
    let wallet = store.credit_wallet(session_id, amount)?;
    Some(Sale {
        logs,
        amount,
        wallet,
    })
}
