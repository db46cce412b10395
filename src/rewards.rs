// src/rewards.rs
//! Lease reward accrual.
//!
//! Each subnet carries a reward rate in smallest units per stake-second
//! slot, set by governance. Anyone may poke accrual for an active lease;
//! pending rewards grow by elapsed-seconds times rate since the last
//! accrual. Payout itself happens off-protocol against the pending
//! balance.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ProtocolError, Result};
use crate::events::{EventLog, ProtocolEvent};
use crate::registry::{LeaseStatus, Registry};
use crate::{Address, LeaseId, SubnetId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardAccrual {
    pub lease_id: LeaseId,
    pub validator: Address,
    pub pending: u64,
    pub last_accrued: u64,
}

struct RewardState {
    /// Reward rate per subnet, smallest units per second
    rates: HashMap<SubnetId, u64>,
    accruals: HashMap<LeaseId, RewardAccrual>,
}

/// Reward bookkeeping for active leases.
pub struct RewardDistributor {
    governance: Address,
    registry: Arc<Registry>,
    state: RwLock<RewardState>,
    events: Arc<EventLog>,
}

impl RewardDistributor {
    pub fn new(governance: &str, registry: Arc<Registry>, events: Arc<EventLog>) -> Self {
        Self {
            governance: governance.to_string(),
            registry,
            state: RwLock::new(RewardState {
                rates: HashMap::new(),
                accruals: HashMap::new(),
            }),
            events,
        }
    }

    /// Set the per-second reward rate for a subnet. Governance only.
    pub fn set_reward_rate(&self, caller: &str, subnet_id: SubnetId, rate: u64) -> Result<()> {
        if caller != self.governance {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} is not governance",
                caller
            )));
        }
        if self.registry.get_subnet(subnet_id).is_none() {
            return Err(ProtocolError::NotFound(format!(
                "subnet {}",
                hex::encode(subnet_id)
            )));
        }
        self.state.write().rates.insert(subnet_id, rate);

        log::info!(
            "Reward rate for subnet {} set to {} per second",
            hex::encode(subnet_id),
            rate
        );
        self.events
            .emit(ProtocolEvent::RewardRateSet { subnet_id, rate });
        Ok(())
    }

    /// Accrue rewards for an active lease up to `now`. Permissionless;
    /// calling twice for the same second adds nothing.
    pub fn accumulate_rewards(&self, caller: &str, lease_id: LeaseId, now: u64) -> Result<u64> {
        let lease = self
            .registry
            .get_lease(lease_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("lease {}", hex::encode(lease_id))))?;
        if lease.status != LeaseStatus::Active {
            return Err(ProtocolError::InvalidState(format!(
                "lease {} is {:?}, rewards accrue only while Active",
                hex::encode(lease_id),
                lease.status
            )));
        }

        let mut state = self.state.write();
        let rate = match state.rates.get(&lease.subnet_id) {
            Some(rate) => *rate,
            None => {
                return Err(ProtocolError::NotFound(format!(
                    "reward rate for subnet {}",
                    hex::encode(lease.subnet_id)
                )));
            }
        };
        let accrual = state.accruals.entry(lease_id).or_insert_with(|| RewardAccrual {
            lease_id,
            validator: lease.validator.clone(),
            pending: 0,
            last_accrued: lease.start_time,
        });

        if now <= accrual.last_accrued {
            return Ok(accrual.pending);
        }
        let elapsed = now - accrual.last_accrued;
        accrual.pending = accrual.pending.saturating_add(elapsed.saturating_mul(rate));
        accrual.last_accrued = now;
        let pending = accrual.pending;
        drop(state);

        log::debug!(
            "Rewards for lease {} accrued by {}: pending {}",
            hex::encode(lease_id),
            caller,
            pending
        );
        self.events
            .emit(ProtocolEvent::RewardsAccumulated { lease_id, pending });
        Ok(pending)
    }

    pub fn get_pending_reward(&self, lease_id: LeaseId) -> u64 {
        self.state
            .read()
            .accruals
            .get(&lease_id)
            .map(|a| a.pending)
            .unwrap_or(0)
    }

    pub fn get_reward_rate(&self, subnet_id: SubnetId) -> Option<u64> {
        self.state.read().rates.get(&subnet_id).copied()
    }
}
