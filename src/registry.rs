// src/registry.rs
//! Validator, subnet, and lease registry.
//!
//! Single source of truth for stake accounting and lease lifecycle:
//! - Validator registration with total/available stake bookkeeping
//! - Subnet registration with immutable type tags
//! - Lease lifecycle: Created -> Active -> {Expired | Slashed}
//!
//! Available stake is reserved at lease creation and restored only when a
//! lease expires. The slash transition forfeits it and is reserved for the
//! configured ACCS principal; lease creation on a validator's behalf is
//! reserved for the validator itself and the configured fee-market
//! principal.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ProtocolError, Result};
use crate::events::{EventLog, ProtocolEvent};
use crate::verification::VmType;
use crate::{derive_id, Address, LeaseId, SubnetId};

/// Minimum total stake to register as a validator: 1,000 tokens
pub const MIN_VALIDATOR_STAKE: u64 = 100_000_000_000;

/// Minimum lease duration: 1 day
pub const MIN_LEASE_DURATION_SECS: u64 = 86_400;

/// Maximum lease duration: 1 year
pub const MAX_LEASE_DURATION_SECS: u64 = 31_536_000;

/// Protocol-level limits enforced at registration and lease creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub min_validator_stake: u64,
    pub min_lease_duration: u64,
    pub max_lease_duration: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            min_validator_stake: MIN_VALIDATOR_STAKE,
            min_lease_duration: MIN_LEASE_DURATION_SECS,
            max_lease_duration: MAX_LEASE_DURATION_SECS,
        }
    }
}

// ─── Records ───────────────────────────────────────────────────────

/// Lease lifecycle state. Transitions are monotone; Expired and Slashed
/// are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LeaseStatus {
    /// Created and stake reserved, not yet serving
    Created,
    /// Actively serving the subnet
    Active,
    /// Ran its full duration; stake restored
    Expired,
    /// Slashed on verified malice; stake forfeited
    Slashed,
}

impl LeaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LeaseStatus::Expired | LeaseStatus::Slashed)
    }
}

/// A registered stake-holding validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub total_stake: u64,
    /// Stake not currently committed to a lease. Always <= total_stake.
    pub available_stake: u64,
    /// Subnet type tags this validator can serve
    pub supported_kinds: Vec<String>,
    pub min_lease_duration: u64,
    pub max_lease_duration: u64,
    pub active: bool,
    pub registered_at: u64,
}

impl Validator {
    pub fn supports(&self, kind: &str) -> bool {
        self.supported_kinds.iter().any(|k| k == kind)
    }
}

/// A registered subnet consuming leased security.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    /// Immutable type tag, e.g. "avalanche" or "cosmos"
    pub kind: String,
    pub owner: Address,
    /// External contact point on the subnet side
    pub adapter: Address,
    /// Minimum stake a single lease must commit
    pub required_stake: u64,
    /// VM family derived from the type tag, used for verifier dispatch
    pub vm_type: VmType,
    pub active: bool,
    pub registered_at: u64,
}

/// A time-bounded commitment of validator stake to a subnet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub validator: Address,
    pub subnet_id: SubnetId,
    pub amount: u64,
    pub duration_secs: u64,
    /// Substrate time at creation; expiry measures from here
    pub start_time: u64,
    pub status: LeaseStatus,
}

impl Lease {
    pub fn is_elapsed(&self, now: u64) -> bool {
        now >= self.start_time.saturating_add(self.duration_secs)
    }
}

// ─── Registry ──────────────────────────────────────────────────────

struct RegistryState {
    validators: HashMap<Address, Validator>,
    subnets: HashMap<SubnetId, Subnet>,
    leases: HashMap<LeaseId, Lease>,
    validator_leases: HashMap<Address, Vec<LeaseId>>,
    /// Principal allowed to create leases during matching
    fee_market: Option<Address>,
    /// Principal allowed to invoke the slash transition
    accs: Option<Address>,
    lease_nonce: u64,
}

/// Registry of validators, subnets, and leases. All state sits behind one
/// lock; every operation validates fully before mutating so a failed call
/// leaves no observable change.
pub struct Registry {
    governance: Address,
    config: ProtocolConfig,
    state: RwLock<RegistryState>,
    events: Arc<EventLog>,
}

impl Registry {
    pub fn new(governance: &str, config: ProtocolConfig, events: Arc<EventLog>) -> Self {
        Self {
            governance: governance.to_string(),
            config,
            state: RwLock::new(RegistryState {
                validators: HashMap::new(),
                subnets: HashMap::new(),
                leases: HashMap::new(),
                validator_leases: HashMap::new(),
                fee_market: None,
                accs: None,
                lease_nonce: 0,
            }),
            events,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    fn require_governance(&self, caller: &str) -> Result<()> {
        if caller != self.governance {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} is not governance",
                caller
            )));
        }
        Ok(())
    }

    // ─── Wiring ────────────────────────────────────────────────────

    /// Set the fee-market principal authorized to create leases on match.
    pub fn set_fee_market(&self, caller: &str, principal: &str) -> Result<()> {
        self.require_governance(caller)?;
        self.state.write().fee_market = Some(principal.to_string());
        log::info!("Fee market principal set to {}", principal);
        Ok(())
    }

    /// Set the ACCS principal authorized to invoke the slash transition.
    pub fn set_accs(&self, caller: &str, principal: &str) -> Result<()> {
        self.require_governance(caller)?;
        self.state.write().accs = Some(principal.to_string());
        log::info!("ACCS principal set to {}", principal);
        Ok(())
    }

    // ─── Validators ────────────────────────────────────────────────

    pub fn register_validator(
        &self,
        caller: &str,
        total_stake: u64,
        available_stake: u64,
        supported_kinds: Vec<String>,
        min_lease_duration: u64,
        max_lease_duration: u64,
        now: u64,
    ) -> Result<Validator> {
        if total_stake < self.config.min_validator_stake {
            return Err(ProtocolError::InsufficientStake {
                required: self.config.min_validator_stake,
                available: total_stake,
            });
        }
        if available_stake > total_stake {
            return Err(ProtocolError::InvalidRange(format!(
                "available stake {} exceeds total stake {}",
                available_stake, total_stake
            )));
        }
        if min_lease_duration == 0 || min_lease_duration > max_lease_duration {
            return Err(ProtocolError::InvalidRange(format!(
                "lease duration bounds [{}s, {}s] are empty",
                min_lease_duration, max_lease_duration
            )));
        }

        let mut state = self.state.write();
        if state.validators.contains_key(caller) {
            return Err(ProtocolError::AlreadyExists(format!(
                "validator {} already registered",
                caller
            )));
        }
        let validator = Validator {
            address: caller.to_string(),
            total_stake,
            available_stake,
            supported_kinds,
            min_lease_duration,
            max_lease_duration,
            active: true,
            registered_at: now,
        };
        state.validators.insert(caller.to_string(), validator.clone());
        drop(state);

        log::info!(
            "Validator {} registered: total {} / available {}",
            caller,
            total_stake,
            available_stake
        );
        self.events.emit(ProtocolEvent::ValidatorRegistered {
            validator: caller.to_string(),
            total_stake,
            available_stake,
        });
        Ok(validator)
    }

    // ─── Subnets ───────────────────────────────────────────────────

    pub fn register_subnet(
        &self,
        caller: &str,
        id: SubnetId,
        kind: &str,
        adapter: &str,
        required_stake: u64,
        now: u64,
    ) -> Result<Subnet> {
        let mut state = self.state.write();
        if state.subnets.contains_key(&id) {
            return Err(ProtocolError::AlreadyExists(format!(
                "subnet {} already registered",
                hex::encode(id)
            )));
        }
        let subnet = Subnet {
            id,
            kind: kind.to_string(),
            owner: caller.to_string(),
            adapter: adapter.to_string(),
            required_stake,
            vm_type: VmType::from_kind(kind),
            active: true,
            registered_at: now,
        };
        state.subnets.insert(id, subnet.clone());
        drop(state);

        log::info!(
            "Subnet {} registered: kind {}, required stake {}",
            hex::encode(id),
            kind,
            required_stake
        );
        self.events.emit(ProtocolEvent::SubnetRegistered {
            subnet_id: id,
            kind: kind.to_string(),
            owner: caller.to_string(),
        });
        Ok(subnet)
    }

    // ─── Leases ────────────────────────────────────────────────────

    /// Create a lease in Created state, reserving `amount` from the
    /// validator's available stake. Returns the deterministic lease id.
    pub fn create_lease(
        &self,
        caller: &str,
        validator_id: &str,
        subnet_id: SubnetId,
        amount: u64,
        duration_secs: u64,
        now: u64,
    ) -> Result<LeaseId> {
        let mut state = self.state.write();

        let authorized = caller == validator_id || state.fee_market.as_deref() == Some(caller);
        if !authorized {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} may not commit stake for validator {}",
                caller, validator_id
            )));
        }

        let subnet = state
            .subnets
            .get(&subnet_id)
            .cloned()
            .ok_or_else(|| ProtocolError::NotFound(format!("subnet {}", hex::encode(subnet_id))))?;
        if !subnet.active {
            return Err(ProtocolError::InvalidState(format!(
                "subnet {} is not active",
                hex::encode(subnet_id)
            )));
        }

        let validator = state
            .validators
            .get(validator_id)
            .cloned()
            .ok_or_else(|| ProtocolError::NotFound(format!("validator {}", validator_id)))?;
        if !validator.active {
            return Err(ProtocolError::InvalidState(format!(
                "validator {} is not active",
                validator_id
            )));
        }
        if amount == 0 {
            return Err(ProtocolError::InvalidParameters(
                "lease amount must be positive".into(),
            ));
        }
        if !validator.supports(&subnet.kind) {
            return Err(ProtocolError::InvalidParameters(format!(
                "validator {} does not support subnet kind {}",
                validator_id, subnet.kind
            )));
        }
        if duration_secs < validator.min_lease_duration
            || duration_secs > validator.max_lease_duration
        {
            return Err(ProtocolError::DurationOutOfRange {
                min: validator.min_lease_duration,
                max: validator.max_lease_duration,
                actual: duration_secs,
            });
        }
        if amount < subnet.required_stake {
            return Err(ProtocolError::InsufficientStake {
                required: subnet.required_stake,
                available: amount,
            });
        }
        if amount > validator.available_stake {
            return Err(ProtocolError::InsufficientAvailableStake {
                requested: amount,
                available: validator.available_stake,
            });
        }

        let nonce = state.lease_nonce;
        let id = derive_id(&[
            b"lease",
            validator_id.as_bytes(),
            &subnet_id,
            &amount.to_be_bytes(),
            &now.to_be_bytes(),
            &nonce.to_be_bytes(),
        ]);
        let lease = Lease {
            id,
            validator: validator_id.to_string(),
            subnet_id,
            amount,
            duration_secs,
            start_time: now,
            status: LeaseStatus::Created,
        };

        let holder = state
            .validators
            .get_mut(validator_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("validator {}", validator_id)))?;
        holder.available_stake = holder.available_stake.saturating_sub(amount);
        state.lease_nonce += 1;
        state.leases.insert(id, lease);
        state
            .validator_leases
            .entry(validator_id.to_string())
            .or_default()
            .push(id);
        drop(state);

        log::info!(
            "Lease {} created: validator {} -> subnet {} ({} units for {}s)",
            hex::encode(id),
            validator_id,
            hex::encode(subnet_id),
            amount,
            duration_secs
        );
        self.events.emit(ProtocolEvent::LeaseCreated {
            lease_id: id,
            validator: validator_id.to_string(),
            subnet_id,
            amount,
            duration_secs,
        });
        Ok(id)
    }

    /// Transition a Created lease to Active. Only the lease's validator
    /// may activate it.
    pub fn activate_lease(&self, caller: &str, lease_id: LeaseId) -> Result<()> {
        let mut state = self.state.write();
        let lease = state
            .leases
            .get_mut(&lease_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("lease {}", hex::encode(lease_id))))?;
        if caller != lease.validator {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} is not the lease validator",
                caller
            )));
        }
        if lease.status != LeaseStatus::Created {
            return Err(ProtocolError::InvalidState(format!(
                "lease {} is {:?}, expected Created",
                hex::encode(lease_id),
                lease.status
            )));
        }
        lease.status = LeaseStatus::Active;
        drop(state);

        log::info!("Lease {} activated", hex::encode(lease_id));
        self.events.emit(ProtocolEvent::LeaseActivated { lease_id });
        Ok(())
    }

    /// Transition a Created or Active lease to Expired once its duration
    /// has elapsed, restoring the reserved stake. Permissionless.
    pub fn expire_lease(&self, caller: &str, lease_id: LeaseId, now: u64) -> Result<()> {
        let mut state = self.state.write();
        let inner = &mut *state;
        let lease = inner
            .leases
            .get_mut(&lease_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("lease {}", hex::encode(lease_id))))?;
        if lease.status.is_terminal() {
            return Err(ProtocolError::InvalidState(format!(
                "lease {} is already {:?}",
                hex::encode(lease_id),
                lease.status
            )));
        }
        if !lease.is_elapsed(now) {
            let ends_at = lease.start_time.saturating_add(lease.duration_secs);
            return Err(ProtocolError::InvalidState(format!(
                "lease {} runs until {} (now {})",
                hex::encode(lease_id),
                ends_at,
                now
            )));
        }
        let validator = inner
            .validators
            .get_mut(&lease.validator)
            .ok_or_else(|| ProtocolError::NotFound(format!("validator {}", lease.validator)))?;
        validator.available_stake = validator.available_stake.saturating_add(lease.amount);
        lease.status = LeaseStatus::Expired;
        let validator_addr = lease.validator.clone();
        let restored = lease.amount;
        drop(state);

        log::info!(
            "Lease {} expired by {}: {} units restored to {}",
            hex::encode(lease_id),
            caller,
            restored,
            validator_addr
        );
        self.events.emit(ProtocolEvent::LeaseExpired {
            lease_id,
            validator: validator_addr,
            restored_stake: restored,
        });
        Ok(())
    }

    /// Slash transition, reserved for the configured ACCS principal.
    /// Forfeits the leased stake: available stake is NOT restored.
    pub fn slash_lease(&self, caller: &str, lease_id: LeaseId) -> Result<()> {
        let mut state = self.state.write();
        if state.accs.as_deref() != Some(caller) {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} is not the configured ACCS principal",
                caller
            )));
        }
        let lease = state
            .leases
            .get_mut(&lease_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("lease {}", hex::encode(lease_id))))?;
        if lease.status.is_terminal() {
            return Err(ProtocolError::InvalidState(format!(
                "lease {} is already {:?}",
                hex::encode(lease_id),
                lease.status
            )));
        }
        lease.status = LeaseStatus::Slashed;
        let validator = lease.validator.clone();
        let amount = lease.amount;
        drop(state);

        log::warn!(
            "Lease {} slashed: {} units forfeited by {}",
            hex::encode(lease_id),
            amount,
            validator
        );
        self.events.emit(ProtocolEvent::LeaseSlashed {
            lease_id,
            validator,
            forfeited_stake: amount,
        });
        Ok(())
    }

    // ─── Reads ─────────────────────────────────────────────────────

    pub fn get_validator(&self, address: &str) -> Option<Validator> {
        self.state.read().validators.get(address).cloned()
    }

    pub fn get_subnet(&self, id: SubnetId) -> Option<Subnet> {
        self.state.read().subnets.get(&id).cloned()
    }

    pub fn get_lease(&self, id: LeaseId) -> Option<Lease> {
        self.state.read().leases.get(&id).cloned()
    }

    pub fn get_validator_leases(&self, address: &str) -> Vec<LeaseId> {
        self.state
            .read()
            .validator_leases
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_validators(&self) -> usize {
        self.state.read().validators.len()
    }

    pub fn total_subnets(&self) -> usize {
        self.state.read().subnets.len()
    }

    pub fn total_leases(&self) -> usize {
        self.state.read().leases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subnet_id;

    const TOKEN: u64 = 100_000_000;
    const DAY: u64 = 86_400;

    fn setup() -> Registry {
        Registry::new(
            "governance",
            ProtocolConfig::default(),
            Arc::new(EventLog::new()),
        )
    }

    fn register_default_validator(registry: &Registry) {
        registry
            .register_validator(
                "validator1",
                10_000 * TOKEN,
                5_000 * TOKEN,
                vec!["avalanche".into(), "cosmos".into()],
                DAY,
                365 * DAY,
                1_000,
            )
            .unwrap();
    }

    fn register_default_subnet(registry: &Registry) -> SubnetId {
        let id = subnet_id("test-subnet-1");
        registry
            .register_subnet("subnet-owner", id, "avalanche", "adapter1", 1_000 * TOKEN, 1_000)
            .unwrap();
        id
    }

    #[test]
    fn test_register_validator() {
        let registry = setup();
        register_default_validator(&registry);

        let v = registry.get_validator("validator1").unwrap();
        assert_eq!(v.total_stake, 10_000 * TOKEN);
        assert_eq!(v.available_stake, 5_000 * TOKEN);
        assert!(v.active);
        assert!(v.supports("avalanche"));
        assert!(!v.supports("substrate"));
        assert_eq!(registry.total_validators(), 1);
    }

    #[test]
    fn test_register_validator_stake_too_low() {
        let registry = setup();
        let err = registry
            .register_validator("validator1", 500 * TOKEN, 100 * TOKEN, vec![], DAY, 365 * DAY, 0)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InsufficientStake { .. }));
    }

    #[test]
    fn test_register_validator_available_exceeds_total() {
        let registry = setup();
        let err = registry
            .register_validator(
                "validator1",
                2_000 * TOKEN,
                3_000 * TOKEN,
                vec![],
                DAY,
                365 * DAY,
                0,
            )
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidRange(_)));
    }

    #[test]
    fn test_duplicate_validator_rejected() {
        let registry = setup();
        register_default_validator(&registry);
        let err = registry
            .register_validator(
                "validator1",
                10_000 * TOKEN,
                5_000 * TOKEN,
                vec![],
                DAY,
                365 * DAY,
                2_000,
            )
            .unwrap_err();
        assert!(matches!(err, ProtocolError::AlreadyExists(_)));
    }

    #[test]
    fn test_duplicate_subnet_rejected() {
        let registry = setup();
        let id = register_default_subnet(&registry);
        let err = registry
            .register_subnet("other-owner", id, "cosmos", "adapter2", TOKEN, 2_000)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::AlreadyExists(_)));
        // The original registration is untouched.
        assert_eq!(registry.get_subnet(id).unwrap().kind, "avalanche");
    }

    #[test]
    fn test_create_lease_reserves_stake() {
        let registry = setup();
        register_default_validator(&registry);
        let subnet = register_default_subnet(&registry);

        let lease_id = registry
            .create_lease("validator1", "validator1", subnet, 2_000 * TOKEN, 30 * DAY, 2_000)
            .unwrap();

        let v = registry.get_validator("validator1").unwrap();
        assert_eq!(v.available_stake, 3_000 * TOKEN);
        assert!(v.available_stake <= v.total_stake);

        let lease = registry.get_lease(lease_id).unwrap();
        assert_eq!(lease.status, LeaseStatus::Created);
        assert_eq!(lease.amount, 2_000 * TOKEN);
        assert_eq!(lease.start_time, 2_000);
        assert_eq!(registry.get_validator_leases("validator1"), vec![lease_id]);
    }

    #[test]
    fn test_create_lease_insufficient_available() {
        let registry = setup();
        register_default_validator(&registry);
        let subnet = register_default_subnet(&registry);

        let err = registry
            .create_lease("validator1", "validator1", subnet, 6_000 * TOKEN, 30 * DAY, 2_000)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InsufficientAvailableStake { .. }
        ));
        // No reservation happened.
        let v = registry.get_validator("validator1").unwrap();
        assert_eq!(v.available_stake, 5_000 * TOKEN);
    }

    #[test]
    fn test_create_lease_duration_outside_validator_bounds() {
        let registry = setup();
        register_default_validator(&registry);
        let subnet = register_default_subnet(&registry);

        let err = registry
            .create_lease("validator1", "validator1", subnet, 2_000 * TOKEN, 400 * DAY, 2_000)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::DurationOutOfRange { .. }));
    }

    #[test]
    fn test_create_lease_unsupported_kind() {
        let registry = setup();
        register_default_validator(&registry);
        let id = subnet_id("substrate-net");
        registry
            .register_subnet("subnet-owner", id, "substrate", "adapter2", TOKEN, 1_000)
            .unwrap();

        let err = registry
            .create_lease("validator1", "validator1", id, 2_000 * TOKEN, 30 * DAY, 2_000)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidParameters(_)));
    }

    #[test]
    fn test_create_lease_unauthorized_caller() {
        let registry = setup();
        register_default_validator(&registry);
        let subnet = register_default_subnet(&registry);

        let err = registry
            .create_lease("stranger", "validator1", subnet, 2_000 * TOKEN, 30 * DAY, 2_000)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Unauthorized(_)));
    }

    #[test]
    fn test_fee_market_principal_may_create_lease() {
        let registry = setup();
        register_default_validator(&registry);
        let subnet = register_default_subnet(&registry);

        registry.set_fee_market("governance", "fee-market").unwrap();
        let lease_id = registry
            .create_lease("fee-market", "validator1", subnet, 2_000 * TOKEN, 30 * DAY, 2_000)
            .unwrap();
        assert_eq!(
            registry.get_lease(lease_id).unwrap().validator,
            "validator1"
        );
    }

    #[test]
    fn test_activate_then_expire_restores_stake() {
        let registry = setup();
        register_default_validator(&registry);
        let subnet = register_default_subnet(&registry);

        let lease_id = registry
            .create_lease("validator1", "validator1", subnet, 2_000 * TOKEN, 30 * DAY, 2_000)
            .unwrap();
        registry.activate_lease("validator1", lease_id).unwrap();
        assert_eq!(
            registry.get_lease(lease_id).unwrap().status,
            LeaseStatus::Active
        );

        registry
            .expire_lease("anyone", lease_id, 2_000 + 30 * DAY)
            .unwrap();
        let v = registry.get_validator("validator1").unwrap();
        assert_eq!(v.available_stake, 5_000 * TOKEN);
        assert_eq!(
            registry.get_lease(lease_id).unwrap().status,
            LeaseStatus::Expired
        );
    }

    #[test]
    fn test_expire_before_duration_elapsed_rejected() {
        let registry = setup();
        register_default_validator(&registry);
        let subnet = register_default_subnet(&registry);

        let lease_id = registry
            .create_lease("validator1", "validator1", subnet, 2_000 * TOKEN, 30 * DAY, 2_000)
            .unwrap();
        let err = registry
            .expire_lease("anyone", lease_id, 2_000 + DAY)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidState(_)));
    }

    #[test]
    fn test_activate_requires_lease_validator() {
        let registry = setup();
        register_default_validator(&registry);
        let subnet = register_default_subnet(&registry);

        let lease_id = registry
            .create_lease("validator1", "validator1", subnet, 2_000 * TOKEN, 30 * DAY, 2_000)
            .unwrap();
        let err = registry.activate_lease("stranger", lease_id).unwrap_err();
        assert!(matches!(err, ProtocolError::Unauthorized(_)));
    }

    #[test]
    fn test_slash_requires_accs_principal() {
        let registry = setup();
        register_default_validator(&registry);
        let subnet = register_default_subnet(&registry);

        let lease_id = registry
            .create_lease("validator1", "validator1", subnet, 2_000 * TOKEN, 30 * DAY, 2_000)
            .unwrap();
        let err = registry.slash_lease("validator1", lease_id).unwrap_err();
        assert!(matches!(err, ProtocolError::Unauthorized(_)));
    }

    #[test]
    fn test_slash_forfeits_stake() {
        let registry = setup();
        register_default_validator(&registry);
        let subnet = register_default_subnet(&registry);

        let lease_id = registry
            .create_lease("validator1", "validator1", subnet, 2_000 * TOKEN, 30 * DAY, 2_000)
            .unwrap();
        registry.activate_lease("validator1", lease_id).unwrap();
        registry.set_accs("governance", "accs").unwrap();
        registry.slash_lease("accs", lease_id).unwrap();

        // Stake stays forfeited.
        let v = registry.get_validator("validator1").unwrap();
        assert_eq!(v.available_stake, 3_000 * TOKEN);
        assert_eq!(
            registry.get_lease(lease_id).unwrap().status,
            LeaseStatus::Slashed
        );

        // Terminal state admits no further transition.
        let err = registry
            .expire_lease("anyone", lease_id, 2_000 + 365 * DAY)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidState(_)));
        let err = registry.activate_lease("validator1", lease_id).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidState(_)));
    }

    #[test]
    fn test_wiring_requires_governance() {
        let registry = setup();
        assert!(registry.set_fee_market("stranger", "fee-market").is_err());
        assert!(registry.set_accs("stranger", "accs").is_err());
        assert!(registry.set_fee_market("governance", "fee-market").is_ok());
        assert!(registry.set_accs("governance", "accs").is_ok());
    }
}
