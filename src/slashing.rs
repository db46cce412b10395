// src/slashing.rs
//! ACCS slashing coordinator.
//!
//! Holds escrowed stake for active leases and drives proof-of-malice
//! through verification to an atomic slash:
//! - lock_stake escrows exactly the leased stake for a lease
//! - submit_proof_of_malice queues a proof against a lease with escrow
//! - verify_proof dispatches the proof, consumes it, executes the
//!   registry slash, and seizes the escrow in one step
//!
//! A proof is one-time-use: once Verified or Rejected it cannot be
//! replayed. Module-level verification failures (no verifier, no header)
//! abort the call and leave the proof in Submitted.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ProtocolError, Result};
use crate::events::{EventLog, ProtocolEvent};
use crate::registry::{LeaseStatus, Registry};
use crate::verification::VerificationModule;
use crate::{derive_id, Address, Hash32, LeaseId, ProofId};

/// Category of provable validator malice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MaliceType {
    DoubleSign,
    InvalidStateTransition,
}

impl fmt::Display for MaliceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaliceType::DoubleSign => f.write_str("double-sign"),
            MaliceType::InvalidStateTransition => f.write_str("invalid-state-transition"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProofStatus {
    Submitted,
    Verified,
    Rejected,
}

/// A queued accusation against a lease. The signature payload carries the
/// claim for double-sign accusations, the state-proof payload for
/// invalid-state-transition ones; block hashes and merkle root are
/// reporter-supplied context. `consumed` is set once a slash has spent
/// the proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofOfMalice {
    pub id: ProofId,
    pub lease_id: LeaseId,
    pub reporter: Address,
    pub malice_type: MaliceType,
    pub block_hash: Hash32,
    pub prev_block_hash: Hash32,
    pub signature: Vec<u8>,
    pub state_proof: Vec<u8>,
    pub merkle_root: Hash32,
    pub status: ProofStatus,
    pub consumed: bool,
    pub submitted_at: u64,
}

impl ProofOfMalice {
    /// Payload holding the claim for this proof's malice type.
    pub fn claim_payload(&self) -> &[u8] {
        match self.malice_type {
            MaliceType::DoubleSign => &self.signature,
            MaliceType::InvalidStateTransition => &self.state_proof,
        }
    }
}

/// Escrow entry covering one lease. `seized` stays set after a slash;
/// `locked` clears only on release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedStake {
    pub lease_id: LeaseId,
    pub validator: Address,
    pub amount: u64,
    pub duration_secs: u64,
    pub locked_at: u64,
    pub locked: bool,
    pub seized: bool,
}

struct SlashState {
    escrows: HashMap<LeaseId, LockedStake>,
    proofs: HashMap<ProofId, ProofOfMalice>,
    /// Proof ids still awaiting a verdict, submission order
    pending: Vec<ProofId>,
    proof_nonce: u64,
}

/// Slashing coordinator. Calls into the registry under its own principal,
/// which governance wires in via `set_accs`.
pub struct SlashingCoordinator {
    identity: Address,
    governance: Address,
    registry: Arc<Registry>,
    verification: Arc<VerificationModule>,
    state: RwLock<SlashState>,
    events: Arc<EventLog>,
}

impl SlashingCoordinator {
    pub fn new(
        identity: &str,
        governance: &str,
        registry: Arc<Registry>,
        verification: Arc<VerificationModule>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            identity: identity.to_string(),
            governance: governance.to_string(),
            registry,
            verification,
            state: RwLock::new(SlashState {
                escrows: HashMap::new(),
                proofs: HashMap::new(),
                pending: Vec::new(),
                proof_nonce: 0,
            }),
            events,
        }
    }

    /// Principal under which slashes execute. Must be wired into the
    /// registry via `set_accs`.
    pub fn identity(&self) -> &str {
        &self.identity
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

    // ─── Escrow ────────────────────────────────────────────────────

    /// Escrow stake for a lease. The attached `value` must cover the
    /// declared `amount` exactly, and the amount must equal the leased
    /// stake. One escrow per lease.
    pub fn lock_stake(
        &self,
        caller: &str,
        lease_id: LeaseId,
        amount: u64,
        duration_secs: u64,
        value: u64,
        now: u64,
    ) -> Result<()> {
        let lease = self
            .registry
            .get_lease(lease_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("lease {}", hex::encode(lease_id))))?;
        if caller != lease.validator {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} is not the lease validator",
                caller
            )));
        }
        if lease.status.is_terminal() {
            return Err(ProtocolError::InvalidState(format!(
                "lease {} is {:?}",
                hex::encode(lease_id),
                lease.status
            )));
        }
        if value < amount {
            return Err(ProtocolError::InsufficientStake {
                required: amount,
                available: value,
            });
        }
        if value > amount {
            return Err(ProtocolError::InvalidParameters(format!(
                "attached value {} exceeds declared amount {}",
                value, amount
            )));
        }
        if amount != lease.amount {
            return Err(ProtocolError::InvalidParameters(format!(
                "escrow {} must equal the leased stake {}",
                amount, lease.amount
            )));
        }

        let mut state = self.state.write();
        if state.escrows.contains_key(&lease_id) {
            return Err(ProtocolError::AlreadyExists(format!(
                "escrow for lease {}",
                hex::encode(lease_id)
            )));
        }
        state.escrows.insert(
            lease_id,
            LockedStake {
                lease_id,
                validator: caller.to_string(),
                amount,
                duration_secs,
                locked_at: now,
                locked: true,
                seized: false,
            },
        );
        drop(state);

        log::info!(
            "Escrow locked for lease {}: {} units for {}s",
            hex::encode(lease_id),
            amount,
            duration_secs
        );
        self.events.emit(ProtocolEvent::StakeLocked {
            lease_id,
            validator: caller.to_string(),
            amount,
            duration_secs,
        });
        Ok(())
    }

    /// Release an escrow once its lease has expired. Returns the amount
    /// released. A seized escrow is never released.
    pub fn unlock_stake(&self, caller: &str, lease_id: LeaseId) -> Result<u64> {
        let lease = self
            .registry
            .get_lease(lease_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("lease {}", hex::encode(lease_id))))?;

        let mut state = self.state.write();
        let escrow = state.escrows.get_mut(&lease_id).ok_or_else(|| {
            ProtocolError::NotFound(format!("escrow for lease {}", hex::encode(lease_id)))
        })?;
        if caller != escrow.validator {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} did not lock this escrow",
                caller
            )));
        }
        if escrow.seized {
            return Err(ProtocolError::InvalidState(format!(
                "escrow for lease {} was seized",
                hex::encode(lease_id)
            )));
        }
        if !escrow.locked {
            return Err(ProtocolError::InvalidState(format!(
                "escrow for lease {} is already released",
                hex::encode(lease_id)
            )));
        }
        if lease.status != LeaseStatus::Expired {
            return Err(ProtocolError::InvalidState(format!(
                "lease {} must expire before escrow release, currently {:?}",
                hex::encode(lease_id),
                lease.status
            )));
        }
        escrow.locked = false;
        let amount = escrow.amount;
        let validator = escrow.validator.clone();
        drop(state);

        log::info!(
            "Escrow released for lease {}: {} units to {}",
            hex::encode(lease_id),
            amount,
            validator
        );
        self.events.emit(ProtocolEvent::StakeUnlocked {
            lease_id,
            validator,
            amount,
        });
        Ok(amount)
    }

    // ─── Proofs ────────────────────────────────────────────────────

    /// Queue a proof of malice against a lease. Open to any reporter;
    /// the lease must be live and carry a locked escrow.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_proof_of_malice(
        &self,
        caller: &str,
        lease_id: LeaseId,
        malice_type: MaliceType,
        block_hash: Hash32,
        prev_block_hash: Hash32,
        signature: Vec<u8>,
        state_proof: Vec<u8>,
        merkle_root: Hash32,
        now: u64,
    ) -> Result<ProofId> {
        let claim_empty = match malice_type {
            MaliceType::DoubleSign => signature.is_empty(),
            MaliceType::InvalidStateTransition => state_proof.is_empty(),
        };
        if claim_empty {
            return Err(ProtocolError::InvalidParameters(format!(
                "{} claim carries an empty payload",
                malice_type
            )));
        }
        let lease = self
            .registry
            .get_lease(lease_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("lease {}", hex::encode(lease_id))))?;
        if lease.status.is_terminal() {
            return Err(ProtocolError::InvalidState(format!(
                "lease {} is {:?}",
                hex::encode(lease_id),
                lease.status
            )));
        }

        let mut state = self.state.write();
        let has_escrow = state
            .escrows
            .get(&lease_id)
            .map(|e| e.locked && !e.seized)
            .unwrap_or(false);
        if !has_escrow {
            return Err(ProtocolError::InvalidState(format!(
                "lease {} has no locked escrow",
                hex::encode(lease_id)
            )));
        }

        let nonce = state.proof_nonce;
        state.proof_nonce += 1;
        let id = derive_id(&[
            b"proof",
            &lease_id,
            caller.as_bytes(),
            &now.to_be_bytes(),
            &nonce.to_be_bytes(),
        ]);
        state.proofs.insert(
            id,
            ProofOfMalice {
                id,
                lease_id,
                reporter: caller.to_string(),
                malice_type,
                block_hash,
                prev_block_hash,
                signature,
                state_proof,
                merkle_root,
                status: ProofStatus::Submitted,
                consumed: false,
                submitted_at: now,
            },
        );
        state.pending.push(id);
        drop(state);

        log::info!(
            "Proof {} submitted against lease {} by {} ({})",
            hex::encode(id),
            hex::encode(lease_id),
            caller,
            malice_type
        );
        self.events.emit(ProtocolEvent::ProofSubmitted {
            proof_id: id,
            lease_id,
            reporter: caller.to_string(),
            malice_type,
        });
        Ok(id)
    }

    /// Verify a submitted proof and act on the verdict in one step. On a
    /// true claim the lease is slashed and the escrow seized; on a false
    /// claim the rejection is recorded. Either way the proof is spent.
    /// Verification-module failures leave the proof in Submitted.
    pub fn verify_proof(&self, caller: &str, proof_id: ProofId) -> Result<ProofStatus> {
        self.require_governance(caller)?;

        let mut state = self.state.write();
        let proof = state
            .proofs
            .get(&proof_id)
            .cloned()
            .ok_or_else(|| ProtocolError::NotFound(format!("proof {}", hex::encode(proof_id))))?;
        match proof.status {
            ProofStatus::Submitted => {}
            ProofStatus::Verified => {
                return Err(ProtocolError::InvalidState(format!(
                    "proof {} was already consumed",
                    hex::encode(proof_id)
                )));
            }
            ProofStatus::Rejected => {
                return Err(ProtocolError::ProofRejected(format!(
                    "proof {} was already rejected",
                    hex::encode(proof_id)
                )));
            }
        }

        let lease = self
            .registry
            .get_lease(proof.lease_id)
            .ok_or_else(|| {
                ProtocolError::NotFound(format!("lease {}", hex::encode(proof.lease_id)))
            })?;
        if lease.status.is_terminal() {
            // Nothing left to slash; record the outcome and move on.
            Self::settle(&mut state, proof_id, ProofStatus::Rejected);
            drop(state);
            log::info!(
                "Proof {} rejected: lease {} is already {:?}",
                hex::encode(proof_id),
                hex::encode(proof.lease_id),
                lease.status
            );
            self.events.emit(ProtocolEvent::ProofRejected {
                proof_id,
                lease_id: proof.lease_id,
            });
            return Ok(ProofStatus::Rejected);
        }

        let subnet = self.registry.get_subnet(lease.subnet_id).ok_or_else(|| {
            ProtocolError::NotFound(format!("subnet {}", hex::encode(lease.subnet_id)))
        })?;
        let escrow_seized = state
            .escrows
            .get(&proof.lease_id)
            .map(|e| e.seized)
            .unwrap_or(false);
        if escrow_seized {
            return Err(ProtocolError::InvalidState(format!(
                "escrow for lease {} was already seized",
                hex::encode(proof.lease_id)
            )));
        }

        // May fail with NoVerifierRegistered or a missing header; the
        // proof stays in Submitted in that case.
        let verdict =
            self.verification
                .check_proof(subnet.id, subnet.vm_type, proof.claim_payload())?;

        if !verdict {
            Self::settle(&mut state, proof_id, ProofStatus::Rejected);
            drop(state);
            log::info!(
                "Proof {} rejected against lease {}",
                hex::encode(proof_id),
                hex::encode(proof.lease_id)
            );
            self.events.emit(ProtocolEvent::ProofRejected {
                proof_id,
                lease_id: proof.lease_id,
            });
            return Ok(ProofStatus::Rejected);
        }

        // Claim holds: slash through the registry, then consume the proof
        // and seize the escrow.
        self.registry.slash_lease(&self.identity, proof.lease_id)?;
        Self::settle(&mut state, proof_id, ProofStatus::Verified);
        let seized_amount = match state.escrows.get_mut(&proof.lease_id) {
            Some(escrow) => {
                escrow.seized = true;
                escrow.amount
            }
            None => 0,
        };
        drop(state);

        log::warn!(
            "Proof {} verified: lease {} slashed, {} units seized from {}",
            hex::encode(proof_id),
            hex::encode(proof.lease_id),
            seized_amount,
            lease.validator
        );
        self.events.emit(ProtocolEvent::ProofVerified {
            proof_id,
            lease_id: proof.lease_id,
        });
        self.events.emit(ProtocolEvent::SlashExecuted {
            proof_id,
            lease_id: proof.lease_id,
            validator: lease.validator.clone(),
            seized_amount,
        });
        Ok(ProofStatus::Verified)
    }

    fn settle(state: &mut SlashState, proof_id: ProofId, status: ProofStatus) {
        if let Some(p) = state.proofs.get_mut(&proof_id) {
            p.status = status;
            if status == ProofStatus::Verified {
                p.consumed = true;
            }
        }
        state.pending.retain(|id| *id != proof_id);
    }

    // ─── Reads ─────────────────────────────────────────────────────

    /// Escrowed amount and lock flag for a lease. A seized escrow keeps
    /// reporting as locked.
    pub fn get_staked_amount(&self, lease_id: LeaseId) -> Option<(u64, bool)> {
        self.state
            .read()
            .escrows
            .get(&lease_id)
            .map(|e| (e.amount, e.locked))
    }

    pub fn get_locked_stake(&self, lease_id: LeaseId) -> Option<LockedStake> {
        self.state.read().escrows.get(&lease_id).cloned()
    }

    pub fn get_proof(&self, proof_id: ProofId) -> Option<ProofOfMalice> {
        self.state.read().proofs.get(&proof_id).cloned()
    }

    /// Submitted proofs awaiting a verdict, in submission order.
    pub fn pending_proofs(&self) -> Vec<ProofOfMalice> {
        let state = self.state.read();
        state
            .pending
            .iter()
            .filter_map(|id| state.proofs.get(id).cloned())
            .collect()
    }
}
