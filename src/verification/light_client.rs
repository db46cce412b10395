// src/verification/light_client.rs
//! Per-subnet light-client head tracking and proof dispatch.
//!
//! Each subnet has a single header slot holding the latest accepted head.
//! A new header replaces it only when strictly newer: a higher block
//! number, or the same block number with a later timestamp. The slot is a
//! cursor, not a chain; previous-hash linkage is recorded but not
//! enforced. Proofs are opaque bytes dispatched to the verifier
//! registered for the (subnet, VM family) pair and checked against the
//! accepted head.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ProtocolError, Result};
use crate::events::{EventLog, ProtocolEvent};
use crate::verification::verifiers::ProofVerifier;
use crate::{Address, Hash32, SubnetId};

/// VM family a subnet's state proofs are expressed against. Derived from
/// the subnet's type tag at registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VmType {
    Evm,
    MoveVm,
    CosmosSdk,
    Substrate,
    Custom,
}

impl VmType {
    /// Map a subnet type tag to its VM family.
    pub fn from_kind(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "avalanche" | "evm" | "ethereum" | "polygon" => VmType::Evm,
            "cosmos" | "cosmos-sdk" => VmType::CosmosSdk,
            "substrate" | "polkadot" => VmType::Substrate,
            "move" | "aptos" | "sui" => VmType::MoveVm,
            _ => VmType::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VmType::Evm => "evm",
            VmType::MoveVm => "move",
            VmType::CosmosSdk => "cosmos-sdk",
            VmType::Substrate => "substrate",
            VmType::Custom => "custom",
        }
    }
}

impl fmt::Display for VmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest accepted light-client head for one subnet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LightClientHeader {
    pub subnet_id: SubnetId,
    pub block_hash: Hash32,
    pub state_root: Hash32,
    pub prev_block_hash: Hash32,
    pub block_number: u64,
    pub timestamp: u64,
    pub validator_set_hash: Hash32,
}

impl LightClientHeader {
    /// Strictly newer than `other`: higher block number, or the same
    /// block number with a later timestamp.
    pub fn is_newer_than(&self, other: &LightClientHeader) -> bool {
        self.block_number > other.block_number
            || (self.block_number == other.block_number && self.timestamp > other.timestamp)
    }
}

struct VerificationState {
    headers: HashMap<SubnetId, LightClientHeader>,
    verifiers: HashMap<(SubnetId, VmType), (Address, Arc<dyn ProofVerifier>)>,
}

/// Verifier registry and header store. Header updates and verifier
/// registration are governance operations; proof submission is open.
pub struct VerificationModule {
    governance: Address,
    state: RwLock<VerificationState>,
    events: Arc<EventLog>,
}

impl VerificationModule {
    pub fn new(governance: &str, events: Arc<EventLog>) -> Self {
        Self {
            governance: governance.to_string(),
            state: RwLock::new(VerificationState {
                headers: HashMap::new(),
                verifiers: HashMap::new(),
            }),
            events,
        }
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

    /// Register (or replace) the verifier for a (subnet, VM family) pair.
    /// `identity` is the verifier's principal address; `verifier` is the
    /// capability invoked for proofs under that pair.
    pub fn register_verifier(
        &self,
        caller: &str,
        subnet_id: SubnetId,
        vm_type: VmType,
        identity: &str,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Result<()> {
        self.require_governance(caller)?;
        self.state
            .write()
            .verifiers
            .insert((subnet_id, vm_type), (identity.to_string(), verifier));

        log::info!(
            "Verifier {} registered for subnet {} ({})",
            identity,
            hex::encode(subnet_id),
            vm_type
        );
        self.events.emit(ProtocolEvent::VerifierRegistered {
            subnet_id,
            vm_type,
            verifier: identity.to_string(),
        });
        Ok(())
    }

    /// Advance the accepted head for a subnet. The first header is always
    /// accepted; afterwards only strictly newer headers replace the slot.
    pub fn update_light_client_header(
        &self,
        caller: &str,
        header: LightClientHeader,
    ) -> Result<()> {
        self.require_governance(caller)?;
        let subnet_id = header.subnet_id;
        let block_number = header.block_number;
        let timestamp = header.timestamp;

        let mut state = self.state.write();
        if let Some(current) = state.headers.get(&subnet_id) {
            if !header.is_newer_than(current) {
                return Err(ProtocolError::HeaderNotNewer);
            }
        }
        state.headers.insert(subnet_id, header);
        drop(state);

        log::info!(
            "Header for subnet {} advanced to block {} (ts {})",
            hex::encode(subnet_id),
            block_number,
            timestamp
        );
        self.events.emit(ProtocolEvent::HeaderUpdated {
            subnet_id,
            block_number,
            timestamp,
        });
        Ok(())
    }

    pub fn get_light_client_header(&self, subnet_id: SubnetId) -> Option<LightClientHeader> {
        self.state.read().headers.get(&subnet_id).cloned()
    }

    /// Identity of the verifier registered for a (subnet, VM family) pair.
    pub fn get_verifier(&self, subnet_id: SubnetId, vm_type: VmType) -> Option<Address> {
        self.state
            .read()
            .verifiers
            .get(&(subnet_id, vm_type))
            .map(|(identity, _)| identity.clone())
    }

    fn lookup(
        &self,
        subnet_id: SubnetId,
        vm_type: VmType,
    ) -> Result<(LightClientHeader, Arc<dyn ProofVerifier>)> {
        let state = self.state.read();
        let header = state.headers.get(&subnet_id).cloned().ok_or_else(|| {
            ProtocolError::NotFound(format!(
                "light-client header for subnet {}",
                hex::encode(subnet_id)
            ))
        })?;
        let verifier = state
            .verifiers
            .get(&(subnet_id, vm_type))
            .map(|(_, capability)| capability.clone())
            .ok_or_else(|| ProtocolError::NoVerifierRegistered {
                subnet: hex::encode(subnet_id),
                vm: vm_type.to_string(),
            })?;
        Ok((header, verifier))
    }

    fn run_verifier(
        verifier: &dyn ProofVerifier,
        header: &LightClientHeader,
        proof: &[u8],
    ) -> bool {
        match verifier.verify(header, proof) {
            Ok(verdict) => verdict,
            Err(err) => {
                log::warn!(
                    "Verifier {} failed, treating as rejection: {}",
                    verifier.name(),
                    err
                );
                false
            }
        }
    }

    /// Check opaque proof bytes against the accepted head without emitting
    /// an event. Fails if no header or no verifier is registered.
    pub fn check_proof(&self, subnet_id: SubnetId, vm_type: VmType, proof: &[u8]) -> Result<bool> {
        let (header, verifier) = self.lookup(subnet_id, vm_type)?;
        Ok(Self::run_verifier(&*verifier, &header, proof))
    }

    /// Submit a state proof against a subnet's accepted head. Returns the
    /// verdict; a rejected proof is a normal outcome, not an error.
    pub fn submit_state_proof(
        &self,
        caller: &str,
        subnet_id: SubnetId,
        vm_type: VmType,
        proof: &[u8],
    ) -> Result<bool> {
        let (header, verifier) = self.lookup(subnet_id, vm_type)?;
        let accepted = Self::run_verifier(&*verifier, &header, proof);

        log::info!(
            "State proof for subnet {} ({}) from {}: {}",
            hex::encode(subnet_id),
            vm_type,
            caller,
            if accepted { "accepted" } else { "rejected" }
        );
        self.events.emit(ProtocolEvent::StateProofSubmitted {
            subnet_id,
            vm_type,
            block_number: header.block_number,
            accepted,
        });
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::MerkleTree;
    use crate::verification::verifiers::{Claim, StandardProofVerifier};
    use crate::{derive_id, subnet_id};

    fn setup() -> (VerificationModule, SubnetId) {
        let module = VerificationModule::new("governance", Arc::new(EventLog::new()));
        (module, subnet_id("test-subnet-1"))
    }

    fn header(
        subnet: SubnetId,
        block_number: u64,
        state_root: Hash32,
        timestamp: u64,
    ) -> LightClientHeader {
        LightClientHeader {
            subnet_id: subnet,
            block_hash: derive_id(&[b"block", &block_number.to_be_bytes()]),
            state_root,
            prev_block_hash: derive_id(&[b"block", &block_number.saturating_sub(1).to_be_bytes()]),
            block_number,
            timestamp,
            validator_set_hash: derive_id(&[b"valset"]),
        }
    }

    #[test]
    fn test_first_header_always_accepted() {
        let (module, subnet) = setup();
        module
            .update_light_client_header("governance", header(subnet, 100, [7u8; 32], 1_000))
            .unwrap();
        let stored = module.get_light_client_header(subnet).unwrap();
        assert_eq!(stored.block_number, 100);
        assert_eq!(stored.state_root, [7u8; 32]);
        assert_eq!(stored.block_hash, derive_id(&[b"block", &100u64.to_be_bytes()]));
    }

    #[test]
    fn test_stale_header_rejected() {
        let (module, subnet) = setup();
        module
            .update_light_client_header("governance", header(subnet, 100, [7u8; 32], 1_000))
            .unwrap();

        let err = module
            .update_light_client_header("governance", header(subnet, 99, [8u8; 32], 2_000))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::HeaderNotNewer));

        // Same block number, same timestamp: still not newer.
        let err = module
            .update_light_client_header("governance", header(subnet, 100, [8u8; 32], 1_000))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::HeaderNotNewer));

        // Slot is untouched after rejections.
        assert_eq!(
            module.get_light_client_header(subnet).unwrap().state_root,
            [7u8; 32]
        );
    }

    #[test]
    fn test_same_block_later_timestamp_accepted() {
        let (module, subnet) = setup();
        module
            .update_light_client_header("governance", header(subnet, 100, [7u8; 32], 1_000))
            .unwrap();
        module
            .update_light_client_header("governance", header(subnet, 100, [8u8; 32], 1_500))
            .unwrap();
        let stored = module.get_light_client_header(subnet).unwrap();
        assert_eq!(stored.state_root, [8u8; 32]);
        assert_eq!(stored.timestamp, 1_500);
    }

    #[test]
    fn test_header_update_requires_governance() {
        let (module, subnet) = setup();
        let err = module
            .update_light_client_header("stranger", header(subnet, 100, [7u8; 32], 1_000))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Unauthorized(_)));
    }

    #[test]
    fn test_proof_without_verifier_rejected() {
        let (module, subnet) = setup();
        module
            .update_light_client_header("governance", header(subnet, 100, [7u8; 32], 1_000))
            .unwrap();
        assert!(module.get_verifier(subnet, VmType::Evm).is_none());
        let err = module
            .submit_state_proof("anyone", subnet, VmType::Evm, b"proof")
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NoVerifierRegistered { .. }));

        module
            .register_verifier(
                "governance",
                subnet,
                VmType::Evm,
                "verifier-1",
                Arc::new(StandardProofVerifier),
            )
            .unwrap();
        assert_eq!(
            module.get_verifier(subnet, VmType::Evm).as_deref(),
            Some("verifier-1")
        );
        // Registered for EVM only; other families stay uncovered.
        assert!(module.get_verifier(subnet, VmType::CosmosSdk).is_none());
    }

    #[test]
    fn test_proof_without_header_rejected() {
        let (module, subnet) = setup();
        module
            .register_verifier(
                "governance",
                subnet,
                VmType::Evm,
                "verifier-1",
                Arc::new(StandardProofVerifier),
            )
            .unwrap();
        let err = module
            .submit_state_proof("anyone", subnet, VmType::Evm, b"proof")
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NotFound(_)));
    }

    #[test]
    fn test_state_proof_against_accepted_root() {
        let (module, subnet) = setup();
        let leaves: Vec<Vec<u8>> = (0u8..4).map(|i| vec![i; 8]).collect();
        let tree = MerkleTree::from_leaves(&leaves);
        module
            .update_light_client_header("governance", header(subnet, 100, tree.root(), 1_000))
            .unwrap();
        module
            .register_verifier(
                "governance",
                subnet,
                VmType::Evm,
                "verifier-1",
                Arc::new(StandardProofVerifier),
            )
            .unwrap();

        let proof = tree.generate_proof(2).unwrap();
        let payload = Claim::StateInclusion { proof }.encode().unwrap();
        assert!(module
            .submit_state_proof("anyone", subnet, VmType::Evm, &payload)
            .unwrap());

        // A tampered proof is a rejection, not an error.
        let mut bad = tree.generate_proof(2).unwrap();
        bad.root[0] ^= 0xFF;
        let payload = Claim::StateInclusion { proof: bad }.encode().unwrap();
        assert!(!module
            .submit_state_proof("anyone", subnet, VmType::Evm, &payload)
            .unwrap());
    }

    #[test]
    fn test_undecodable_proof_is_rejection() {
        let (module, subnet) = setup();
        module
            .update_light_client_header("governance", header(subnet, 100, [7u8; 32], 1_000))
            .unwrap();
        module
            .register_verifier(
                "governance",
                subnet,
                VmType::Evm,
                "verifier-1",
                Arc::new(StandardProofVerifier),
            )
            .unwrap();
        assert!(!module
            .submit_state_proof("anyone", subnet, VmType::Evm, b"not json")
            .unwrap());
    }

    #[test]
    fn test_verifier_replacement_overwrites() {
        let (module, subnet) = setup();
        module
            .register_verifier(
                "governance",
                subnet,
                VmType::Evm,
                "verifier-1",
                Arc::new(StandardProofVerifier),
            )
            .unwrap();
        module
            .register_verifier(
                "governance",
                subnet,
                VmType::Evm,
                "verifier-2",
                Arc::new(StandardProofVerifier),
            )
            .unwrap();
        assert_eq!(
            module.get_verifier(subnet, VmType::Evm).as_deref(),
            Some("verifier-2")
        );

        let err = module
            .register_verifier(
                "stranger",
                subnet,
                VmType::Evm,
                "verifier-3",
                Arc::new(StandardProofVerifier),
            )
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Unauthorized(_)));
    }

    #[test]
    fn test_vm_type_from_kind() {
        assert_eq!(VmType::from_kind("avalanche"), VmType::Evm);
        assert_eq!(VmType::from_kind("Ethereum"), VmType::Evm);
        assert_eq!(VmType::from_kind("cosmos"), VmType::CosmosSdk);
        assert_eq!(VmType::from_kind("polkadot"), VmType::Substrate);
        assert_eq!(VmType::from_kind("aptos"), VmType::MoveVm);
        assert_eq!(VmType::from_kind("unknown-l1"), VmType::Custom);
    }
}
