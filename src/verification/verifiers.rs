// src/verification/verifiers.rs
//! Pluggable proof verification.
//!
//! Proof bytes are opaque to the rest of the protocol; a verifier decides
//! what they mean for its VM family. The standard verifier decodes a
//! JSON [`Claim`] and checks it against the accepted light-client head:
//! - StateInclusion: a Merkle proof anchored in the accepted state root
//! - DoubleSign: two distinct payloads signed by the same Ed25519 key
//! - ConflictingState: a valid Merkle proof anchored in a root that
//!   contradicts the accepted one at the current head

use anyhow::{bail, Context, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::merkle::MerkleProof;
use crate::verification::light_client::LightClientHeader;

/// Capability for verifying opaque proof bytes against an accepted head.
///
/// `Ok(verdict)` is the claim's truth value; `Err` means the verifier
/// itself could not run and is treated as a rejection by the caller.
pub trait ProofVerifier: Send + Sync {
    fn name(&self) -> &str;
    fn verify(&self, header: &LightClientHeader, proof: &[u8]) -> Result<bool>;
}

/// Structured claims carried inside proof bytes, JSON-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Claim {
    /// A state element claimed to be part of the accepted state root
    StateInclusion { proof: MerkleProof },
    /// Two distinct payloads signed by the same key
    DoubleSign {
        /// Hex-encoded Ed25519 verifying key
        public_key: String,
        first_payload: Vec<u8>,
        /// Hex-encoded signature over `first_payload`
        first_signature: String,
        second_payload: Vec<u8>,
        second_signature: String,
    },
    /// A state element proven under a root that contradicts the accepted
    /// head
    ConflictingState { proof: MerkleProof },
}

impl Claim {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Default verifier wired per (subnet, VM family) pair. VM-specific
/// verifiers implement [`ProofVerifier`] directly and replace it through
/// verifier registration.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardProofVerifier;

impl ProofVerifier for StandardProofVerifier {
    fn name(&self) -> &str {
        "standard"
    }

    fn verify(&self, header: &LightClientHeader, proof: &[u8]) -> Result<bool> {
        let claim: Claim =
            serde_json::from_slice(proof).context("claim payload did not decode")?;
        let verdict = match claim {
            Claim::StateInclusion { proof } => {
                proof.verify() && proof.root == header.state_root
            }
            Claim::DoubleSign {
                public_key,
                first_payload,
                first_signature,
                second_payload,
                second_signature,
            } => {
                if first_payload == second_payload {
                    false
                } else {
                    verify_detached_signature(&public_key, &first_payload, &first_signature)
                        .is_ok()
                        && verify_detached_signature(
                            &public_key,
                            &second_payload,
                            &second_signature,
                        )
                        .is_ok()
                }
            }
            Claim::ConflictingState { proof } => {
                proof.verify() && proof.root != header.state_root
            }
        };
        Ok(verdict)
    }
}

/// Verify a hex-encoded Ed25519 signature over `message`.
fn verify_detached_signature(
    pubkey_hex: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<()> {
    let pubkey_bytes = hex::decode(pubkey_hex)?;
    if pubkey_bytes.len() != 32 {
        bail!(
            "Invalid public key length: expected 32, got {}",
            pubkey_bytes.len()
        );
    }
    let mut pk_array = [0u8; 32];
    pk_array.copy_from_slice(&pubkey_bytes);
    let verifying_key = VerifyingKey::from_bytes(&pk_array)?;

    let sig_bytes = hex::decode(signature_hex)?;
    if sig_bytes.len() != 64 {
        bail!(
            "Invalid signature length: expected 64, got {}",
            sig_bytes.len()
        );
    }
    let mut sig_array = [0u8; 64];
    sig_array.copy_from_slice(&sig_bytes);
    let signature = Signature::from_bytes(&sig_array);

    verifying_key.verify(message, &signature)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::MerkleTree;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn header_with_root(state_root: [u8; 32]) -> LightClientHeader {
        LightClientHeader {
            subnet_id: [1u8; 32],
            block_hash: [2u8; 32],
            state_root,
            prev_block_hash: [3u8; 32],
            block_number: 100,
            timestamp: 1_000,
            validator_set_hash: [4u8; 32],
        }
    }

    fn sign_hex(key: &SigningKey, payload: &[u8]) -> String {
        hex::encode(key.sign(payload).to_bytes())
    }

    #[test]
    fn test_state_inclusion_claim() {
        let leaves: Vec<Vec<u8>> = (0u8..4).map(|i| vec![i; 8]).collect();
        let tree = MerkleTree::from_leaves(&leaves);
        let proof = tree.generate_proof(1).unwrap();
        let payload = Claim::StateInclusion { proof }.encode().unwrap();

        let verifier = StandardProofVerifier;
        assert!(verifier
            .verify(&header_with_root(tree.root()), &payload)
            .unwrap());
        // Same proof against a different accepted root fails.
        assert!(!verifier
            .verify(&header_with_root([9u8; 32]), &payload)
            .unwrap());
    }

    #[test]
    fn test_double_sign_claim() {
        let mut cng = OsRng;
        let key = SigningKey::generate(&mut cng);
        let public_key = hex::encode(key.verifying_key().to_bytes());

        let first: Vec<u8> = b"block 100 root aaaa".to_vec();
        let second: Vec<u8> = b"block 100 root bbbb".to_vec();
        let payload = Claim::DoubleSign {
            public_key,
            first_signature: sign_hex(&key, &first),
            second_signature: sign_hex(&key, &second),
            first_payload: first,
            second_payload: second,
        }
        .encode()
        .unwrap();

        let verifier = StandardProofVerifier;
        assert!(verifier
            .verify(&header_with_root([0u8; 32]), &payload)
            .unwrap());
    }

    #[test]
    fn test_double_sign_same_payload_rejected() {
        let mut cng = OsRng;
        let key = SigningKey::generate(&mut cng);
        let public_key = hex::encode(key.verifying_key().to_bytes());

        let payload_bytes: Vec<u8> = b"block 100 root aaaa".to_vec();
        let sig = sign_hex(&key, &payload_bytes);
        let payload = Claim::DoubleSign {
            public_key,
            first_signature: sig.clone(),
            second_signature: sig,
            first_payload: payload_bytes.clone(),
            second_payload: payload_bytes,
        }
        .encode()
        .unwrap();

        let verifier = StandardProofVerifier;
        assert!(!verifier
            .verify(&header_with_root([0u8; 32]), &payload)
            .unwrap());
    }

    #[test]
    fn test_double_sign_foreign_signature_rejected() {
        let mut cng = OsRng;
        let owner = SigningKey::generate(&mut cng);
        let attacker = SigningKey::generate(&mut cng);
        let public_key = hex::encode(owner.verifying_key().to_bytes());

        let first: Vec<u8> = b"block 100 root aaaa".to_vec();
        let second: Vec<u8> = b"block 100 root bbbb".to_vec();
        let payload = Claim::DoubleSign {
            public_key,
            first_signature: sign_hex(&owner, &first),
            second_signature: sign_hex(&attacker, &second),
            first_payload: first,
            second_payload: second,
        }
        .encode()
        .unwrap();

        let verifier = StandardProofVerifier;
        assert!(!verifier
            .verify(&header_with_root([0u8; 32]), &payload)
            .unwrap());
    }

    #[test]
    fn test_double_sign_malformed_key_rejected() {
        let mut cng = OsRng;
        let key = SigningKey::generate(&mut cng);
        let first: Vec<u8> = b"aaaa".to_vec();
        let second: Vec<u8> = b"bbbb".to_vec();
        let payload = Claim::DoubleSign {
            public_key: "not hex".into(),
            first_signature: sign_hex(&key, &first),
            second_signature: sign_hex(&key, &second),
            first_payload: first,
            second_payload: second,
        }
        .encode()
        .unwrap();

        let verifier = StandardProofVerifier;
        assert!(!verifier
            .verify(&header_with_root([0u8; 32]), &payload)
            .unwrap());
    }

    #[test]
    fn test_conflicting_state_claim() {
        let accepted: Vec<Vec<u8>> = (0u8..4).map(|i| vec![i; 8]).collect();
        let forked: Vec<Vec<u8>> = (10u8..14).map(|i| vec![i; 8]).collect();
        let accepted_tree = MerkleTree::from_leaves(&accepted);
        let forked_tree = MerkleTree::from_leaves(&forked);

        let verifier = StandardProofVerifier;
        let header = header_with_root(accepted_tree.root());

        // Proof under a contradicting root demonstrates malice.
        let proof = forked_tree.generate_proof(0).unwrap();
        let payload = Claim::ConflictingState { proof }.encode().unwrap();
        assert!(verifier.verify(&header, &payload).unwrap());

        // Proof under the accepted root does not.
        let proof = accepted_tree.generate_proof(0).unwrap();
        let payload = Claim::ConflictingState { proof }.encode().unwrap();
        assert!(!verifier.verify(&header, &payload).unwrap());

        // A broken proof under a foreign root proves nothing.
        let mut proof = forked_tree.generate_proof(0).unwrap();
        proof.leaf = b"tampered".to_vec();
        let payload = Claim::ConflictingState { proof }.encode().unwrap();
        assert!(!verifier.verify(&header, &payload).unwrap());
    }

    #[test]
    fn test_undecodable_payload_is_error() {
        let verifier = StandardProofVerifier;
        assert!(verifier
            .verify(&header_with_root([0u8; 32]), b"not json")
            .is_err());
    }
}
