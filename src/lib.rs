// src/lib.rs
//! Stake-leasing protocol core: validators lease stake to subnets through
//! a fee market, backed by escrow, light-client verification, and
//! provable slashing.

pub mod error;
pub mod events;
pub mod fee_market;
pub mod merkle;
pub mod registry;
pub mod rewards;
pub mod slashing;
pub mod verification;
pub mod violations;

use sha2::{Digest, Sha256};

pub use error::{ProtocolError, Result};

/// Substrate-authenticated principal identifier
pub type Address = String;

/// 32-byte digest or identifier
pub type Hash32 = [u8; 32];

pub type SubnetId = Hash32;
pub type LeaseId = Hash32;
pub type BidId = Hash32;
pub type OfferId = Hash32;
pub type ProofId = Hash32;

/// Derive a deterministic object id by hashing the given field encodings
/// in order.
pub fn derive_id(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Canonical subnet id for a human-readable label.
pub fn subnet_id(label: &str) -> SubnetId {
    derive_id(&[b"subnet", label.as_bytes()])
}
