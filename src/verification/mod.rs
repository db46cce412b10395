// src/verification/mod.rs
pub mod light_client;
pub mod verifiers;

pub use light_client::{LightClientHeader, VerificationModule, VmType};
pub use verifiers::{Claim, ProofVerifier, StandardProofVerifier};
