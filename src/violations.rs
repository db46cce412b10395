// src/violations.rs
//! Per-lease violation records.
//!
//! Lighter-weight than proof-of-malice: governance records observed
//! misbehavior with a severity grade, building a history that informs
//! off-protocol penalties and future matching decisions. Records are
//! append-only and never trigger a slash by themselves.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ProtocolError, Result};
use crate::events::{EventLog, ProtocolEvent};
use crate::registry::Registry;
use crate::{Address, LeaseId};

/// Highest accepted severity grade.
pub const MAX_SEVERITY: u8 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ViolationKind {
    DoubleSign,
    Downtime,
    InvalidStateTransition,
    ProtocolViolation,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::DoubleSign => f.write_str("double-sign"),
            ViolationKind::Downtime => f.write_str("downtime"),
            ViolationKind::InvalidStateTransition => f.write_str("invalid-state-transition"),
            ViolationKind::ProtocolViolation => f.write_str("protocol-violation"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub lease_id: LeaseId,
    pub kind: ViolationKind,
    /// Severity grade, 0 (informational) to 100 (critical)
    pub severity: u8,
    /// Pointer to supporting material, e.g. an ipfs:// reference
    pub evidence: String,
    pub reported_at: u64,
}

/// Append-only violation history, keyed by lease.
pub struct ViolationTracker {
    governance: Address,
    registry: Arc<Registry>,
    records: RwLock<HashMap<LeaseId, Vec<ViolationRecord>>>,
    events: Arc<EventLog>,
}

impl ViolationTracker {
    pub fn new(governance: &str, registry: Arc<Registry>, events: Arc<EventLog>) -> Self {
        Self {
            governance: governance.to_string(),
            registry,
            records: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Record a violation against a lease. Governance only.
    pub fn report_violation(
        &self,
        caller: &str,
        lease_id: LeaseId,
        kind: ViolationKind,
        severity: u8,
        evidence: &str,
        now: u64,
    ) -> Result<()> {
        if caller != self.governance {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} is not governance",
                caller
            )));
        }
        if severity > MAX_SEVERITY {
            return Err(ProtocolError::InvalidParameters(format!(
                "severity {} exceeds {}",
                severity, MAX_SEVERITY
            )));
        }
        if self.registry.get_lease(lease_id).is_none() {
            return Err(ProtocolError::NotFound(format!(
                "lease {}",
                hex::encode(lease_id)
            )));
        }

        self.records.write().entry(lease_id).or_default().push(ViolationRecord {
            lease_id,
            kind,
            severity,
            evidence: evidence.to_string(),
            reported_at: now,
        });

        log::warn!(
            "Violation recorded against lease {}: {} severity {}",
            hex::encode(lease_id),
            kind,
            severity
        );
        self.events.emit(ProtocolEvent::ViolationReported {
            lease_id,
            kind,
            severity,
        });
        Ok(())
    }

    pub fn get_violations(&self, lease_id: LeaseId) -> Vec<ViolationRecord> {
        self.records
            .read()
            .get(&lease_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_violation_count(&self, lease_id: LeaseId) -> usize {
        self.records
            .read()
            .get(&lease_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn max_severity(&self, lease_id: LeaseId) -> Option<u8> {
        self.records
            .read()
            .get(&lease_id)
            .and_then(|records| records.iter().map(|r| r.severity).max())
    }

    pub fn total_violations(&self) -> usize {
        self.records.read().values().map(Vec::len).sum()
    }
}
