// src/events.rs
//! Protocol event log.
//!
//! Every mutating operation appends one structured event here for external
//! monitoring to consume. The log is append-only and sequence-numbered;
//! consumers either poll `events_since` with the last sequence number they
//! saw, or subscribe to the broadcast channel for push delivery. Emission
//! never blocks the emitting operation: a send with no receivers is a no-op
//! and lagging subscribers drop messages instead of back-pressuring the
//! protocol.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::slashing::MaliceType;
use crate::verification::VmType;
use crate::violations::ViolationKind;
use crate::{Address, Hash32};

/// Broadcast channel capacity. Slow subscribers past this lag are dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// One event per state change, carrying the identifiers and amounts
/// relevant to that change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ProtocolEvent {
    ValidatorRegistered {
        validator: Address,
        total_stake: u64,
        available_stake: u64,
    },
    SubnetRegistered {
        subnet_id: Hash32,
        kind: String,
        owner: Address,
    },
    LeaseCreated {
        lease_id: Hash32,
        validator: Address,
        subnet_id: Hash32,
        amount: u64,
        duration_secs: u64,
    },
    LeaseActivated {
        lease_id: Hash32,
    },
    LeaseExpired {
        lease_id: Hash32,
        validator: Address,
        restored_stake: u64,
    },
    LeaseSlashed {
        lease_id: Hash32,
        validator: Address,
        forfeited_stake: u64,
    },
    BidCreated {
        bid_id: Hash32,
        subnet_id: Hash32,
        required_stake: u64,
        price: u64,
    },
    OfferCreated {
        offer_id: Hash32,
        validator: Address,
        available_stake: u64,
        min_price: u64,
    },
    MatchExecuted {
        bid_id: Hash32,
        offer_id: Hash32,
        lease_id: Hash32,
        amount: u64,
    },
    BidCancelled {
        bid_id: Hash32,
    },
    OfferCancelled {
        offer_id: Hash32,
    },
    StakeLocked {
        lease_id: Hash32,
        validator: Address,
        amount: u64,
        duration_secs: u64,
    },
    StakeUnlocked {
        lease_id: Hash32,
        validator: Address,
        amount: u64,
    },
    ProofSubmitted {
        proof_id: Hash32,
        lease_id: Hash32,
        reporter: Address,
        malice_type: MaliceType,
    },
    ProofVerified {
        proof_id: Hash32,
        lease_id: Hash32,
    },
    ProofRejected {
        proof_id: Hash32,
        lease_id: Hash32,
    },
    SlashExecuted {
        proof_id: Hash32,
        lease_id: Hash32,
        validator: Address,
        seized_amount: u64,
    },
    VerifierRegistered {
        subnet_id: Hash32,
        vm_type: VmType,
        verifier: Address,
    },
    HeaderUpdated {
        subnet_id: Hash32,
        block_number: u64,
        timestamp: u64,
    },
    StateProofSubmitted {
        subnet_id: Hash32,
        vm_type: VmType,
        block_number: u64,
        accepted: bool,
    },
    ViolationReported {
        lease_id: Hash32,
        kind: ViolationKind,
        severity: u8,
    },
    RewardRateSet {
        subnet_id: Hash32,
        rate: u64,
    },
    RewardsAccumulated {
        lease_id: Hash32,
        pending: u64,
    },
}

/// A logged event with its position in the log and a wall-clock stamp for
/// monitoring. Protocol state itself never reads this clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: ProtocolEvent,
}

struct LogInner {
    entries: Vec<EventRecord>,
    next_seq: u64,
}

/// Append-only event log shared by all protocol components.
pub struct EventLog {
    inner: Mutex<LogInner>,
    tx: broadcast::Sender<ProtocolEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(LogInner {
                entries: Vec::new(),
                next_seq: 0,
            }),
            tx,
        }
    }

    /// Append an event and fan it out to subscribers. Returns the sequence
    /// number assigned to the entry.
    pub fn emit(&self, event: ProtocolEvent) -> u64 {
        let seq = {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.push(EventRecord {
                seq,
                recorded_at: Utc::now(),
                event: event.clone(),
            });
            seq
        };
        log::debug!("event #{}: {:?}", seq, event);
        // No receivers is fine; the log itself is the durable record.
        let _ = self.tx.send(event);
        seq
    }

    /// Subscribe for push delivery of future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.tx.subscribe()
    }

    /// All entries with sequence number >= `seq`, for polling consumers.
    pub fn events_since(&self, seq: u64) -> Vec<EventRecord> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|e| e.seq >= seq)
            .cloned()
            .collect()
    }

    /// Full copy of the log.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        let inner = self.inner.lock();
        inner.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
