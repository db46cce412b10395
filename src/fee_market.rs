// src/fee_market.rs
//! Security fee market.
//!
//! Subnets post bids for leased stake; validators post offers. Matching is
//! greedy and conservative: cheapest compatible offer first, never
//! exceeding either side's remainder, and every executed match creates a
//! lease through the registry under the market's own principal. Matching
//! runs automatically whenever an order is created.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ProtocolError, Result};
use crate::events::{EventLog, ProtocolEvent};
use crate::registry::Registry;
use crate::{derive_id, Address, BidId, LeaseId, OfferId, SubnetId};

/// Quality-of-service vector attached to every order. Basis-point fields
/// range 0..=10_000.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QosRequirements {
    /// Minimum uptime in basis points (9950 = 99.50%)
    pub min_uptime_bps: u32,
    /// Maximum acceptable latency in milliseconds
    pub max_latency_ms: u32,
    pub min_validator_count: u32,
    /// Security tier, 1 (lowest) to 10
    pub security_level: u8,
    /// Geographic diversity in basis points
    pub geographic_diversity_bps: u32,
}

impl QosRequirements {
    pub fn validate(&self) -> Result<()> {
        if self.min_uptime_bps > 10_000 {
            return Err(ProtocolError::InvalidParameters(format!(
                "min_uptime_bps {} exceeds 10000",
                self.min_uptime_bps
            )));
        }
        if self.geographic_diversity_bps > 10_000 {
            return Err(ProtocolError::InvalidParameters(format!(
                "geographic_diversity_bps {} exceeds 10000",
                self.geographic_diversity_bps
            )));
        }
        if !(1..=10).contains(&self.security_level) {
            return Err(ProtocolError::InvalidParameters(format!(
                "security_level {} outside 1..=10",
                self.security_level
            )));
        }
        Ok(())
    }

    /// True when an offer carrying these guarantees can serve a bid
    /// demanding `demanded`.
    pub fn satisfies(&self, demanded: &QosRequirements) -> bool {
        self.min_uptime_bps >= demanded.min_uptime_bps
            && self.max_latency_ms <= demanded.max_latency_ms
            && self.min_validator_count <= demanded.min_validator_count
            && self.security_level >= demanded.security_level
            && self.geographic_diversity_bps >= demanded.geographic_diversity_bps
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    /// No fills yet
    Open,
    /// Some stake matched, remainder still accepting fills
    PartiallyMatched,
    /// Remainder reached zero
    Matched,
    /// Withdrawn by its creator; executed fills stand
    Cancelled,
}

impl OrderStatus {
    /// Whether the matcher may still fill against this order.
    pub fn accepts_fills(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyMatched)
    }
}

/// A subnet's demand for leased stake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityBid {
    pub id: BidId,
    pub subnet_id: SubnetId,
    pub creator: Address,
    pub required_stake: u64,
    pub matched_stake: u64,
    pub duration_secs: u64,
    /// Token the subnet pays fees in, recorded for settlement
    pub payment_token: Address,
    /// Highest price per stake unit the subnet will pay
    pub max_price: u64,
    pub qos: QosRequirements,
    pub status: OrderStatus,
    pub created_at: u64,
    /// Leases created by fills of this bid
    pub lease_ids: Vec<LeaseId>,
}

impl SecurityBid {
    pub fn remaining_stake(&self) -> u64 {
        self.required_stake.saturating_sub(self.matched_stake)
    }
}

/// A validator's supply of stake for leasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorOffer {
    pub id: OfferId,
    pub validator: Address,
    pub offered_stake: u64,
    pub matched_stake: u64,
    pub max_duration_secs: u64,
    /// Lowest acceptable price per stake unit
    pub min_price: u64,
    pub qos: QosRequirements,
    pub status: OrderStatus,
    pub created_at: u64,
}

impl ValidatorOffer {
    pub fn remaining_stake(&self) -> u64 {
        self.offered_stake.saturating_sub(self.matched_stake)
    }
}

/// One executed fill. Matches execute at the offer's asking price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub bid_id: BidId,
    pub offer_id: OfferId,
    pub lease_id: LeaseId,
    pub amount: u64,
    pub price: u64,
    pub executed_at: u64,
}

struct MarketState {
    bids: HashMap<BidId, SecurityBid>,
    offers: HashMap<OfferId, ValidatorOffer>,
    matches: Vec<MatchRecord>,
    order_nonce: u64,
}

/// Order book and matcher. Market state sits behind its own lock; lease
/// creation re-validates stake under the registry's lock, so a fill that
/// lost its backing stake is skipped rather than executed.
pub struct FeeMarket {
    identity: Address,
    registry: Arc<Registry>,
    state: RwLock<MarketState>,
    events: Arc<EventLog>,
}

impl FeeMarket {
    pub fn new(identity: &str, registry: Arc<Registry>, events: Arc<EventLog>) -> Self {
        Self {
            identity: identity.to_string(),
            registry,
            state: RwLock::new(MarketState {
                bids: HashMap::new(),
                offers: HashMap::new(),
                matches: Vec::new(),
                order_nonce: 0,
            }),
            events,
        }
    }

    /// Principal under which the market creates leases. Must be wired
    /// into the registry via `set_fee_market`.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    // ─── Orders ────────────────────────────────────────────────────

    /// Post a bid for leased stake. Only the subnet's owner may bid on
    /// its behalf. Matching runs before returning.
    #[allow(clippy::too_many_arguments)]
    pub fn create_security_bid(
        &self,
        caller: &str,
        subnet_id: SubnetId,
        required_stake: u64,
        duration_secs: u64,
        qos: QosRequirements,
        payment_token: &str,
        max_price: u64,
        now: u64,
    ) -> Result<BidId> {
        qos.validate()?;
        if required_stake == 0 || max_price == 0 {
            return Err(ProtocolError::InvalidParameters(
                "required stake and max price must be positive".into(),
            ));
        }
        if payment_token.is_empty() {
            return Err(ProtocolError::InvalidParameters(
                "payment token must be named".into(),
            ));
        }
        let config = self.registry.config();
        if duration_secs < config.min_lease_duration {
            return Err(ProtocolError::DurationTooShort {
                min: config.min_lease_duration,
                actual: duration_secs,
            });
        }
        if duration_secs > config.max_lease_duration {
            return Err(ProtocolError::DurationOutOfRange {
                min: config.min_lease_duration,
                max: config.max_lease_duration,
                actual: duration_secs,
            });
        }
        let subnet = self
            .registry
            .get_subnet(subnet_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("subnet {}", hex::encode(subnet_id))))?;
        if !subnet.active {
            return Err(ProtocolError::InvalidState(format!(
                "subnet {} is inactive",
                hex::encode(subnet_id)
            )));
        }
        if caller != subnet.owner {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} does not own subnet {}",
                caller,
                hex::encode(subnet_id)
            )));
        }

        let mut state = self.state.write();
        let nonce = state.order_nonce;
        state.order_nonce += 1;
        let id = derive_id(&[
            b"bid",
            &subnet_id,
            caller.as_bytes(),
            &now.to_be_bytes(),
            &nonce.to_be_bytes(),
        ]);
        state.bids.insert(
            id,
            SecurityBid {
                id,
                subnet_id,
                creator: caller.to_string(),
                required_stake,
                matched_stake: 0,
                duration_secs,
                payment_token: payment_token.to_string(),
                max_price,
                qos,
                status: OrderStatus::Open,
                created_at: now,
                lease_ids: Vec::new(),
            },
        );

        log::info!(
            "Bid {} created for subnet {}: {} units, max price {} in {}",
            hex::encode(id),
            hex::encode(subnet_id),
            required_stake,
            max_price,
            payment_token
        );
        self.events.emit(ProtocolEvent::BidCreated {
            bid_id: id,
            subnet_id,
            required_stake,
            price: max_price,
        });

        self.run_matching(&mut state, now);
        Ok(id)
    }

    /// Post an offer of stake. The caller must be a registered validator
    /// with enough uncommitted stake. Matching runs before returning.
    pub fn create_validator_offer(
        &self,
        caller: &str,
        offered_stake: u64,
        max_duration_secs: u64,
        min_price: u64,
        qos: QosRequirements,
        now: u64,
    ) -> Result<OfferId> {
        qos.validate()?;
        if offered_stake == 0 || min_price == 0 {
            return Err(ProtocolError::InvalidParameters(
                "offered stake and min price must be positive".into(),
            ));
        }
        let config = self.registry.config();
        if max_duration_secs < config.min_lease_duration {
            return Err(ProtocolError::DurationTooShort {
                min: config.min_lease_duration,
                actual: max_duration_secs,
            });
        }
        let validator = self
            .registry
            .get_validator(caller)
            .ok_or_else(|| ProtocolError::NotFound(format!("validator {}", caller)))?;
        if !validator.active {
            return Err(ProtocolError::InvalidState(format!(
                "validator {} is inactive",
                caller
            )));
        }
        if offered_stake > validator.available_stake {
            return Err(ProtocolError::InsufficientAvailableStake {
                requested: offered_stake,
                available: validator.available_stake,
            });
        }

        let mut state = self.state.write();
        let nonce = state.order_nonce;
        state.order_nonce += 1;
        let id = derive_id(&[
            b"offer",
            caller.as_bytes(),
            &now.to_be_bytes(),
            &nonce.to_be_bytes(),
        ]);
        state.offers.insert(
            id,
            ValidatorOffer {
                id,
                validator: caller.to_string(),
                offered_stake,
                matched_stake: 0,
                max_duration_secs,
                min_price,
                qos,
                status: OrderStatus::Open,
                created_at: now,
            },
        );

        log::info!(
            "Offer {} created by {}: {} units, min price {}",
            hex::encode(id),
            caller,
            offered_stake,
            min_price
        );
        self.events.emit(ProtocolEvent::OfferCreated {
            offer_id: id,
            validator: caller.to_string(),
            available_stake: offered_stake,
            min_price,
        });

        self.run_matching(&mut state, now);
        Ok(id)
    }

    /// Withdraw a bid's unmatched remainder. Executed fills stand.
    pub fn cancel_bid(&self, caller: &str, bid_id: BidId) -> Result<()> {
        let mut state = self.state.write();
        let bid = state
            .bids
            .get_mut(&bid_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("bid {}", hex::encode(bid_id))))?;
        if bid.creator != caller {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} did not create bid {}",
                caller,
                hex::encode(bid_id)
            )));
        }
        if !bid.status.accepts_fills() {
            return Err(ProtocolError::InvalidState(format!(
                "bid {} is {:?}",
                hex::encode(bid_id),
                bid.status
            )));
        }
        bid.status = OrderStatus::Cancelled;
        drop(state);

        log::info!("Bid {} cancelled", hex::encode(bid_id));
        self.events.emit(ProtocolEvent::BidCancelled { bid_id });
        Ok(())
    }

    /// Withdraw an offer's unmatched remainder. Executed fills stand.
    pub fn cancel_offer(&self, caller: &str, offer_id: OfferId) -> Result<()> {
        let mut state = self.state.write();
        let offer = state
            .offers
            .get_mut(&offer_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("offer {}", hex::encode(offer_id))))?;
        if offer.validator != caller {
            return Err(ProtocolError::Unauthorized(format!(
                "caller {} did not create offer {}",
                caller,
                hex::encode(offer_id)
            )));
        }
        if !offer.status.accepts_fills() {
            return Err(ProtocolError::InvalidState(format!(
                "offer {} is {:?}",
                hex::encode(offer_id),
                offer.status
            )));
        }
        offer.status = OrderStatus::Cancelled;
        drop(state);

        log::info!("Offer {} cancelled", hex::encode(offer_id));
        self.events.emit(ProtocolEvent::OfferCancelled { offer_id });
        Ok(())
    }

    // ─── Matching ──────────────────────────────────────────────────

    fn compatible(bid: &SecurityBid, offer: &ValidatorOffer) -> bool {
        offer.max_duration_secs >= bid.duration_secs
            && offer.min_price <= bid.max_price
            && offer.qos.satisfies(&bid.qos)
    }

    /// Match every fillable bid, oldest first, against offers in asking
    /// price order. Each executed fill creates a lease; a fill the
    /// registry refuses is skipped without failing the pass.
    fn run_matching(&self, state: &mut MarketState, now: u64) -> usize {
        let mut open_bids: Vec<(u64, BidId)> = state
            .bids
            .values()
            .filter(|b| b.status.accepts_fills())
            .map(|b| (b.created_at, b.id))
            .collect();
        open_bids.sort();

        let mut executed = 0;
        for (_, bid_id) in open_bids {
            let bid = match state.bids.get(&bid_id) {
                Some(b) if b.status.accepts_fills() => b.clone(),
                _ => continue,
            };
            let subnet = match self.registry.get_subnet(bid.subnet_id) {
                Some(s) => s,
                None => continue,
            };

            let mut candidates: Vec<(u64, u64, OfferId)> = state
                .offers
                .values()
                .filter(|o| o.status.accepts_fills())
                .map(|o| (o.min_price, o.created_at, o.id))
                .collect();
            candidates.sort();

            let mut remaining = bid.remaining_stake();
            for (_, _, offer_id) in candidates {
                if remaining == 0 {
                    break;
                }
                let offer = match state.offers.get(&offer_id) {
                    Some(o) if o.status.accepts_fills() => o.clone(),
                    _ => continue,
                };
                if !Self::compatible(&bid, &offer) {
                    continue;
                }
                let amount = remaining.min(offer.remaining_stake());
                if amount == 0 || amount < subnet.required_stake {
                    continue;
                }

                let lease_id = match self.registry.create_lease(
                    &self.identity,
                    &offer.validator,
                    bid.subnet_id,
                    amount,
                    bid.duration_secs,
                    now,
                ) {
                    Ok(id) => id,
                    Err(err) => {
                        log::debug!(
                            "Fill of bid {} by offer {} skipped: {}",
                            hex::encode(bid_id),
                            hex::encode(offer_id),
                            err
                        );
                        continue;
                    }
                };

                if let Some(o) = state.offers.get_mut(&offer_id) {
                    o.matched_stake = o.matched_stake.saturating_add(amount);
                    o.status = if o.remaining_stake() == 0 {
                        OrderStatus::Matched
                    } else {
                        OrderStatus::PartiallyMatched
                    };
                }
                if let Some(b) = state.bids.get_mut(&bid_id) {
                    b.matched_stake = b.matched_stake.saturating_add(amount);
                    b.lease_ids.push(lease_id);
                    b.status = if b.remaining_stake() == 0 {
                        OrderStatus::Matched
                    } else {
                        OrderStatus::PartiallyMatched
                    };
                }
                state.matches.push(MatchRecord {
                    bid_id,
                    offer_id,
                    lease_id,
                    amount,
                    price: offer.min_price,
                    executed_at: now,
                });
                remaining = remaining.saturating_sub(amount);
                executed += 1;

                log::info!(
                    "Matched bid {} with offer {}: {} units at price {} (lease {})",
                    hex::encode(bid_id),
                    hex::encode(offer_id),
                    amount,
                    offer.min_price,
                    hex::encode(lease_id)
                );
                self.events.emit(ProtocolEvent::MatchExecuted {
                    bid_id,
                    offer_id,
                    lease_id,
                    amount,
                });
            }
        }
        executed
    }

    // ─── Reads ─────────────────────────────────────────────────────

    pub fn get_bid(&self, id: BidId) -> Option<SecurityBid> {
        self.state.read().bids.get(&id).cloned()
    }

    pub fn get_offer(&self, id: OfferId) -> Option<ValidatorOffer> {
        self.state.read().offers.get(&id).cloned()
    }

    pub fn list_matches(&self) -> Vec<MatchRecord> {
        self.state.read().matches.clone()
    }

    pub fn total_bids(&self) -> usize {
        self.state.read().bids.len()
    }

    pub fn total_offers(&self) -> usize {
        self.state.read().offers.len()
    }
}
