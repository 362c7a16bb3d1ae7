// 11.0: every committed operation appends one event. nothing is emitted for a
// rejected operation, so the log can be replayed to rebuild balances.

use crate::symbol::{SymbolStatus, TradeSettlement};
use crate::types::{AccountId, AssetId, Quote, SignedSize, SymbolId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Pool events
    LiquidityAdded(LiquidityAddedEvent),
    LiquidityRemoved(LiquidityRemovedEvent),
    ProtocolFeeCollected(ProtocolFeeCollectedEvent),

    // Margin events
    MarginAdded(MarginAddedEvent),
    MarginRemoved(MarginRemovedEvent),

    // Trading events
    Traded(TradedEvent),
    ExpirySettled(ExpirySettledEvent),

    // Risk events
    Liquidated(LiquidatedEvent),

    // Admin events
    SymbolAdded(SymbolAddedEvent),
    SymbolStatusChanged(SymbolStatusChangedEvent),
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::LiquidityAdded(_) => "liquidity_added",
            EventPayload::LiquidityRemoved(_) => "liquidity_removed",
            EventPayload::ProtocolFeeCollected(_) => "protocol_fee_collected",
            EventPayload::MarginAdded(_) => "margin_added",
            EventPayload::MarginRemoved(_) => "margin_removed",
            EventPayload::Traded(_) => "traded",
            EventPayload::ExpirySettled(_) => "expiry_settled",
            EventPayload::Liquidated(_) => "liquidated",
            EventPayload::SymbolAdded(_) => "symbol_added",
            EventPayload::SymbolStatusChanged(_) => "symbol_status_changed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityAddedEvent {
    pub provider: AccountId,
    pub amount: Quote,
    pub shares_minted: Decimal,
    pub nav_after: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityRemovedEvent {
    pub provider: AccountId,
    pub shares_burned: Decimal,
    pub value: Quote,
    // vault came back short; the difference is lost to the provider
    pub released: Quote,
    pub nav_after: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolFeeCollectedEvent {
    pub amount: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginAddedEvent {
    pub trader: AccountId,
    pub asset: AssetId,
    pub amount: Decimal,
    pub cleared_liquidation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginRemovedEvent {
    pub trader: AccountId,
    pub asset: AssetId,
    pub requested: Decimal,
    pub released: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradedEvent {
    pub trader: AccountId,
    pub volume: SignedSize,
    pub settlement: TradeSettlement,
    pub margin_ratio_after: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpirySettledEvent {
    pub trader: AccountId,
    pub settlement: TradeSettlement,
    // debt left on a flat, base-only account and taken by the pool (<= 0)
    pub written_off: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidatedEvent {
    pub trader: AccountId,
    pub liquidator: AccountId,
    pub closed: Vec<TradeSettlement>,
    pub remaining_margin: Quote,
    pub reward: Quote,
    pub pool_residual: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolAddedEvent {
    pub symbol: SymbolId,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolStatusChangedEvent {
    pub symbol: SymbolId,
    pub previous: SymbolStatus,
    pub status: SymbolStatus,
}

/// Bounded in-memory event log. Ids keep increasing after old events are dropped.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<Event>,
    next_id: u64,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 1,
            capacity,
        }
    }

    pub fn push(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.events.push_back(Event::new(id, timestamp, payload));
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
        id
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> {
        self.events.iter()
    }

    pub fn recent(&self, count: usize) -> Vec<&Event> {
        let skip = self.events.len().saturating_sub(count);
        self.events.iter().skip(skip).collect()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.back()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
