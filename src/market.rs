//! Market aggregate row (spec.md §3 "Market"). Status lifecycle and
//! invariants live on [`crate::invariant`]/[`crate::settlement`]; this
//! module is the row shape, grounded on `pm_market/domain/models.py::Market`
//! and `MatchingEngine.MarketState` in `pm_matching/engine/engine.py` (the
//! latter is the "row shadow" the Python engine loads FOR UPDATE per trade).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{MarketStatus, ResolutionResult};
use crate::money::{Bps, Cents, Quantity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub market_id: String,
    pub status: MarketStatus,
    pub min_price: u8,
    pub max_price: u8,
    pub max_order_quantity: u32,
    pub max_position_quantity: u32,
    pub max_order_notional_cents: i64,
    pub maker_fee_bps: Bps,
    pub taker_fee_bps: Bps,
    pub reserve_balance: Cents,
    pub pnl_pool: Cents,
    pub total_yes_shares: Quantity,
    pub total_no_shares: Quantity,
    pub resolution_result: Option<ResolutionResult>,
    pub settled_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Market {
    pub fn new(market_id: impl Into<String>, config: &crate::config::MarketConfig, now: DateTime<Utc>) -> Self {
        Market {
            market_id: market_id.into(),
            status: MarketStatus::Draft,
            min_price: config.min_price,
            max_price: config.max_price,
            max_order_quantity: config.max_order_quantity,
            max_position_quantity: config.max_position_quantity,
            max_order_notional_cents: config.max_order_notional_cents,
            maker_fee_bps: config.maker_fee_bps,
            taker_fee_bps: config.taker_fee_bps,
            reserve_balance: Cents::ZERO,
            pnl_pool: Cents::ZERO,
            total_yes_shares: Quantity::ZERO,
            total_no_shares: Quantity::ZERO,
            resolution_result: None,
            settled_at: None,
            version: 0,
            updated_at: now,
        }
    }
}
