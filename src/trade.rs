//! Trade (spec.md §3 "Trade") — the immutable fill record written once per
//! match, grounded on `_make_trade_buy_incoming`/`_make_trade_sell_incoming`
//! in `pm_matching/engine/matching_algo.py` and the audit row both the
//! privileged mint/burn path (§11) and ordinary clearing write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{BookType, TradeScenario};
use crate::money::{Cents, Price, Quantity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub market_id: String,
    pub maker_order_id: String,
    pub taker_order_id: String,
    pub maker_user_id: String,
    pub taker_user_id: String,
    pub buy_book_type: BookType,
    pub sell_book_type: BookType,
    pub scenario: TradeScenario,
    pub price: Price,
    pub quantity: Quantity,
    pub maker_fee: Cents,
    pub taker_fee: Cents,
    pub buyer_realised_pnl: Option<Cents>,
    pub seller_realised_pnl: Option<Cents>,
    pub created_at: DateTime<Utc>,
}
