//! Engine and per-market configuration, grounded on the teacher's
//! `config.rs`/`gym/trading/config.rs` pattern of a plain constructible
//! struct (no file loading — spec.md §1 puts config loading out of scope,
//! so this crate only defines the shape a caller populates).

use std::collections::HashSet;

use crate::money::Bps;

/// Per-market tunables (spec.md §3 Market attributes).
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub min_price: u8,
    pub max_price: u8,
    pub max_order_quantity: u32,
    pub max_position_quantity: u32,
    pub max_order_notional_cents: i64,
    pub maker_fee_bps: Bps,
    pub taker_fee_bps: Bps,
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            min_price: 1,
            max_price: 99,
            // spec.md §4.6 check 3: "1 <= quantity <= 100_000".
            max_order_quantity: 100_000,
            max_position_quantity: u32::MAX,
            max_order_notional_cents: i64::MAX,
            maker_fee_bps: Bps(10),
            taker_fee_bps: Bps(20),
        }
    }
}

/// Engine-wide tunables that apply across all markets: the AMM identity and
/// the self-trade exempt set (spec.md §9 "must be configurable sets, not
/// hard-coded to one id" — the Python source hardcodes a single-element
/// frozenset, which this crate's `EngineConfig` generalizes).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub amm_user_id: String,
    pub self_trade_exempt: HashSet<String>,
    pub platform_fee_account_id: String,
    pub system_reserve_account_id: String,
    pub snowflake_machine_id: u16,
}

impl EngineConfig {
    /// The conventional setup: one AMM account, exempt from both self-trade
    /// prevention and auto-netting, matching `pm_risk/rules/self_trade.py`'s
    /// default `SELF_TRADE_EXEMPT_USERS = {AMM_USER_ID}`.
    pub fn with_single_amm(amm_user_id: impl Into<String>) -> Self {
        let amm_user_id = amm_user_id.into();
        let mut self_trade_exempt = HashSet::new();
        self_trade_exempt.insert(amm_user_id.to_lowercase());
        EngineConfig {
            amm_user_id,
            self_trade_exempt,
            platform_fee_account_id: "PLATFORM_FEE".to_string(),
            system_reserve_account_id: "SYSTEM_RESERVE".to_string(),
            snowflake_machine_id: 1,
        }
    }

    /// Case-insensitive membership check (spec.md §4.8: "user-id comparison
    /// MUST be case-insensitive for string-form identifiers").
    pub fn is_self_trade_exempt(&self, user_id: &str) -> bool {
        self.self_trade_exempt.contains(&user_id.to_lowercase())
    }
}
