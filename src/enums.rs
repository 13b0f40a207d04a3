//! Closed string-like enums (spec.md §3), `strum`-backed the way the teacher
//! crate derives `strum::Display`/`EnumString` on `CandleDirection` and
//! `TradeSide` in `data/domain.rs`.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    Draft,
    Active,
    Suspended,
    Halted,
    Resolved,
    Settled,
    Voided,
}

impl MarketStatus {
    /// Markets accept new orders only in this state (spec.md §4.6 check 1).
    pub fn is_tradable(self) -> bool {
        matches!(self, MarketStatus::Active)
    }

    /// Settlement is only valid from these two states (spec.md §4.15).
    pub fn is_settleable(self) -> bool {
        matches!(self, MarketStatus::Active | MarketStatus::Suspended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BookType {
    NativeBuy,
    NativeSell,
    SyntheticBuy,
    SyntheticSell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum BookDirection {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeScenario {
    Mint,
    TransferYes,
    TransferNo,
    Burn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FrozenAssetType {
    Funds,
    YesShares,
    NoShares,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum OriginalSide {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum OrderDirection {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::Gtc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// The 16-variant append-only ledger taxonomy (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    Deposit,
    Withdraw,
    OrderFreeze,
    OrderUnfreeze,
    MintCost,
    MintReserveIn,
    BurnRevenue,
    BurnReserveOut,
    TransferPayment,
    TransferReceipt,
    Netting,
    NettingReserveOut,
    Fee,
    FeeRevenue,
    SettlementPayout,
    SettlementVoid,
}

/// WAL audit event kinds (spec.md §3, "WAL event").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WalEventKind {
    OrderAccepted,
    OrderMatched,
    OrderPartiallyFilled,
    OrderCancelled,
    OrderExpired,
}

/// Market resolution outcome. A VOID outcome is out of scope (spec.md §4.15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionResult {
    Yes,
    No,
}

/// Which direction(s) `batch_cancel` targets (spec.md §4.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelScope {
    All,
    BuyOnly,
    SellOnly,
}

impl CancelScope {
    pub fn matches(self, direction: OrderDirection) -> bool {
        match self {
            CancelScope::All => true,
            CancelScope::BuyOnly => direction == OrderDirection::Buy,
            CancelScope::SellOnly => direction == OrderDirection::Sell,
        }
    }
}
