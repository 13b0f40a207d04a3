//! Layered error model, grounded on the teacher crate's `ChapatyError`
//! umbrella: one top-level enum over per-domain sub-enums, each wrapped via
//! `#[error(transparent)] #[from]`, plus a `code`/`http_status` mapping
//! matching the numeric table in spec.md §6 (itself mirroring
//! `pm_common/errors.py::AppError`). Auth/user errors (1001-1005) are
//! deliberately not modeled here — request authentication is out of core
//! scope (spec.md §1) and owned by the HTTP layer that wraps this crate.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Market(#[from] MarketError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Replace(#[from] ReplaceError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error(transparent)]
    System(#[from] SystemError),
}

/// 2xxx — account custody (C3).
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account {0} not found")]
    NotFound(String),
    #[error("insufficient available balance: need {needed} cents, have {available} cents")]
    InsufficientBalance { needed: i64, available: i64 },
}

/// 5xxx — position custody (C4).
#[derive(Debug, Error)]
pub enum PositionError {
    #[error("position not found for account {account} in market {market}")]
    NotFound { account: String, market: String },
    #[error("insufficient available {side} shares: need {needed}, have {available}")]
    InsufficientShares {
        side: &'static str,
        needed: u32,
        available: u32,
    },
}

/// 3xxx — market lifecycle (C13/C15).
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("market {0} not found")]
    NotFound(String),
    #[error("market {market} is not active (status: {status})")]
    NotActive { market: String, status: String },
}

/// 4xxx — order placement/risk/matching (C6/C8/C13).
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("price {0} is out of the valid [1, 99] range")]
    PriceOutOfRange(u8),
    #[error("quantity {requested} exceeds the order limit of {max}")]
    OrderLimitExceeded { requested: u32, max: u32 },
    #[error("IOC order filled nothing after skipping {self_trade_skipped} self-trade(s)")]
    SelfTrade { self_trade_skipped: u32 },
    #[error("order {0} not found")]
    NotFound(String),
    #[error("client_order_id {client_order_id} was already used with different order parameters")]
    DuplicateOrder { client_order_id: String },
    #[error("order {0} is not cancellable in its current state")]
    NotCancellable(String),
}

/// 6001-6005 — `replace_order` (C13), distinct from plain order errors
/// because a replace has two orders and fails in ways neither a bare place
/// nor a bare cancel can.
#[derive(Debug, Error)]
pub enum ReplaceError {
    #[error("old order {0} has a partial fill; replace rejected, old order left intact")]
    RejectedPartial(String),
    #[error("old order {0} not found")]
    OldNotFound(String),
    #[error("old order {0} is already fully filled")]
    OldAlreadyFilled(String),
    #[error("order {order} does not belong to user {user}")]
    WrongUser { order: String, user: String },
    #[error("replacement market {new_market} does not match old order's market {old_market}")]
    MarketMismatch { old_market: String, new_market: String },
}

/// INV-1/2/3/G violations and the AMM-only guard (C14, and the privileged
/// mint/burn path of C10/§11) — all fatal, per spec.md §7 "invariant" class.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("INV-1 violated in market {market}: total_yes_shares {yes} != total_no_shares {no}")]
    ShareSymmetry { market: String, yes: i64, no: i64 },
    #[error(
        "INV-2 violated in market {market}: reserve_balance {reserve} != 100 * total_yes_shares {yes}"
    )]
    ReserveShareCoupling {
        market: String,
        reserve: i64,
        yes: i64,
    },
    #[error(
        "INV-3 violated in market {market}: reserve {reserve} + pnl_pool {pnl} != cost sum {cost_sum}"
    )]
    ReserveCostBalance {
        market: String,
        reserve: i64,
        pnl: i64,
        cost_sum: i64,
    },
    #[error("INV-G violated: {0}")]
    GlobalZeroSum(String),
    #[error("AMM-only operation attempted by non-AMM account {0}")]
    AmmOnly(String),
}

/// 9xxx — infrastructure/internal (C13 transaction plumbing, the store
/// port).
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("price {0} is out of the valid [1, 99] range")]
    PriceOutOfRange(u8),
    #[error("arithmetic overflow in money computation")]
    Overflow,
    #[error("order book in an inconsistent state: {0}")]
    BookCorrupt(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by the [`crate::store::Store`] port, independent of which
/// backing implementation (in-memory or Postgres) is in use.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency conflict on {entity} {id}: expected version {expected}")]
    VersionConflict {
        entity: &'static str,
        id: String,
        expected: i64,
    },
    #[error("row not found: {entity} {id}")]
    RowNotFound { entity: &'static str, id: String },
    #[error("backing store error: {0}")]
    Backend(String),
}

/// Lets every store call site use a bare `?` instead of
/// `.map_err(SystemError::from)?` — `StoreError` always means a
/// [`SystemError::Store`] as far as a clearing/engine caller is concerned.
impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::System(SystemError::Store(err))
    }
}

impl CoreError {
    /// Numeric code matching spec.md §6's table exactly (1001-1005 are
    /// reserved there for the external auth layer and never produced here).
    pub fn code(&self) -> u32 {
        match self {
            CoreError::Account(AccountError::InsufficientBalance { .. }) => 2001,
            CoreError::Account(AccountError::NotFound(_)) => 2001,
            CoreError::Market(MarketError::NotFound(_)) => 3001,
            CoreError::Market(MarketError::NotActive { .. }) => 3002,
            CoreError::Order(OrderError::PriceOutOfRange(_)) => 4001,
            CoreError::Order(OrderError::OrderLimitExceeded { .. }) => 4002,
            CoreError::Order(OrderError::SelfTrade { .. }) => 4003,
            CoreError::Order(OrderError::NotFound(_)) => 4004,
            CoreError::Order(OrderError::DuplicateOrder { .. }) => 4005,
            CoreError::Order(OrderError::NotCancellable(_)) => 4006,
            CoreError::Position(_) => 5001,
            CoreError::Replace(ReplaceError::RejectedPartial(_)) => 6001,
            CoreError::Replace(ReplaceError::OldNotFound(_)) => 6002,
            CoreError::Replace(ReplaceError::OldAlreadyFilled(_)) => 6003,
            CoreError::Replace(ReplaceError::WrongUser { .. }) => 6004,
            CoreError::Replace(ReplaceError::MarketMismatch { .. }) => 6005,
            CoreError::Invariant(InvariantError::AmmOnly(_)) => 6099,
            CoreError::Invariant(_) => 9002,
            CoreError::System(_) => 9002,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Account(_) => 422,
            CoreError::Market(MarketError::NotFound(_)) => 404,
            CoreError::Market(MarketError::NotActive { .. }) => 422,
            CoreError::Order(OrderError::NotFound(_)) => 404,
            CoreError::Order(OrderError::DuplicateOrder { .. }) => 409,
            CoreError::Order(_) => 422,
            CoreError::Position(_) => 422,
            CoreError::Replace(ReplaceError::OldNotFound(_)) => 404,
            CoreError::Replace(ReplaceError::WrongUser { .. }) => 403,
            CoreError::Replace(_) => 422,
            CoreError::Invariant(InvariantError::AmmOnly(_)) => 403,
            CoreError::Invariant(_) => 500,
            CoreError::System(_) => 500,
        }
    }
}
