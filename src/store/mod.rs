//! Persistence ports (§19 of SPEC_FULL) — the single async boundary the
//! engine (C13) depends on. Grounded on spec.md §6's "required store
//! semantics" (`SELECT ... FOR UPDATE`, conditional `UPDATE ... WHERE ...
//! RETURNING`, `INSERT ... ON CONFLICT ... DO UPDATE`) which the teacher
//! crate has no equivalent of (it streams immutable Parquet/object-store
//! frames, never a mutable relational row). Two implementations live in
//! sibling modules: [`memory`] (in-process, used by every test in this
//! crate) and [`postgres`] (issues the SQL shapes of the original Python
//! persistence layer).

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};

use crate::account::Account;
use crate::enums::{FrozenAssetType, LedgerEntryType};
use crate::error::StoreError;
use crate::ledger::{LedgerEntry, LedgerPage, NewLedgerEntry};
use crate::market::Market;
use crate::money::{Cents, Quantity};
use crate::order::Order;
use crate::position::Position;
use crate::trade::Trade;
use crate::wal::NewWalEvent;

pub type StoreResult<T> = Result<T, StoreError>;

/// Account custody operations (C3). Every mutator is a single conditional
/// write: the guard and the mutation happen together, so a failed guard
/// leaves state untouched rather than requiring a compensating rollback.
#[allow(async_fn_in_trait)]
pub trait AccountStore {
    async fn get_or_create_account(&self, user_id: &str, auto_netting_enabled: bool) -> StoreResult<Account>;
    async fn deposit(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account>;
    async fn withdraw(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account>;
    async fn freeze_funds(
        &self,
        user_id: &str,
        amount: Cents,
        reference_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Account>;
    async fn unfreeze_funds(
        &self,
        user_id: &str,
        amount: Cents,
        reference_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Account>;
    /// Debits `amount` from available balance and credits it to `user_id`
    /// without a freeze step (used for proceeds, payouts, fee collection).
    async fn credit_available(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account>;
    async fn debit_available(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account>;
    async fn debit_frozen(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account>;
}

/// Position custody operations (C4).
#[allow(async_fn_in_trait)]
pub trait PositionStore {
    async fn get_or_create_position(&self, user_id: &str, market_id: &str) -> StoreResult<Position>;
    async fn freeze_yes(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position>;
    async fn freeze_no(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position>;
    async fn unfreeze_yes(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position>;
    async fn unfreeze_no(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position>;
    /// Applies a signed delta to volume and cost_sum on one side, used only
    /// by clearing (C10) and settlement (C15) per spec.md §4.4.
    async fn apply_yes_delta(
        &self,
        user_id: &str,
        market_id: &str,
        volume_delta: i64,
        cost_sum_delta: i64,
        pending_sell_delta: i64,
    ) -> StoreResult<Position>;
    async fn apply_no_delta(
        &self,
        user_id: &str,
        market_id: &str,
        volume_delta: i64,
        cost_sum_delta: i64,
        pending_sell_delta: i64,
    ) -> StoreResult<Position>;
    async fn zero(&self, user_id: &str, market_id: &str) -> StoreResult<Position>;
    async fn list_positions_for_market(&self, market_id: &str) -> StoreResult<Vec<Position>>;
}

/// Order persistence (part of C13).
#[allow(async_fn_in_trait)]
pub trait OrderStore {
    async fn insert_order(&self, order: Order) -> StoreResult<Order>;
    async fn get_order(&self, order_id: &str) -> StoreResult<Order>;
    async fn find_by_client_order_id(&self, user_id: &str, client_order_id: &str) -> StoreResult<Option<Order>>;
    async fn update(&self, order: Order) -> StoreResult<Order>;
    async fn list_open_for_market(&self, market_id: &str) -> StoreResult<Vec<Order>>;
    async fn list_active_for_user(
        &self,
        market_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<Order>>;
}

/// Market aggregate persistence (C13/C14/C15).
#[allow(async_fn_in_trait)]
pub trait MarketStore {
    async fn get_market(&self, market_id: &str) -> StoreResult<Market>;
    async fn create(&self, market: Market) -> StoreResult<Market>;
    /// Loads the row `FOR UPDATE` for the duration of the caller's critical
    /// section (spec.md §6). The in-memory store's lock is the per-market
    /// engine mutex; the Postgres store issues a real `SELECT ... FOR
    /// UPDATE`.
    async fn get_for_update(&self, market_id: &str) -> StoreResult<Market>;
    async fn save(&self, market: Market) -> StoreResult<Market>;
}

/// Append-only ledger (C2). No update/delete method exists anywhere on this
/// trait — that is P8 enforced structurally, not by runtime check.
#[allow(async_fn_in_trait)]
pub trait LedgerStore {
    async fn append(&self, entry: NewLedgerEntry, now: DateTime<Utc>) -> StoreResult<LedgerEntry>;
    async fn list(
        &self,
        user_id: &str,
        after: Option<u64>,
        entry_type: Option<LedgerEntryType>,
        limit: usize,
    ) -> StoreResult<LedgerPage>;
}

/// WAL audit log (spec.md §3 "WAL event").
#[allow(async_fn_in_trait)]
pub trait WalStore {
    async fn record(&self, event: NewWalEvent, now: DateTime<Utc>) -> StoreResult<()>;
}

/// Trade (fill) persistence.
#[allow(async_fn_in_trait)]
pub trait TradeStore {
    async fn insert_trade(&self, trade: Trade) -> StoreResult<Trade>;
    /// Like `insert_trade`, but also indexes the row under
    /// `(reference_type, reference_id)` so a later `find_by_reference` call
    /// can recognise a retried privileged mint/burn (§11) as a no-op. The
    /// caller's `trade.id` is preserved rather than reassigned, since the
    /// privileged path's idempotency check must return the *original*
    /// trade, id included, on every retry.
    async fn insert_trade_with_reference(&self, trade: Trade, reference_type: &str, reference_id: &str) -> StoreResult<Trade>;
    async fn list_trades_for_market(&self, market_id: &str) -> StoreResult<Vec<Trade>>;
    /// Looks a prior privileged mint/burn up by its idempotency key, per §11
    /// ("idempotent on `(reference_type, reference_id)`").
    async fn find_by_reference(&self, reference_type: &str, reference_id: &str) -> StoreResult<Option<Trade>>;
}

/// Frozen-asset release helper used by `cancel_order`/`batch_cancel`/
/// settlement: dispatches to the right custody port by
/// [`FrozenAssetType`] instead of repeating the match at every call site.
#[allow(async_fn_in_trait)]
pub trait CustodyRelease: AccountStore + PositionStore {
    async fn release(
        &self,
        user_id: &str,
        market_id: &str,
        asset: FrozenAssetType,
        amount: Cents,
        quantity: Quantity,
        reference_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        match asset {
            FrozenAssetType::Funds => {
                self.unfreeze_funds(user_id, amount, reference_id, now).await?;
            }
            FrozenAssetType::YesShares => {
                self.unfreeze_yes(user_id, market_id, quantity).await?;
            }
            FrozenAssetType::NoShares => {
                self.unfreeze_no(user_id, market_id, quantity).await?;
            }
        }
        Ok(())
    }
}

/// The engine's single persistence dependency: everything it needs in one
/// bound, so `Engine<S: Store>` is one type parameter rather than six.
pub trait Store:
    AccountStore + PositionStore + OrderStore + MarketStore + LedgerStore + WalStore + TradeStore + CustodyRelease
{
}

impl<T> CustodyRelease for T where T: AccountStore + PositionStore {}
impl<T> Store for T where
    T: AccountStore + PositionStore + OrderStore + MarketStore + LedgerStore + WalStore + TradeStore + CustodyRelease
{
}
