//! In-memory reference implementation of every store port. This is what
//! every test in this crate runs against; it implements the exact
//! atomicity contract spec.md §6 asks of a relational store (conditional
//! guarded writes, append-only ledger) using one `tokio::sync::Mutex` per
//! table, the async analogue of the single critical section a real
//! `UPDATE ... WHERE ... RETURNING` statement gives you for free.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::account::Account;
use crate::enums::LedgerEntryType;
use crate::error::StoreError;
use crate::ledger::{LedgerEntry, LedgerPage, NewLedgerEntry};
use crate::market::Market;
use crate::money::{Cents, Quantity};
use crate::order::Order;
use crate::position::Position;
use crate::store::{AccountStore, LedgerStore, MarketStore, OrderStore, PositionStore, StoreResult, TradeStore, WalStore};
use crate::trade::Trade;
use crate::wal::{NewWalEvent, WalEvent};

#[derive(Default)]
pub struct InMemoryStore {
    accounts: Mutex<HashMap<String, Account>>,
    positions: Mutex<HashMap<(String, String), Position>>,
    orders: Mutex<HashMap<String, Order>>,
    orders_by_client: Mutex<HashMap<(String, String), String>>,
    markets: Mutex<HashMap<String, Market>>,
    ledger: Mutex<LedgerTable>,
    wal: Mutex<Vec<WalEvent>>,
    trades: Mutex<TradeTable>,
}

#[derive(Default)]
struct LedgerTable {
    rows: Vec<LedgerEntry>,
    next_id: u64,
}

#[derive(Default)]
struct TradeTable {
    rows: HashMap<u64, Trade>,
    next_id: u64,
    by_market: HashMap<String, Vec<u64>>,
    by_reference: HashMap<(String, String), u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }
}

impl AccountStore for InMemoryStore {
    async fn get_or_create_account(&self, user_id: &str, auto_netting_enabled: bool) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .entry(user_id.to_string())
            .or_insert_with(|| Account::new(user_id, auto_netting_enabled, Utc::now()));
        Ok(account.clone())
    }

    async fn deposit(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        let account = entry_account(&mut accounts, user_id, true);
        account.available_balance += amount;
        account.version += 1;
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn withdraw(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        let account = entry_account(&mut accounts, user_id, true);
        guard_sub(&mut account.available_balance, amount, "account", user_id)?;
        account.version += 1;
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn freeze_funds(
        &self,
        user_id: &str,
        amount: Cents,
        _reference_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        let account = entry_account(&mut accounts, user_id, true);
        guard_sub(&mut account.available_balance, amount, "account", user_id)?;
        account.frozen_balance += amount;
        account.version += 1;
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn unfreeze_funds(
        &self,
        user_id: &str,
        amount: Cents,
        _reference_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        let account = entry_account(&mut accounts, user_id, true);
        guard_sub(&mut account.frozen_balance, amount, "account", user_id)?;
        account.available_balance += amount;
        account.version += 1;
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn credit_available(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        let account = entry_account(&mut accounts, user_id, true);
        account.available_balance += amount;
        account.version += 1;
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn debit_available(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        let account = entry_account(&mut accounts, user_id, true);
        guard_sub(&mut account.available_balance, amount, "account", user_id)?;
        account.version += 1;
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn debit_frozen(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        let account = entry_account(&mut accounts, user_id, true);
        guard_sub(&mut account.frozen_balance, amount, "account", user_id)?;
        account.version += 1;
        account.updated_at = now;
        Ok(account.clone())
    }
}

fn entry_account<'a>(
    accounts: &'a mut HashMap<String, Account>,
    user_id: &str,
    auto_netting_enabled: bool,
) -> &'a mut Account {
    accounts
        .entry(user_id.to_string())
        .or_insert_with(|| Account::new(user_id, auto_netting_enabled, Utc::now()))
}

fn guard_sub(field: &mut Cents, amount: Cents, entity: &'static str, id: &str) -> StoreResult<()> {
    let updated = field.checked_sub(amount).filter(|c| !c.is_negative());
    match updated {
        Some(value) => {
            *field = value;
            Ok(())
        }
        None => Err(StoreError::Backend(format!(
            "{entity} {id}: insufficient balance for guarded write"
        ))),
    }
}

impl PositionStore for InMemoryStore {
    async fn get_or_create_position(&self, user_id: &str, market_id: &str) -> StoreResult<Position> {
        let mut positions = self.positions.lock().await;
        let pos = entry_position(&mut positions, user_id, market_id);
        Ok(pos.clone())
    }

    async fn freeze_yes(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position> {
        let mut positions = self.positions.lock().await;
        let pos = entry_position(&mut positions, user_id, market_id);
        let available = pos.yes_volume.0.saturating_sub(pos.yes_pending_sell.0);
        if available < qty.0 {
            return Err(StoreError::Backend(format!(
                "position {user_id}/{market_id}: insufficient available YES shares"
            )));
        }
        pos.yes_pending_sell.0 += qty.0;
        pos.version += 1;
        Ok(pos.clone())
    }

    async fn freeze_no(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position> {
        let mut positions = self.positions.lock().await;
        let pos = entry_position(&mut positions, user_id, market_id);
        let available = pos.no_volume.0.saturating_sub(pos.no_pending_sell.0);
        if available < qty.0 {
            return Err(StoreError::Backend(format!(
                "position {user_id}/{market_id}: insufficient available NO shares"
            )));
        }
        pos.no_pending_sell.0 += qty.0;
        pos.version += 1;
        Ok(pos.clone())
    }

    async fn unfreeze_yes(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position> {
        let mut positions = self.positions.lock().await;
        let pos = entry_position(&mut positions, user_id, market_id);
        if pos.yes_pending_sell.0 < qty.0 {
            return Err(StoreError::Backend(format!(
                "position {user_id}/{market_id}: unfreeze exceeds pending YES"
            )));
        }
        pos.yes_pending_sell.0 -= qty.0;
        pos.version += 1;
        Ok(pos.clone())
    }

    async fn unfreeze_no(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position> {
        let mut positions = self.positions.lock().await;
        let pos = entry_position(&mut positions, user_id, market_id);
        if pos.no_pending_sell.0 < qty.0 {
            return Err(StoreError::Backend(format!(
                "position {user_id}/{market_id}: unfreeze exceeds pending NO"
            )));
        }
        pos.no_pending_sell.0 -= qty.0;
        pos.version += 1;
        Ok(pos.clone())
    }

    async fn apply_yes_delta(
        &self,
        user_id: &str,
        market_id: &str,
        volume_delta: i64,
        cost_sum_delta: i64,
        pending_sell_delta: i64,
    ) -> StoreResult<Position> {
        let mut positions = self.positions.lock().await;
        let pos = entry_position(&mut positions, user_id, market_id);
        pos.yes_volume.0 = apply_i64(pos.yes_volume.0, volume_delta)?;
        pos.yes_cost_sum.0 += cost_sum_delta;
        pos.yes_pending_sell.0 = apply_i64(pos.yes_pending_sell.0, pending_sell_delta)?;
        pos.version += 1;
        Ok(pos.clone())
    }

    async fn apply_no_delta(
        &self,
        user_id: &str,
        market_id: &str,
        volume_delta: i64,
        cost_sum_delta: i64,
        pending_sell_delta: i64,
    ) -> StoreResult<Position> {
        let mut positions = self.positions.lock().await;
        let pos = entry_position(&mut positions, user_id, market_id);
        pos.no_volume.0 = apply_i64(pos.no_volume.0, volume_delta)?;
        pos.no_cost_sum.0 += cost_sum_delta;
        pos.no_pending_sell.0 = apply_i64(pos.no_pending_sell.0, pending_sell_delta)?;
        pos.version += 1;
        Ok(pos.clone())
    }

    async fn zero(&self, user_id: &str, market_id: &str) -> StoreResult<Position> {
        let mut positions = self.positions.lock().await;
        let pos = entry_position(&mut positions, user_id, market_id);
        pos.yes_volume = Quantity::ZERO;
        pos.yes_cost_sum = Cents::ZERO;
        pos.yes_pending_sell = Quantity::ZERO;
        pos.no_volume = Quantity::ZERO;
        pos.no_cost_sum = Cents::ZERO;
        pos.no_pending_sell = Quantity::ZERO;
        pos.version += 1;
        Ok(pos.clone())
    }

    async fn list_positions_for_market(&self, market_id: &str) -> StoreResult<Vec<Position>> {
        let positions = self.positions.lock().await;
        Ok(positions
            .values()
            .filter(|p| p.market_id == market_id)
            .cloned()
            .collect())
    }
}

fn apply_i64(current: u32, delta: i64) -> StoreResult<u32> {
    let updated = current as i64 + delta;
    if updated < 0 {
        return Err(StoreError::Backend(
            "position delta would go negative".to_string(),
        ));
    }
    Ok(updated as u32)
}

fn entry_position<'a>(
    positions: &'a mut HashMap<(String, String), Position>,
    user_id: &str,
    market_id: &str,
) -> &'a mut Position {
    positions
        .entry((user_id.to_string(), market_id.to_string()))
        .or_insert_with(|| Position::new(user_id, market_id, Utc::now()))
}

impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: Order) -> StoreResult<Order> {
        let mut orders = self.orders.lock().await;
        let mut by_client = self.orders_by_client.lock().await;
        by_client.insert(
            (order.user_id.clone(), order.client_order_id.clone()),
            order.order_id.clone(),
        );
        orders.insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: &str) -> StoreResult<Order> {
        let orders = self.orders.lock().await;
        orders.get(order_id).cloned().ok_or_else(|| StoreError::RowNotFound {
            entity: "order",
            id: order_id.to_string(),
        })
    }

    async fn find_by_client_order_id(&self, user_id: &str, client_order_id: &str) -> StoreResult<Option<Order>> {
        let by_client = self.orders_by_client.lock().await;
        let orders = self.orders.lock().await;
        Ok(by_client
            .get(&(user_id.to_string(), client_order_id.to_string()))
            .and_then(|order_id| orders.get(order_id))
            .cloned())
    }

    async fn update(&self, order: Order) -> StoreResult<Order> {
        let mut orders = self.orders.lock().await;
        orders.insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    async fn list_open_for_market(&self, market_id: &str) -> StoreResult<Vec<Order>> {
        let orders = self.orders.lock().await;
        let mut matching: Vec<Order> = orders
            .values()
            .filter(|o| o.market_id == market_id && o.is_active())
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    async fn list_active_for_user(&self, market_id: &str, user_id: &str) -> StoreResult<Vec<Order>> {
        let orders = self.orders.lock().await;
        Ok(orders
            .values()
            .filter(|o| o.market_id == market_id && o.user_id == user_id && o.is_active())
            .cloned()
            .collect())
    }
}

impl MarketStore for InMemoryStore {
    async fn get_market(&self, market_id: &str) -> StoreResult<Market> {
        let markets = self.markets.lock().await;
        markets.get(market_id).cloned().ok_or_else(|| StoreError::RowNotFound {
            entity: "market",
            id: market_id.to_string(),
        })
    }

    async fn create(&self, market: Market) -> StoreResult<Market> {
        let mut markets = self.markets.lock().await;
        markets.insert(market.market_id.clone(), market.clone());
        Ok(market)
    }

    async fn get_for_update(&self, market_id: &str) -> StoreResult<Market> {
        // The in-memory store has no separate row-lock primitive; callers
        // (the engine) already hold the per-market mutex before reaching
        // here, so a plain read has the same exclusivity a real
        // `SELECT ... FOR UPDATE` would give under that mutex.
        self.get_market(market_id).await
    }

    async fn save(&self, market: Market) -> StoreResult<Market> {
        let mut markets = self.markets.lock().await;
        markets.insert(market.market_id.clone(), market.clone());
        Ok(market)
    }
}

impl LedgerStore for InMemoryStore {
    async fn append(&self, entry: NewLedgerEntry, now: DateTime<Utc>) -> StoreResult<LedgerEntry> {
        let mut table = self.ledger.lock().await;
        table.next_id += 1;
        let row = LedgerEntry {
            id: table.next_id,
            user_id: entry.user_id,
            entry_type: entry.entry_type,
            amount: entry.amount,
            balance_after: entry.balance_after,
            reference_type: entry.reference_type,
            reference_id: entry.reference_id,
            description: entry.description,
            created_at: now,
        };
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn list(
        &self,
        user_id: &str,
        after: Option<u64>,
        entry_type: Option<LedgerEntryType>,
        limit: usize,
    ) -> StoreResult<LedgerPage> {
        let table = self.ledger.lock().await;
        let cursor = after.unwrap_or(u64::MAX);
        let mut matching: Vec<LedgerEntry> = table
            .rows
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id && e.id < cursor)
            .filter(|e| entry_type.map(|t| t == e.entry_type).unwrap_or(true))
            .take(limit + 1)
            .cloned()
            .collect();
        let next_cursor = if matching.len() > limit {
            matching.pop();
            matching.last().map(|e| e.id)
        } else {
            None
        };
        Ok(LedgerPage {
            entries: matching,
            next_cursor,
        })
    }
}

impl WalStore for InMemoryStore {
    async fn record(&self, event: NewWalEvent, now: DateTime<Utc>) -> StoreResult<()> {
        let mut wal = self.wal.lock().await;
        let id = wal.len() as u64 + 1;
        wal.push(WalEvent {
            id,
            market_id: event.market_id,
            order_id: event.order_id,
            kind: event.kind,
            payload: event.payload,
            created_at: now,
        });
        Ok(())
    }
}

impl TradeStore for InMemoryStore {
    async fn insert_trade(&self, mut trade: Trade) -> StoreResult<Trade> {
        let mut table = self.trades.lock().await;
        table.next_id += 1;
        trade.id = table.next_id;
        table
            .by_market
            .entry(trade.market_id.clone())
            .or_default()
            .push(trade.id);
        table.rows.insert(trade.id, trade.clone());
        Ok(trade)
    }

    async fn list_trades_for_market(&self, market_id: &str) -> StoreResult<Vec<Trade>> {
        let table = self.trades.lock().await;
        Ok(table
            .by_market
            .get(market_id)
            .map(|ids| ids.iter().filter_map(|id| table.rows.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn insert_trade_with_reference(&self, trade: Trade, reference_type: &str, reference_id: &str) -> StoreResult<Trade> {
        let mut table = self.trades.lock().await;
        if trade.id > table.next_id {
            table.next_id = trade.id;
        }
        table
            .by_market
            .entry(trade.market_id.clone())
            .or_default()
            .push(trade.id);
        table
            .by_reference
            .insert((reference_type.to_string(), reference_id.to_string()), trade.id);
        table.rows.insert(trade.id, trade.clone());
        Ok(trade)
    }

    async fn find_by_reference(&self, reference_type: &str, reference_id: &str) -> StoreResult<Option<Trade>> {
        let table = self.trades.lock().await;
        Ok(table
            .by_reference
            .get(&(reference_type.to_string(), reference_id.to_string()))
            .and_then(|id| table.rows.get(id).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deposit_then_withdraw_round_trips() {
        let store = InMemoryStore::new();
        store.deposit("alice", Cents(1000), Utc::now()).await.unwrap();
        let acct = store.withdraw("alice", Cents(400), Utc::now()).await.unwrap();
        assert_eq!(acct.available_balance, Cents(600));
    }

    #[tokio::test]
    async fn withdraw_more_than_available_is_rejected() {
        let store = InMemoryStore::new();
        store.deposit("alice", Cents(100), Utc::now()).await.unwrap();
        let result = store.withdraw("alice", Cents(500), Utc::now()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn freeze_then_unfreeze_funds_round_trips() {
        let store = InMemoryStore::new();
        store.deposit("alice", Cents(1000), Utc::now()).await.unwrap();
        store.freeze_funds("alice", Cents(300), "o1", Utc::now()).await.unwrap();
        let acct = store.unfreeze_funds("alice", Cents(300), "o1", Utc::now()).await.unwrap();
        assert_eq!(acct.available_balance, Cents(1000));
        assert_eq!(acct.frozen_balance, Cents::ZERO);
    }

    #[tokio::test]
    async fn ledger_pagination_is_descending_by_id() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .append(
                    NewLedgerEntry {
                        user_id: "alice".to_string(),
                        entry_type: LedgerEntryType::Deposit,
                        amount: Cents(i),
                        balance_after: Cents(i),
                        reference_type: None,
                        reference_id: None,
                        description: None,
                    },
                    Utc::now(),
                )
                .await
                .unwrap();
        }
        let page = store.list("alice", None, None, 3).await.unwrap();
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.entries[0].id, 5);
        assert!(page.next_cursor.is_some());
    }

    #[tokio::test]
    async fn freeze_yes_guards_against_insufficient_shares() {
        let store = InMemoryStore::new();
        store.get_or_create_position("alice", "m1").await.unwrap();
        let result = store.freeze_yes("alice", "m1", Quantity(1)).await;
        assert!(result.is_err());
    }
}
