//! Postgres-backed store, issuing the SQL shapes spec.md §6 requires and
//! `examples/original_source/src/pm_account/infrastructure/persistence.py`
//! (and the sibling `pm_market`/`pm_order`/`pm_clearing` persistence
//! modules) actually ran: conditional `UPDATE ... WHERE ... RETURNING`,
//! `SELECT ... FOR UPDATE`, `INSERT ... ON CONFLICT ... DO UPDATE`.
//! Schema/migration management (`alembic` in the original) is out of
//! scope — this module assumes the tables of spec.md §3/§6 already exist.
//!
//! `sqlx`'s runtime query API is used throughout rather than the
//! compile-time-checked `query!` macros, since the latter need a live
//! database reachable at build time.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::str::FromStr;

use crate::account::Account;
use crate::enums::{
    BookDirection, BookType, FrozenAssetType, LedgerEntryType, MarketStatus, OrderDirection,
    OrderStatus, OriginalSide, ResolutionResult, TimeInForce,
};
use crate::error::StoreError;
use crate::ledger::{LedgerEntry, LedgerPage, NewLedgerEntry};
use crate::market::Market;
use crate::money::{Bps, Cents, Price, Quantity};
use crate::order::Order;
use crate::position::Position;
use crate::store::{AccountStore, LedgerStore, MarketStore, OrderStore, PositionStore, StoreResult, TradeStore, WalStore};
use crate::trade::Trade;
use crate::wal::NewWalEvent;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresStore { pool }
    }
}

fn backend_err(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn row_not_found(entity: &'static str, id: &str) -> StoreError {
    StoreError::RowNotFound {
        entity,
        id: id.to_string(),
    }
}

fn account_from_row(row: sqlx::postgres::PgRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        user_id: row.try_get("user_id")?,
        available_balance: Cents(row.try_get("available_balance")?),
        frozen_balance: Cents(row.try_get("frozen_balance")?),
        version: row.try_get("version")?,
        auto_netting_enabled: row.try_get("auto_netting_enabled")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl AccountStore for PostgresStore {
    async fn get_or_create_account(&self, user_id: &str, auto_netting_enabled: bool) -> StoreResult<Account> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (user_id, available_balance, frozen_balance, version, auto_netting_enabled, updated_at)
            VALUES ($1, 0, 0, 0, $2, now())
            ON CONFLICT (user_id) DO UPDATE SET user_id = accounts.user_id
            RETURNING user_id, available_balance, frozen_balance, version, auto_netting_enabled, updated_at
            "#,
        )
        .bind(user_id)
        .bind(auto_netting_enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        account_from_row(row).map_err(backend_err)
    }

    async fn deposit(&self, user_id: &str, amount: Cents, _now: DateTime<Utc>) -> StoreResult<Account> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET available_balance = available_balance + $2,
                version = version + 1,
                updated_at = now()
            WHERE user_id = $1
            RETURNING user_id, available_balance, frozen_balance, version, auto_netting_enabled, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| row_not_found("account", user_id))?;
        account_from_row(row).map_err(backend_err)
    }

    async fn withdraw(&self, user_id: &str, amount: Cents, _now: DateTime<Utc>) -> StoreResult<Account> {
        // The guard and the mutation are one conditional UPDATE; a zero-row
        // result is the failure signal (spec.md §4.3), not a separate check.
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET available_balance = available_balance - $2,
                version = version + 1,
                updated_at = now()
            WHERE user_id = $1 AND available_balance >= $2
            RETURNING user_id, available_balance, frozen_balance, version, auto_netting_enabled, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| StoreError::Backend(format!("account {user_id}: insufficient available balance")))?;
        account_from_row(row).map_err(backend_err)
    }

    async fn freeze_funds(
        &self,
        user_id: &str,
        amount: Cents,
        _reference_id: &str,
        _now: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET available_balance = available_balance - $2,
                frozen_balance = frozen_balance + $2,
                version = version + 1,
                updated_at = now()
            WHERE user_id = $1 AND available_balance >= $2
            RETURNING user_id, available_balance, frozen_balance, version, auto_netting_enabled, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| StoreError::Backend(format!("account {user_id}: insufficient available balance to freeze")))?;
        account_from_row(row).map_err(backend_err)
    }

    async fn unfreeze_funds(
        &self,
        user_id: &str,
        amount: Cents,
        _reference_id: &str,
        _now: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET available_balance = available_balance + $2,
                frozen_balance = frozen_balance - $2,
                version = version + 1,
                updated_at = now()
            WHERE user_id = $1 AND frozen_balance >= $2
            RETURNING user_id, available_balance, frozen_balance, version, auto_netting_enabled, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| StoreError::Backend(format!("account {user_id}: insufficient frozen balance to unfreeze")))?;
        account_from_row(row).map_err(backend_err)
    }

    async fn credit_available(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account> {
        self.deposit(user_id, amount, now).await
    }

    async fn debit_available(&self, user_id: &str, amount: Cents, now: DateTime<Utc>) -> StoreResult<Account> {
        self.withdraw(user_id, amount, now).await
    }

    async fn debit_frozen(&self, user_id: &str, amount: Cents, _now: DateTime<Utc>) -> StoreResult<Account> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET frozen_balance = frozen_balance - $2,
                version = version + 1,
                updated_at = now()
            WHERE user_id = $1 AND frozen_balance >= $2
            RETURNING user_id, available_balance, frozen_balance, version, auto_netting_enabled, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| StoreError::Backend(format!("account {user_id}: insufficient frozen balance")))?;
        account_from_row(row).map_err(backend_err)
    }
}

fn position_from_row(row: sqlx::postgres::PgRow) -> Result<Position, sqlx::Error> {
    Ok(Position {
        user_id: row.try_get("user_id")?,
        market_id: row.try_get("market_id")?,
        yes_volume: Quantity(row.try_get::<i64, _>("yes_volume")? as u32),
        yes_cost_sum: Cents(row.try_get("yes_cost_sum")?),
        yes_pending_sell: Quantity(row.try_get::<i64, _>("yes_pending_sell")? as u32),
        no_volume: Quantity(row.try_get::<i64, _>("no_volume")? as u32),
        no_cost_sum: Cents(row.try_get("no_cost_sum")?),
        no_pending_sell: Quantity(row.try_get::<i64, _>("no_pending_sell")? as u32),
        version: row.try_get("version")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PositionStore for PostgresStore {
    async fn get_or_create_position(&self, user_id: &str, market_id: &str) -> StoreResult<Position> {
        let row = sqlx::query(
            r#"
            INSERT INTO positions (user_id, market_id, yes_volume, yes_cost_sum, yes_pending_sell, no_volume, no_cost_sum, no_pending_sell, version, updated_at)
            VALUES ($1, $2, 0, 0, 0, 0, 0, 0, 0, now())
            ON CONFLICT (user_id, market_id) DO UPDATE SET user_id = positions.user_id
            RETURNING user_id, market_id, yes_volume, yes_cost_sum, yes_pending_sell, no_volume, no_cost_sum, no_pending_sell, version, updated_at
            "#,
        )
        .bind(user_id)
        .bind(market_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        position_from_row(row).map_err(backend_err)
    }

    async fn freeze_yes(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position> {
        let row = sqlx::query(
            r#"
            UPDATE positions
            SET yes_pending_sell = yes_pending_sell + $3, version = version + 1, updated_at = now()
            WHERE user_id = $1 AND market_id = $2 AND yes_volume - yes_pending_sell >= $3
            RETURNING user_id, market_id, yes_volume, yes_cost_sum, yes_pending_sell, no_volume, no_cost_sum, no_pending_sell, version, updated_at
            "#,
        )
        .bind(user_id)
        .bind(market_id)
        .bind(qty.0 as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| StoreError::Backend(format!("position {user_id}/{market_id}: insufficient available YES shares")))?;
        position_from_row(row).map_err(backend_err)
    }

    async fn freeze_no(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position> {
        let row = sqlx::query(
            r#"
            UPDATE positions
            SET no_pending_sell = no_pending_sell + $3, version = version + 1, updated_at = now()
            WHERE user_id = $1 AND market_id = $2 AND no_volume - no_pending_sell >= $3
            RETURNING user_id, market_id, yes_volume, yes_cost_sum, yes_pending_sell, no_volume, no_cost_sum, no_pending_sell, version, updated_at
            "#,
        )
        .bind(user_id)
        .bind(market_id)
        .bind(qty.0 as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| StoreError::Backend(format!("position {user_id}/{market_id}: insufficient available NO shares")))?;
        position_from_row(row).map_err(backend_err)
    }

    async fn unfreeze_yes(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position> {
        let row = sqlx::query(
            r#"
            UPDATE positions
            SET yes_pending_sell = yes_pending_sell - $3, version = version + 1, updated_at = now()
            WHERE user_id = $1 AND market_id = $2 AND yes_pending_sell >= $3
            RETURNING user_id, market_id, yes_volume, yes_cost_sum, yes_pending_sell, no_volume, no_cost_sum, no_pending_sell, version, updated_at
            "#,
        )
        .bind(user_id)
        .bind(market_id)
        .bind(qty.0 as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| StoreError::Backend(format!("position {user_id}/{market_id}: unfreeze exceeds pending YES")))?;
        position_from_row(row).map_err(backend_err)
    }

    async fn unfreeze_no(&self, user_id: &str, market_id: &str, qty: Quantity) -> StoreResult<Position> {
        let row = sqlx::query(
            r#"
            UPDATE positions
            SET no_pending_sell = no_pending_sell - $3, version = version + 1, updated_at = now()
            WHERE user_id = $1 AND market_id = $2 AND no_pending_sell >= $3
            RETURNING user_id, market_id, yes_volume, yes_cost_sum, yes_pending_sell, no_volume, no_cost_sum, no_pending_sell, version, updated_at
            "#,
        )
        .bind(user_id)
        .bind(market_id)
        .bind(qty.0 as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| StoreError::Backend(format!("position {user_id}/{market_id}: unfreeze exceeds pending NO")))?;
        position_from_row(row).map_err(backend_err)
    }

    async fn apply_yes_delta(
        &self,
        user_id: &str,
        market_id: &str,
        volume_delta: i64,
        cost_sum_delta: i64,
        pending_sell_delta: i64,
    ) -> StoreResult<Position> {
        let row = sqlx::query(
            r#"
            UPDATE positions
            SET yes_volume = yes_volume + $3,
                yes_cost_sum = yes_cost_sum + $4,
                yes_pending_sell = yes_pending_sell + $5,
                version = version + 1,
                updated_at = now()
            WHERE user_id = $1 AND market_id = $2
            RETURNING user_id, market_id, yes_volume, yes_cost_sum, yes_pending_sell, no_volume, no_cost_sum, no_pending_sell, version, updated_at
            "#,
        )
        .bind(user_id)
        .bind(market_id)
        .bind(volume_delta)
        .bind(cost_sum_delta)
        .bind(pending_sell_delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| row_not_found("position", &format!("{user_id}/{market_id}")))?;
        position_from_row(row).map_err(backend_err)
    }

    async fn apply_no_delta(
        &self,
        user_id: &str,
        market_id: &str,
        volume_delta: i64,
        cost_sum_delta: i64,
        pending_sell_delta: i64,
    ) -> StoreResult<Position> {
        let row = sqlx::query(
            r#"
            UPDATE positions
            SET no_volume = no_volume + $3,
                no_cost_sum = no_cost_sum + $4,
                no_pending_sell = no_pending_sell + $5,
                version = version + 1,
                updated_at = now()
            WHERE user_id = $1 AND market_id = $2
            RETURNING user_id, market_id, yes_volume, yes_cost_sum, yes_pending_sell, no_volume, no_cost_sum, no_pending_sell, version, updated_at
            "#,
        )
        .bind(user_id)
        .bind(market_id)
        .bind(volume_delta)
        .bind(cost_sum_delta)
        .bind(pending_sell_delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| row_not_found("position", &format!("{user_id}/{market_id}")))?;
        position_from_row(row).map_err(backend_err)
    }

    async fn zero(&self, user_id: &str, market_id: &str) -> StoreResult<Position> {
        let row = sqlx::query(
            r#"
            UPDATE positions
            SET yes_volume = 0, yes_cost_sum = 0, yes_pending_sell = 0,
                no_volume = 0, no_cost_sum = 0, no_pending_sell = 0,
                version = version + 1, updated_at = now()
            WHERE user_id = $1 AND market_id = $2
            RETURNING user_id, market_id, yes_volume, yes_cost_sum, yes_pending_sell, no_volume, no_cost_sum, no_pending_sell, version, updated_at
            "#,
        )
        .bind(user_id)
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| row_not_found("position", &format!("{user_id}/{market_id}")))?;
        position_from_row(row).map_err(backend_err)
    }

    async fn list_positions_for_market(&self, market_id: &str) -> StoreResult<Vec<Position>> {
        let rows = sqlx::query(
            r#"SELECT user_id, market_id, yes_volume, yes_cost_sum, yes_pending_sell, no_volume, no_cost_sum, no_pending_sell, version, updated_at
               FROM positions WHERE market_id = $1"#,
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter()
            .map(|r| position_from_row(r).map_err(backend_err))
            .collect()
    }
}

fn order_from_row(row: sqlx::postgres::PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_id: row.try_get("order_id")?,
        market_id: row.try_get("market_id")?,
        user_id: row.try_get("user_id")?,
        client_order_id: row.try_get("client_order_id")?,
        original_side: parse_enum(row.try_get::<String, _>("original_side")?),
        original_direction: parse_enum(row.try_get::<String, _>("original_direction")?),
        original_price: Price::new(row.try_get::<i32, _>("original_price")? as u8).expect("stored price in range"),
        book_type: parse_enum(row.try_get::<String, _>("book_type")?),
        book_direction: parse_enum(row.try_get::<String, _>("book_direction")?),
        book_price: Price::new(row.try_get::<i32, _>("book_price")? as u8).expect("stored price in range"),
        quantity: Quantity(row.try_get::<i64, _>("quantity")? as u32),
        filled_quantity: Quantity(row.try_get::<i64, _>("filled_quantity")? as u32),
        frozen_amount: Cents(row.try_get("frozen_amount")?),
        frozen_asset_type: row
            .try_get::<Option<String>, _>("frozen_asset_type")?
            .map(parse_enum),
        time_in_force: parse_enum(row.try_get::<String, _>("time_in_force")?),
        status: parse_enum(row.try_get::<String, _>("status")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_enum<T: FromStr>(raw: String) -> T
where
    T::Err: std::fmt::Debug,
{
    T::from_str(&raw).expect("stored enum text matches a known variant")
}

impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: Order) -> StoreResult<Order> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders (
                order_id, market_id, user_id, client_order_id,
                original_side, original_direction, original_price,
                book_type, book_direction, book_price,
                quantity, filled_quantity, frozen_amount, frozen_asset_type,
                time_in_force, status, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
            RETURNING order_id, market_id, user_id, client_order_id,
                original_side, original_direction, original_price,
                book_type, book_direction, book_price,
                quantity, filled_quantity, frozen_amount, frozen_asset_type,
                time_in_force, status, created_at, updated_at
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.market_id)
        .bind(&order.user_id)
        .bind(&order.client_order_id)
        .bind(order.original_side.to_string())
        .bind(order.original_direction.to_string())
        .bind(order.original_price.get() as i32)
        .bind(order.book_type.to_string())
        .bind(order.book_direction.to_string())
        .bind(order.book_price.get() as i32)
        .bind(order.quantity.0 as i64)
        .bind(order.filled_quantity.0 as i64)
        .bind(order.frozen_amount.0)
        .bind(order.frozen_asset_type.map(|a| a.to_string()))
        .bind(order.time_in_force.to_string())
        .bind(order.status.to_string())
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        order_from_row(row).map_err(backend_err)
    }

    async fn get_order(&self, order_id: &str) -> StoreResult<Order> {
        let row = sqlx::query(
            r#"SELECT order_id, market_id, user_id, client_order_id,
                original_side, original_direction, original_price,
                book_type, book_direction, book_price,
                quantity, filled_quantity, frozen_amount, frozen_asset_type,
                time_in_force, status, created_at, updated_at
               FROM orders WHERE order_id = $1"#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| row_not_found("order", order_id))?;
        order_from_row(row).map_err(backend_err)
    }

    async fn find_by_client_order_id(&self, user_id: &str, client_order_id: &str) -> StoreResult<Option<Order>> {
        let row = sqlx::query(
            r#"SELECT order_id, market_id, user_id, client_order_id,
                original_side, original_direction, original_price,
                book_type, book_direction, book_price,
                quantity, filled_quantity, frozen_amount, frozen_asset_type,
                time_in_force, status, created_at, updated_at
               FROM orders WHERE user_id = $1 AND client_order_id = $2"#,
        )
        .bind(user_id)
        .bind(client_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;
        row.map(|r| order_from_row(r).map_err(backend_err)).transpose()
    }

    async fn update(&self, order: Order) -> StoreResult<Order> {
        let row = sqlx::query(
            r#"
            UPDATE orders
            SET filled_quantity = $2, status = $3, frozen_amount = $4, frozen_asset_type = $5, updated_at = $6
            WHERE order_id = $1
            RETURNING order_id, market_id, user_id, client_order_id,
                original_side, original_direction, original_price,
                book_type, book_direction, book_price,
                quantity, filled_quantity, frozen_amount, frozen_asset_type,
                time_in_force, status, created_at, updated_at
            "#,
        )
        .bind(&order.order_id)
        .bind(order.filled_quantity.0 as i64)
        .bind(order.status.to_string())
        .bind(order.frozen_amount.0)
        .bind(order.frozen_asset_type.map(|a| a.to_string()))
        .bind(order.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| row_not_found("order", &order.order_id))?;
        order_from_row(row).map_err(backend_err)
    }

    async fn list_open_for_market(&self, market_id: &str) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(
            r#"SELECT order_id, market_id, user_id, client_order_id,
                original_side, original_direction, original_price,
                book_type, book_direction, book_price,
                quantity, filled_quantity, frozen_amount, frozen_asset_type,
                time_in_force, status, created_at, updated_at
               FROM orders
               WHERE market_id = $1 AND status IN ('OPEN', 'PARTIALLY_FILLED')
               ORDER BY created_at ASC"#,
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter().map(|r| order_from_row(r).map_err(backend_err)).collect()
    }

    async fn list_active_for_user(&self, market_id: &str, user_id: &str) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(
            r#"SELECT order_id, market_id, user_id, client_order_id,
                original_side, original_direction, original_price,
                book_type, book_direction, book_price,
                quantity, filled_quantity, frozen_amount, frozen_asset_type,
                time_in_force, status, created_at, updated_at
               FROM orders
               WHERE market_id = $1 AND user_id = $2 AND status IN ('OPEN', 'PARTIALLY_FILLED')"#,
        )
        .bind(market_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter().map(|r| order_from_row(r).map_err(backend_err)).collect()
    }
}

fn market_from_row(row: sqlx::postgres::PgRow) -> Result<Market, sqlx::Error> {
    Ok(Market {
        market_id: row.try_get("market_id")?,
        status: parse_enum(row.try_get::<String, _>("status")?),
        min_price: row.try_get::<i32, _>("min_price")? as u8,
        max_price: row.try_get::<i32, _>("max_price")? as u8,
        max_order_quantity: row.try_get::<i64, _>("max_order_quantity")? as u32,
        max_position_quantity: row.try_get::<i64, _>("max_position_quantity")? as u32,
        max_order_notional_cents: row.try_get("max_order_notional_cents")?,
        maker_fee_bps: Bps(row.try_get::<i32, _>("maker_fee_bps")? as u32),
        taker_fee_bps: Bps(row.try_get::<i32, _>("taker_fee_bps")? as u32),
        reserve_balance: Cents(row.try_get("reserve_balance")?),
        pnl_pool: Cents(row.try_get("pnl_pool")?),
        total_yes_shares: Quantity(row.try_get::<i64, _>("total_yes_shares")? as u32),
        total_no_shares: Quantity(row.try_get::<i64, _>("total_no_shares")? as u32),
        resolution_result: row
            .try_get::<Option<String>, _>("resolution_result")?
            .map(parse_enum),
        settled_at: row.try_get("settled_at")?,
        version: row.try_get("version")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl MarketStore for PostgresStore {
    async fn get_market(&self, market_id: &str) -> StoreResult<Market> {
        let row = sqlx::query(
            r#"SELECT market_id, status, min_price, max_price, max_order_quantity, max_position_quantity,
                max_order_notional_cents, maker_fee_bps, taker_fee_bps, reserve_balance, pnl_pool,
                total_yes_shares, total_no_shares, resolution_result, settled_at, version, updated_at
               FROM markets WHERE market_id = $1"#,
        )
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| row_not_found("market", market_id))?;
        market_from_row(row).map_err(backend_err)
    }

    async fn create(&self, market: Market) -> StoreResult<Market> {
        let row = sqlx::query(
            r#"
            INSERT INTO markets (
                market_id, status, min_price, max_price, max_order_quantity, max_position_quantity,
                max_order_notional_cents, maker_fee_bps, taker_fee_bps, reserve_balance, pnl_pool,
                total_yes_shares, total_no_shares, resolution_result, settled_at, version, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,0,0,0,0,$10,$11,0,now())
            RETURNING market_id, status, min_price, max_price, max_order_quantity, max_position_quantity,
                max_order_notional_cents, maker_fee_bps, taker_fee_bps, reserve_balance, pnl_pool,
                total_yes_shares, total_no_shares, resolution_result, settled_at, version, updated_at
            "#,
        )
        .bind(&market.market_id)
        .bind(market.status.to_string())
        .bind(market.min_price as i32)
        .bind(market.max_price as i32)
        .bind(market.max_order_quantity as i64)
        .bind(market.max_position_quantity as i64)
        .bind(market.max_order_notional_cents)
        .bind(market.maker_fee_bps.0 as i32)
        .bind(market.taker_fee_bps.0 as i32)
        .bind(market.resolution_result.map(|r| r.to_string()))
        .bind(market.settled_at)
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        market_from_row(row).map_err(backend_err)
    }

    async fn get_for_update(&self, market_id: &str) -> StoreResult<Market> {
        let row = sqlx::query(
            r#"SELECT market_id, status, min_price, max_price, max_order_quantity, max_position_quantity,
                max_order_notional_cents, maker_fee_bps, taker_fee_bps, reserve_balance, pnl_pool,
                total_yes_shares, total_no_shares, resolution_result, settled_at, version, updated_at
               FROM markets WHERE market_id = $1 FOR UPDATE"#,
        )
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| row_not_found("market", market_id))?;
        market_from_row(row).map_err(backend_err)
    }

    async fn save(&self, market: Market) -> StoreResult<Market> {
        let row = sqlx::query(
            r#"
            UPDATE markets
            SET status = $2, reserve_balance = $3, pnl_pool = $4,
                total_yes_shares = $5, total_no_shares = $6,
                resolution_result = $7, settled_at = $8,
                version = version + 1, updated_at = now()
            WHERE market_id = $1
            RETURNING market_id, status, min_price, max_price, max_order_quantity, max_position_quantity,
                max_order_notional_cents, maker_fee_bps, taker_fee_bps, reserve_balance, pnl_pool,
                total_yes_shares, total_no_shares, resolution_result, settled_at, version, updated_at
            "#,
        )
        .bind(&market.market_id)
        .bind(market.status.to_string())
        .bind(market.reserve_balance.0)
        .bind(market.pnl_pool.0)
        .bind(market.total_yes_shares.0 as i64)
        .bind(market.total_no_shares.0 as i64)
        .bind(market.resolution_result.map(|r| r.to_string()))
        .bind(market.settled_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or_else(|| row_not_found("market", &market.market_id))?;
        market_from_row(row).map_err(backend_err)
    }
}

impl LedgerStore for PostgresStore {
    async fn append(&self, entry: NewLedgerEntry, _now: DateTime<Utc>) -> StoreResult<LedgerEntry> {
        // `id` is an auto-incrementing bigserial; no UPDATE/DELETE statement
        // against `ledger_entries` exists anywhere in this module (P8).
        let row = sqlx::query(
            r#"
            INSERT INTO ledger_entries (user_id, entry_type, amount, balance_after, reference_type, reference_id, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            RETURNING id, user_id, entry_type, amount, balance_after, reference_type, reference_id, description, created_at
            "#,
        )
        .bind(&entry.user_id)
        .bind(entry.entry_type.to_string())
        .bind(entry.amount.0)
        .bind(entry.balance_after.0)
        .bind(&entry.reference_type)
        .bind(&entry.reference_id)
        .bind(&entry.description)
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(LedgerEntry {
            id: row.try_get::<i64, _>("id").map_err(backend_err)? as u64,
            user_id: row.try_get("user_id").map_err(backend_err)?,
            entry_type: parse_enum(row.try_get::<String, _>("entry_type").map_err(backend_err)?),
            amount: Cents(row.try_get("amount").map_err(backend_err)?),
            balance_after: Cents(row.try_get("balance_after").map_err(backend_err)?),
            reference_type: row.try_get("reference_type").map_err(backend_err)?,
            reference_id: row.try_get("reference_id").map_err(backend_err)?,
            description: row.try_get("description").map_err(backend_err)?,
            created_at: row.try_get("created_at").map_err(backend_err)?,
        })
    }

    async fn list(
        &self,
        user_id: &str,
        after: Option<u64>,
        entry_type: Option<LedgerEntryType>,
        limit: usize,
    ) -> StoreResult<LedgerPage> {
        let cursor = after.map(|c| c as i64).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, entry_type, amount, balance_after, reference_type, reference_id, description, created_at
            FROM ledger_entries
            WHERE user_id = $1 AND id < $2 AND ($3::text IS NULL OR entry_type = $3)
            ORDER BY id DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(cursor)
        .bind(entry_type.map(|t| t.to_string()))
        .bind(limit as i64 + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        let mut entries: Vec<LedgerEntry> = rows
            .into_iter()
            .map(|row| {
                Ok::<_, sqlx::Error>(LedgerEntry {
                    id: row.try_get::<i64, _>("id")? as u64,
                    user_id: row.try_get("user_id")?,
                    entry_type: parse_enum(row.try_get::<String, _>("entry_type")?),
                    amount: Cents(row.try_get("amount")?),
                    balance_after: Cents(row.try_get("balance_after")?),
                    reference_type: row.try_get("reference_type")?,
                    reference_id: row.try_get("reference_id")?,
                    description: row.try_get("description")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<_, _>>()
            .map_err(backend_err)?;

        let next_cursor = if entries.len() > limit {
            entries.pop();
            entries.last().map(|e| e.id)
        } else {
            None
        };
        Ok(LedgerPage { entries, next_cursor })
    }
}

impl WalStore for PostgresStore {
    async fn record(&self, event: NewWalEvent, _now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wal_events (market_id, order_id, kind, payload, created_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(&event.market_id)
        .bind(&event.order_id)
        .bind(event.kind.to_string())
        .bind(event.payload)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }
}

impl TradeStore for PostgresStore {
    async fn insert_trade(&self, trade: Trade) -> StoreResult<Trade> {
        let row = sqlx::query(
            r#"
            INSERT INTO trades (
                market_id, maker_order_id, taker_order_id, maker_user_id, taker_user_id,
                buy_book_type, sell_book_type, scenario, price, quantity,
                maker_fee, taker_fee, buyer_realised_pnl, seller_realised_pnl, created_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,now())
            RETURNING id, created_at
            "#,
        )
        .bind(&trade.market_id)
        .bind(&trade.maker_order_id)
        .bind(&trade.taker_order_id)
        .bind(&trade.maker_user_id)
        .bind(&trade.taker_user_id)
        .bind(trade.buy_book_type.to_string())
        .bind(trade.sell_book_type.to_string())
        .bind(trade.scenario.to_string())
        .bind(trade.price.get() as i32)
        .bind(trade.quantity.0 as i64)
        .bind(trade.maker_fee.0)
        .bind(trade.taker_fee.0)
        .bind(trade.buyer_realised_pnl.map(|c| c.0))
        .bind(trade.seller_realised_pnl.map(|c| c.0))
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(Trade {
            id: row.try_get::<i64, _>("id").map_err(backend_err)? as u64,
            created_at: row.try_get("created_at").map_err(backend_err)?,
            ..trade
        })
    }

    async fn insert_trade_with_reference(&self, trade: Trade, reference_type: &str, reference_id: &str) -> StoreResult<Trade> {
        let row = sqlx::query(
            r#"
            INSERT INTO trades (
                market_id, maker_order_id, taker_order_id, maker_user_id, taker_user_id,
                buy_book_type, sell_book_type, scenario, price, quantity,
                maker_fee, taker_fee, buyer_realised_pnl, seller_realised_pnl,
                reference_type, reference_id, created_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,now())
            RETURNING id, created_at
            "#,
        )
        .bind(&trade.market_id)
        .bind(&trade.maker_order_id)
        .bind(&trade.taker_order_id)
        .bind(&trade.maker_user_id)
        .bind(&trade.taker_user_id)
        .bind(trade.buy_book_type.to_string())
        .bind(trade.sell_book_type.to_string())
        .bind(trade.scenario.to_string())
        .bind(trade.price.get() as i32)
        .bind(trade.quantity.0 as i64)
        .bind(trade.maker_fee.0)
        .bind(trade.taker_fee.0)
        .bind(trade.buyer_realised_pnl.map(|c| c.0))
        .bind(trade.seller_realised_pnl.map(|c| c.0))
        .bind(reference_type)
        .bind(reference_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(Trade {
            id: row.try_get::<i64, _>("id").map_err(backend_err)? as u64,
            created_at: row.try_get("created_at").map_err(backend_err)?,
            ..trade
        })
    }

    async fn list_trades_for_market(&self, market_id: &str) -> StoreResult<Vec<Trade>> {
        let rows = sqlx::query(
            r#"SELECT id, market_id, maker_order_id, taker_order_id, maker_user_id, taker_user_id,
                buy_book_type, sell_book_type, scenario, price, quantity,
                maker_fee, taker_fee, buyer_realised_pnl, seller_realised_pnl, created_at
               FROM trades WHERE market_id = $1 ORDER BY id ASC"#,
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter().map(trade_from_row).collect::<Result<_, _>>().map_err(backend_err)
    }

    async fn find_by_reference(&self, reference_type: &str, reference_id: &str) -> StoreResult<Option<Trade>> {
        let row = sqlx::query(
            r#"SELECT id, market_id, maker_order_id, taker_order_id, maker_user_id, taker_user_id,
                buy_book_type, sell_book_type, scenario, price, quantity,
                maker_fee, taker_fee, buyer_realised_pnl, seller_realised_pnl, created_at
               FROM trades WHERE reference_type = $1 AND reference_id = $2 LIMIT 1"#,
        )
        .bind(reference_type)
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;
        row.map(trade_from_row).transpose().map_err(backend_err)
    }
}

fn trade_from_row(row: sqlx::postgres::PgRow) -> Result<Trade, sqlx::Error> {
    Ok(Trade {
        id: row.try_get::<i64, _>("id")? as u64,
        market_id: row.try_get("market_id")?,
        maker_order_id: row.try_get("maker_order_id")?,
        taker_order_id: row.try_get("taker_order_id")?,
        maker_user_id: row.try_get("maker_user_id")?,
        taker_user_id: row.try_get("taker_user_id")?,
        buy_book_type: parse_enum(row.try_get::<String, _>("buy_book_type")?),
        sell_book_type: parse_enum(row.try_get::<String, _>("sell_book_type")?),
        scenario: parse_enum(row.try_get::<String, _>("scenario")?),
        price: Price::new(row.try_get::<i32, _>("price")? as u8).expect("stored price in range"),
        quantity: Quantity(row.try_get::<i64, _>("quantity")? as u32),
        maker_fee: Cents(row.try_get("maker_fee")?),
        taker_fee: Cents(row.try_get("taker_fee")?),
        buyer_realised_pnl: row.try_get::<Option<i64>, _>("buyer_realised_pnl")?.map(Cents),
        seller_realised_pnl: row.try_get::<Option<i64>, _>("seller_realised_pnl")?.map(Cents),
        created_at: row.try_get("created_at")?,
    })
}
