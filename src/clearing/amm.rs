//! Privileged AMM mint/burn — spec.md §1 ("A privileged 'automated market
//! maker' account ... may directly MINT/BURN contract pairs") and
//! `pm_clearing/domain/{mint_service,burn_service}.py`. Unlike the ordinary
//! clearing handlers (C10), which are only ever reached through a matched
//! fill, these two operations are invoked directly against the AMM account,
//! gated on `AmmOnly` (error 6099) for any other caller, and idempotent on
//! `(reference_type, reference_id)` so a retried call is a no-op.

use chrono::{DateTime, Utc};

use crate::enums::{LedgerEntryType, TradeScenario};
use crate::error::{CoreError, CoreResult, InvariantError, SystemError};
use crate::ledger::NewLedgerEntry;
use crate::market::Market;
use crate::money::{Cents, Price, Quantity};
use crate::store::Store;
use crate::trade::Trade;

/// Fair-value cost basis the AMM books on each side of a privileged mint,
/// the Python's `INITIAL_FAIR_COST_PER_SHARE = 50` (a fresh pair is worth
/// 50/50 YES/NO until the market moves).
const INITIAL_FAIR_COST_PER_SHARE: u8 = 50;
const AMM_REFERENCE_TYPE_MINT: &str = "AMM_MINT";
const AMM_REFERENCE_TYPE_BURN: &str = "AMM_BURN";

fn require_amm(amm_user_id: &str, caller: &str) -> CoreResult<()> {
    if !caller.eq_ignore_ascii_case(amm_user_id) {
        return Err(InvariantError::AmmOnly(caller.to_string()).into());
    }
    Ok(())
}

pub async fn privileged_mint<S: Store>(
    store: &S,
    amm_user_id: &str,
    caller: &str,
    market: &mut Market,
    quantity: Quantity,
    trade_id: u64,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> CoreResult<Trade> {
    require_amm(amm_user_id, caller)?;

    if let Some(existing) = store.find_by_reference(AMM_REFERENCE_TYPE_MINT, idempotency_key).await? {
        return Ok(existing);
    }

    let cost = (quantity.0 as i64)
        .checked_mul(100)
        .map(Cents)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    let cost_half = (quantity.0 as i64)
        .checked_mul(INITIAL_FAIR_COST_PER_SHARE as i64)
        .map(Cents)
        .ok_or(CoreError::from(SystemError::Overflow))?;

    store.debit_available(caller, cost, now).await?;
    store.apply_yes_delta(caller, &market.market_id, quantity.0 as i64, cost_half.0, 0).await?;
    store.apply_no_delta(caller, &market.market_id, quantity.0 as i64, cost_half.0, 0).await?;

    market.reserve_balance = market
        .reserve_balance
        .checked_add(cost)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    market.total_yes_shares = market
        .total_yes_shares
        .checked_add(quantity)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    market.total_no_shares = market
        .total_no_shares
        .checked_add(quantity)
        .ok_or(CoreError::from(SystemError::Overflow))?;

    store
        .append(
            NewLedgerEntry {
                user_id: caller.to_string(),
                entry_type: LedgerEntryType::MintCost,
                amount: -cost,
                balance_after: Cents::ZERO,
                reference_type: Some(AMM_REFERENCE_TYPE_MINT.to_string()),
                reference_id: Some(idempotency_key.to_string()),
                description: None,
            },
            now,
        )
        .await?;
    store
        .append(
            NewLedgerEntry::system(LedgerEntryType::MintReserveIn, cost, idempotency_key),
            now,
        )
        .await?;

    let trade = Trade {
        id: trade_id,
        market_id: market.market_id.clone(),
        maker_order_id: trade_id.to_string(),
        taker_order_id: trade_id.to_string(),
        maker_user_id: crate::ledger::SYSTEM_USER_ID.to_string(),
        taker_user_id: caller.to_string(),
        buy_book_type: crate::enums::BookType::NativeBuy,
        sell_book_type: crate::enums::BookType::SyntheticSell,
        scenario: TradeScenario::Mint,
        price: Price::new(INITIAL_FAIR_COST_PER_SHARE).expect("50 is in [1, 99]"),
        quantity,
        maker_fee: Cents::ZERO,
        taker_fee: Cents::ZERO,
        buyer_realised_pnl: None,
        seller_realised_pnl: None,
        created_at: now,
    };
    store.insert_trade_with_reference(trade.clone(), AMM_REFERENCE_TYPE_MINT, idempotency_key).await?;

    Ok(trade)
}

pub async fn privileged_burn<S: Store>(
    store: &S,
    amm_user_id: &str,
    caller: &str,
    market: &mut Market,
    quantity: Quantity,
    trade_id: u64,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> CoreResult<Trade> {
    require_amm(amm_user_id, caller)?;

    if let Some(existing) = store.find_by_reference(AMM_REFERENCE_TYPE_BURN, idempotency_key).await? {
        return Ok(existing);
    }

    let position = store.get_or_create_position(caller, &market.market_id).await?;
    let max_burnable = position.available_yes().min(position.available_no());
    if quantity > max_burnable {
        return Err(crate::error::PositionError::InsufficientShares {
            side: "YES/NO pair",
            needed: quantity.0,
            available: max_burnable.0,
        }
        .into());
    }

    let yes_cost_released = crate::money::released_cost(position.yes_cost_sum, position.yes_volume, quantity);
    let no_cost_released = crate::money::released_cost(position.no_cost_sum, position.no_volume, quantity);
    let recovery = (quantity.0 as i64)
        .checked_mul(100)
        .map(Cents)
        .ok_or(CoreError::from(SystemError::Overflow))?;

    store
        .apply_yes_delta(caller, &market.market_id, -(quantity.0 as i64), -yes_cost_released.0, 0)
        .await?;
    store
        .apply_no_delta(caller, &market.market_id, -(quantity.0 as i64), -no_cost_released.0, 0)
        .await?;
    store.credit_available(caller, recovery, now).await?;

    market.reserve_balance = market
        .reserve_balance
        .checked_sub(recovery)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    market.total_yes_shares = market
        .total_yes_shares
        .checked_sub(quantity)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    market.total_no_shares = market
        .total_no_shares
        .checked_sub(quantity)
        .ok_or(CoreError::from(SystemError::Overflow))?;

    store
        .append(
            NewLedgerEntry {
                user_id: caller.to_string(),
                entry_type: LedgerEntryType::BurnRevenue,
                amount: recovery,
                balance_after: Cents::ZERO,
                reference_type: Some(AMM_REFERENCE_TYPE_BURN.to_string()),
                reference_id: Some(idempotency_key.to_string()),
                description: None,
            },
            now,
        )
        .await?;
    store
        .append(
            NewLedgerEntry::system(LedgerEntryType::BurnReserveOut, -recovery, idempotency_key),
            now,
        )
        .await?;

    let trade = Trade {
        id: trade_id,
        market_id: market.market_id.clone(),
        maker_order_id: trade_id.to_string(),
        taker_order_id: trade_id.to_string(),
        maker_user_id: caller.to_string(),
        taker_user_id: crate::ledger::SYSTEM_USER_ID.to_string(),
        buy_book_type: crate::enums::BookType::SyntheticBuy,
        sell_book_type: crate::enums::BookType::NativeSell,
        scenario: TradeScenario::Burn,
        price: Price::new(INITIAL_FAIR_COST_PER_SHARE).expect("50 is in [1, 99]"),
        quantity,
        maker_fee: Cents::ZERO,
        taker_fee: Cents::ZERO,
        buyer_realised_pnl: None,
        seller_realised_pnl: None,
        created_at: now,
    };
    store.insert_trade_with_reference(trade.clone(), AMM_REFERENCE_TYPE_BURN, idempotency_key).await?;

    Ok(trade)
}
