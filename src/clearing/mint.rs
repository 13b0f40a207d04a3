//! MINT (C10) — a fresh YES/NO pair comes into existence, grounded on
//! `pm_clearing/domain/scenarios/mint.py::clear_mint`. Buyer is the
//! NATIVE_BUY side (a YES buyer); seller is the SYNTHETIC_SELL side (a NO
//! buyer resting as a synthetic sell of YES).

use chrono::{DateTime, Utc};

use crate::clearing::ClearingOutcome;
use crate::enums::LedgerEntryType;
use crate::error::{CoreError, CoreResult, SystemError};
use crate::ledger::NewLedgerEntry;
use crate::market::Market;
use crate::match_engine::Fill;
use crate::money::{trade_value, Cents};
use crate::store::Store;

pub async fn apply<S: Store>(
    store: &S,
    market: &mut Market,
    fill: &Fill,
    reference_id: &str,
    now: DateTime<Utc>,
) -> CoreResult<ClearingOutcome> {
    let q = fill.quantity;
    let p_complement = fill.price.complement();

    let yes_cost = trade_value(fill.price, q)?;
    store.unfreeze_funds(&fill.buyer_user_id, yes_cost, reference_id, now).await?;
    store.debit_available(&fill.buyer_user_id, yes_cost, now).await?;
    store
        .apply_yes_delta(&fill.buyer_user_id, &market.market_id, q.0 as i64, yes_cost.0, 0)
        .await?;
    store
        .append(
            NewLedgerEntry {
                user_id: fill.buyer_user_id.clone(),
                entry_type: LedgerEntryType::MintCost,
                amount: -yes_cost,
                balance_after: Cents::ZERO,
                reference_type: Some("trade".to_string()),
                reference_id: Some(reference_id.to_string()),
                description: None,
            },
            now,
        )
        .await?;

    let no_cost = trade_value(p_complement, q)?;
    store.unfreeze_funds(&fill.seller_user_id, no_cost, reference_id, now).await?;
    store.debit_available(&fill.seller_user_id, no_cost, now).await?;
    store
        .apply_no_delta(&fill.seller_user_id, &market.market_id, q.0 as i64, no_cost.0, 0)
        .await?;
    store
        .append(
            NewLedgerEntry {
                user_id: fill.seller_user_id.clone(),
                entry_type: LedgerEntryType::MintCost,
                amount: -no_cost,
                balance_after: Cents::ZERO,
                reference_type: Some("trade".to_string()),
                reference_id: Some(reference_id.to_string()),
                description: None,
            },
            now,
        )
        .await?;

    let reserve_in = yes_cost.checked_add(no_cost).ok_or(CoreError::from(SystemError::Overflow))?;
    market.reserve_balance += reserve_in;
    market.total_yes_shares = market
        .total_yes_shares
        .checked_add(q)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    market.total_no_shares = market
        .total_no_shares
        .checked_add(q)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    store
        .append(
            NewLedgerEntry::system(LedgerEntryType::MintReserveIn, reserve_in, reference_id),
            now,
        )
        .await?;

    Ok(ClearingOutcome::default())
}
