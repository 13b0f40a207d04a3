//! Auto-netter (C12) — spec.md §4.12, grounded on
//! `pm_clearing/domain/netting.py::execute_netting_if_needed`. Runs after
//! every fill for the buyer side, skipped when the account's
//! `auto_netting_enabled` is false (the AMM, per spec.md §9's "auto-netting
//! does not apply when the user's `auto_netting_enabled` flag is false").

use chrono::{DateTime, Utc};

use crate::enums::LedgerEntryType;
use crate::error::{CoreError, CoreResult, SystemError};
use crate::ledger::NewLedgerEntry;
use crate::market::Market;
use crate::money::{released_cost, Cents, Quantity};
use crate::store::Store;

/// Nets the user's opposing YES/NO holdings in `market`, if any, returning
/// the quantity netted (`0` if nothing was nettable or netting is
/// disabled for this account).
pub async fn net_if_needed<S: Store>(
    store: &S,
    market: &mut Market,
    user_id: &str,
    reference_id: &str,
    now: DateTime<Utc>,
) -> CoreResult<Quantity> {
    let account = store.get_or_create_account(user_id, true).await?;
    if !account.auto_netting_enabled {
        return Ok(Quantity::ZERO);
    }

    let position = store.get_or_create_position(user_id, &market.market_id).await?;
    let nettable = position.available_yes().min(position.available_no());
    if nettable.0 == 0 {
        return Ok(Quantity::ZERO);
    }

    let yes_cost_released = released_cost(position.yes_cost_sum, position.yes_volume, nettable);
    let no_cost_released = released_cost(position.no_cost_sum, position.no_volume, nettable);
    let total_cost_released = yes_cost_released
        .checked_add(no_cost_released)
        .ok_or(CoreError::from(SystemError::Overflow))?;

    let refund = (nettable.0 as i64)
        .checked_mul(100)
        .map(Cents)
        .ok_or(CoreError::from(SystemError::Overflow))?;

    store
        .apply_yes_delta(user_id, &market.market_id, -(nettable.0 as i64), -yes_cost_released.0, 0)
        .await?;
    store
        .apply_no_delta(user_id, &market.market_id, -(nettable.0 as i64), -no_cost_released.0, 0)
        .await?;
    store.credit_available(user_id, refund, now).await?;
    store
        .append(
            NewLedgerEntry {
                user_id: user_id.to_string(),
                entry_type: LedgerEntryType::Netting,
                amount: refund,
                balance_after: Cents::ZERO,
                reference_type: Some("trade".to_string()),
                reference_id: Some(reference_id.to_string()),
                description: None,
            },
            now,
        )
        .await?;
    store
        .append(
            NewLedgerEntry::system(LedgerEntryType::NettingReserveOut, -refund, reference_id),
            now,
        )
        .await?;

    market.reserve_balance = market
        .reserve_balance
        .checked_sub(refund)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    let pnl_delta = refund
        .checked_sub(total_cost_released)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    market.pnl_pool = market
        .pnl_pool
        .checked_sub(pnl_delta)
        .ok_or(CoreError::from(SystemError::Overflow))?;

    Ok(nettable)
}
