//! Settlement (C15) — spec.md §4.15, grounded on
//! `pm_clearing/domain/settlement.py::settle_market`. A leaf operation in
//! the same shape as the clearing handlers (C10): it takes a mutable
//! market-aggregates view and a persistence port and returns what it paid
//! out, with no callback into the engine or the matcher (spec.md §9 "Cyclic
//! clearing graph avoidance"). The engine (C13) is responsible for holding
//! the per-market lock for the whole pass and for cancelling every resting
//! order through its own `cancel_order` before calling here.

use chrono::{DateTime, Utc};

use crate::enums::{LedgerEntryType, MarketStatus, ResolutionResult};
use crate::error::{CoreError, CoreResult, MarketError, SystemError};
use crate::ledger::NewLedgerEntry;
use crate::market::Market;
use crate::money::{Cents, Quantity};
use crate::store::Store;

/// Pays `100 * winning_volume` to every position holder on the winning
/// side (spec.md §4.15), zeroes every position in the market, and flips
/// `market` to SETTLED with every pooled aggregate reset to zero. Only
/// valid from ACTIVE or SUSPENDED (`MarketStatus::is_settleable`); a VOID
/// outcome is out of scope (spec.md §4.15).
///
/// Returns the total paid out, which by S8/INV-G is always exactly the
/// market's pre-settlement `reserve_balance` — `total_yes_shares ==
/// total_no_shares` (INV-1) and `reserve_balance == 100 *
/// total_yes_shares` (INV-2), so the winning side's combined volume across
/// all holders equals the losing side's and the 100-per-share payout comes
/// from the reserve exactly, with nothing left over.
pub async fn settle_market<S: Store>(
    store: &S,
    market: &mut Market,
    outcome: ResolutionResult,
    reference_id: &str,
    now: DateTime<Utc>,
) -> CoreResult<Cents> {
    if !market.status.is_settleable() {
        return Err(MarketError::NotActive {
            market: market.market_id.clone(),
            status: market.status.to_string(),
        }
        .into());
    }

    let positions = store.list_positions_for_market(&market.market_id).await?;
    let mut total_paid = Cents::ZERO;

    for position in &positions {
        let winning_volume = match outcome {
            ResolutionResult::Yes => position.yes_volume,
            ResolutionResult::No => position.no_volume,
        };
        if winning_volume > Quantity::ZERO {
            let payout = (winning_volume.0 as i64)
                .checked_mul(100)
                .map(Cents)
                .ok_or(CoreError::from(SystemError::Overflow))?;
            store.credit_available(&position.user_id, payout, now).await?;
            store
                .append(
                    NewLedgerEntry {
                        user_id: position.user_id.clone(),
                        entry_type: LedgerEntryType::SettlementPayout,
                        amount: payout,
                        balance_after: Cents::ZERO,
                        reference_type: Some("market".to_string()),
                        reference_id: Some(reference_id.to_string()),
                        description: None,
                    },
                    now,
                )
                .await?;
            total_paid = total_paid.checked_add(payout).ok_or(CoreError::from(SystemError::Overflow))?;
        }
        store.zero(&position.user_id, &market.market_id).await?;
    }

    store
        .append(NewLedgerEntry::system(LedgerEntryType::SettlementPayout, -total_paid, reference_id), now)
        .await?;

    market.reserve_balance = Cents::ZERO;
    market.pnl_pool = Cents::ZERO;
    market.total_yes_shares = Quantity::ZERO;
    market.total_no_shares = Quantity::ZERO;
    market.resolution_result = Some(outcome);
    market.settled_at = Some(now);
    market.status = MarketStatus::Settled;
    market.updated_at = now;

    Ok(total_paid)
}
