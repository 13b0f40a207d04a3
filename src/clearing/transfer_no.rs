//! TRANSFER_NO (C10) — SYNTHETIC_BUY + SYNTHETIC_SELL, existing NO shares
//! change hands at the complement price, symmetric with
//! [`crate::clearing::transfer_yes`] and grounded on the same
//! `pm_clearing/domain/scenarios/transfer_yes.py` shape applied to the NO
//! side (the Python source's `transfer_no.py` is the literal NO-side
//! mirror).

use chrono::{DateTime, Utc};

use crate::clearing::ClearingOutcome;
use crate::enums::LedgerEntryType;
use crate::error::{CoreError, CoreResult, SystemError};
use crate::ledger::NewLedgerEntry;
use crate::market::Market;
use crate::match_engine::Fill;
use crate::money::{released_cost, trade_value, Cents};
use crate::store::Store;

/// Unlike [`crate::clearing::transfer_yes`], the fill's book-level buy/sell
/// sides are inverted from the NO-share roles: `buy_book_type` is
/// `SyntheticBuy` (the transform of an original NO *SELL*, so
/// `fill.buyer_user_id` is the NO position being closed) and
/// `sell_book_type` is `SyntheticSell` (the transform of an original NO
/// *BUY*, so `fill.seller_user_id` is the NO position being opened) — see
/// `transform.rs`'s table. `pm_clearing/domain/scenarios/transfer_no.py`
/// therefore credits new NO shares to `trade.sell_user_id`, not
/// `trade.buy_user_id`.
pub async fn apply<S: Store>(
    store: &S,
    market: &mut Market,
    fill: &Fill,
    reference_id: &str,
    now: DateTime<Utc>,
) -> CoreResult<ClearingOutcome> {
    let q = fill.quantity;
    let p_complement = fill.price.complement();
    let opener_cost = trade_value(p_complement, q)?;

    // SyntheticSell (fill.seller_user_id): opens the NO position, had frozen funds.
    store.unfreeze_funds(&fill.seller_user_id, opener_cost, reference_id, now).await?;
    store.debit_available(&fill.seller_user_id, opener_cost, now).await?;
    store
        .apply_no_delta(&fill.seller_user_id, &market.market_id, q.0 as i64, opener_cost.0, 0)
        .await?;
    store
        .append(
            NewLedgerEntry {
                user_id: fill.seller_user_id.clone(),
                entry_type: LedgerEntryType::TransferPayment,
                amount: -opener_cost,
                balance_after: Cents::ZERO,
                reference_type: Some("trade".to_string()),
                reference_id: Some(reference_id.to_string()),
                description: None,
            },
            now,
        )
        .await?;

    // SyntheticBuy (fill.buyer_user_id): closes the NO position, had frozen shares.
    let closer_position = store.get_or_create_position(&fill.buyer_user_id, &market.market_id).await?;
    let cost_released = released_cost(closer_position.no_cost_sum, closer_position.no_volume, q);
    let proceeds = opener_cost;

    store
        .apply_no_delta(
            &fill.buyer_user_id,
            &market.market_id,
            -(q.0 as i64),
            -cost_released.0,
            -(q.0 as i64),
        )
        .await?;
    store.credit_available(&fill.buyer_user_id, proceeds, now).await?;
    store
        .append(
            NewLedgerEntry {
                user_id: fill.buyer_user_id.clone(),
                entry_type: LedgerEntryType::TransferReceipt,
                amount: proceeds,
                balance_after: Cents::ZERO,
                reference_type: Some("trade".to_string()),
                reference_id: Some(reference_id.to_string()),
                description: None,
            },
            now,
        )
        .await?;

    let closer_pnl = proceeds.checked_sub(cost_released).ok_or(CoreError::from(SystemError::Overflow))?;
    market.pnl_pool -= closer_pnl;

    Ok(ClearingOutcome {
        buyer_realised_pnl: Some(closer_pnl),
        seller_realised_pnl: None,
    })
}
