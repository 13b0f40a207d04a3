//! Fee collector (C11) — spec.md §4.11, grounded on
//! `pm_clearing/domain/fee.py::get_fee_trade_value`/`calc_fee` and
//! `pm_clearing/infrastructure/fee_collector.py::collect_fee_from_frozen`/
//! `collect_fee_from_proceeds`. Maker fee is always 0 (spec.md §9 open
//! question, decided in DESIGN.md): only the taker side ever pays.

use chrono::{DateTime, Utc};

use crate::enums::{BookType, LedgerEntryType};
use crate::error::CoreResult;
use crate::ledger::NewLedgerEntry;
use crate::match_engine::Fill;
use crate::money::{fee_ceil_div, trade_value, Bps, Cents};
use crate::store::Store;

/// The trade value a fee is computed against, which depends on whether the
/// taker's book_type freezes against the YES price or the NO (complement)
/// price (spec.md §4.11).
pub fn fee_base(taker_book_type: BookType, price_yes: crate::money::Price, original_price: crate::money::Price, quantity: crate::money::Quantity) -> CoreResult<Cents> {
    match taker_book_type {
        BookType::NativeBuy | BookType::NativeSell => trade_value(price_yes, quantity).map_err(Into::into),
        BookType::SyntheticSell => trade_value(original_price, quantity).map_err(Into::into),
        BookType::SyntheticBuy => trade_value(price_yes.complement(), quantity).map_err(Into::into),
    }
}

/// Whether the taker's freeze, at order placement, pre-funded the worst
/// case fee buffer (`NATIVE_BUY`/`SYNTHETIC_SELL` froze funds) or whether
/// the fee must instead be deducted from proceeds at settlement time
/// (`NATIVE_SELL`/`SYNTHETIC_BUY` froze shares, no funds to deduct from
/// until the sale pays out).
fn taker_pre_froze_funds(taker_book_type: BookType) -> bool {
    matches!(taker_book_type, BookType::NativeBuy | BookType::SyntheticSell)
}

/// Collects the taker fee for one fill: `ceil(fee_base * taker_fee_bps /
/// 10_000)`, deducted from the taker's pre-frozen buffer (refunding the
/// unused portion) or from their available proceeds, and always credited
/// to the platform-fee account.
pub async fn collect<S: Store>(
    store: &S,
    fill: &Fill,
    taker_order_id: &str,
    taker_book_type: BookType,
    original_price: crate::money::Price,
    taker_fee_bps: Bps,
    max_fee: Cents,
    platform_fee_account_id: &str,
    reference_id: &str,
    now: DateTime<Utc>,
) -> CoreResult<Cents> {
    let taker_user_id = if fill.buyer_order_id == taker_order_id {
        &fill.buyer_user_id
    } else {
        &fill.seller_user_id
    };

    let base = fee_base(taker_book_type, fill.price, original_price, fill.quantity)?;
    let actual_fee = fee_ceil_div(base, taker_fee_bps)?;

    if taker_pre_froze_funds(taker_book_type) {
        let refund = max_fee.checked_sub(actual_fee).ok_or(crate::error::SystemError::Overflow)?;
        store.debit_frozen(taker_user_id, actual_fee, now).await?;
        if refund.0 != 0 {
            store.credit_available(taker_user_id, refund, now).await?;
        }
    } else {
        store.debit_available(taker_user_id, actual_fee, now).await?;
    }

    store.credit_available(platform_fee_account_id, actual_fee, now).await?;
    store
        .append(
            NewLedgerEntry {
                user_id: taker_user_id.clone(),
                entry_type: LedgerEntryType::Fee,
                amount: -actual_fee,
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
            NewLedgerEntry {
                user_id: platform_fee_account_id.to_string(),
                entry_type: LedgerEntryType::FeeRevenue,
                amount: actual_fee,
                balance_after: Cents::ZERO,
                reference_type: Some("trade".to_string()),
                reference_id: Some(reference_id.to_string()),
                description: None,
            },
            now,
        )
        .await?;

    Ok(actual_fee)
}
