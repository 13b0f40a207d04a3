//! Risk gate (C6) — sequential, fail-fast pre-trade checks, grounded on
//! `pm_risk/rules/order_checks.py::run_checks` (market active → price range
//! → quantity cap → freeze requirement). This module computes; it never
//! touches the store — `place_order` (C13) performs the freeze call once all
//! four checks pass, so a rejection never partially mutates custody state.

use crate::enums::{BookType, MarketStatus};
use crate::error::{CoreError, MarketError, OrderError};
use crate::market::Market;
use crate::money::{fee_ceil_div, trade_value, Bps, Cents, Price, Quantity};

/// Which asset a resting order must freeze, and how much, per spec.md §4.6
/// check 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeRequirement {
    Funds(Cents),
    YesShares(Quantity),
    NoShares(Quantity),
}

/// Check 1: the market must exist (caller already loaded it) and be ACTIVE.
pub fn check_market_active(market: &Market) -> Result<(), CoreError> {
    if !market.status.is_tradable() {
        return Err(MarketError::NotActive {
            market: market.market_id.clone(),
            status: market.status.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Check 2: `1 <= price <= 99`. `Price::new` already enforces this at
/// construction; this wrapper exists so a rejection surfaces as the order
/// domain's `PriceOutOfRange` (4001) rather than the system domain's.
pub fn check_price_range(price: u8) -> Result<Price, CoreError> {
    Price::new(price).map_err(|_| OrderError::PriceOutOfRange(price).into())
}

/// Check 3: `1 <= quantity <= market.max_order_quantity` (itself capped at
/// 100 000 by `MarketConfig`'s default, but a market may configure lower).
pub fn check_quantity(quantity: u32, market: &Market) -> Result<Quantity, CoreError> {
    if quantity == 0 || quantity > market.max_order_quantity {
        return Err(OrderError::OrderLimitExceeded {
            requested: quantity,
            max: market.max_order_quantity,
        }
        .into());
    }
    Ok(Quantity(quantity))
}

/// Check 4: computes what must be frozen for a resting order of this
/// `book_type`, without performing the freeze. `original_price` is the
/// price the user actually entered (YES price for YES orders, NO price for
/// NO orders) — distinct from `book_price` for the two synthetic flavours.
pub fn freeze_requirement(
    book_type: BookType,
    book_price: Price,
    original_price: Price,
    quantity: Quantity,
    taker_fee_bps: Bps,
) -> Result<FreezeRequirement, CoreError> {
    match book_type {
        BookType::NativeBuy => Ok(FreezeRequirement::Funds(funds_with_fee_buffer(
            book_price,
            quantity,
            taker_fee_bps,
        )?)),
        BookType::SyntheticSell => Ok(FreezeRequirement::Funds(funds_with_fee_buffer(
            original_price,
            quantity,
            taker_fee_bps,
        )?)),
        BookType::NativeSell => Ok(FreezeRequirement::YesShares(quantity)),
        BookType::SyntheticBuy => Ok(FreezeRequirement::NoShares(quantity)),
    }
}

/// `freeze_price * quantity + ceil(freeze_price * quantity * taker_fee_bps / 10_000)`
/// (spec.md §4.6 check 4) — the worst-case notional plus the worst-case
/// taker fee, so a full fill at the taker rate never exceeds what was
/// frozen.
fn funds_with_fee_buffer(freeze_price: Price, quantity: Quantity, taker_fee_bps: Bps) -> Result<Cents, CoreError> {
    let notional = trade_value(freeze_price, quantity).map_err(CoreError::from)?;
    let fee_buffer = fee_ceil_div(notional, taker_fee_bps).map_err(CoreError::from)?;
    notional.checked_add(fee_buffer).ok_or(CoreError::from(crate::error::SystemError::Overflow))
}
