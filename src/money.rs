//! Money primitives (C1): cents arithmetic and ceiling-division fees.
//!
//! All monetary values in the core are signed 64-bit integer cents. Prices
//! are integers in `[1, 99]`. Quantities are non-negative 32-bit integers.
//! No floating point appears anywhere below this module.

use serde::{Deserialize, Serialize};

use crate::error::SystemError;
use crate::macros::{impl_add_sub_primitive, impl_from_primitive};

/// A signed amount of US-cent-equivalent value: balances, costs, proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Cents(pub i64);
impl_from_primitive!(Cents, i64);
impl_add_sub_primitive!(Cents, i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub fn checked_add(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_add(rhs.0).map(Cents)
    }

    pub fn checked_sub(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_sub(rhs.0).map(Cents)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl std::ops::Neg for Cents {
    type Output = Cents;
    fn neg(self) -> Cents {
        Cents(-self.0)
    }
}

/// A YES-equivalent price in whole cents, always within `[1, 99]` once
/// validated. Constructed via [`Price::new`]; arithmetic that must cross the
/// `[1, 99]` boundary (e.g. the NO-dual `100 - price`) goes through
/// `Price::complement`, which re-validates the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(u8);

impl Price {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 99;

    pub fn new(value: u8) -> Result<Self, SystemError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Price(value))
        } else {
            Err(SystemError::PriceOutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// The YES-equivalent price of the opposite (NO) side: `100 - price`.
    pub fn complement(self) -> Price {
        Price(100 - self.0)
    }
}

/// A non-negative share/order quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Serialize, Deserialize)]
pub struct Quantity(pub u32);
impl_from_primitive!(Quantity, u32);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub fn checked_add(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_add(rhs.0).map(Quantity)
    }

    pub fn checked_sub(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_sub(rhs.0).map(Quantity)
    }

    pub fn min(self, other: Quantity) -> Quantity {
        Quantity(self.0.min(other.0))
    }
}

/// Basis points, 1/10 000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Bps(pub u32);
impl_from_primitive!(Bps, u32);

/// `value * price * quantity` as plain cents, with checked multiplication
/// per the overflow design note in spec.md §9 ("implementations MUST use
/// checked arithmetic on every multiplication in fee and cost math").
pub fn trade_value(price: Price, quantity: Quantity) -> Result<Cents, SystemError> {
    let price = price.get() as i64;
    let qty = quantity.0 as i64;
    price
        .checked_mul(qty)
        .map(Cents)
        .ok_or(SystemError::Overflow)
}

/// Ceiling-division fee: `ceil(value * bps / 10_000)`, implemented as
/// `(value * bps + 9999) / 10000` with integer division so the platform
/// never loses a fractional cent to rounding (spec.md §4.1).
pub fn fee_ceil_div(value: Cents, bps: Bps) -> Result<Cents, SystemError> {
    if value.0 == 0 || bps.0 == 0 {
        return Ok(Cents::ZERO);
    }
    let scaled = value
        .0
        .checked_mul(bps.0 as i64)
        .and_then(|v| v.checked_add(9_999))
        .ok_or(SystemError::Overflow)?;
    Ok(Cents(scaled / 10_000))
}

/// The proportional cost released when closing `closed_qty` out of a
/// position whose total volume is `volume` and whose total cost basis is
/// `cost_sum`: `floor(cost_sum * closed_qty / volume)` (spec.md §3, "On
/// partial close, cost released is ..."). Returns zero if `volume` is zero
/// — the position is already fully closed, nothing to release.
pub fn released_cost(cost_sum: Cents, volume: Quantity, closed_qty: Quantity) -> Cents {
    if volume.0 == 0 {
        return Cents::ZERO;
    }
    let numerator = cost_sum.0 as i128 * closed_qty.0 as i128;
    Cents((numerator / volume.0 as i128) as i64)
}

/// Formats signed cents as `"[-]$d,ddd.cc"`, grounded 1:1 on
/// `pm_common/cents.py::cents_to_display`.
pub fn cents_to_display(amount: Cents) -> String {
    let cents = amount.0;
    if cents < 0 {
        let abs = -cents;
        format!("-${}.{:02}", group_thousands(abs / 100), abs % 100)
    } else {
        format!("${}.{:02}", group_thousands(cents / 100), cents % 100)
    }
}

fn group_thousands(mut whole: i64) -> String {
    if whole == 0 {
        return "0".to_string();
    }
    let mut groups = Vec::new();
    while whole > 0 {
        groups.push(format!("{:03}", whole % 1000));
        whole /= 1000;
    }
    let mut groups: Vec<String> = groups
        .into_iter()
        .rev()
        .map(|g| g.trim_start_matches('0').to_string())
        .collect();
    if let Some(first) = groups.first_mut() {
        if first.is_empty() {
            *first = "0".to_string();
        }
    }
    groups.join(",")
}
