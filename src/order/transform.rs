//! Order transformer (C5) — the pure, total function that projects the
//! four user-visible (side, direction) combinations onto a single
//! YES-priced book (spec.md §4.5), grounded 1:1 on
//! `pm_order/domain/transformer.py::transform_order`.

use crate::enums::{BookDirection, BookType, OrderDirection, OriginalSide};
use crate::money::Price;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookView {
    pub book_type: BookType,
    pub book_direction: BookDirection,
    pub book_price: Price,
}

/// `(side, direction, price) -> (book_type, book_direction, book_price)`,
/// per the table in spec.md §4.5:
///
/// | side | dir  | book_type      | book_dir | book_price |
/// |------|------|----------------|----------|-----------|
/// | YES  | BUY  | NATIVE_BUY     | BUY      | price     |
/// | YES  | SELL | NATIVE_SELL    | SELL     | price     |
/// | NO   | BUY  | SYNTHETIC_SELL | SELL     | 100-price |
/// | NO   | SELL | SYNTHETIC_BUY  | BUY      | 100-price |
pub fn transform_order(side: OriginalSide, direction: OrderDirection, price: Price) -> BookView {
    match (side, direction) {
        (OriginalSide::Yes, OrderDirection::Buy) => BookView {
            book_type: BookType::NativeBuy,
            book_direction: BookDirection::Buy,
            book_price: price,
        },
        (OriginalSide::Yes, OrderDirection::Sell) => BookView {
            book_type: BookType::NativeSell,
            book_direction: BookDirection::Sell,
            book_price: price,
        },
        (OriginalSide::No, OrderDirection::Buy) => BookView {
            book_type: BookType::SyntheticSell,
            book_direction: BookDirection::Sell,
            book_price: price.complement(),
        },
        (OriginalSide::No, OrderDirection::Sell) => BookView {
            book_type: BookType::SyntheticBuy,
            book_direction: BookDirection::Buy,
            book_price: price.complement(),
        },
    }
}
