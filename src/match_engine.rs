//! Matcher (C8) — price-time priority fill loop with self-trade skip,
//! grounded on `pm_matching/engine/matching_algo.py`'s `match_order`/
//! `_match_buy`/`_match_sell`.

use crate::book::OrderBook;
use crate::enums::{BookDirection, BookType};
use crate::money::{Price, Quantity};

#[derive(Debug, Clone)]
pub struct Fill {
    pub maker_order_id: String,
    pub taker_order_id: String,
    pub maker_user_id: String,
    pub taker_user_id: String,
    /// Which of `maker_order_id`/`taker_order_id` is the buy side — clearing
    /// (C10) and the fee collector (C11) need to know which order/user is
    /// buyer vs. seller, not just maker vs. taker.
    pub buyer_order_id: String,
    pub seller_order_id: String,
    pub buyer_user_id: String,
    pub seller_user_id: String,
    pub buy_book_type: BookType,
    pub sell_book_type: BookType,
    pub price: Price,
    pub quantity: Quantity,
}

/// `a == b` case-insensitively, except exempt parties never self-trade with
/// anyone (spec.md §4.8: "exempt parties never block fills").
pub fn is_self_trade(a: &str, b: &str, is_exempt: impl Fn(&str) -> bool) -> bool {
    if is_exempt(a) || is_exempt(b) {
        return false;
    }
    a.eq_ignore_ascii_case(b)
}

/// Runs the incoming order against the opposing side of `book` until it is
/// exhausted or no more crossing levels remain. Returns the fills produced
/// and the number of self-trade rotations performed (used by the engine to
/// decide whether an unfilled IOC is a genuine `SelfTrade` rejection).
pub fn match_order(
    book: &mut OrderBook,
    taker_order_id: &str,
    taker_user_id: &str,
    taker_book_type: BookType,
    direction: BookDirection,
    price: Price,
    remaining: &mut Quantity,
    is_exempt: impl Fn(&str) -> bool,
) -> (Vec<Fill>, u32) {
    match direction {
        BookDirection::Buy => match_buy(book, taker_order_id, taker_user_id, taker_book_type, price, remaining, is_exempt),
        BookDirection::Sell => match_sell(book, taker_order_id, taker_user_id, taker_book_type, price, remaining, is_exempt),
    }
}

fn match_buy(
    book: &mut OrderBook,
    taker_order_id: &str,
    taker_user_id: &str,
    taker_book_type: BookType,
    price: Price,
    remaining: &mut Quantity,
    is_exempt: impl Fn(&str) -> bool,
) -> (Vec<Fill>, u32) {
    let mut fills = Vec::new();
    let mut total_skipped = 0u32;

    while remaining.0 > 0 && book.best_ask() <= price.get() {
        let level_price = book.best_ask();
        let total_at_level = book.ask_level(level_price).len();
        let mut checked = 0;
        let mut matched_this_level = false;

        while remaining.0 > 0 && checked < total_at_level {
            let Some(head) = book.ask_level_mut(level_price).pop_front() else {
                break;
            };
            if is_self_trade(taker_user_id, &head.user_id, &is_exempt) {
                book.ask_level_mut(level_price).push_back(head);
                checked += 1;
                total_skipped += 1;
                continue;
            }

            matched_this_level = true;
            let fill_qty = remaining.min(head.remaining);
            fills.push(Fill {
                maker_order_id: head.order_id.clone(),
                taker_order_id: taker_order_id.to_string(),
                maker_user_id: head.user_id.clone(),
                taker_user_id: taker_user_id.to_string(),
                buyer_order_id: taker_order_id.to_string(),
                seller_order_id: head.order_id.clone(),
                buyer_user_id: taker_user_id.to_string(),
                seller_user_id: head.user_id.clone(),
                buy_book_type: taker_book_type,
                sell_book_type: head.book_type,
                price: Price::new(level_price).expect("best_ask is always in [1, 99]"),
                quantity: fill_qty,
            });
            remaining.0 -= fill_qty.0;

            let mut updated = head;
            updated.remaining.0 -= fill_qty.0;
            if updated.remaining.0 > 0 {
                book.ask_level_mut(level_price).push_front(updated);
            } else {
                book.untrack(&updated.order_id);
            }
            checked += 1;
        }

        if book.ask_level(level_price).is_empty() {
            book.on_level_emptied_ask(level_price);
        }
        if !matched_this_level {
            break;
        }
    }

    (fills, total_skipped)
}

fn match_sell(
    book: &mut OrderBook,
    taker_order_id: &str,
    taker_user_id: &str,
    taker_book_type: BookType,
    price: Price,
    remaining: &mut Quantity,
    is_exempt: impl Fn(&str) -> bool,
) -> (Vec<Fill>, u32) {
    let mut fills = Vec::new();
    let mut total_skipped = 0u32;

    while remaining.0 > 0 && book.best_bid() >= price.get() {
        let level_price = book.best_bid();
        let total_at_level = book.bid_level(level_price).len();
        let mut checked = 0;
        let mut matched_this_level = false;

        while remaining.0 > 0 && checked < total_at_level {
            let Some(head) = book.bid_level_mut(level_price).pop_front() else {
                break;
            };
            if is_self_trade(taker_user_id, &head.user_id, &is_exempt) {
                book.bid_level_mut(level_price).push_back(head);
                checked += 1;
                total_skipped += 1;
                continue;
            }

            matched_this_level = true;
            let fill_qty = remaining.min(head.remaining);
            fills.push(Fill {
                maker_order_id: head.order_id.clone(),
                taker_order_id: taker_order_id.to_string(),
                maker_user_id: head.user_id.clone(),
                taker_user_id: taker_user_id.to_string(),
                buyer_order_id: head.order_id.clone(),
                seller_order_id: taker_order_id.to_string(),
                buyer_user_id: head.user_id.clone(),
                seller_user_id: taker_user_id.to_string(),
                buy_book_type: head.book_type,
                sell_book_type: taker_book_type,
                price: Price::new(level_price).expect("best_bid is always in [1, 99]"),
                quantity: fill_qty,
            });
            remaining.0 -= fill_qty.0;

            let mut updated = head;
            updated.remaining.0 -= fill_qty.0;
            if updated.remaining.0 > 0 {
                book.bid_level_mut(level_price).push_front(updated);
            } else {
                book.untrack(&updated.order_id);
            }
            checked += 1;
        }

        if book.bid_level(level_price).is_empty() {
            book.on_level_emptied_bid(level_price);
        }
        if !matched_this_level {
            break;
        }
    }

    (fills, total_skipped)
}
