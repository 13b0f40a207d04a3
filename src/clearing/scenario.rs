//! Scenario dispatcher (C9), grounded 1:1 on spec.md §4.9's table /
//! `pm_matching/engine/scenario.py::determine_scenario`. Tagged-enum match
//! instead of dynamic dispatch, per the "Dynamic dispatch → tagged
//! variants" REDESIGN FLAG in spec.md §9.

use crate::enums::{BookType, TradeScenario};
use crate::error::SystemError;

/// Classifies a fill by the pair `(buy_book_type, sell_book_type)`. The only
/// four combinations a correctly-built book can ever produce are covered;
/// anything else indicates a matcher bug, surfaced as `BookCorrupt` rather
/// than silently picking a scenario.
pub fn determine(buy: BookType, sell: BookType) -> Result<TradeScenario, SystemError> {
    match (buy, sell) {
        (BookType::NativeBuy, BookType::SyntheticSell) => Ok(TradeScenario::Mint),
        (BookType::NativeBuy, BookType::NativeSell) => Ok(TradeScenario::TransferYes),
        (BookType::SyntheticBuy, BookType::SyntheticSell) => Ok(TradeScenario::TransferNo),
        (BookType::SyntheticBuy, BookType::NativeSell) => Ok(TradeScenario::Burn),
        (buy, sell) => Err(SystemError::BookCorrupt(format!(
            "impossible book_type pair: buy={buy}, sell={sell}"
        ))),
    }
}
