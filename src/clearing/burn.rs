//! BURN (C10) — SYNTHETIC_BUY + NATIVE_SELL, a YES+NO pair is destroyed and
//! 100 cents per share leave the reserve, grounded on
//! `pm_clearing/domain/scenarios/burn.py::clear_burn`.

use chrono::{DateTime, Utc};

use crate::clearing::ClearingOutcome;
use crate::enums::LedgerEntryType;
use crate::error::{CoreError, CoreResult, SystemError};
use crate::ledger::NewLedgerEntry;
use crate::market::Market;
use crate::match_engine::Fill;
use crate::money::{released_cost, trade_value, Cents};
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

    // YES seller (NATIVE_SELL).
    let yes_position = store.get_or_create_position(&fill.seller_user_id, &market.market_id).await?;
    let yes_cost_released = released_cost(yes_position.yes_cost_sum, yes_position.yes_volume, q);
    let yes_proceeds = trade_value(fill.price, q)?;

    store
        .apply_yes_delta(
            &fill.seller_user_id,
            &market.market_id,
            -(q.0 as i64),
            -yes_cost_released.0,
            -(q.0 as i64),
        )
        .await?;
    store.credit_available(&fill.seller_user_id, yes_proceeds, now).await?;
    store
        .append(
            NewLedgerEntry {
                user_id: fill.seller_user_id.clone(),
                entry_type: LedgerEntryType::BurnRevenue,
                amount: yes_proceeds,
                balance_after: Cents::ZERO,
                reference_type: Some("trade".to_string()),
                reference_id: Some(reference_id.to_string()),
                description: None,
            },
            now,
        )
        .await?;

    // NO seller (SYNTHETIC_BUY).
    let no_position = store.get_or_create_position(&fill.buyer_user_id, &market.market_id).await?;
    let no_cost_released = released_cost(no_position.no_cost_sum, no_position.no_volume, q);
    let no_proceeds = trade_value(p_complement, q)?;

    store
        .apply_no_delta(
            &fill.buyer_user_id,
            &market.market_id,
            -(q.0 as i64),
            -no_cost_released.0,
            -(q.0 as i64),
        )
        .await?;
    store.credit_available(&fill.buyer_user_id, no_proceeds, now).await?;
    store
        .append(
            NewLedgerEntry {
                user_id: fill.buyer_user_id.clone(),
                entry_type: LedgerEntryType::BurnRevenue,
                amount: no_proceeds,
                balance_after: Cents::ZERO,
                reference_type: Some("trade".to_string()),
                reference_id: Some(reference_id.to_string()),
                description: None,
            },
            now,
        )
        .await?;

    let reserve_out = (q.0 as i64)
        .checked_mul(100)
        .map(Cents)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    market.reserve_balance = market
        .reserve_balance
        .checked_sub(reserve_out)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    market.total_yes_shares = market
        .total_yes_shares
        .checked_sub(q)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    market.total_no_shares = market
        .total_no_shares
        .checked_sub(q)
        .ok_or(CoreError::from(SystemError::Overflow))?;
    store
        .append(
            NewLedgerEntry::system(LedgerEntryType::BurnReserveOut, -reserve_out, reference_id),
            now,
        )
        .await?;

    let yes_pnl = yes_proceeds.checked_sub(yes_cost_released).ok_or(CoreError::from(SystemError::Overflow))?;
    let no_pnl = no_proceeds.checked_sub(no_cost_released).ok_or(CoreError::from(SystemError::Overflow))?;
    market.pnl_pool = market
        .pnl_pool
        .checked_sub(yes_pnl)
        .and_then(|p| p.checked_sub(no_pnl))
        .ok_or(CoreError::from(SystemError::Overflow))?;

    Ok(ClearingOutcome {
        buyer_realised_pnl: Some(no_pnl),
        seller_realised_pnl: Some(yes_pnl),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::enums::{BookType, MarketStatus};
    use crate::money::{Price, Quantity};
    use crate::store::memory::InMemoryStore;

    fn fill(price: u8, qty: u32) -> Fill {
        Fill {
            maker_order_id: "sell1".into(),
            taker_order_id: "buy1".into(),
            maker_user_id: "alice".into(),
            taker_user_id: "bob".into(),
            buyer_order_id: "buy1".into(),
            seller_order_id: "sell1".into(),
            buyer_user_id: "bob".into(),
            seller_user_id: "alice".into(),
            buy_book_type: BookType::SyntheticBuy,
            sell_book_type: BookType::NativeSell,
            price: Price::new(price).unwrap(),
            quantity: Quantity(qty),
        }
    }

    #[tokio::test]
    async fn burn_destroys_pair_and_pays_both_sides() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.deposit("alice", Cents(0), now).await.unwrap();
        store.deposit("bob", Cents(0), now).await.unwrap();

        // alice holds 5 YES at cost 250 (avg 50), bob holds 5 NO at cost 150 (avg 30).
        store.apply_yes_delta("alice", "m1", 5, 250, 0).await.unwrap();
        store.freeze_yes("alice", "m1", Quantity(5)).await.unwrap();
        store.apply_no_delta("bob", "m1", 5, 150, 0).await.unwrap();
        store.freeze_no("bob", "m1", Quantity(5)).await.unwrap();

        let mut market = Market::new("m1", &MarketConfig::default(), now);
        market.status = MarketStatus::Active;
        market.reserve_balance = Cents(500);
        market.total_yes_shares = Quantity(5);
        market.total_no_shares = Quantity(5);

        let f = fill(70, 5);
        let outcome = apply(&store, &mut market, &f, "t1", now).await.unwrap();

        let alice_acct = store.get_or_create_account("alice", true).await.unwrap();
        assert_eq!(alice_acct.available_balance, Cents(350));
        let bob_acct = store.get_or_create_account("bob", true).await.unwrap();
        assert_eq!(bob_acct.available_balance, Cents(150));

        assert_eq!(market.reserve_balance, Cents::ZERO);
        assert_eq!(market.total_yes_shares, Quantity::ZERO);
        assert_eq!(market.total_no_shares, Quantity::ZERO);

        assert_eq!(outcome.seller_realised_pnl, Some(Cents(100)));
        assert_eq!(outcome.buyer_realised_pnl, Some(Cents(0)));
    }
}
