//! TRANSFER_YES (C10) — NATIVE_BUY + NATIVE_SELL, existing YES shares
//! change hands, grounded on
//! `pm_clearing/domain/scenarios/transfer_yes.py::clear_transfer_yes`.

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
    let buyer_cost = trade_value(fill.price, q)?;

    store.unfreeze_funds(&fill.buyer_user_id, buyer_cost, reference_id, now).await?;
    store.debit_available(&fill.buyer_user_id, buyer_cost, now).await?;
    store
        .apply_yes_delta(&fill.buyer_user_id, &market.market_id, q.0 as i64, buyer_cost.0, 0)
        .await?;
    store
        .append(
            NewLedgerEntry {
                user_id: fill.buyer_user_id.clone(),
                entry_type: LedgerEntryType::TransferPayment,
                amount: -buyer_cost,
                balance_after: Cents::ZERO,
                reference_type: Some("trade".to_string()),
                reference_id: Some(reference_id.to_string()),
                description: None,
            },
            now,
        )
        .await?;

    let seller_position = store.get_or_create_position(&fill.seller_user_id, &market.market_id).await?;
    let cost_released = released_cost(seller_position.yes_cost_sum, seller_position.yes_volume, q);
    let proceeds = buyer_cost;

    store
        .apply_yes_delta(
            &fill.seller_user_id,
            &market.market_id,
            -(q.0 as i64),
            -cost_released.0,
            -(q.0 as i64),
        )
        .await?;
    store.credit_available(&fill.seller_user_id, proceeds, now).await?;
    store
        .append(
            NewLedgerEntry {
                user_id: fill.seller_user_id.clone(),
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

    let seller_pnl = proceeds.checked_sub(cost_released).ok_or(CoreError::from(SystemError::Overflow))?;
    market.pnl_pool -= seller_pnl;

    Ok(ClearingOutcome {
        buyer_realised_pnl: None,
        seller_realised_pnl: Some(seller_pnl),
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
            maker_user_id: "bob".into(),
            taker_user_id: "alice".into(),
            buyer_order_id: "buy1".into(),
            seller_order_id: "sell1".into(),
            buyer_user_id: "alice".into(),
            seller_user_id: "bob".into(),
            buy_book_type: BookType::NativeBuy,
            sell_book_type: BookType::NativeSell,
            price: Price::new(price).unwrap(),
            quantity: Quantity(qty),
        }
    }

    #[tokio::test]
    async fn transfer_yes_moves_shares_and_books_seller_pnl() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.deposit("alice", Cents(10_000), now).await.unwrap();
        store.freeze_funds("alice", Cents(700), "o1", now).await.unwrap();
        store.deposit("bob", Cents(10_000), now).await.unwrap();

        // Bob already holds 10 YES at cost 400 (avg 40/share), now sells at 70.
        store
            .apply_yes_delta("bob", "m1", 10, 400, 0)
            .await
            .unwrap();
        store.freeze_yes("bob", "m1", Quantity(10)).await.unwrap();

        let mut market = Market::new("m1", &MarketConfig::default(), now);
        market.status = MarketStatus::Active;
        market.pnl_pool = Cents(0);

        let f = fill(70, 10);
        let outcome = apply(&store, &mut market, &f, "t1", now).await.unwrap();

        let alice_pos = store.get_or_create_position("alice", "m1").await.unwrap();
        assert_eq!(alice_pos.yes_volume, Quantity(10));
        assert_eq!(alice_pos.yes_cost_sum, Cents(700));

        let bob_pos = store.get_or_create_position("bob", "m1").await.unwrap();
        assert_eq!(bob_pos.yes_volume, Quantity::ZERO);
        assert_eq!(bob_pos.yes_pending_sell, Quantity::ZERO);
        assert_eq!(bob_pos.yes_cost_sum, Cents::ZERO);

        // proceeds 700, cost_released 400 -> pnl 300
        assert_eq!(outcome.seller_realised_pnl, Some(Cents(300)));
        assert_eq!(market.pnl_pool, Cents(-300));

        let bob_acct = store.get_or_create_account("bob", true).await.unwrap();
        assert_eq!(bob_acct.available_balance, Cents(10_000 + 700));
    }
}
