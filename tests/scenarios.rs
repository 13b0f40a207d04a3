//! End-to-end scenario coverage (SPEC_FULL.md §20, S1-S8): each test drives
//! the engine exactly the way the seed scenario describes it, against
//! `InMemoryStore`, and checks the ledgered/positional outcome it specifies.

use chrono::Utc;
use pm_core::config::{EngineConfig, MarketConfig};
use pm_core::enums::{CancelScope, MarketStatus, OrderDirection, OrderStatus, OriginalSide, ResolutionResult, TimeInForce};
use pm_core::engine::Engine;
use pm_core::market::Market;
use pm_core::money::{Cents, Price, Quantity};
use pm_core::order::model::NewOrderRequest;
use pm_core::store::memory::InMemoryStore;
use pm_core::store::{AccountStore, LedgerStore, MarketStore, OrderStore, PositionStore, TradeStore};

const TAKER_FEE_BPS: u32 = 20;
const MAKER_FEE_BPS: u32 = 10;
const SEED_BALANCE: i64 = 1_000_000; // $10,000.00

fn seed_config() -> MarketConfig {
    let mut cfg = MarketConfig::default();
    cfg.taker_fee_bps.0 = TAKER_FEE_BPS;
    cfg.maker_fee_bps.0 = MAKER_FEE_BPS;
    cfg
}

async fn seeded_engine(market_id: &str) -> Engine<InMemoryStore> {
    let engine = Engine::new(InMemoryStore::new(), EngineConfig::with_single_amm("AMM"));
    let now = Utc::now();
    let mut market = Market::new(market_id, &seed_config(), now);
    market.status = MarketStatus::Active;
    engine.store().create(market).await.unwrap();
    engine
}

async fn fund(engine: &Engine<InMemoryStore>, user: &str, now: chrono::DateTime<Utc>) {
    engine.store().deposit(user, Cents(SEED_BALANCE), now).await.unwrap();
}

fn order(user: &str, client_id: &str, market_id: &str, side: OriginalSide, direction: OrderDirection, price: u8, qty: u32) -> NewOrderRequest {
    NewOrderRequest {
        client_order_id: client_id.to_string(),
        market_id: market_id.to_string(),
        user_id: user.to_string(),
        side,
        direction,
        price: Price::new(price).unwrap(),
        quantity: Quantity(qty),
        time_in_force: TimeInForce::Gtc,
    }
}

/// S1 — GTC rest: a YES BUY against an empty book freezes
/// `price*qty + ceil(price*qty*taker_fee_bps/10_000)` and rests untouched.
#[tokio::test]
async fn s1_gtc_rest_freezes_price_times_qty_plus_fee_buffer() {
    let engine = seeded_engine("m1").await;
    let now = Utc::now();
    fund(&engine, "alice", now).await;

    let outcome = engine
        .place_order(order("alice", "c1", "m1", OriginalSide::Yes, OrderDirection::Buy, 40, 5), now)
        .await
        .unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Open);
    assert_eq!(outcome.order.filled_quantity, Quantity::ZERO);
    assert_eq!(outcome.order.remaining_quantity(), Quantity(5));
    assert!(outcome.fills.is_empty());

    // 40*5 = 200, fee = ceil(200*20/10_000) = 1 -> freeze 201.
    assert_eq!(outcome.order.frozen_amount, Cents(201));

    let acct = engine.store().get_or_create_account("alice", true).await.unwrap();
    assert_eq!(acct.frozen_balance, Cents(201));
    assert_eq!(acct.available_balance, Cents(SEED_BALANCE - 201));

    let page = engine.store().list("alice", None, None, 10).await.unwrap();
    let freeze_row = page.entries.iter().find(|e| e.amount == Cents(-201)).expect("ORDER_FREEZE row");
    assert_eq!(freeze_row.entry_type, pm_core::enums::LedgerEntryType::OrderFreeze);
}

/// S2 — IOC immediate cancel on an empty book: no fill, freeze restored.
#[tokio::test]
async fn s2_ioc_with_nothing_to_match_cancels_and_restores_balance() {
    let engine = seeded_engine("m1").await;
    let now = Utc::now();
    fund(&engine, "alice", now).await;

    let mut req = order("alice", "c1", "m1", OriginalSide::Yes, OrderDirection::Buy, 1, 3);
    req.time_in_force = TimeInForce::Ioc;
    let outcome = engine.place_order(req, now).await.unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Cancelled);
    assert!(outcome.fills.is_empty());

    let acct = engine.store().get_or_create_account("alice", true).await.unwrap();
    assert_eq!(acct.available_balance, Cents(SEED_BALANCE));
    assert_eq!(acct.frozen_balance, Cents::ZERO);
}

/// S3 — MINT fill: a crossing YES BUY / NO BUY pair mints a fresh YES+NO
/// pair at the resting price.
#[tokio::test]
async fn s3_crossing_yes_and_no_buys_mint_a_fresh_pair() {
    let engine = seeded_engine("m1").await;
    let now = Utc::now();
    fund(&engine, "alice", now).await;
    fund(&engine, "bob", now).await;

    engine
        .place_order(order("alice", "a1", "m1", OriginalSide::Yes, OrderDirection::Buy, 65, 5), now)
        .await
        .unwrap();
    let outcome = engine
        .place_order(order("bob", "b1", "m1", OriginalSide::No, OrderDirection::Buy, 35, 5), now)
        .await
        .unwrap();

    assert_eq!(outcome.fills.len(), 1);
    let fill = &outcome.fills[0];
    assert_eq!(fill.price.get(), 65);
    assert_eq!(fill.quantity, Quantity(5));

    let alice_pos = engine.store().get_or_create_position("alice", "m1").await.unwrap();
    assert_eq!(alice_pos.yes_volume, Quantity(5));
    assert_eq!(alice_pos.yes_cost_sum, Cents(325));

    let bob_pos = engine.store().get_or_create_position("bob", "m1").await.unwrap();
    assert_eq!(bob_pos.no_volume, Quantity(5));
    assert_eq!(bob_pos.no_cost_sum, Cents(175));

    let market = engine.store().get_market("m1").await.unwrap();
    assert_eq!(market.reserve_balance, Cents(500));
    assert_eq!(market.total_yes_shares, Quantity(5));
    assert_eq!(market.total_no_shares, Quantity(5));
}

/// S4 — TRANSFER_YES with price improvement: a resting sell at 60 fills a
/// buy limited at 70 at the maker's (better) price.
#[tokio::test]
async fn s4_transfer_yes_fills_at_the_resting_maker_price() {
    let engine = seeded_engine("m1").await;
    let now = Utc::now();
    fund(&engine, "alice", now).await;
    fund(&engine, "bob", now).await;

    // Bob must own 10 YES shares before he can rest a YES sell: mint them
    // first via a crossing NO buy from the AMM.
    fund(&engine, "AMM", now).await;
    engine
        .place_order(order("bob", "b0", "m1", OriginalSide::Yes, OrderDirection::Buy, 60, 10), now)
        .await
        .unwrap();
    engine
        .place_order(order("AMM", "amm0", "m1", OriginalSide::No, OrderDirection::Buy, 40, 10), now)
        .await
        .unwrap();
    let bob_pos_before = engine.store().get_or_create_position("bob", "m1").await.unwrap();
    assert_eq!(bob_pos_before.yes_volume, Quantity(10));
    let bob_cost_before = bob_pos_before.yes_cost_sum;

    engine
        .place_order(order("bob", "b1", "m1", OriginalSide::Yes, OrderDirection::Sell, 60, 10), now)
        .await
        .unwrap();
    let outcome = engine
        .place_order(order("alice", "a1", "m1", OriginalSide::Yes, OrderDirection::Buy, 70, 10), now)
        .await
        .unwrap();

    assert_eq!(outcome.fills.len(), 1);
    assert_eq!(outcome.fills[0].price.get(), 60);

    let alice_pos = engine.store().get_or_create_position("alice", "m1").await.unwrap();
    assert_eq!(alice_pos.yes_volume, Quantity(10));
    assert_eq!(alice_pos.yes_cost_sum, Cents(600));

    let bob_pos = engine.store().get_or_create_position("bob", "m1").await.unwrap();
    assert_eq!(bob_pos.yes_volume, Quantity::ZERO);

    let expected_pnl = Cents(600) - bob_cost_before;
    assert_eq!(outcome.fills[0].quantity, Quantity(10));
    let trades = engine.store().list_trades_for_market("m1").await.unwrap();
    let transfer_trade = trades.iter().rev().find(|t| t.scenario == pm_core::enums::TradeScenario::TransferYes).unwrap();
    assert_eq!(transfer_trade.seller_realised_pnl, Some(expected_pnl));
}

/// S5 — auto-netting: once a user holds opposing YES/NO shares the
/// auto-netter immediately cashes out the overlap. Netting (C12) only runs
/// for the fill's buy-side user (spec.md §4.12), so alice must end up on
/// the buy side of the fill that completes her opposing pair.
#[tokio::test]
async fn s5_auto_netting_cashes_out_opposing_holdings() {
    let engine = seeded_engine("m1").await;
    let now = Utc::now();
    fund(&engine, "alice", now).await;
    fund(&engine, "bob", now).await;

    // Bob rests a YES buy; alice's NO buy (a SYNTHETIC_SELL) crosses it,
    // leaving alice on the sell side of this MINT and holding 5 NO shares.
    engine
        .place_order(order("bob", "b1", "m1", OriginalSide::Yes, OrderDirection::Buy, 65, 5), now)
        .await
        .unwrap();
    engine
        .place_order(order("alice", "a1", "m1", OriginalSide::No, OrderDirection::Buy, 35, 5), now)
        .await
        .unwrap();

    let alice_before = engine.store().get_or_create_position("alice", "m1").await.unwrap();
    assert_eq!(alice_before.no_volume, Quantity(5));
    assert_eq!(alice_before.yes_volume, Quantity::ZERO);
    let available_before = engine.store().get_or_create_account("alice", true).await.unwrap().available_balance;

    // Alice now rests a YES buy of her own; bob's NO buy crosses it, putting
    // alice on the *buy* side of this MINT -> she now holds 5 YES + 5 NO and
    // the auto-netter collapses the pair immediately.
    engine
        .place_order(order("alice", "a2", "m1", OriginalSide::Yes, OrderDirection::Buy, 40, 5), now)
        .await
        .unwrap();
    let netting_outcome = engine
        .place_order(order("bob", "b2", "m1", OriginalSide::No, OrderDirection::Buy, 60, 5), now)
        .await
        .unwrap();
    assert_eq!(netting_outcome.fills.len(), 1);

    let alice_after = engine.store().get_or_create_position("alice", "m1").await.unwrap();
    assert_eq!(alice_after.yes_volume, Quantity::ZERO);
    assert_eq!(alice_after.no_volume, Quantity::ZERO);

    // Bob ends up holding 5 YES (from b1) and 5 NO (from b2) too, but
    // netting only runs for the buy-side user of each fill (alice in both
    // trades here), so his opposing pair is left outstanding.
    let market = engine.store().get_market("m1").await.unwrap();
    assert_eq!(market.total_yes_shares, Quantity(5));
    assert_eq!(market.total_no_shares, Quantity(5));

    let available_after = engine.store().get_or_create_account("alice", true).await.unwrap().available_balance;
    assert!(available_after.0 > available_before.0, "netting must credit cash back to alice");
}

/// S6 — BURN: a YES sell crossing a NO "sell" (SYNTHETIC_BUY) destroys a
/// pair and redeems 100 cents of reserve per unit.
#[tokio::test]
async fn s6_burn_destroys_a_pair_and_pays_both_sides() {
    let engine = seeded_engine("m1").await;
    let now = Utc::now();
    fund(&engine, "alice", now).await;
    fund(&engine, "bob", now).await;
    fund(&engine, "AMM", now).await;

    // Give alice 5 YES and bob 5 NO via two independent mints against the AMM.
    engine
        .place_order(order("alice", "a0", "m1", OriginalSide::Yes, OrderDirection::Buy, 50, 5), now)
        .await
        .unwrap();
    engine
        .place_order(order("AMM", "amm0", "m1", OriginalSide::No, OrderDirection::Buy, 50, 5), now)
        .await
        .unwrap();
    engine
        .place_order(order("bob", "b0", "m1", OriginalSide::No, OrderDirection::Buy, 50, 5), now)
        .await
        .unwrap();
    engine
        .place_order(order("AMM", "amm1", "m1", OriginalSide::Yes, OrderDirection::Buy, 50, 5), now)
        .await
        .unwrap();

    let market_before = engine.store().get_market("m1").await.unwrap();
    assert_eq!(market_before.total_yes_shares, Quantity(10));

    // Alice sells her 5 YES at 70; bob sells his 5 NO at 30 (a SYNTHETIC_BUY
    // at book price 70) -> crosses at alice's resting price, scenario BURN.
    engine
        .place_order(order("alice", "a1", "m1", OriginalSide::Yes, OrderDirection::Sell, 70, 5), now)
        .await
        .unwrap();
    let outcome = engine
        .place_order(order("bob", "b1", "m1", OriginalSide::No, OrderDirection::Sell, 30, 5), now)
        .await
        .unwrap();

    assert_eq!(outcome.fills.len(), 1);
    assert_eq!(outcome.fills[0].price.get(), 70);

    let market_after = engine.store().get_market("m1").await.unwrap();
    assert_eq!(market_after.total_yes_shares, Quantity(5));
    assert_eq!(market_after.total_no_shares, Quantity(5));
    assert_eq!(market_after.reserve_balance, market_before.reserve_balance - Cents(500));
}

/// Mints `qty` YES shares to `user` at `price` by crossing against a
/// dedicated funder's NO buy, so a test can give a participant shares to
/// rest a native sell order against without that setup being the thing
/// under test.
async fn mint_yes(engine: &Engine<InMemoryStore>, user: &str, qty: u32, price: u8, now: chrono::DateTime<Utc>) {
    engine
        .place_order(
            order(user, &format!("{user}-mint-{price}"), "m1", OriginalSide::Yes, OrderDirection::Buy, price, qty),
            now,
        )
        .await
        .unwrap();
    engine
        .place_order(
            order("funder", &format!("funder-mint-{user}-{price}"), "m1", OriginalSide::No, OrderDirection::Buy, 100 - price, qty),
            now,
        )
        .await
        .unwrap();
}

/// S7 — self-trade skip: a user's own resting order is rotated past, and
/// the AMM is exempt from self-trade prevention.
#[tokio::test]
async fn s7_self_trade_is_skipped_but_the_amm_is_exempt() {
    let engine = seeded_engine("m1").await;
    let now = Utc::now();
    fund(&engine, "alice", now).await;
    fund(&engine, "carol", now).await;
    fund(&engine, "AMM", now).await;
    fund(&engine, "funder", now).await;

    // Give alice, carol, and the AMM YES shares to rest sells against.
    mint_yes(&engine, "alice", 5, 50, now).await;
    mint_yes(&engine, "carol", 5, 50, now).await;
    mint_yes(&engine, "AMM", 5, 50, now).await;

    // Alice rests a YES sell; carol rests another at the same price (time
    // priority behind alice's).
    engine
        .place_order(order("alice", "a1", "m1", OriginalSide::Yes, OrderDirection::Sell, 50, 5), now)
        .await
        .unwrap();
    engine
        .place_order(order("carol", "c1", "m1", OriginalSide::Yes, OrderDirection::Sell, 50, 5), now)
        .await
        .unwrap();

    // Alice's own crossing buy must skip her own resting ask and match
    // carol's instead.
    let outcome = engine
        .place_order(order("alice", "a2", "m1", OriginalSide::Yes, OrderDirection::Buy, 50, 5), now)
        .await
        .unwrap();
    assert_eq!(outcome.fills.len(), 1);
    assert_eq!(outcome.fills[0].maker_user_id, "carol");

    // Alice's original resting ask is still open (rotated, not consumed).
    let alice_order = engine.store().get_order(&outcome_order_id(&engine, "alice", "a1").await).await.unwrap();
    assert!(alice_order.is_active());

    // The AMM may freely trade against itself.
    engine
        .place_order(order("AMM", "amm1", "m1", OriginalSide::Yes, OrderDirection::Sell, 55, 5), now)
        .await
        .unwrap();
    let amm_outcome = engine
        .place_order(order("AMM", "amm2", "m1", OriginalSide::Yes, OrderDirection::Buy, 55, 5), now)
        .await
        .unwrap();
    assert_eq!(amm_outcome.fills.len(), 1);
}

async fn outcome_order_id(engine: &Engine<InMemoryStore>, user: &str, client_id: &str) -> String {
    engine
        .store()
        .find_by_client_order_id(user, client_id)
        .await
        .unwrap()
        .expect("order must exist")
        .order_id
}

/// S8 — settlement: resolving YES pays every YES holder 100/share, zeros
/// every position, cancels resting orders, and leaves the market drained.
#[tokio::test]
async fn s8_settlement_pays_winners_and_zeros_the_market() {
    let engine = seeded_engine("m1").await;
    let now = Utc::now();
    fund(&engine, "alice", now).await;
    fund(&engine, "bob", now).await;

    engine
        .place_order(order("alice", "a1", "m1", OriginalSide::Yes, OrderDirection::Buy, 65, 5), now)
        .await
        .unwrap();
    engine
        .place_order(order("bob", "b1", "m1", OriginalSide::No, OrderDirection::Buy, 35, 5), now)
        .await
        .unwrap();

    // A resting order left unfilled, to be cancelled by settlement.
    engine
        .place_order(order("bob", "b2", "m1", OriginalSide::Yes, OrderDirection::Buy, 10, 3), now)
        .await
        .unwrap();

    let market_before = engine.store().get_market("m1").await.unwrap();
    let alice_available_before = engine.store().get_or_create_account("alice", true).await.unwrap().available_balance;

    let settlement = engine.settle_market("m1", ResolutionResult::Yes, now).await.unwrap();
    assert_eq!(settlement.cancelled_order_ids.len(), 1);
    assert_eq!(settlement.total_paid, market_before.reserve_balance);

    let alice_after = engine.store().get_or_create_account("alice", true).await.unwrap();
    assert_eq!(alice_after.available_balance, alice_available_before + Cents(500));
    assert_eq!(alice_after.frozen_balance, Cents::ZERO);

    let alice_pos = engine.store().get_or_create_position("alice", "m1").await.unwrap();
    assert_eq!(alice_pos.yes_volume, Quantity::ZERO);
    let bob_pos = engine.store().get_or_create_position("bob", "m1").await.unwrap();
    assert_eq!(bob_pos.no_volume, Quantity::ZERO);

    let market_after = engine.store().get_market("m1").await.unwrap();
    assert_eq!(market_after.status, MarketStatus::Settled);
    assert_eq!(market_after.reserve_balance, Cents::ZERO);
    assert_eq!(market_after.pnl_pool, Cents::ZERO);
    assert_eq!(market_after.total_yes_shares, Quantity::ZERO);
    assert_eq!(market_after.total_no_shares, Quantity::ZERO);
    assert_eq!(market_after.resolution_result, Some(ResolutionResult::Yes));

    // Bob's unfilled resting order's funds were unfrozen by the cancel pass.
    let bob_acct = engine.store().get_or_create_account("bob", true).await.unwrap();
    assert_eq!(bob_acct.frozen_balance, Cents::ZERO);
}

#[tokio::test]
async fn batch_cancel_scope_filters_by_original_direction() {
    let engine = seeded_engine("m1").await;
    let now = Utc::now();
    fund(&engine, "alice", now).await;

    engine
        .place_order(order("alice", "buy1", "m1", OriginalSide::Yes, OrderDirection::Buy, 40, 5), now)
        .await
        .unwrap();
    // Give alice shares to sell, then rest a sell order too.
    fund(&engine, "AMM", now).await;
    engine
        .place_order(order("alice", "a2", "m1", OriginalSide::Yes, OrderDirection::Buy, 60, 5), now)
        .await
        .unwrap();
    engine
        .place_order(order("AMM", "amm1", "m1", OriginalSide::No, OrderDirection::Buy, 40, 5), now)
        .await
        .unwrap();
    engine
        .place_order(order("alice", "sell1", "m1", OriginalSide::Yes, OrderDirection::Sell, 80, 5), now)
        .await
        .unwrap();

    let outcome = engine.batch_cancel("m1", "alice", CancelScope::BuyOnly, now).await.unwrap();
    assert_eq!(outcome.cancelled_order_ids.len(), 1);

    let remaining = engine.store().list_active_for_user("m1", "alice").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].original_direction, OrderDirection::Sell);
}
