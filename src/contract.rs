//! Boundary data contracts (§17 of the design notes) — the request/response
//! DTOs an external HTTP/RPC layer exchanges with this crate, grounded 1:1
//! on `pm_order/application/schemas.py` and `pm_order/application/
//! amm_schemas.py`. Routing, auth, and pagination cursors stay external
//! (spec.md §1); this module owns only the serialization shape of the four
//! engine operations (place/cancel/replace/batch-cancel).

use serde::{Deserialize, Serialize};

use crate::clearing::scenario;
use crate::engine::{BatchCancelOutcome, PlaceOrderOutcome, ReplaceOrderOutcome};
use crate::enums::{CancelScope, OrderDirection, OrderStatus, OriginalSide, TimeInForce};
use crate::error::{CoreError, CoreResult};
use crate::match_engine::Fill;
use crate::money::{Price, Quantity};
use crate::order::{NewOrderRequest, Order};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub client_order_id: String,
    pub market_id: String,
    pub side: OriginalSide,
    pub direction: OrderDirection,
    pub price_cents: u8,
    pub quantity: u32,
    #[serde(default)]
    pub time_in_force: TimeInForce,
}

impl PlaceOrderRequest {
    /// `pm_order/application/service.py` resolves `user_id` from the
    /// authenticated caller, never from the request body; this crate keeps
    /// the same split — the transport layer supplies `user_id` out of band.
    pub fn into_new_order_request(self, user_id: impl Into<String>) -> CoreResult<NewOrderRequest> {
        Ok(NewOrderRequest {
            client_order_id: self.client_order_id,
            market_id: self.market_id,
            user_id: user_id.into(),
            side: self.side,
            direction: self.direction,
            price: Price::new(self.price_cents)?,
            quantity: Quantity(self.quantity),
            time_in_force: self.time_in_force,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub client_order_id: String,
    pub market_id: String,
    pub side: OriginalSide,
    pub direction: OrderDirection,
    pub price_cents: u8,
    pub quantity: u32,
    pub filled_quantity: u32,
    pub remaining_quantity: u32,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        OrderResponse {
            id: order.order_id.clone(),
            client_order_id: order.client_order_id.clone(),
            market_id: order.market_id.clone(),
            side: order.original_side,
            direction: order.original_direction,
            price_cents: order.original_price.get(),
            quantity: order.quantity.0,
            filled_quantity: order.filled_quantity.0,
            remaining_quantity: order.remaining_quantity().0,
            status: order.status,
            time_in_force: order.time_in_force,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResponse {
    pub buy_order_id: String,
    pub sell_order_id: String,
    pub price: u8,
    pub quantity: u32,
    pub scenario: String,
}

impl TryFrom<&Fill> for TradeResponse {
    type Error = CoreError;

    fn try_from(fill: &Fill) -> CoreResult<Self> {
        let scenario = scenario::determine(fill.buy_book_type, fill.sell_book_type)?;
        Ok(TradeResponse {
            buy_order_id: fill.buyer_order_id.clone(),
            sell_order_id: fill.seller_order_id.clone(),
            price: fill.price.get(),
            quantity: fill.quantity.0,
            scenario: scenario.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderResponse {
    pub order: OrderResponse,
    pub trades: Vec<TradeResponse>,
}

impl TryFrom<&PlaceOrderOutcome> for PlaceOrderResponse {
    type Error = CoreError;

    fn try_from(outcome: &PlaceOrderOutcome) -> CoreResult<Self> {
        let trades = outcome.fills.iter().map(TradeResponse::try_from).collect::<CoreResult<Vec<_>>>()?;
        Ok(PlaceOrderResponse {
            order: OrderResponse::from(&outcome.order),
            trades,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderResponse {
    pub order_id: String,
    pub unfrozen_amount: i64,
    pub unfrozen_asset_type: Option<String>,
}

impl CancelOrderResponse {
    pub fn from_cancelled(order: &Order) -> Self {
        CancelOrderResponse {
            order_id: order.order_id.clone(),
            unfrozen_amount: order.frozen_amount.0,
            unfrozen_asset_type: order.frozen_asset_type.map(|t| t.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceOrderRequest {
    pub old_order_id: String,
    pub new_order: PlaceOrderRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceOrderResponse {
    pub old_order_id: String,
    pub old_order_status: OrderStatus,
    pub old_order_filled_quantity: u32,
    pub old_order_original_quantity: u32,
    pub new_order: OrderResponse,
    pub trades: Vec<TradeResponse>,
}

impl TryFrom<&ReplaceOrderOutcome> for ReplaceOrderResponse {
    type Error = CoreError;

    fn try_from(outcome: &ReplaceOrderOutcome) -> CoreResult<Self> {
        let trades = outcome.fills.iter().map(TradeResponse::try_from).collect::<CoreResult<Vec<_>>>()?;
        Ok(ReplaceOrderResponse {
            old_order_id: outcome.old_order.order_id.clone(),
            old_order_status: outcome.old_order.status,
            old_order_filled_quantity: outcome.old_order.filled_quantity.0,
            old_order_original_quantity: outcome.old_order.quantity.0,
            new_order: OrderResponse::from(&outcome.new_order),
            trades,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCancelRequest {
    pub market_id: String,
    #[serde(default = "default_cancel_scope")]
    pub cancel_scope: CancelScope,
}

fn default_cancel_scope() -> CancelScope {
    CancelScope::All
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCancelResponse {
    pub market_id: String,
    pub cancelled_count: usize,
    pub total_unfrozen_funds_cents: i64,
    pub total_unfrozen_yes_shares: u32,
    pub total_unfrozen_no_shares: u32,
}

impl BatchCancelResponse {
    pub fn from_outcome(market_id: impl Into<String>, outcome: &BatchCancelOutcome) -> Self {
        BatchCancelResponse {
            market_id: market_id.into(),
            cancelled_count: outcome.cancelled_order_ids.len(),
            total_unfrozen_funds_cents: outcome.funds_unfrozen.0,
            total_unfrozen_yes_shares: outcome.yes_shares_unfrozen.0,
            total_unfrozen_no_shares: outcome.no_shares_unfrozen.0,
        }
    }
}
