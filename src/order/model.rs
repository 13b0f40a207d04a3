//! Order row shape (spec.md §3 "Order"), capturing both the user's original
//! intent and the book view produced by the transformer (C5). Grounded on
//! `pm_order/domain/models.py::Order`, including its `__post_init__`
//! invariant that `remaining_quantity = quantity - filled_quantity`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{BookDirection, BookType, FrozenAssetType, OrderDirection, OrderStatus, OriginalSide, TimeInForce};
use crate::money::{Cents, Price, Quantity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub market_id: String,
    pub user_id: String,
    pub client_order_id: String,

    pub original_side: OriginalSide,
    pub original_direction: OrderDirection,
    pub original_price: Price,

    pub book_type: BookType,
    pub book_direction: BookDirection,
    pub book_price: Price,

    pub quantity: Quantity,
    pub filled_quantity: Quantity,

    pub frozen_amount: Cents,
    pub frozen_asset_type: Option<FrozenAssetType>,

    pub time_in_force: TimeInForce,
    pub status: OrderStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Invariant from spec.md §3: `filled + remaining = quantity`, always.
    pub fn remaining_quantity(&self) -> Quantity {
        Quantity(self.quantity.0 - self.filled_quantity.0)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    pub fn is_cancellable(&self) -> bool {
        self.status.is_cancellable()
    }

    /// The fields that must match for an idempotent replay of the same
    /// `client_order_id` to be accepted as a no-op (spec.md §4.13
    /// "Idempotent placement").
    pub fn matches_intent(
        &self,
        side: OriginalSide,
        direction: OrderDirection,
        price: Price,
        quantity: Quantity,
    ) -> bool {
        self.original_side == side
            && self.original_direction == direction
            && self.original_price == price
            && self.quantity == quantity
    }
}

/// Input accepted by `place_order` (spec.md §6 boundary contract).
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub client_order_id: String,
    pub market_id: String,
    pub user_id: String,
    pub side: OriginalSide,
    pub direction: OrderDirection,
    pub price: Price,
    pub quantity: Quantity,
    pub time_in_force: TimeInForce,
}
