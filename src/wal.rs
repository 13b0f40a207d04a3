//! WAL event (spec.md §3 "WAL event") — append-only order-book audit log,
//! grounded on `write_wal_event` in `pm_clearing/infrastructure/ledger.py`.
//! The payload is a free-form JSON object; the engine (C13) writes one row
//! per ORDER_ACCEPTED/ORDER_MATCHED/ORDER_PARTIALLY_FILLED/ORDER_CANCELLED/
//! ORDER_EXPIRED transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::WalEventKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEvent {
    pub id: u64,
    pub market_id: String,
    pub order_id: String,
    pub kind: WalEventKind,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWalEvent {
    pub market_id: String,
    pub order_id: String,
    pub kind: WalEventKind,
    pub payload: Value,
}
