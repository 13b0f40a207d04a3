//! Ledger (C2) — append-only journal of every balance-changing event
//! (spec.md §4.2). The append operation and the append-only guarantee live
//! on [`crate::store::LedgerStore`]; this module is the row shape plus the
//! cursor-pagination request/response types, grounded on
//! `pm_account/domain/models.py::LedgerEntry` and the `_LIST_LEDGER_SQL`
//! cursor shape in `pm_account/infrastructure/persistence.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::LedgerEntryType;
use crate::money::Cents;

/// Sentinel user id for SYSTEM-side ledger legs (MINT/BURN reserve
/// movements), per spec.md §3 "the system uses 'SYSTEM' for reserve/
/// platform-fee legs".
pub const SYSTEM_USER_ID: &str = "SYSTEM";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub user_id: String,
    pub entry_type: LedgerEntryType,
    pub amount: Cents,
    /// Snapshot of `available_balance` after the mutation. For SYSTEM legs
    /// this is a placeholder 0 and informational only (spec.md §9 open
    /// question, decided: not interpreted as a real balance anywhere).
    pub balance_after: Cents,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub entry_type: LedgerEntryType,
    pub amount: Cents,
    pub balance_after: Cents,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub description: Option<String>,
}

impl NewLedgerEntry {
    pub fn system(entry_type: LedgerEntryType, amount: Cents, reference_id: impl Into<String>) -> Self {
        NewLedgerEntry {
            user_id: SYSTEM_USER_ID.to_string(),
            entry_type,
            amount,
            balance_after: Cents::ZERO,
            reference_type: None,
            reference_id: Some(reference_id.into()),
            description: None,
        }
    }
}

/// A single page of a descending-by-id ledger listing (spec.md §4.2
/// "cursor-paginated listing by user").
#[derive(Debug, Clone)]
pub struct LedgerPage {
    pub entries: Vec<LedgerEntry>,
    pub next_cursor: Option<u64>,
}
