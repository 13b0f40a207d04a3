//! Account custody (C3) — per-user available/frozen cash (spec.md §4.3).
//!
//! This module is the pure domain model only. The conditional-write
//! discipline ("UPDATE ... WHERE available >= amount RETURNING ...") that
//! makes these mutations atomic lives on the [`crate::store::AccountStore`]
//! port, not here — `Account` itself is a plain row shadow, mirroring
//! `pm_account/domain/models.py::Account`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Cents;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub available_balance: Cents,
    pub frozen_balance: Cents,
    pub version: i64,
    /// False for the AMM account, true for every other user (spec.md §3).
    pub auto_netting_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: impl Into<String>, auto_netting_enabled: bool, now: DateTime<Utc>) -> Self {
        Account {
            user_id: user_id.into(),
            available_balance: Cents::ZERO,
            frozen_balance: Cents::ZERO,
            version: 0,
            auto_netting_enabled,
            updated_at: now,
        }
    }

    pub fn total_balance(&self) -> Cents {
        self.available_balance + self.frozen_balance
    }
}
