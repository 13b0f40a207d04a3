//! Position custody (C4) — per-(user, market) YES/NO share volumes, cost
//! bases, and pending-sell reservations (spec.md §4.4), mirroring
//! `pm_account/domain/models.py::Position`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Cents, Quantity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub user_id: String,
    pub market_id: String,
    pub yes_volume: Quantity,
    pub yes_cost_sum: Cents,
    pub yes_pending_sell: Quantity,
    pub no_volume: Quantity,
    pub no_cost_sum: Cents,
    pub no_pending_sell: Quantity,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(user_id: impl Into<String>, market_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Position {
            user_id: user_id.into(),
            market_id: market_id.into(),
            yes_volume: Quantity::ZERO,
            yes_cost_sum: Cents::ZERO,
            yes_pending_sell: Quantity::ZERO,
            no_volume: Quantity::ZERO,
            no_cost_sum: Cents::ZERO,
            no_pending_sell: Quantity::ZERO,
            version: 0,
            updated_at: now,
        }
    }

    /// Shares free to rest a new sell against (spec.md §4.4, the guard
    /// `volume - pending_sell >= qty` for `freeze_yes`/`freeze_no`).
    pub fn available_yes(&self) -> Quantity {
        Quantity(self.yes_volume.0.saturating_sub(self.yes_pending_sell.0))
    }

    pub fn available_no(&self) -> Quantity {
        Quantity(self.no_volume.0.saturating_sub(self.no_pending_sell.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_shares_subtract_pending_sell() {
        let mut pos = Position::new("alice", "m1", Utc::now());
        pos.yes_volume = Quantity(10);
        pos.yes_pending_sell = Quantity(4);
        assert_eq!(pos.available_yes(), Quantity(6));
    }

    #[test]
    fn fresh_position_has_zero_everything() {
        let pos = Position::new("alice", "m1", Utc::now());
        assert_eq!(pos.available_yes(), Quantity::ZERO);
        assert_eq!(pos.available_no(), Quantity::ZERO);
    }
}
