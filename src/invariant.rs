//! Invariant checker (C14) — spec.md §4.14, grounded on
//! `pm_clearing/domain/invariants.py::verify_after_trade` and
//! `global_invariants.py::verify_global`. Every violation is fatal (spec.md
//! §7's "invariant" failure class): the engine (C13) treats a non-`Ok`
//! return as a reason to abort the operation, evict the in-memory book, and
//! emit a loud `tracing::error!` under `target: "pm_core::invariant"`.

use tracing::error;

use crate::account::Account;
use crate::error::{CoreResult, InvariantError};
use crate::market::Market;
use crate::money::Cents;
use crate::position::Position;

/// Checks INV-1, INV-2, and INV-3 against one market's current aggregate
/// state and the positions resting in it. Called after every fill (and any
/// privileged mint/burn) before the engine releases the market lock.
pub fn verify_after_trade(market: &Market, positions: &[Position]) -> CoreResult<()> {
    if market.total_yes_shares != market.total_no_shares {
        let err = InvariantError::ShareSymmetry {
            market: market.market_id.clone(),
            yes: market.total_yes_shares.0 as i64,
            no: market.total_no_shares.0 as i64,
        };
        error!(target: "pm_core::invariant", market = %market.market_id, ?err, "INV-1 violated");
        return Err(err.into());
    }

    let expected_reserve = (market.total_yes_shares.0 as i64)
        .checked_mul(100)
        .map(Cents)
        .ok_or(crate::error::SystemError::Overflow)?;
    if market.reserve_balance != expected_reserve {
        let err = InvariantError::ReserveShareCoupling {
            market: market.market_id.clone(),
            reserve: market.reserve_balance.0,
            yes: market.total_yes_shares.0 as i64,
        };
        error!(target: "pm_core::invariant", market = %market.market_id, ?err, "INV-2 violated");
        return Err(err.into());
    }

    let cost_sum = positions.iter().try_fold(Cents::ZERO, |acc, p| {
        acc.checked_add(p.yes_cost_sum)
            .and_then(|a| a.checked_add(p.no_cost_sum))
    });
    let cost_sum = cost_sum.ok_or(crate::error::SystemError::Overflow)?;
    let lhs = market
        .reserve_balance
        .checked_add(market.pnl_pool)
        .ok_or(crate::error::SystemError::Overflow)?;
    if lhs != cost_sum {
        let err = InvariantError::ReserveCostBalance {
            market: market.market_id.clone(),
            reserve: market.reserve_balance.0,
            pnl: market.pnl_pool.0,
            cost_sum: cost_sum.0,
        };
        error!(target: "pm_core::invariant", market = %market.market_id, ?err, "INV-3 violated");
        return Err(err.into());
    }

    Ok(())
}

/// Checks INV-G: the sum over all user accounts of `(available + frozen)`,
/// plus every market's `reserve_balance`, equals net deposits minus net
/// withdrawals. This has no hot-path call site — the `Store` port
/// deliberately exposes no "list every account" method (it would force a
/// full table scan per trade) — so a periodic external sweep assembles
/// `accounts`/`markets` (e.g. via a batched store query) and calls this.
pub fn verify_global(accounts: &[Account], markets: &[Market], net_deposits: Cents, net_withdrawals: Cents) -> CoreResult<()> {
    let accounts_total = accounts.iter().try_fold(Cents::ZERO, |acc, a| {
        acc.checked_add(a.available_balance)
            .and_then(|a2| a2.checked_add(a.frozen_balance))
    });
    let accounts_total = accounts_total.ok_or(crate::error::SystemError::Overflow)?;

    let reserves_total = markets
        .iter()
        .try_fold(Cents::ZERO, |acc, m| acc.checked_add(m.reserve_balance));
    let reserves_total = reserves_total.ok_or(crate::error::SystemError::Overflow)?;

    let lhs = accounts_total
        .checked_add(reserves_total)
        .ok_or(crate::error::SystemError::Overflow)?;
    let rhs = net_deposits
        .checked_sub(net_withdrawals)
        .ok_or(crate::error::SystemError::Overflow)?;

    if lhs != rhs {
        let err = InvariantError::GlobalZeroSum(format!(
            "accounts+reserves = {} cents, net deposits - withdrawals = {} cents",
            lhs.0, rhs.0
        ));
        error!(target: "pm_core::invariant", ?err, "INV-G violated");
        return Err(err.into());
    }

    Ok(())
}
