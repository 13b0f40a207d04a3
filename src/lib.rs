//! `pm_core` — matching and clearing engine for a binary-outcome
//! prediction-market exchange (spec.md §1). The crate owns everything
//! between order intake and ledgered settlement: the order-intent
//! transformer, the price-time-priority matcher, the scenario-dispatched
//! clearing handlers, custody of funds and shares, fee accrual, auto-
//! netting, market resolution, and the invariants that tie all of it
//! together. User auth, HTTP transport, and schema migrations are external
//! collaborators (spec.md §1) this crate does not implement.

pub mod account;
pub mod book;
pub mod clearing;
pub mod config;
pub mod contract;
pub mod engine;
pub mod enums;
pub mod error;
pub mod id;
pub mod invariant;
pub mod ledger;
mod macros;
pub mod market;
pub mod match_engine;
pub mod money;
pub mod order;
pub mod position;
pub mod risk;
pub mod settlement;
pub mod store;
pub mod trade;
pub mod wal;
