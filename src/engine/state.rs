//! Watchlist, holdings, and trade-log state.
//!
//! A symbol is a member of at most one of {watchlist, holdings} at any time;
//! `EngineState::tracks` is the membership check every transition must pass
//! before it may fire.

use crate::quotes::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A symbol under observation after a qualifying drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    /// Price at the moment the drop was detected
    pub trigger_price: Decimal,
    /// Trailing high the drop was measured from
    pub high_price: Decimal,
    /// Fractional decline from `high_price` at detection time
    pub drop_pct: Decimal,
    pub added_at: DateTime<Utc>,
}

/// An open position. Quantity is fixed at entry and never re-evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: u32,
    pub entry_price: Decimal,
    pub entered_at: DateTime<Utc>,
}

impl Holding {
    /// Fractional gain of `current` over the entry price.
    pub fn gain_at(&self, current: Decimal) -> Decimal {
        crate::utils::decimal::fractional_change(self.entry_price, current)
    }
}

/// One row of the append-only trade log. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: u32,
    pub executed_at: DateTime<Utc>,
    /// Set on sells only: (exit - entry) * quantity
    pub realized_pnl: Option<Decimal>,
}

/// In-memory engine state, loaded from and mirrored to the state store.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub watchlist: HashMap<String, WatchlistEntry>,
    pub holdings: HashMap<String, Holding>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the symbol is already watchlisted or held. The mandatory
    /// precondition for adding to the watchlist.
    pub fn tracks(&self, symbol: &str) -> bool {
        self.watchlist.contains_key(symbol) || self.holdings.contains_key(symbol)
    }
}
