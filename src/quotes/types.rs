//! Shared market-data and order types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One day of OHLCV data for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confirmed execution reported by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub price: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// Quote source failures. Per-symbol and recoverable: the symbol is skipped
/// for the cycle and nothing is cached.
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("quote unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },
}

impl QuoteError {
    pub fn unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }
}

/// Broker failures. Per-transition and recoverable: the engine leaves the
/// state machine untouched and retries next cycle.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order rejected: {reason}")]
    Rejected { reason: String },
    #[error("order not filled within {secs}s")]
    Timeout { secs: u64 },
}
