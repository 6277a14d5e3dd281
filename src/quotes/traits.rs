//! Collaborator seams the engine is written against.

use super::types::{DailyBar, Fill, OrderError, OrderSide, QuoteError};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Source of current prices and daily history.
///
/// Implementations may be a single vendor or a failover pair; callers see one
/// logical source that either answers or fails per symbol.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Latest available price for a symbol.
    async fn current_price(&self, symbol: &str) -> Result<Decimal, QuoteError>;

    /// Daily bars covering at least the trailing `days` window, oldest first.
    async fn history(&self, symbol: &str, days: u32) -> Result<Vec<DailyBar>, QuoteError>;
}

/// Order execution gateway.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Submit a market order and wait for the fill confirmation.
    async fn submit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: u32,
    ) -> Result<Fill, OrderError>;
}
