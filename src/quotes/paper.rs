//! Paper broker: simulated fills at the currently quoted price.

use super::traits::{BrokerGateway, QuoteSource};
use super::types::{Fill, OrderError, OrderSide};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Fills every order instantly at the quote source's current price.
///
/// The default gateway when live trading is not enabled. An order for a
/// symbol the quote source cannot price is rejected, which mirrors how a real
/// broker refuses an unquotable instrument.
pub struct PaperBroker {
    quotes: Arc<dyn QuoteSource>,
    order_count: AtomicU64,
}

impl PaperBroker {
    pub fn new(quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            quotes,
            order_count: AtomicU64::new(0),
        }
    }

    /// Number of orders filled so far.
    pub fn order_count(&self) -> u64 {
        self.order_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn submit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: u32,
    ) -> Result<Fill, OrderError> {
        let price = self
            .quotes
            .current_price(symbol)
            .await
            .map_err(|e| OrderError::Rejected {
                reason: format!("cannot price paper fill: {}", e),
            })?;

        let seq = self.order_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(symbol, %side, quantity, %price, order = seq, "[PAPER] Order filled");

        Ok(Fill {
            price,
            filled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::mock::MockQuoteSource;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_fills_at_quoted_price() {
        let quotes = Arc::new(MockQuoteSource::new());
        quotes.set_price("AAPL", dec!(187.5));

        let broker = PaperBroker::new(quotes);
        let fill = broker.submit_order("AAPL", OrderSide::Buy, 1).await.unwrap();

        assert_eq!(fill.price, dec!(187.5));
        assert_eq!(broker.order_count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unquotable_symbol() {
        let quotes = Arc::new(MockQuoteSource::new());
        let broker = PaperBroker::new(quotes);

        let err = broker
            .submit_order("NOPE", OrderSide::Sell, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Rejected { .. }));
        assert_eq!(broker.order_count(), 0);
    }
}
