//! Primary/fallback quote source pair.

use super::traits::QuoteSource;
use super::types::{DailyBar, QuoteError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

/// Wraps two quote sources and fails over transparently: callers see one
/// logical source. The fallback answer is only consulted after the primary
/// has failed for that symbol.
pub struct FailoverSource {
    primary: Arc<dyn QuoteSource>,
    fallback: Arc<dyn QuoteSource>,
}

impl FailoverSource {
    pub fn new(primary: Arc<dyn QuoteSource>, fallback: Arc<dyn QuoteSource>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl QuoteSource for FailoverSource {
    async fn current_price(&self, symbol: &str) -> Result<Decimal, QuoteError> {
        match self.primary.current_price(symbol).await {
            Ok(price) => Ok(price),
            Err(e) => {
                warn!(symbol, error = %e, "Primary quote source failed, trying fallback");
                self.fallback.current_price(symbol).await
            }
        }
    }

    async fn history(&self, symbol: &str, days: u32) -> Result<Vec<DailyBar>, QuoteError> {
        match self.primary.history(symbol, days).await {
            Ok(bars) => Ok(bars),
            Err(e) => {
                warn!(symbol, error = %e, "Primary quote source failed, trying fallback");
                self.fallback.history(symbol, days).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::mock::MockQuoteSource;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_primary_answer_wins() {
        let primary = Arc::new(MockQuoteSource::new());
        primary.set_price("AAPL", dec!(100));
        let fallback = Arc::new(MockQuoteSource::new());
        fallback.set_price("AAPL", dec!(99));

        let source = FailoverSource::new(primary, fallback);
        assert_eq!(source.current_price("AAPL").await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn test_falls_back_on_primary_failure() {
        let primary = Arc::new(MockQuoteSource::new());
        primary.fail_symbol("AAPL");
        let fallback = Arc::new(MockQuoteSource::new());
        fallback.set_price("AAPL", dec!(99));

        let source = FailoverSource::new(primary, fallback);
        assert_eq!(source.current_price("AAPL").await.unwrap(), dec!(99));
    }

    #[tokio::test]
    async fn test_both_failing_surfaces_error() {
        let primary = Arc::new(MockQuoteSource::new());
        primary.fail_symbol("AAPL");
        let fallback = Arc::new(MockQuoteSource::new());
        fallback.fail_symbol("AAPL");

        let source = FailoverSource::new(primary, fallback);
        assert!(source.current_price("AAPL").await.is_err());
    }
}
