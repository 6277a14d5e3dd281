//! Symbol screening: the price floor filter and trailing-drawdown detection.
//!
//! Every lookup goes cache-first and falls back to the quote source on a
//! miss, writing the result back before returning. Per-symbol failures are
//! skipped and counted; one dead quote never sinks a batch.

use crate::cache::{CacheKind, CacheStore};
use crate::config::StrategyConfig;
use crate::quotes::{DailyBar, QuoteError, QuoteSource};
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Trailing-drawdown measurement for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct DropAnalysis {
    pub symbol: String,
    /// Maximum high over the lookback window
    pub high_price: Decimal,
    /// Latest close in the window
    pub current_price: Decimal,
    /// (high - current) / high
    pub drop_pct: Decimal,
}

/// Result of the price floor filter over a batch.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub eligible: Vec<String>,
    pub checked: usize,
    pub failed: usize,
    pub from_cache: bool,
}

/// Result of the drop scan over a batch.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Symbols whose drawdown met the configured threshold
    pub candidates: Vec<DropAnalysis>,
    pub checked: usize,
    pub failed: usize,
}

/// Cached access to quotes plus the two screening passes.
pub struct Screener {
    cache: Arc<CacheStore>,
    quotes: Arc<dyn QuoteSource>,
    strategy: StrategyConfig,
    fetch_concurrency: usize,
}

impl Screener {
    pub fn new(
        strategy: StrategyConfig,
        cache: Arc<CacheStore>,
        quotes: Arc<dyn QuoteSource>,
        fetch_concurrency: usize,
    ) -> Self {
        Self {
            cache,
            quotes,
            strategy,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    /// Latest price for a symbol, cache-first.
    pub async fn current_price(&self, symbol: &str) -> Result<Decimal, QuoteError> {
        let key = CacheStore::price_key(symbol);
        if let Some(price) = self.cache.get::<Decimal>(&key) {
            return Ok(price);
        }

        let price = self.quotes.current_price(symbol).await?;
        self.cache.set(&key, CacheKind::Price, &price);
        Ok(price)
    }

    /// Daily bars covering the trailing window, cache-first.
    pub async fn history(&self, symbol: &str, days: u32) -> Result<Vec<DailyBar>, QuoteError> {
        let key = CacheStore::history_key(symbol, days);
        if let Some(bars) = self.cache.get::<Vec<DailyBar>>(&key) {
            return Ok(bars);
        }

        let bars = self.quotes.history(symbol, days).await?;
        self.cache.set(&key, CacheKind::History, &bars);
        Ok(bars)
    }

    /// Keep symbols trading above the configured price floor.
    ///
    /// The whole eligible set is cached under a filter key; on a cache miss
    /// the per-symbol prices fan out with bounded concurrency.
    #[instrument(skip(self, symbols), fields(universe = symbols.len()))]
    pub async fn filter_by_min_price(&self, symbols: &[String]) -> FilterOutcome {
        let min_price = self.strategy.min_stock_price;
        let filter_key = CacheStore::filter_key(min_price);

        if let Some(eligible) = self.cache.get::<Vec<String>>(&filter_key) {
            info!(
                eligible = eligible.len(),
                %min_price,
                "Using cached price floor filter"
            );
            return FilterOutcome {
                eligible,
                checked: 0,
                failed: 0,
                from_cache: true,
            };
        }

        let prices: HashMap<String, Result<Decimal, QuoteError>> =
            stream::iter(symbols.iter().cloned())
                .map(|symbol| async move {
                    let result = self.current_price(&symbol).await;
                    (symbol, result)
                })
                .buffer_unordered(self.fetch_concurrency)
                .collect()
                .await;

        let mut eligible = Vec::new();
        let mut failed = 0usize;

        // Preserve the universe ordering in the output.
        for symbol in symbols {
            match prices.get(symbol) {
                Some(Ok(price)) if *price > min_price => eligible.push(symbol.clone()),
                Some(Ok(price)) => {
                    debug!(symbol = %symbol, %price, "Below price floor");
                }
                Some(Err(e)) => {
                    debug!(symbol = %symbol, error = %e, "Skipping symbol, quote failed");
                    failed += 1;
                }
                None => failed += 1,
            }
        }

        self.cache.set(&filter_key, CacheKind::Filter, &eligible);

        info!(
            checked = symbols.len(),
            eligible = eligible.len(),
            failed,
            %min_price,
            "Price floor filter complete"
        );

        FilterOutcome {
            eligible,
            checked: symbols.len(),
            failed,
            from_cache: false,
        }
    }

    /// Drawdown over the trailing lookback window for one symbol.
    pub async fn compute_drop(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<DropAnalysis, QuoteError> {
        let bars = self.history(symbol, lookback_days).await?;
        if bars.len() < 2 {
            return Err(QuoteError::unavailable(symbol, "insufficient history"));
        }

        // Trailing window, inclusive of the latest bar.
        let window = &bars[bars.len().saturating_sub(lookback_days as usize)..];

        let high_price = window
            .iter()
            .map(|b| b.high)
            .max()
            .expect("window checked non-empty");
        let current_price = window.last().expect("window checked non-empty").close;
        let drop_pct = crate::utils::decimal::drawdown(high_price, current_price);

        Ok(DropAnalysis {
            symbol: symbol.to_string(),
            high_price,
            current_price,
            drop_pct,
        })
    }

    /// Scan a batch for symbols whose drawdown meets the drop threshold.
    #[instrument(skip(self, symbols), fields(batch = symbols.len()))]
    pub async fn scan_for_drops(&self, symbols: &[String]) -> ScanOutcome {
        let lookback = self.strategy.lookback_days;

        let results: Vec<Result<DropAnalysis, QuoteError>> = stream::iter(symbols.iter())
            .map(|symbol| self.compute_drop(symbol, lookback))
            .buffer_unordered(self.fetch_concurrency)
            .collect()
            .await;

        let mut outcome = ScanOutcome {
            checked: symbols.len(),
            ..ScanOutcome::default()
        };

        for result in results {
            match result {
                Ok(analysis) => {
                    if analysis.drop_pct >= self.strategy.drop_threshold {
                        info!(
                            symbol = %analysis.symbol,
                            drop_pct = %analysis.drop_pct,
                            high = %analysis.high_price,
                            current = %analysis.current_price,
                            "Drop detected"
                        );
                        outcome.candidates.push(analysis);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Drop scan skipped a symbol");
                    outcome.failed += 1;
                }
            }
        }

        // buffer_unordered scrambles completion order; keep reports stable.
        outcome.candidates.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        info!(
            checked = outcome.checked,
            candidates = outcome.candidates.len(),
            failed = outcome.failed,
            "Drop scan complete"
        );

        outcome
    }
}
