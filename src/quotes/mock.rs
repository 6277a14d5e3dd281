//! Scripted quote source and broker for tests.

use super::traits::{BrokerGateway, QuoteSource};
use super::types::{DailyBar, Fill, OrderError, OrderSide, QuoteError};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Build a run of daily bars from closing prices, one bar per day ending at
/// `end`. High/low hug the close; volume is a steady million shares.
pub fn bars_from_closes(end: NaiveDate, closes: &[Decimal]) -> Vec<DailyBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let offset = (closes.len() - 1 - i) as i64;
            DailyBar {
                date: end - Duration::days(offset),
                open: *close,
                high: *close * dec!(1.01),
                low: *close * dec!(0.99),
                close: *close,
                volume: dec!(1_000_000),
            }
        })
        .collect()
}

/// Quote source with scripted prices, histories, and failure injection.
#[derive(Default)]
pub struct MockQuoteSource {
    prices: RwLock<HashMap<String, Decimal>>,
    histories: RwLock<HashMap<String, Vec<DailyBar>>>,
    failing: RwLock<HashSet<String>>,
    price_requests: AtomicU64,
    history_requests: AtomicU64,
}

impl MockQuoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices
            .write()
            .unwrap()
            .insert(symbol.to_string(), price);
    }

    pub fn set_history(&self, symbol: &str, bars: Vec<DailyBar>) {
        self.histories
            .write()
            .unwrap()
            .insert(symbol.to_string(), bars);
    }

    /// All subsequent requests for this symbol fail with `QuoteError`.
    pub fn fail_symbol(&self, symbol: &str) {
        self.failing.write().unwrap().insert(symbol.to_string());
    }

    pub fn recover_symbol(&self, symbol: &str) {
        self.failing.write().unwrap().remove(symbol);
    }

    /// Total `current_price` calls answered or failed.
    pub fn price_requests(&self) -> u64 {
        self.price_requests.load(Ordering::SeqCst)
    }

    /// Total `history` calls answered or failed.
    pub fn history_requests(&self) -> u64 {
        self.history_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for MockQuoteSource {
    async fn current_price(&self, symbol: &str) -> Result<Decimal, QuoteError> {
        self.price_requests.fetch_add(1, Ordering::SeqCst);

        if self.failing.read().unwrap().contains(symbol) {
            return Err(QuoteError::unavailable(symbol, "scripted failure"));
        }

        if let Some(price) = self.prices.read().unwrap().get(symbol) {
            return Ok(*price);
        }

        // Fall back to the last scripted close so tests that only set a
        // history behave like a real source.
        self.histories
            .read()
            .unwrap()
            .get(symbol)
            .and_then(|bars| bars.last())
            .map(|bar| bar.close)
            .ok_or_else(|| QuoteError::unavailable(symbol, "no scripted price"))
    }

    async fn history(&self, symbol: &str, _days: u32) -> Result<Vec<DailyBar>, QuoteError> {
        self.history_requests.fetch_add(1, Ordering::SeqCst);

        if self.failing.read().unwrap().contains(symbol) {
            return Err(QuoteError::unavailable(symbol, "scripted failure"));
        }

        self.histories
            .read()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| QuoteError::unavailable(symbol, "no scripted history"))
    }
}

/// An order the mock broker accepted.
#[derive(Debug, Clone)]
pub struct SubmittedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: Decimal,
}

/// Broker with scripted fill prices, rejection injection, and an order log.
#[derive(Default)]
pub struct MockBroker {
    fill_prices: RwLock<HashMap<String, Decimal>>,
    rejecting: RwLock<HashSet<String>>,
    submitted: RwLock<Vec<SubmittedOrder>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fill_price(&self, symbol: &str, price: Decimal) {
        self.fill_prices
            .write()
            .unwrap()
            .insert(symbol.to_string(), price);
    }

    /// All subsequent orders for this symbol are rejected.
    pub fn reject_symbol(&self, symbol: &str) {
        self.rejecting.write().unwrap().insert(symbol.to_string());
    }

    pub fn accept_symbol(&self, symbol: &str) {
        self.rejecting.write().unwrap().remove(symbol);
    }

    pub fn orders(&self) -> Vec<SubmittedOrder> {
        self.submitted.read().unwrap().clone()
    }

    pub fn order_count(&self) -> usize {
        self.submitted.read().unwrap().len()
    }

    pub fn orders_for(&self, symbol: &str) -> usize {
        self.submitted
            .read()
            .unwrap()
            .iter()
            .filter(|o| o.symbol == symbol)
            .count()
    }
}

#[async_trait]
impl BrokerGateway for MockBroker {
    async fn submit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: u32,
    ) -> Result<Fill, OrderError> {
        if self.rejecting.read().unwrap().contains(symbol) {
            return Err(OrderError::Rejected {
                reason: "scripted rejection".to_string(),
            });
        }

        let price = self
            .fill_prices
            .read()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| OrderError::Rejected {
                reason: format!("no scripted fill price for {}", symbol),
            })?;

        self.submitted.write().unwrap().push(SubmittedOrder {
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
        });

        Ok(Fill {
            price,
            filled_at: Utc::now(),
        })
    }
}
