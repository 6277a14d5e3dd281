//! Alpaca REST API client for market data and order routing.

use super::traits::{BrokerGateway, QuoteSource};
use super::types::{DailyBar, Fill, OrderError, OrderSide, QuoteError};
use crate::config::AlpacaConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

const DATA_BASE_URL: &str = "https://data.alpaca.markets";
const TRADING_BASE_URL: &str = "https://api.alpaca.markets";
const PAPER_TRADING_BASE_URL: &str = "https://paper-api.alpaca.markets";

/// Extra calendar days requested beyond the lookback window so weekends and
/// holidays still leave enough trading days in the response.
const CALENDAR_PADDING_DAYS: i64 = 10;

const FILL_POLL_ATTEMPTS: u32 = 10;
const FILL_POLL_INTERVAL_MS: u64 = 500;

/// Alpaca API client covering the market-data and trading endpoints.
pub struct AlpacaClient {
    http: Client,
    api_key: String,
    secret_key: String,
    data_base_url: String,
    trading_base_url: String,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    bars: Option<Vec<AlpacaBar>>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    open: Decimal,
    #[serde(rename = "h")]
    high: Decimal,
    #[serde(rename = "l")]
    low: Decimal,
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "v")]
    volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderStatus {
    id: String,
    status: String,
    filled_avg_price: Option<Decimal>,
    filled_at: Option<DateTime<Utc>>,
}

impl AlpacaClient {
    /// Create a new Alpaca client from configuration.
    pub fn new(config: &AlpacaConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let trading_base_url = if config.paper {
            PAPER_TRADING_BASE_URL.to_string()
        } else {
            TRADING_BASE_URL.to_string()
        };

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            data_base_url: DATA_BASE_URL.to_string(),
            trading_base_url,
        })
    }

    /// Override both base URLs (integration tests point these at a local server).
    pub fn with_base_urls(mut self, data: impl Into<String>, trading: impl Into<String>) -> Self {
        self.data_base_url = data.into();
        self.trading_base_url = trading.into();
        self
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    /// Fetch daily bars for the trailing window, oldest first.
    #[instrument(skip(self))]
    async fn fetch_daily_bars(&self, symbol: &str, days: u32) -> Result<Vec<DailyBar>, QuoteError> {
        let start = Utc::now() - Duration::days(i64::from(days) + CALENDAR_PADDING_DAYS);
        let url = format!(
            "{}/v2/stocks/{}/bars?timeframe=1Day&start={}&limit=1000&adjustment=raw",
            self.data_base_url,
            symbol,
            start.to_rfc3339()
        );

        let response = self
            .auth(self.http.get(&url))
            .send()
            .await
            .map_err(|e| QuoteError::unavailable(symbol, e.to_string()))?;

        if !response.status().is_success() {
            return Err(QuoteError::unavailable(
                symbol,
                format!("bars request returned {}", response.status()),
            ));
        }

        let body: BarsResponse = response
            .json()
            .await
            .map_err(|e| QuoteError::unavailable(symbol, format!("bad bars payload: {}", e)))?;

        let bars: Vec<DailyBar> = body
            .bars
            .unwrap_or_default()
            .into_iter()
            .map(|b| DailyBar {
                date: b.timestamp.date_naive(),
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.volume,
            })
            .collect();

        if bars.is_empty() {
            return Err(QuoteError::unavailable(symbol, "no bars returned"));
        }

        debug!(symbol, bars = bars.len(), "Fetched daily bars");
        Ok(bars)
    }

    async fn poll_for_fill(&self, symbol: &str, order_id: &str) -> Result<Fill, OrderError> {
        for _ in 0..FILL_POLL_ATTEMPTS {
            tokio::time::sleep(std::time::Duration::from_millis(FILL_POLL_INTERVAL_MS)).await;

            let url = format!("{}/v2/orders/{}", self.trading_base_url, order_id);
            let response = self.auth(self.http.get(&url)).send().await.map_err(|e| {
                OrderError::Rejected {
                    reason: format!("order status request failed: {}", e),
                }
            })?;

            let status: OrderStatus =
                response.json().await.map_err(|e| OrderError::Rejected {
                    reason: format!("bad order status payload: {}", e),
                })?;

            match status.status.as_str() {
                "filled" => return order_status_to_fill(&status),
                "rejected" | "canceled" | "expired" => {
                    return Err(OrderError::Rejected {
                        reason: format!("order {} for {} ended {}", status.id, symbol, status.status),
                    })
                }
                other => debug!(symbol, order_id, status = other, "Order still working"),
            }
        }

        Err(OrderError::Timeout {
            secs: FILL_POLL_ATTEMPTS as u64 * FILL_POLL_INTERVAL_MS / 1000,
        })
    }
}

fn order_status_to_fill(status: &OrderStatus) -> Result<Fill, OrderError> {
    let price = status.filled_avg_price.ok_or_else(|| OrderError::Rejected {
        reason: format!("order {} filled without an average price", status.id),
    })?;
    Ok(Fill {
        price,
        filled_at: status.filled_at.unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl QuoteSource for AlpacaClient {
    async fn current_price(&self, symbol: &str) -> Result<Decimal, QuoteError> {
        let bars = self.fetch_daily_bars(symbol, 7).await?;
        // fetch_daily_bars guarantees non-empty
        Ok(bars.last().expect("bars checked non-empty").close)
    }

    async fn history(&self, symbol: &str, days: u32) -> Result<Vec<DailyBar>, QuoteError> {
        self.fetch_daily_bars(symbol, days).await
    }
}

#[async_trait]
impl BrokerGateway for AlpacaClient {
    #[instrument(skip(self))]
    async fn submit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: u32,
    ) -> Result<Fill, OrderError> {
        let url = format!("{}/v2/orders", self.trading_base_url);
        let body = serde_json::json!({
            "symbol": symbol,
            "qty": quantity.to_string(),
            "side": side.as_str(),
            "type": "market",
            "time_in_force": "gtc",
        });

        let response = self
            .auth(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| OrderError::Rejected {
                reason: format!("order submit failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(OrderError::Rejected {
                reason: format!("order submit returned {}: {}", status, detail),
            });
        }

        let order: OrderStatus = response.json().await.map_err(|e| OrderError::Rejected {
            reason: format!("bad order payload: {}", e),
        })?;

        match order.status.as_str() {
            "filled" => order_status_to_fill(&order),
            "rejected" | "canceled" | "expired" => Err(OrderError::Rejected {
                reason: format!("order {} for {} ended {}", order.id, symbol, order.status),
            }),
            _ => {
                warn!(symbol, order_id = %order.id, "Order accepted but not yet filled; polling");
                self.poll_for_fill(symbol, &order.id).await
            }
        }
    }
}
