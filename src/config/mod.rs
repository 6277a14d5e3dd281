//! Configuration management for the dip harvester.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Alpaca API credentials
    #[serde(default)]
    pub alpaca: AlpacaConfig,
    /// Dip-buying strategy parameters
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Quote cache tuning
    #[serde(default)]
    pub cache: CacheConfig,
    /// Scan cadence and fetch parallelism
    #[serde(default)]
    pub scan: ScanConfig,
    /// Market session window
    #[serde(default)]
    pub market: MarketConfig,
    /// Symbol universe to scan
    #[serde(default = "default_universe")]
    pub universe: Vec<String>,
    /// SQLite database path for cache and engine state
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlpacaConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret key paired with the API key
    #[serde(default)]
    pub secret_key: String,
    /// Route orders to the paper-trading endpoint
    #[serde(default = "default_paper")]
    pub paper: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Minimum share price to consider (filters out penny stocks)
    #[serde(default = "default_min_stock_price")]
    pub min_stock_price: Decimal,
    /// Fractional drop from the trailing high that triggers watchlisting (0.0-1.0)
    #[serde(default = "default_drop_threshold")]
    pub drop_threshold: Decimal,
    /// Fractional gain from entry that triggers the sell (0.0-1.0)
    #[serde(default = "default_profit_target")]
    pub profit_target: Decimal,
    /// Trailing window in days for the drop computation
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Shares bought per entry; fixed for the life of the holding
    #[serde(default = "default_position_size")]
    pub position_size: u32,
    /// Entry-signal factors that must agree before a buy fires
    #[serde(default = "default_min_entry_signals")]
    pub min_entry_signals: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Disable to force every lookup to the quote source
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Base TTL for current-price entries, in seconds
    #[serde(default = "default_price_ttl")]
    pub price_ttl_secs: i64,
    /// Base TTL for price-history entries, in seconds
    #[serde(default = "default_history_ttl")]
    pub history_ttl_secs: i64,
    /// Base TTL for screener filter results, in seconds
    #[serde(default = "default_filter_ttl")]
    pub filter_ttl_secs: i64,
    /// TTL multiplier applied to entries written while the market is closed
    #[serde(default = "default_closed_multiplier")]
    pub market_closed_multiplier: i64,
    /// Flush to disk every this many writes (plus on shutdown)
    #[serde(default = "default_flush_every")]
    pub flush_every_writes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Seconds between scan cycles in continuous mode
    #[serde(default = "default_scan_interval")]
    pub interval_secs: u64,
    /// Maximum in-flight quote requests during a batch
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Exchange-local offset from UTC in hours (Eastern Time is -5, -4 in DST)
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

// Default value functions

fn default_paper() -> bool {
    true
}

fn default_min_stock_price() -> Decimal {
    Decimal::new(5, 0) // $5 floor avoids penny stocks
}

fn default_drop_threshold() -> Decimal {
    Decimal::new(30, 2) // 0.30
}

fn default_profit_target() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_lookback_days() -> u32 {
    7
}

fn default_position_size() -> u32 {
    1
}

fn default_min_entry_signals() -> u32 {
    2
}

fn default_cache_enabled() -> bool {
    true
}

fn default_price_ttl() -> i64 {
    120 // 2 minutes, short enough for 5-minute scans
}

fn default_history_ttl() -> i64 {
    1800 // 30 minutes
}

fn default_filter_ttl() -> i64 {
    600 // 10 minutes
}

fn default_closed_multiplier() -> i64 {
    6
}

fn default_flush_every() -> u32 {
    10
}

fn default_scan_interval() -> u64 {
    300 // 5 minutes
}

fn default_fetch_concurrency() -> usize {
    8
}

fn default_utc_offset_hours() -> i32 {
    -5 // US Eastern, standard time
}

fn default_db_path() -> String {
    "data/state.db".to_string()
}

fn default_universe() -> Vec<String> {
    // Large-cap US names with enough liquidity that a one-share fill is
    // never in doubt. Override via config file for a broader scan.
    [
        "AAPL", "MSFT", "NVDA", "GOOGL", "AMZN", "META", "TSLA", "AVGO", "ORCL", "CRM",
        "NFLX", "ADBE", "AMD", "INTC", "CSCO", "QCOM", "TXN", "MU", "AMAT", "JPM",
        "V", "MA", "BAC", "WFC", "GS", "MS", "AXP", "BLK", "SCHW", "COF",
        "UNH", "JNJ", "PFE", "ABT", "TMO", "MRK", "ABBV", "CVS", "GILD", "ISRG",
        "HD", "MCD", "DIS", "NKE", "SBUX", "TGT", "LOW", "COST", "WMT", "KO",
        "PEP", "PG", "CAT", "BA", "UNP", "HON", "UPS", "LMT", "RTX", "GE",
        "XOM", "CVX", "COP", "EOG", "SLB", "LIN", "APD", "SHW", "FCX", "NEM",
        "NEE", "SO", "DUK", "AEP", "VZ", "T", "TMUS", "CMCSA", "PLD", "AMT",
        "UBER", "SHOP", "PYPL", "SPOT", "PLTR", "COIN", "NET", "DDOG", "SNOW", "CRWD",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("DIP"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values. Out-of-range values are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.strategy.min_stock_price > Decimal::ZERO,
            "min_stock_price must be positive"
        );

        anyhow::ensure!(
            self.strategy.drop_threshold > Decimal::ZERO
                && self.strategy.drop_threshold < Decimal::ONE,
            "drop_threshold must be between 0 and 1 exclusive"
        );

        anyhow::ensure!(
            self.strategy.profit_target > Decimal::ZERO
                && self.strategy.profit_target < Decimal::ONE,
            "profit_target must be between 0 and 1 exclusive"
        );

        anyhow::ensure!(
            self.strategy.lookback_days >= 1,
            "lookback_days must be at least 1"
        );

        anyhow::ensure!(
            self.strategy.position_size >= 1,
            "position_size must be at least 1"
        );

        anyhow::ensure!(
            self.strategy.min_entry_signals >= 1,
            "min_entry_signals must be at least 1"
        );

        anyhow::ensure!(
            self.cache.price_ttl_secs > 0
                && self.cache.history_ttl_secs > 0
                && self.cache.filter_ttl_secs > 0,
            "cache TTLs must be positive"
        );

        anyhow::ensure!(
            self.cache.market_closed_multiplier >= 1,
            "market_closed_multiplier must be at least 1"
        );

        anyhow::ensure!(
            self.cache.flush_every_writes >= 1,
            "flush_every_writes must be at least 1"
        );

        anyhow::ensure!(self.scan.interval_secs > 0, "scan interval must be positive");

        anyhow::ensure!(
            self.scan.fetch_concurrency >= 1,
            "fetch_concurrency must be at least 1"
        );

        anyhow::ensure!(!self.universe.is_empty(), "symbol universe must not be empty");

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpaca: AlpacaConfig::default(),
            strategy: StrategyConfig::default(),
            cache: CacheConfig::default(),
            scan: ScanConfig::default(),
            market: MarketConfig::default(),
            universe: default_universe(),
            db_path: default_db_path(),
        }
    }
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            paper: default_paper(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_stock_price: default_min_stock_price(),
            drop_threshold: default_drop_threshold(),
            profit_target: default_profit_target(),
            lookback_days: default_lookback_days(),
            position_size: default_position_size(),
            min_entry_signals: default_min_entry_signals(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            price_ttl_secs: default_price_ttl(),
            history_ttl_secs: default_history_ttl(),
            filter_ttl_secs: default_filter_ttl(),
            market_closed_multiplier: default_closed_multiplier(),
            flush_every_writes: default_flush_every(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scan_interval(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}
