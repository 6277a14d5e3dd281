//! Dip Harvester - Main Entry Point
//!
//! Scans a symbol universe for hard drops, watchlists them, buys on
//! stabilization, and sells at the profit target. Paper trading by default.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dip_harvester::cache::CacheStore;
use dip_harvester::config::Config;
use dip_harvester::engine::Engine;
use dip_harvester::market::MarketHours;
use dip_harvester::persistence::StateStore;
use dip_harvester::quotes::{AlpacaClient, BrokerGateway, PaperBroker, QuoteSource};
use dip_harvester::screener::Screener;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Dip Harvester CLI
#[derive(Parser)]
#[command(name = "dip-harvester")]
#[command(version, about = "Automated dip-buying on US equities")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run exactly one scan cycle and print the report
    Cycle,

    /// Show watchlist, holdings, and recent trades from persisted state
    Status {
        /// Path to the SQLite database (default: data/state.db)
        #[arg(short, long)]
        db: Option<String>,

        /// Show the full trade history instead of the last few
        #[arg(short, long)]
        verbose: bool,
    },

    /// Inspect or clear the quote cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Print cache occupancy statistics
    Stats,
    /// Drop cache entries (all of them, or one symbol's)
    Clear {
        /// Only clear entries for this symbol
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

/// Trading mode: Live (real orders) or Paper (simulated fills).
#[derive(Debug, Clone, Copy, PartialEq)]
enum TradingMode {
    Live,
    Paper,
}

/// Everything a cycle needs, wired once at startup.
struct App {
    engine: Engine,
    cache: Arc<CacheStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Some(Commands::Status { db, verbose }) => {
            let db_path = db.unwrap_or_else(|| config.db_path.clone());
            return show_status(&db_path, verbose);
        }
        Some(Commands::Cache { command }) => {
            return run_cache_command(&config, command);
        }
        Some(Commands::Cycle) => {
            let mut app = build_app(&config)?;
            let report = app.engine.run_cycle_once().await;
            app.cache.flush();
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        None => {
            // Default: continuous scanning
        }
    }

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║            Dip Harvester v{}                            ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    log_config(&config);

    let mut app = build_app(&config)?;

    // Shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    info!(
        interval_secs = config.scan.interval_secs,
        "🚀 Starting scan loop"
    );

    let mut cycle = 0u64;

    // One cycle runs to completion before the next may start; the loop is the
    // scheduler, so overlapping cycles cannot happen by construction.
    while !shutdown.load(Ordering::SeqCst) {
        cycle += 1;
        info!(cycle, "📡 Starting scan cycle");

        let started = std::time::Instant::now();
        let report = app.engine.run_cycle_once().await;
        debug!(
            cycle,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ?report,
            "Scan cycle finished"
        );

        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        tokio::time::sleep(Duration::from_secs(config.scan.interval_secs)).await;
    }

    // Teardown: make the cache durable before exit.
    info!("💾 Flushing cache before shutdown");
    app.cache.flush();

    let summary = app.engine.portfolio_summary().await;
    info!(
        holdings = summary.holdings,
        watchlist = summary.watchlisted,
        portfolio_value = %summary.total_value,
        unrealized_pnl = %summary.unrealized_pnl,
        "👋 Dip Harvester shutdown complete"
    );

    Ok(())
}

/// Wire the store, cache, quote source, broker, screener, and engine.
fn build_app(config: &Config) -> Result<App> {
    let trading_mode = if std::env::var("LIVE_TRADING").unwrap_or_default() == "true" {
        warn!("⚠️  LIVE TRADING MODE - Real orders will be placed!");
        TradingMode::Live
    } else {
        info!("📝 PAPER MODE - Simulated fills");
        TradingMode::Paper
    };

    if config.alpaca.api_key.is_empty() {
        warn!("No Alpaca API keys configured; quote requests will fail until they are set");
    }

    let store = Arc::new(StateStore::new(&config.db_path)?);
    let hours = MarketHours::new(&config.market);
    let cache = Arc::new(CacheStore::new(config.cache.clone(), hours, store.clone()));

    let alpaca = Arc::new(AlpacaClient::new(&config.alpaca)?);
    let quotes: Arc<dyn QuoteSource> = alpaca.clone();

    let broker: Arc<dyn BrokerGateway> = match trading_mode {
        TradingMode::Live => alpaca,
        TradingMode::Paper => Arc::new(PaperBroker::new(quotes.clone())),
    };

    let screener = Arc::new(Screener::new(
        config.strategy.clone(),
        cache.clone(),
        quotes,
        config.scan.fetch_concurrency,
    ));

    let engine = Engine::new(
        config.strategy.clone(),
        config.universe.clone(),
        screener,
        broker,
        store.clone(),
        cache.clone(),
    )?;

    Ok(App { engine, cache })
}

/// Initialize logging with stdout and rolling file output.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "dip-harvester.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("dip_harvester=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log the effective strategy on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Universe: {} symbols", config.universe.len());
    info!("   Price Floor: ${}", config.strategy.min_stock_price);
    info!(
        "   Drop Threshold: {:.0}%",
        config.strategy.drop_threshold * dec!(100)
    );
    info!(
        "   Profit Target: {:.0}%",
        config.strategy.profit_target * dec!(100)
    );
    info!("   Lookback: {} days", config.strategy.lookback_days);
    info!("   Position Size: {} share(s)", config.strategy.position_size);
    info!(
        "   Cache TTLs: price {}s / history {}s / filter {}s (x{} closed)",
        config.cache.price_ttl_secs,
        config.cache.history_ttl_secs,
        config.cache.filter_ttl_secs,
        config.cache.market_closed_multiplier
    );
}

/// Show watchlist, holdings, and trades from persisted state.
fn show_status(db_path: &str, verbose: bool) -> Result<()> {
    use std::path::Path;

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                 DIP HARVESTER STATUS                       ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    if !Path::new(db_path).exists() {
        println!("\n❌ Database not found: {}", db_path);
        println!("   The harvester has not run yet, or the database path is wrong.");
        return Ok(());
    }

    let store = StateStore::new(db_path)?;
    let state = store.load_engine_state()?;

    println!("\n👀 Watchlist ({})", state.watchlist.len());
    let mut watched: Vec<_> = state.watchlist.values().collect();
    watched.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    for entry in watched {
        println!(
            "   ├─ {:6} | {:.1}% off ${:.2} high | triggered at ${:.2} | since {}",
            entry.symbol,
            entry.drop_pct * dec!(100),
            entry.high_price,
            entry.trigger_price,
            entry.added_at.format("%Y-%m-%d %H:%M UTC")
        );
    }

    println!("\n💼 Holdings ({})", state.holdings.len());
    let mut held: Vec<_> = state.holdings.values().collect();
    held.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    let mut total_cost = Decimal::ZERO;
    for holding in held {
        let cost = holding.entry_price * Decimal::from(holding.quantity);
        total_cost += cost;
        println!(
            "   ├─ {:6} | {} @ ${:.2} | cost ${:.2} | entered {}",
            holding.symbol,
            holding.quantity,
            holding.entry_price,
            cost,
            holding.entered_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    if total_cost > Decimal::ZERO {
        println!("   └─ Total cost basis: ${:.2}", total_cost);
    }

    let limit = if verbose { 1000 } else { 10 };
    let trades = store.recent_trades(limit)?;
    let realized: Decimal = trades.iter().filter_map(|t| t.realized_pnl).sum();

    println!("\n📜 Trades (showing {})", trades.len());
    for trade in &trades {
        match trade.realized_pnl {
            Some(pnl) => println!(
                "   ├─ {} {:4} {:6} {} @ ${:.2} | P&L ${:.2}",
                trade.executed_at.format("%Y-%m-%d %H:%M"),
                trade.side,
                trade.symbol,
                trade.quantity,
                trade.price,
                pnl
            ),
            None => println!(
                "   ├─ {} {:4} {:6} {} @ ${:.2}",
                trade.executed_at.format("%Y-%m-%d %H:%M"),
                trade.side,
                trade.symbol,
                trade.quantity,
                trade.price
            ),
        }
    }
    println!("   └─ Realized P&L (shown trades): ${:.2}", realized);

    println!();
    Ok(())
}

/// Inspect or clear the quote cache.
fn run_cache_command(config: &Config, command: CacheCommands) -> Result<()> {
    let store = Arc::new(StateStore::new(&config.db_path)?);
    let hours = MarketHours::new(&config.market);
    let cache = CacheStore::new(config.cache.clone(), hours, store);

    match command {
        CacheCommands::Stats => {
            let stats = cache.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        CacheCommands::Clear { symbol } => {
            let removed = match symbol {
                Some(symbol) => {
                    let removed = cache.clear_symbol(&symbol);
                    println!("Cleared {} cache entries for {}", removed, symbol);
                    removed
                }
                None => {
                    let removed = cache.clear_all();
                    println!("Cleared all {} cache entries", removed);
                    removed
                }
            };
            if removed == 0 {
                println!("Nothing to clear");
            }
        }
    }

    Ok(())
}
