//! Watchlist/holdings engine: the dip-buying state machine.
//!
//! Per symbol the lifecycle is `Untracked -> Watchlisted -> Held ->
//! Untracked`. One scan cycle runs three passes over disjoint sets:
//!
//! 1. Drop scan: qualifying drawdowns watchlist symbols not already tracked.
//! 2. Buy pass: watchlisted symbols (and only those not already held) are
//!    evaluated against the entry signal; a confirmed fill moves the symbol
//!    to holdings and removes the watchlist entry in one durable commit.
//! 3. Sell pass: held symbols at or above the profit target are sold; a
//!    confirmed fill removes the holding and logs the realized P&L.
//!
//! Membership checks are preconditions, not optimizations: replaying a cycle
//! against unchanged external state performs zero new transitions. Order
//! failures leave state untouched for retry next cycle, and no per-symbol
//! error ever aborts the remainder of a pass.

mod signals;
mod state;

pub use signals::{evaluate_entry, EntryVerdict, ENTRY_SIGNAL_DAYS};
pub use state::{EngineState, Holding, TradeRecord, WatchlistEntry};

use crate::cache::CacheStore;
use crate::config::StrategyConfig;
use crate::persistence::StateStore;
use crate::quotes::{BrokerGateway, OrderSide};
use crate::screener::Screener;
use anyhow::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What one cycle did, for the control surface. A caller can tell "no
/// opportunities" (all zeros) from "errors occurred" (`errors` > 0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// New watchlist additions from qualifying drops
    pub drops_detected: u32,
    pub buys: u32,
    pub sells: u32,
    /// Transitions suppressed because the symbol was already tracked
    pub skipped_existing: u32,
    /// Per-symbol and per-transition failures absorbed during the cycle
    pub errors: u32,
}

/// Value snapshot of the current holdings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub unrealized_pnl: Decimal,
    /// Unrealized P&L as a percentage of cost basis
    pub unrealized_pnl_pct: Decimal,
    pub holdings: usize,
    pub watchlisted: usize,
}

/// The state machine plus its collaborators. Owns its state exclusively; the
/// scheduler guarantees cycles never overlap.
pub struct Engine {
    state: EngineState,
    strategy: StrategyConfig,
    universe: Vec<String>,
    screener: Arc<Screener>,
    broker: Arc<dyn BrokerGateway>,
    store: Arc<StateStore>,
    cache: Arc<CacheStore>,
}

impl Engine {
    /// Build the engine, resuming watchlist and holdings from the store.
    pub fn new(
        strategy: StrategyConfig,
        universe: Vec<String>,
        screener: Arc<Screener>,
        broker: Arc<dyn BrokerGateway>,
        store: Arc<StateStore>,
        cache: Arc<CacheStore>,
    ) -> Result<Self> {
        let state = store.load_engine_state()?;
        Ok(Self {
            state,
            strategy,
            universe,
            screener,
            broker,
            store,
            cache,
        })
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Run one complete scan cycle to completion.
    pub async fn run_cycle_once(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let swept = self.cache.sweep_expired();
        debug!(swept, "Cycle start");

        // Pass 1: universe -> eligible -> drop candidates -> watchlist.
        let filter = self.screener.filter_by_min_price(&self.universe).await;
        report.errors += filter.failed as u32;

        let scan = self.screener.scan_for_drops(&filter.eligible).await;
        report.errors += scan.failed as u32;

        for analysis in scan.candidates {
            if self.state.tracks(&analysis.symbol) {
                debug!(symbol = %analysis.symbol, "Already tracked, not re-watchlisting");
                report.skipped_existing += 1;
                continue;
            }

            let entry = WatchlistEntry {
                symbol: analysis.symbol.clone(),
                trigger_price: analysis.current_price,
                high_price: analysis.high_price,
                drop_pct: analysis.drop_pct,
                added_at: chrono::Utc::now(),
            };

            if let Err(e) = self.store.insert_watchlist_entry(&entry) {
                warn!(symbol = %entry.symbol, error = %e, "Failed to persist watchlist entry");
                report.errors += 1;
                continue;
            }

            info!(
                symbol = %entry.symbol,
                drop_pct = %entry.drop_pct,
                trigger = %entry.trigger_price,
                "Watchlisted"
            );
            self.state.watchlist.insert(entry.symbol.clone(), entry);
            report.drops_detected += 1;
        }

        // Pass 2: buy evaluation over the watchlist.
        self.run_buy_pass(&mut report).await;

        // Pass 3: profit-target evaluation over the holdings.
        self.run_sell_pass(&mut report).await;

        let summary = self.portfolio_summary().await;
        let cache_stats = self.cache.stats();
        info!(
            drops = report.drops_detected,
            buys = report.buys,
            sells = report.sells,
            skipped = report.skipped_existing,
            errors = report.errors,
            holdings = summary.holdings,
            watchlist = summary.watchlisted,
            portfolio_value = %summary.total_value,
            unrealized_pnl = %summary.unrealized_pnl,
            cache_entries = cache_stats.total_entries,
            market_open = cache_stats.market_open,
            "Cycle complete"
        );

        report
    }

    async fn run_buy_pass(&mut self, report: &mut CycleReport) {
        let mut symbols: Vec<String> = self.state.watchlist.keys().cloned().collect();
        symbols.sort();

        for symbol in symbols {
            // Mandatory precondition: never buy a symbol we already hold.
            if self.state.holdings.contains_key(&symbol) {
                info!(symbol = %symbol, "Already holding, skipping buy evaluation");
                report.skipped_existing += 1;
                continue;
            }

            let bars = match self.screener.history(&symbol, ENTRY_SIGNAL_DAYS).await {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Buy evaluation skipped, no history");
                    report.errors += 1;
                    continue;
                }
            };

            let verdict = evaluate_entry(&bars, self.strategy.min_entry_signals);
            if !verdict.pass {
                debug!(
                    symbol = %symbol,
                    factors = ?verdict.factors,
                    "Entry signal not met, still watching"
                );
                continue;
            }

            let quantity = self.strategy.position_size;
            let fill = match self.broker.submit_order(&symbol, OrderSide::Buy, quantity).await {
                Ok(fill) => fill,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Buy order failed, will retry next cycle");
                    report.errors += 1;
                    continue;
                }
            };

            let holding = Holding {
                symbol: symbol.clone(),
                quantity,
                entry_price: fill.price,
                entered_at: fill.filled_at,
            };
            let trade = TradeRecord {
                symbol: symbol.clone(),
                side: OrderSide::Buy,
                price: fill.price,
                quantity,
                executed_at: fill.filled_at,
                realized_pnl: None,
            };

            if let Err(e) = self.store.apply_buy(&holding, &trade) {
                // The fill is real even though the disk write failed; keep
                // the in-memory transition so the next cycle cannot re-buy,
                // and surface the durability failure.
                error!(symbol = %symbol, error = %e, "Fill confirmed but commit failed");
                report.errors += 1;
            }

            info!(
                symbol = %symbol,
                price = %fill.price,
                quantity,
                factors = ?verdict.factors,
                "Bought"
            );
            self.state.watchlist.remove(&symbol);
            self.state.holdings.insert(symbol, holding);
            report.buys += 1;
        }
    }

    async fn run_sell_pass(&mut self, report: &mut CycleReport) {
        let mut symbols: Vec<String> = self.state.holdings.keys().cloned().collect();
        symbols.sort();

        for symbol in symbols {
            let holding = match self.state.holdings.get(&symbol) {
                Some(h) => h.clone(),
                None => continue,
            };

            let price = match self.screener.current_price(&symbol).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Sell evaluation skipped, no quote");
                    report.errors += 1;
                    continue;
                }
            };

            let gain = holding.gain_at(price);
            if gain < self.strategy.profit_target {
                debug!(symbol = %symbol, gain = %gain, "Below profit target, holding");
                continue;
            }

            let fill = match self
                .broker
                .submit_order(&symbol, OrderSide::Sell, holding.quantity)
                .await
            {
                Ok(fill) => fill,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Sell order failed, will retry next cycle");
                    report.errors += 1;
                    continue;
                }
            };

            let realized =
                (fill.price - holding.entry_price) * Decimal::from(holding.quantity);
            let trade = TradeRecord {
                symbol: symbol.clone(),
                side: OrderSide::Sell,
                price: fill.price,
                quantity: holding.quantity,
                executed_at: fill.filled_at,
                realized_pnl: Some(realized),
            };

            if let Err(e) = self.store.apply_sell(&symbol, &trade) {
                error!(symbol = %symbol, error = %e, "Fill confirmed but commit failed");
                report.errors += 1;
            }

            info!(
                symbol = %symbol,
                entry = %holding.entry_price,
                exit = %fill.price,
                pnl = %realized,
                "Sold"
            );
            self.state.holdings.remove(&symbol);
            report.sells += 1;
        }
    }

    /// Value the current holdings with the freshest available quotes.
    /// Symbols without a quote contribute cost only.
    pub async fn portfolio_summary(&self) -> PortfolioSummary {
        let mut summary = PortfolioSummary {
            holdings: self.state.holdings.len(),
            watchlisted: self.state.watchlist.len(),
            ..PortfolioSummary::default()
        };

        for holding in self.state.holdings.values() {
            let quantity = Decimal::from(holding.quantity);
            summary.total_cost += holding.entry_price * quantity;

            if let Ok(price) = self.screener.current_price(&holding.symbol).await {
                summary.total_value += price * quantity;
            } else {
                summary.total_value += holding.entry_price * quantity;
            }
        }

        summary.unrealized_pnl = summary.total_value - summary.total_cost;
        summary.unrealized_pnl_pct =
            crate::utils::decimal::safe_div(summary.unrealized_pnl, summary.total_cost)
                * Decimal::ONE_HUNDRED;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, MarketConfig};
    use crate::market::MarketHours;
    use crate::quotes::mock::{bars_from_closes, MockBroker, MockQuoteSource};
    use crate::quotes::DailyBar;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    struct Fixture {
        engine: Engine,
        quotes: Arc<MockQuoteSource>,
        broker: Arc<MockBroker>,
        store: Arc<StateStore>,
    }

    fn fixture_with_universe(universe: &[&str]) -> Fixture {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let cache = Arc::new(CacheStore::new(
            CacheConfig::default(),
            MarketHours::new(&MarketConfig::default()),
            store.clone(),
        ));
        let quotes = Arc::new(MockQuoteSource::new());
        let broker = Arc::new(MockBroker::new());
        let screener = Arc::new(Screener::new(
            StrategyConfig::default(),
            cache.clone(),
            quotes.clone(),
            4,
        ));

        let engine = Engine::new(
            StrategyConfig::default(),
            universe.iter().map(|s| s.to_string()).collect(),
            screener,
            broker.clone(),
            store.clone(),
            cache,
        )
        .unwrap();

        Fixture {
            engine,
            quotes,
            broker,
            store,
        }
    }

    fn end_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    fn day(offset: i64) -> NaiveDate {
        end_date() - chrono::Duration::days(offset)
    }

    fn raw_bar(date: NaiveDate, high: Decimal, low: Decimal, close: Decimal) -> DailyBar {
        DailyBar {
            date,
            open: close,
            high,
            low,
            close,
            volume: dec!(1_000_000),
        }
    }

    /// 39% off a 100 high, stabilized at 61: qualifies for the watchlist and
    /// passes all three entry factors.
    fn dropped_and_stable_bars() -> Vec<DailyBar> {
        vec![
            raw_bar(day(3), dec!(100), dec!(96), dec!(98)),
            raw_bar(day(2), dec!(70), dec!(58), dec!(62)),
            raw_bar(day(1), dec!(62), dec!(59), dec!(60)),
            raw_bar(day(0), dec!(62), dec!(60), dec!(61)),
        ]
    }

    /// 40% off the high and still in freefall: watchlists but must not buy.
    fn dropped_still_falling_bars() -> Vec<DailyBar> {
        vec![
            raw_bar(day(3), dec!(100), dec!(96), dec!(98)),
            raw_bar(day(2), dec!(80), dec!(74), dec!(75)),
            raw_bar(day(1), dec!(70), dec!(66), dec!(67)),
            raw_bar(day(0), dec!(67), dec!(60), dec!(60)),
        ]
    }

    #[tokio::test]
    async fn test_drop_scenario_watchlists_only_the_big_drop() {
        let mut fx = fixture_with_universe(&["A", "B"]);
        fx.quotes.set_history("A", dropped_still_falling_bars());
        fx.quotes
            .set_history("B", bars_from_closes(end_date(), &[dec!(100), dec!(90)]));

        let report = fx.engine.run_cycle_once().await;

        assert_eq!(report.drops_detected, 1);
        assert_eq!(report.buys, 0);
        assert_eq!(report.errors, 0);

        let entry = &fx.engine.state().watchlist["A"];
        assert_eq!(entry.trigger_price, dec!(60));
        assert_eq!(entry.high_price, dec!(100));
        assert_eq!(entry.drop_pct, dec!(0.40));
        assert!(!fx.engine.state().tracks("B"));
    }

    #[tokio::test]
    async fn test_no_duplicate_watchlist_on_replay() {
        let mut fx = fixture_with_universe(&["A"]);
        fx.quotes.set_history("A", dropped_still_falling_bars());

        let first = fx.engine.run_cycle_once().await;
        assert_eq!(first.drops_detected, 1);

        let second = fx.engine.run_cycle_once().await;
        assert_eq!(second.drops_detected, 0);
        assert_eq!(second.skipped_existing, 1);
        assert_eq!(fx.engine.state().watchlist.len(), 1);
    }

    #[tokio::test]
    async fn test_buy_fires_on_entry_signal_and_commits() {
        let mut fx = fixture_with_universe(&["A"]);
        fx.quotes.set_history("A", dropped_and_stable_bars());
        fx.broker.set_fill_price("A", dec!(61));

        let report = fx.engine.run_cycle_once().await;

        assert_eq!(report.drops_detected, 1);
        assert_eq!(report.buys, 1);

        let state = fx.engine.state();
        assert!(state.watchlist.is_empty());
        let holding = &state.holdings["A"];
        assert_eq!(holding.entry_price, dec!(61));
        assert_eq!(holding.quantity, 1);

        // The commit is durable: a fresh load sees the same state.
        let persisted = fx.store.load_engine_state().unwrap();
        assert!(persisted.watchlist.is_empty());
        assert_eq!(persisted.holdings["A"].entry_price, dec!(61));

        let trades = fx.store.recent_trades(10).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, OrderSide::Buy);
        assert_eq!(trades[0].price, dec!(61));
    }

    #[tokio::test]
    async fn test_no_duplicate_buy_for_held_symbol() {
        let fx = fixture_with_universe(&["A"]);

        // Seed a held symbol and a stray watchlist row for the same symbol;
        // the buy pass must refuse to order regardless of how the state
        // came about.
        let now = chrono::Utc::now();
        fx.store
            .insert_watchlist_entry(&WatchlistEntry {
                symbol: "A".into(),
                trigger_price: dec!(60),
                high_price: dec!(100),
                drop_pct: dec!(0.40),
                added_at: now,
            })
            .unwrap();
        fx.store
            .apply_buy(
                &Holding {
                    symbol: "A".into(),
                    quantity: 1,
                    entry_price: dec!(61),
                    entered_at: now,
                },
                &TradeRecord {
                    symbol: "A".into(),
                    side: OrderSide::Buy,
                    price: dec!(61),
                    quantity: 1,
                    executed_at: now,
                    realized_pnl: None,
                },
            )
            .unwrap();
        fx.store
            .insert_watchlist_entry(&WatchlistEntry {
                symbol: "A".into(),
                trigger_price: dec!(60),
                high_price: dec!(100),
                drop_pct: dec!(0.40),
                added_at: now,
            })
            .unwrap();

        let mut engine = Engine::new(
            StrategyConfig::default(),
            vec!["A".into()],
            Arc::new(Screener::new(
                StrategyConfig::default(),
                fx.engine.cache.clone(),
                fx.quotes.clone(),
                4,
            )),
            fx.broker.clone(),
            fx.store.clone(),
            fx.engine.cache.clone(),
        )
        .unwrap();

        fx.quotes.set_history("A", dropped_and_stable_bars());
        // Price below the profit target so the sell pass stays quiet.
        fx.quotes.set_price("A", dec!(62));
        fx.broker.set_fill_price("A", dec!(62));

        let report = engine.run_cycle_once().await;

        assert_eq!(fx.broker.orders_for("A"), 0);
        assert_eq!(report.buys, 0);
        assert!(report.skipped_existing >= 1);
        assert_eq!(engine.state().holdings["A"].entry_price, dec!(61));
    }

    #[tokio::test]
    async fn test_failed_buy_leaves_symbol_watchlisted() {
        let mut fx = fixture_with_universe(&["A"]);
        fx.quotes.set_history("A", dropped_and_stable_bars());
        fx.broker.set_fill_price("A", dec!(61));
        fx.broker.reject_symbol("A");

        let report = fx.engine.run_cycle_once().await;

        assert_eq!(report.buys, 0);
        assert!(report.errors >= 1);
        assert!(fx.engine.state().watchlist.contains_key("A"));
        assert!(fx.engine.state().holdings.is_empty());
        assert!(fx.store.recent_trades(10).unwrap().is_empty());

        // The broker recovers; the retry succeeds next cycle.
        fx.broker.accept_symbol("A");
        let retry = fx.engine.run_cycle_once().await;
        assert_eq!(retry.buys, 1);
        assert!(fx.engine.state().holdings.contains_key("A"));
    }

    #[tokio::test]
    async fn test_sell_fires_at_profit_target() {
        let mut fx = fixture_with_universe(&[]);
        let now = chrono::Utc::now();
        fx.store
            .apply_buy(
                &Holding {
                    symbol: "A".into(),
                    quantity: 1,
                    entry_price: dec!(61),
                    entered_at: now,
                },
                &TradeRecord {
                    symbol: "A".into(),
                    side: OrderSide::Buy,
                    price: dec!(61),
                    quantity: 1,
                    executed_at: now,
                    realized_pnl: None,
                },
            )
            .unwrap();
        fx.engine.state = fx.store.load_engine_state().unwrap();

        // 68 on a 61 entry is an 11.5% gain, above the 10% target.
        fx.quotes.set_price("A", dec!(68));
        fx.broker.set_fill_price("A", dec!(68));

        let report = fx.engine.run_cycle_once().await;

        assert_eq!(report.sells, 1);
        assert!(fx.engine.state().holdings.is_empty());

        let trades = fx.store.recent_trades(10).unwrap();
        assert_eq!(trades[0].side, OrderSide::Sell);
        assert_eq!(trades[0].price, dec!(68));
        assert_eq!(trades[0].realized_pnl, Some(dec!(7)));
    }

    #[tokio::test]
    async fn test_below_target_keeps_holding() {
        let mut fx = fixture_with_universe(&[]);
        let now = chrono::Utc::now();
        fx.store
            .apply_buy(
                &Holding {
                    symbol: "A".into(),
                    quantity: 1,
                    entry_price: dec!(61),
                    entered_at: now,
                },
                &TradeRecord {
                    symbol: "A".into(),
                    side: OrderSide::Buy,
                    price: dec!(61),
                    quantity: 1,
                    executed_at: now,
                    realized_pnl: None,
                },
            )
            .unwrap();
        fx.engine.state = fx.store.load_engine_state().unwrap();

        // 8.2% gain: under the target.
        fx.quotes.set_price("A", dec!(66));
        fx.broker.set_fill_price("A", dec!(66));

        let report = fx.engine.run_cycle_once().await;

        assert_eq!(report.sells, 0);
        assert_eq!(fx.broker.order_count(), 0);
        assert!(fx.engine.state().holdings.contains_key("A"));
    }

    #[tokio::test]
    async fn test_failed_sell_keeps_holding_for_retry() {
        let mut fx = fixture_with_universe(&[]);
        let now = chrono::Utc::now();
        fx.store
            .apply_buy(
                &Holding {
                    symbol: "A".into(),
                    quantity: 1,
                    entry_price: dec!(61),
                    entered_at: now,
                },
                &TradeRecord {
                    symbol: "A".into(),
                    side: OrderSide::Buy,
                    price: dec!(61),
                    quantity: 1,
                    executed_at: now,
                    realized_pnl: None,
                },
            )
            .unwrap();
        fx.engine.state = fx.store.load_engine_state().unwrap();

        fx.quotes.set_price("A", dec!(68));
        fx.broker.set_fill_price("A", dec!(68));
        fx.broker.reject_symbol("A");

        let report = fx.engine.run_cycle_once().await;

        assert_eq!(report.sells, 0);
        assert!(report.errors >= 1);
        assert!(fx.engine.state().holdings.contains_key("A"));

        fx.broker.accept_symbol("A");
        let retry = fx.engine.run_cycle_once().await;
        assert_eq!(retry.sells, 1);
        assert!(fx.engine.state().holdings.is_empty());
    }

    #[tokio::test]
    async fn test_idempotent_replay_produces_no_new_transitions() {
        let mut fx = fixture_with_universe(&["A"]);
        fx.quotes.set_history("A", dropped_still_falling_bars());

        let first = fx.engine.run_cycle_once().await;
        assert_eq!(first.drops_detected, 1);
        let trades_after_first = fx.store.recent_trades(100).unwrap().len();

        let second = fx.engine.run_cycle_once().await;
        assert_eq!(second.drops_detected, 0);
        assert_eq!(second.buys, 0);
        assert_eq!(second.sells, 0);
        assert_eq!(fx.broker.order_count(), 0);
        assert_eq!(
            fx.store.recent_trades(100).unwrap().len(),
            trades_after_first
        );

        let third = fx.engine.run_cycle_once().await;
        assert_eq!(second, third);
    }

    #[tokio::test]
    async fn test_one_bad_symbol_does_not_sink_the_cycle() {
        let mut fx = fixture_with_universe(&["A", "DEAD"]);
        fx.quotes.set_history("A", dropped_still_falling_bars());
        fx.quotes.fail_symbol("DEAD");

        let report = fx.engine.run_cycle_once().await;

        // A is still evaluated and watchlisted; DEAD shows up as an error.
        assert_eq!(report.drops_detected, 1);
        assert!(report.errors >= 1);
        assert!(fx.engine.state().watchlist.contains_key("A"));
    }

    #[tokio::test]
    async fn test_engine_resumes_from_persisted_state() {
        let fx = fixture_with_universe(&[]);
        let now = chrono::Utc::now();
        fx.store
            .apply_buy(
                &Holding {
                    symbol: "A".into(),
                    quantity: 1,
                    entry_price: dec!(61),
                    entered_at: now,
                },
                &TradeRecord {
                    symbol: "A".into(),
                    side: OrderSide::Buy,
                    price: dec!(61),
                    quantity: 1,
                    executed_at: now,
                    realized_pnl: None,
                },
            )
            .unwrap();

        // A fresh engine against the same store sees the holding and sells
        // once the target is hit.
        let mut resumed = Engine::new(
            StrategyConfig::default(),
            Vec::new(),
            Arc::new(Screener::new(
                StrategyConfig::default(),
                fx.engine.cache.clone(),
                fx.quotes.clone(),
                4,
            )),
            fx.broker.clone(),
            fx.store.clone(),
            fx.engine.cache.clone(),
        )
        .unwrap();
        assert!(resumed.state().holdings.contains_key("A"));

        fx.quotes.set_price("A", dec!(68));
        fx.broker.set_fill_price("A", dec!(68));

        let report = resumed.run_cycle_once().await;
        assert_eq!(report.sells, 1);
        assert!(fx.store.load_engine_state().unwrap().holdings.is_empty());
    }

    #[tokio::test]
    async fn test_portfolio_summary_values_holdings() {
        let mut fx = fixture_with_universe(&[]);
        let now = chrono::Utc::now();
        fx.store
            .apply_buy(
                &Holding {
                    symbol: "A".into(),
                    quantity: 2,
                    entry_price: dec!(50),
                    entered_at: now,
                },
                &TradeRecord {
                    symbol: "A".into(),
                    side: OrderSide::Buy,
                    price: dec!(50),
                    quantity: 2,
                    executed_at: now,
                    realized_pnl: None,
                },
            )
            .unwrap();
        fx.engine.state = fx.store.load_engine_state().unwrap();
        fx.quotes.set_price("A", dec!(53));

        let summary = fx.engine.portfolio_summary().await;
        assert_eq!(summary.total_cost, dec!(100));
        assert_eq!(summary.total_value, dec!(106));
        assert_eq!(summary.unrealized_pnl, dec!(6));
        assert_eq!(summary.unrealized_pnl_pct, dec!(6));
        assert_eq!(summary.holdings, 1);
    }
}
