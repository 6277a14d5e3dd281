//! End-to-end cycle tests: mocks wired through the failover source, the
//! cache, the engine, and the in-memory state store.

use dip_harvester::cache::CacheStore;
use dip_harvester::config::{CacheConfig, MarketConfig, StrategyConfig};
use dip_harvester::engine::Engine;
use dip_harvester::market::MarketHours;
use dip_harvester::persistence::StateStore;
use dip_harvester::quotes::mock::{bars_from_closes, MockBroker, MockQuoteSource};
use dip_harvester::quotes::{DailyBar, FailoverSource, OrderSide};
use dip_harvester::screener::Screener;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

struct Rig {
    engine: Engine,
    cache: Arc<CacheStore>,
    store: Arc<StateStore>,
    primary: Arc<MockQuoteSource>,
    fallback: Arc<MockQuoteSource>,
    broker: Arc<MockBroker>,
}

fn rig(universe: &[&str]) -> Rig {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let cache = Arc::new(CacheStore::new(
        CacheConfig::default(),
        MarketHours::new(&MarketConfig::default()),
        store.clone(),
    ));

    let primary = Arc::new(MockQuoteSource::new());
    let fallback = Arc::new(MockQuoteSource::new());
    let quotes = Arc::new(FailoverSource::new(primary.clone(), fallback.clone()));
    let broker = Arc::new(MockBroker::new());

    let screener = Arc::new(Screener::new(
        StrategyConfig::default(),
        cache.clone(),
        quotes,
        4,
    ));

    let engine = Engine::new(
        StrategyConfig::default(),
        universe.iter().map(|s| s.to_string()).collect(),
        screener,
        broker.clone(),
        store.clone(),
        cache.clone(),
    )
    .unwrap();

    Rig {
        engine,
        cache,
        store,
        primary,
        fallback,
        broker,
    }
}

fn end_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
}

fn bar(offset: i64, high: Decimal, low: Decimal, close: Decimal) -> DailyBar {
    DailyBar {
        date: end_date() - chrono::Duration::days(offset),
        open: close,
        high,
        low,
        close,
        volume: dec!(1_000_000),
    }
}

/// Down 39% from the high, stabilized at 61: qualifies and passes entry.
fn buyable_bars() -> Vec<DailyBar> {
    vec![
        bar(3, dec!(100), dec!(96), dec!(98)),
        bar(2, dec!(70), dec!(58), dec!(62)),
        bar(1, dec!(62), dec!(59), dec!(60)),
        bar(0, dec!(62), dec!(60), dec!(61)),
    ]
}

#[tokio::test]
async fn full_lifecycle_watchlist_buy_hold_sell() {
    let mut rig = rig(&["AAPL", "MSFT"]);

    // AAPL collapsed and stabilized; MSFT barely moved.
    rig.primary.set_history("AAPL", buyable_bars());
    rig.primary.set_history(
        "MSFT",
        bars_from_closes(end_date(), &[dec!(400), dec!(396), dec!(398)]),
    );
    rig.broker.set_fill_price("AAPL", dec!(61));

    // Cycle 1: AAPL is watchlisted and bought in the same cycle.
    let first = rig.engine.run_cycle_once().await;
    assert_eq!(first.drops_detected, 1);
    assert_eq!(first.buys, 1);
    assert_eq!(first.sells, 0);
    assert_eq!(first.errors, 0);
    assert!(rig.engine.state().holdings.contains_key("AAPL"));
    assert!(!rig.engine.state().tracks("MSFT"));

    // Cycle 2: nothing changed externally, nothing happens. The 2.5% gain is
    // far below the 10% target.
    rig.primary.set_price("AAPL", dec!(62.5));
    rig.cache.clear_symbol("AAPL"); // quotes would have aged out by now
    let second = rig.engine.run_cycle_once().await;
    assert_eq!(second.buys, 0);
    assert_eq!(second.sells, 0);
    assert_eq!(rig.broker.orders_for("AAPL"), 1);

    // Cycle 3: price recovers past the target; the holding is sold.
    rig.primary.set_price("AAPL", dec!(68));
    rig.broker.set_fill_price("AAPL", dec!(68));
    rig.cache.clear_symbol("AAPL");
    let third = rig.engine.run_cycle_once().await;
    assert_eq!(third.sells, 1);
    assert!(rig.engine.state().holdings.is_empty());

    let trades = rig.store.recent_trades(10).unwrap();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].side, OrderSide::Sell);
    assert_eq!(trades[0].realized_pnl, Some(dec!(7)));
    assert_eq!(trades[1].side, OrderSide::Buy);
    assert_eq!(trades[1].price, dec!(61));
}

#[tokio::test]
async fn failover_carries_the_cycle_when_primary_dies() {
    let mut rig = rig(&["AAPL"]);

    // Primary is down for AAPL; the fallback has the data. The engine never
    // notices which source answered.
    rig.primary.fail_symbol("AAPL");
    rig.fallback.set_history("AAPL", buyable_bars());
    rig.broker.set_fill_price("AAPL", dec!(61));

    let report = rig.engine.run_cycle_once().await;

    assert_eq!(report.drops_detected, 1);
    assert_eq!(report.buys, 1);
    assert_eq!(report.errors, 0);
    assert!(rig.fallback.history_requests() > 0);
}

#[tokio::test]
async fn one_dead_symbol_is_isolated_and_counted() {
    let mut rig = rig(&["AAPL", "DEAD"]);

    rig.primary.set_history("AAPL", buyable_bars());
    rig.primary.fail_symbol("DEAD");
    rig.fallback.fail_symbol("DEAD");
    rig.broker.set_fill_price("AAPL", dec!(61));

    let report = rig.engine.run_cycle_once().await;

    // AAPL still makes it all the way to a fill; DEAD is an error stat.
    assert_eq!(report.buys, 1);
    assert!(report.errors >= 1);
}

#[tokio::test]
async fn cache_survives_restart_and_saves_quote_calls() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let hours = MarketHours::new(&MarketConfig::default());

    let primary = Arc::new(MockQuoteSource::new());
    primary.set_price("AAPL", dec!(180));

    {
        let cache = Arc::new(CacheStore::new(CacheConfig::default(), hours, store.clone()));
        let screener = Screener::new(
            StrategyConfig::default(),
            cache.clone(),
            primary.clone(),
            4,
        );
        assert_eq!(screener.current_price("AAPL").await.unwrap(), dec!(180));
        cache.flush();
    }
    let calls_before_restart = primary.price_requests();

    // A fresh cache over the same store answers from disk.
    let cache = Arc::new(CacheStore::new(CacheConfig::default(), hours, store));
    let screener = Screener::new(StrategyConfig::default(), cache, primary.clone(), 4);
    assert_eq!(screener.current_price("AAPL").await.unwrap(), dec!(180));
    assert_eq!(primary.price_requests(), calls_before_restart);
}
