//! SQLite persistence for the cache and the engine state.
//!
//! One database file holds:
//! - Cache entries (rewritten wholesale on each flush)
//! - Watchlist and holdings (the resumable state machine)
//! - The append-only trade log
//!
//! Buy and sell transitions are committed in a single transaction so a
//! confirmed fill is durable before the engine reports it.

use crate::cache::{CacheEntry, CacheKind};
use crate::engine::{EngineState, Holding, TradeRecord, WatchlistEntry};
use crate::quotes::OrderSide;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// SQLite-backed state store. Connection access is serialized; callers hold
/// the lock only for the duration of a statement, never across an await.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (or create) the database at `path`, initializing the schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create data directory {:?}", parent))?;
            }
        }

        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        info!("State store initialized at {:?}", db_path.as_ref());
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            -- Cache entries, rewritten on each flush
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                value TEXT NOT NULL,
                stored_at TEXT NOT NULL,
                ttl_secs INTEGER NOT NULL
            );

            -- Symbols awaiting an entry signal
            CREATE TABLE IF NOT EXISTS watchlist (
                symbol TEXT PRIMARY KEY,
                trigger_price TEXT NOT NULL,
                high_price TEXT NOT NULL,
                drop_pct TEXT NOT NULL,
                added_at TEXT NOT NULL
            );

            -- Open positions
            CREATE TABLE IF NOT EXISTS holdings (
                symbol TEXT PRIMARY KEY,
                quantity INTEGER NOT NULL,
                entry_price TEXT NOT NULL,
                entered_at TEXT NOT NULL
            );

            -- Append-only trade log
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                price TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                executed_at TEXT NOT NULL,
                realized_pnl TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol);
            CREATE INDEX IF NOT EXISTS idx_trades_executed ON trades(executed_at);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    // ==================== Cache ====================

    /// Replace the persisted cache snapshot with `entries`.
    pub fn save_cache_entries(&self, entries: &[CacheEntry]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM cache_entries", [])?;

        for entry in entries {
            tx.execute(
                r#"
                INSERT INTO cache_entries (key, kind, value, stored_at, ttl_secs)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    entry.key,
                    entry.kind.as_str(),
                    entry.value.to_string(),
                    entry.stored_at.to_rfc3339(),
                    entry.ttl_secs,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Load the persisted cache snapshot. Unparseable rows are skipped with a
    /// warning; a broken table or file surfaces as an error the cache treats
    /// as "start empty".
    pub fn load_cache_entries(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT key, kind, value, stored_at, ttl_secs FROM cache_entries")?;

        let raw: Vec<(String, String, String, String, i64)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let mut entries = Vec::with_capacity(raw.len());
        let mut skipped = 0usize;

        for (key, kind, value, stored_at, ttl_secs) in raw {
            let parsed = CacheKind::from_str(&kind).ok().and_then(|kind| {
                let value = serde_json::from_str(&value).ok()?;
                let stored_at = DateTime::parse_from_rfc3339(&stored_at)
                    .ok()?
                    .with_timezone(&Utc);
                Some(CacheEntry {
                    key: key.clone(),
                    kind,
                    value,
                    stored_at,
                    ttl_secs,
                })
            });

            match parsed {
                Some(entry) => entries.push(entry),
                None => {
                    skipped += 1;
                    warn!(key, "Skipping unparseable cache row");
                }
            }
        }

        if skipped > 0 {
            warn!(skipped, "Some cache rows were unparseable and dropped");
        }

        Ok(entries)
    }

    // ==================== Engine state ====================

    /// Persist a new watchlist entry.
    pub fn insert_watchlist_entry(&self, entry: &WatchlistEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO watchlist (symbol, trigger_price, high_price, drop_pct, added_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.symbol,
                entry.trigger_price.to_string(),
                entry.high_price.to_string(),
                entry.drop_pct.to_string(),
                entry.added_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Commit a confirmed buy: the holding appears, the watchlist entry goes,
    /// and the trade row lands, all in one transaction.
    pub fn apply_buy(&self, holding: &Holding, trade: &TradeRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT OR REPLACE INTO holdings (symbol, quantity, entry_price, entered_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                holding.symbol,
                holding.quantity,
                holding.entry_price.to_string(),
                holding.entered_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "DELETE FROM watchlist WHERE symbol = ?1",
            params![holding.symbol],
        )?;

        insert_trade(&tx, trade)?;

        tx.commit()?;
        debug!(symbol = %holding.symbol, "Buy committed");
        Ok(())
    }

    /// Commit a confirmed sell: the holding goes and the trade row lands in
    /// one transaction.
    pub fn apply_sell(&self, symbol: &str, trade: &TradeRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM holdings WHERE symbol = ?1", params![symbol])?;
        insert_trade(&tx, trade)?;

        tx.commit()?;
        debug!(symbol, "Sell committed");
        Ok(())
    }

    /// Load watchlist and holdings. Unparseable rows are skipped with a
    /// warning so a single bad row cannot strand the state machine.
    pub fn load_engine_state(&self) -> Result<EngineState> {
        let conn = self.conn.lock().unwrap();
        let mut state = EngineState::new();

        let mut stmt = conn
            .prepare("SELECT symbol, trigger_price, high_price, drop_pct, added_at FROM watchlist")?;
        let watch_rows: Vec<(String, String, String, String, String)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        for (symbol, trigger_price, high_price, drop_pct, added_at) in watch_rows {
            let parsed = (|| {
                Some(WatchlistEntry {
                    symbol: symbol.clone(),
                    trigger_price: Decimal::from_str(&trigger_price).ok()?,
                    high_price: Decimal::from_str(&high_price).ok()?,
                    drop_pct: Decimal::from_str(&drop_pct).ok()?,
                    added_at: DateTime::parse_from_rfc3339(&added_at)
                        .ok()?
                        .with_timezone(&Utc),
                })
            })();

            match parsed {
                Some(entry) => {
                    state.watchlist.insert(symbol, entry);
                }
                None => warn!(symbol, "Skipping unparseable watchlist row"),
            }
        }

        let mut stmt =
            conn.prepare("SELECT symbol, quantity, entry_price, entered_at FROM holdings")?;
        let holding_rows: Vec<(String, u32, String, String)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .filter_map(|r| r.ok())
            .collect();

        for (symbol, quantity, entry_price, entered_at) in holding_rows {
            let parsed = (|| {
                Some(Holding {
                    symbol: symbol.clone(),
                    quantity,
                    entry_price: Decimal::from_str(&entry_price).ok()?,
                    entered_at: DateTime::parse_from_rfc3339(&entered_at)
                        .ok()?
                        .with_timezone(&Utc),
                })
            })();

            match parsed {
                Some(holding) => {
                    state.holdings.insert(symbol, holding);
                }
                None => warn!(symbol, "Skipping unparseable holdings row"),
            }
        }

        info!(
            watchlist = state.watchlist.len(),
            holdings = state.holdings.len(),
            "Loaded engine state"
        );

        Ok(state)
    }

    /// Most recent trades, newest first.
    pub fn recent_trades(&self, limit: usize) -> Result<Vec<TradeRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT symbol, side, price, quantity, executed_at, realized_pnl
            FROM trades
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let raw: Vec<(String, String, String, u32, String, Option<String>)> = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let trades = raw
            .into_iter()
            .filter_map(|(symbol, side, price, quantity, executed_at, realized_pnl)| {
                Some(TradeRecord {
                    symbol,
                    side: parse_side(&side)?,
                    price: Decimal::from_str(&price).ok()?,
                    quantity,
                    executed_at: DateTime::parse_from_rfc3339(&executed_at)
                        .ok()?
                        .with_timezone(&Utc),
                    realized_pnl: match realized_pnl {
                        Some(s) => Some(Decimal::from_str(&s).ok()?),
                        None => None,
                    },
                })
            })
            .collect();

        Ok(trades)
    }
}

fn insert_trade(tx: &rusqlite::Transaction<'_>, trade: &TradeRecord) -> rusqlite::Result<()> {
    tx.execute(
        r#"
        INSERT INTO trades (symbol, side, price, quantity, executed_at, realized_pnl)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            trade.symbol,
            trade.side.as_str(),
            trade.price.to_string(),
            trade.quantity,
            trade.executed_at.to_rfc3339(),
            trade.realized_pnl.map(|p| p.to_string()),
        ],
    )?;
    Ok(())
}

fn parse_side(s: &str) -> Option<OrderSide> {
    match s {
        "buy" => Some(OrderSide::Buy),
        "sell" => Some(OrderSide::Sell),
        _ => None,
    }
}
