//! Typed adapter over the SQLite store.
//!
//! Owns the schema for the OHLC archive, trade ledger, bot sessions,
//! backtest reports with their simulated trades, notifications, and trading
//! accounts. Every write is a single statement except the simulated-trade
//! batch, which runs in one transaction so the backtest engine can keep its
//! compensating-delete guarantee.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{Candle, Side, Timeframe};
use crate::engine::RiskLevel;
use crate::error::EngineError;
use crate::strategy::{StrategyMode, StrategyParams};

const CANDLE_TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
        }
    }
}

/// One trade ledger row. A row is `open` iff `close_price`, `profit_loss`
/// and `closed_at` are all absent; once closed those fields are frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub session_id: Option<String>,
    pub ticket: String,
    pub symbol: String,
    pub side: Side,
    pub lot_size: f64,
    pub open_price: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub close_price: Option<f64>,
    pub profit_loss: Option<f64>,
    pub status: TradeStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Stopped,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Error => "error",
        }
    }
}

/// A running strategy configuration for one user. The sole principal of
/// bot-origin trades; its id tags every trade it opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSession {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub risk_level: RiskLevel,
    pub strategy_mode: StrategyMode,
    pub strategy_params: StrategyParams,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub trade_count: i64,
    pub last_trade_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    #[serde(rename = "SL")]
    StopLoss,
    #[serde(rename = "TP")]
    TakeProfit,
    Signal,
    EndOfTest,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::StopLoss => "SL",
            CloseReason::TakeProfit => "TP",
            CloseReason::Signal => "Signal",
            CloseReason::EndOfTest => "EndOfTest",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub id: String,
    pub user_id: Option<String>,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub strategy_params: StrategyParams,
    pub risk_level: RiskLevel,
    pub total_trades: i64,
    pub total_pl: f64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub win_rate: f64,
    pub created_at: DateTime<Utc>,
}

/// Same shape as a ledger trade, plus the reason the replay closed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub id: String,
    pub report_id: String,
    pub side: Side,
    pub lot_size: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub profit_loss: f64,
    pub close_reason: CloseReason,
    pub opened_at: NaiveDateTime,
    pub closed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingAccount {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub account_number: String,
    pub server: String,
    pub balance: f64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserOverview {
    pub user_id: String,
    pub active_sessions: i64,
    pub open_trades: i64,
    pub total_trades: i64,
    pub total_pl: f64,
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(db_path: &str) -> Result<Self, EngineError> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS price_data (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, timeframe, timestamp)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                session_id TEXT,
                ticket TEXT NOT NULL UNIQUE,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                lot_size REAL NOT NULL,
                open_price REAL NOT NULL,
                stop_loss REAL NOT NULL,
                take_profit REAL,
                close_price REAL,
                profit_loss REAL,
                status TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_session_status
             ON trades(session_id, status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_user ON trades(user_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS bot_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                strategy_mode TEXT NOT NULL,
                strategy_params TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                stopped_at TEXT,
                trade_count INTEGER NOT NULL DEFAULT 0,
                last_trade_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS backtest_reports (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                strategy_params TEXT NOT NULL,
                risk_params TEXT NOT NULL,
                total_trades INTEGER NOT NULL,
                total_pl REAL NOT NULL,
                winning_trades INTEGER NOT NULL,
                losing_trades INTEGER NOT NULL,
                win_rate REAL NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS simulated_trades (
                id TEXT PRIMARY KEY,
                report_id TEXT NOT NULL REFERENCES backtest_reports(id),
                side TEXT NOT NULL,
                lot_size REAL NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL NOT NULL,
                stop_loss REAL NOT NULL,
                take_profit REAL,
                profit_loss REAL NOT NULL,
                close_reason TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_simulated_trades_report
             ON simulated_trades(report_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trading_accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                account_number TEXT NOT NULL,
                server TEXT NOT NULL,
                balance REAL NOT NULL,
                currency TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // -- candles ------------------------------------------------------------

    /// Upsert candles by `(symbol, timeframe, timestamp)`; re-ingest
    /// overwrites the OHLCV fields. Returns the number of rows written.
    pub async fn upsert_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<usize, EngineError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO price_data (symbol, timeframe, timestamp, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(symbol, timeframe, timestamp) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume",
            )?;
            for c in candles {
                stmt.execute(params![
                    symbol,
                    timeframe.as_str(),
                    c.timestamp.format(CANDLE_TS_FMT).to_string(),
                    c.open,
                    c.high,
                    c.low,
                    c.close,
                    c.volume,
                ])?;
            }
        }
        tx.commit()?;
        Ok(candles.len())
    }

    /// Candles in `[start, end]` (whole days), ascending by timestamp.
    pub async fn candles_in_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT timestamp, open, high, low, close, volume FROM price_data
             WHERE symbol = ?1 AND timeframe = ?2 AND timestamp >= ?3 AND timestamp <= ?4
             ORDER BY timestamp ASC",
        )?;
        let from = format!("{start} 00:00:00");
        let to = format!("{end} 23:59:59");
        let rows = stmt.query_map(params![symbol, timeframe.as_str(), from, to], |row| {
            let stamp: String = row.get(0)?;
            Ok(Candle {
                timestamp: parse_candle_ts(&stamp, 0)?,
                open: row.get(1)?,
                high: row.get(2)?,
                low: row.get(3)?,
                close: row.get(4)?,
                volume: row.get(5)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    // -- trade ledger -------------------------------------------------------

    pub async fn insert_trade(&self, trade: &TradeRecord) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO trades (id, user_id, account_id, session_id, ticket, symbol, side,
                lot_size, open_price, stop_loss, take_profit, close_price, profit_loss,
                status, opened_at, closed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                &trade.id,
                &trade.user_id,
                &trade.account_id,
                trade.session_id.as_deref(),
                &trade.ticket,
                &trade.symbol,
                trade.side.as_str(),
                trade.lot_size,
                trade.open_price,
                trade.stop_loss,
                trade.take_profit,
                trade.close_price,
                trade.profit_loss,
                trade.status.as_str(),
                trade.opened_at.to_rfc3339(),
                trade.closed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Conditional insert for session-tagged trades: the row is written only
    /// when the session has no open trade. The existence check and the insert
    /// run as one statement, so two overlapping runner invocations cannot
    /// both succeed. Returns false when the insert was rejected.
    pub async fn insert_session_trade(&self, trade: &TradeRecord) -> Result<bool, EngineError> {
        let Some(session_id) = trade.session_id.as_deref() else {
            return Err(EngineError::Validation(
                "session trade insert requires a session id".to_string(),
            ));
        };
        let conn = self.conn.lock().await;
        let written = conn.execute(
            "INSERT INTO trades (id, user_id, account_id, session_id, ticket, symbol, side,
                lot_size, open_price, stop_loss, take_profit, close_price, profit_loss,
                status, opened_at, closed_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, NULL, 'open', ?12, NULL
             WHERE NOT EXISTS (
                SELECT 1 FROM trades WHERE session_id = ?4 AND status = 'open'
             )",
            params![
                &trade.id,
                &trade.user_id,
                &trade.account_id,
                session_id,
                &trade.ticket,
                &trade.symbol,
                trade.side.as_str(),
                trade.lot_size,
                trade.open_price,
                trade.stop_loss,
                trade.take_profit,
                trade.opened_at.to_rfc3339(),
            ],
        )?;
        Ok(written == 1)
    }

    /// Look a trade up by ledger id or provider ticket.
    pub async fn find_trade(&self, key: &str) -> Result<Option<TradeRecord>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {TRADE_COLS} FROM trades WHERE id = ?1 OR ticket = ?1 LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(trade_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Mark an open trade closed. The close fields are written once and the
    /// statement refuses already-closed rows, keeping them frozen.
    pub async fn close_trade(
        &self,
        id: &str,
        close_price: f64,
        profit_loss: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE trades SET close_price = ?2, profit_loss = ?3, closed_at = ?4,
                status = 'closed'
             WHERE id = ?1 AND status = 'open'",
            params![id, close_price, profit_loss, closed_at.to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(EngineError::Store(format!(
                "trade {id} is not open, refusing to close"
            )));
        }
        Ok(())
    }

    pub async fn open_trades(
        &self,
        account_id: Option<&str>,
    ) -> Result<Vec<TradeRecord>, EngineError> {
        let conn = self.conn.lock().await;
        let mut out = Vec::new();
        if let Some(account) = account_id {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {TRADE_COLS} FROM trades
                 WHERE status = 'open' AND account_id = ?1 ORDER BY opened_at ASC"
            ))?;
            let rows = stmt.query_map(params![account], trade_from_row)?;
            for r in rows {
                out.push(r?);
            }
        } else {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {TRADE_COLS} FROM trades WHERE status = 'open' ORDER BY opened_at ASC"
            ))?;
            let rows = stmt.query_map([], trade_from_row)?;
            for r in rows {
                out.push(r?);
            }
        }
        Ok(out)
    }

    pub async fn count_open_session_trades(&self, session_id: &str) -> Result<i64, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT COUNT(*) FROM trades WHERE session_id = ?1 AND status = 'open'",
        )?;
        let count: i64 = stmt.query_row(params![session_id], |row| row.get(0))?;
        Ok(count)
    }

    // -- bot sessions -------------------------------------------------------

    /// Insert or update a session. A stopped session is terminal: attempts
    /// to move it back out of `stopped` are rejected.
    pub async fn upsert_session(&self, session: &BotSession) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        let existing: Option<String> = conn
            .query_row(
                "SELECT status FROM bot_sessions WHERE id = ?1",
                params![&session.id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        if existing.as_deref() == Some("stopped") && session.status != SessionStatus::Stopped {
            return Err(EngineError::Validation(format!(
                "session {} is stopped and cannot be reactivated",
                session.id
            )));
        }

        let params_json = serde_json::to_string(&session.strategy_params)
            .map_err(|e| EngineError::Store(format!("strategy params encode failed: {e}")))?;
        conn.execute(
            "INSERT INTO bot_sessions (id, user_id, account_id, risk_level, strategy_mode,
                strategy_params, status, started_at, stopped_at, trade_count, last_trade_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                risk_level = excluded.risk_level,
                strategy_mode = excluded.strategy_mode,
                strategy_params = excluded.strategy_params,
                status = excluded.status,
                stopped_at = excluded.stopped_at,
                trade_count = excluded.trade_count,
                last_trade_at = excluded.last_trade_at",
            params![
                &session.id,
                &session.user_id,
                &session.account_id,
                session.risk_level.as_str(),
                session.strategy_mode.as_str(),
                params_json,
                session.status.as_str(),
                session.started_at.to_rfc3339(),
                session.stopped_at.map(|t| t.to_rfc3339()),
                session.trade_count,
                session.last_trade_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub async fn active_sessions(&self) -> Result<Vec<BotSession>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, user_id, account_id, risk_level, strategy_mode, strategy_params,
                status, started_at, stopped_at, trade_count, last_trade_at
             FROM bot_sessions WHERE status = 'active' ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map([], session_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Bump a session's trade bookkeeping after a successful entry.
    pub async fn record_session_trade(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE bot_sessions SET trade_count = trade_count + 1, last_trade_at = ?2
             WHERE id = ?1",
            params![session_id, at.to_rfc3339()],
        )?;
        Ok(())
    }

    // -- backtest reports ---------------------------------------------------

    pub async fn insert_backtest_report(&self, report: &BacktestReport) -> Result<(), EngineError> {
        let params_json = serde_json::to_string(&report.strategy_params)
            .map_err(|e| EngineError::Store(format!("strategy params encode failed: {e}")))?;
        let risk_json = serde_json::to_string(&serde_json::json!({
            "risk_level": report.risk_level.as_str()
        }))
        .map_err(|e| EngineError::Store(format!("risk params encode failed: {e}")))?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO backtest_reports (id, user_id, symbol, timeframe, start_date, end_date,
                strategy_params, risk_params, total_trades, total_pl, winning_trades,
                losing_trades, win_rate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                &report.id,
                report.user_id.as_deref(),
                &report.symbol,
                report.timeframe.as_str(),
                report.start_date.to_string(),
                report.end_date.to_string(),
                params_json,
                risk_json,
                report.total_trades,
                report.total_pl,
                report.winning_trades,
                report.losing_trades,
                report.win_rate,
                report.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert all simulated trades for one report in a single transaction.
    pub async fn insert_simulated_trades(
        &self,
        trades: &[SimulatedTrade],
    ) -> Result<(), EngineError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO simulated_trades (id, report_id, side, lot_size, entry_price,
                    exit_price, stop_loss, take_profit, profit_loss, close_reason,
                    opened_at, closed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for t in trades {
                stmt.execute(params![
                    &t.id,
                    &t.report_id,
                    t.side.as_str(),
                    t.lot_size,
                    t.entry_price,
                    t.exit_price,
                    t.stop_loss,
                    t.take_profit,
                    t.profit_loss,
                    t.close_reason.as_str(),
                    t.opened_at.format(CANDLE_TS_FMT).to_string(),
                    t.closed_at.format(CANDLE_TS_FMT).to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Compensating delete: removes the report and any children that made it
    /// in before a failed batch.
    pub async fn delete_backtest_report(&self, report_id: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM simulated_trades WHERE report_id = ?1",
            params![report_id],
        )?;
        conn.execute(
            "DELETE FROM backtest_reports WHERE id = ?1",
            params![report_id],
        )?;
        Ok(())
    }

    pub async fn backtest_report(
        &self,
        report_id: &str,
    ) -> Result<Option<(BacktestReport, Vec<SimulatedTrade>)>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, user_id, symbol, timeframe, start_date, end_date, strategy_params,
                risk_params, total_trades, total_pl, winning_trades, losing_trades,
                win_rate, created_at
             FROM backtest_reports WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![report_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let report = report_from_row(row)?;

        let mut stmt = conn.prepare_cached(
            "SELECT id, report_id, side, lot_size, entry_price, exit_price, stop_loss,
                take_profit, profit_loss, close_reason, opened_at, closed_at
             FROM simulated_trades WHERE report_id = ?1 ORDER BY opened_at ASC",
        )?;
        let children = stmt.query_map(params![report_id], simulated_trade_from_row)?;
        let mut trades = Vec::new();
        for t in children {
            trades.push(t?);
        }
        Ok(Some((report, trades)))
    }

    pub async fn list_backtest_reports(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<BacktestReport>, EngineError> {
        let limit = limit.clamp(1, 500) as i64;
        let conn = self.conn.lock().await;
        let mut out = Vec::new();
        if let Some(user) = user_id {
            let mut stmt = conn.prepare_cached(
                "SELECT id, user_id, symbol, timeframe, start_date, end_date, strategy_params,
                    risk_params, total_trades, total_pl, winning_trades, losing_trades,
                    win_rate, created_at
                 FROM backtest_reports WHERE user_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![user, limit], report_from_row)?;
            for r in rows {
                out.push(r?);
            }
        } else {
            let mut stmt = conn.prepare_cached(
                "SELECT id, user_id, symbol, timeframe, start_date, end_date, strategy_params,
                    risk_params, total_trades, total_pl, winning_trades, losing_trades,
                    win_rate, created_at
                 FROM backtest_reports ORDER BY created_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], report_from_row)?;
            for r in rows {
                out.push(r?);
            }
        }
        Ok(out)
    }

    // -- notifications ------------------------------------------------------

    pub async fn insert_notification(
        &self,
        rec: &NotificationRecord,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO notifications (id, user_id, kind, title, body, created_at, read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &rec.id,
                &rec.user_id,
                &rec.kind,
                &rec.title,
                &rec.body,
                rec.created_at.to_rfc3339(),
                i64::from(rec.read),
            ],
        )?;
        Ok(())
    }

    pub async fn notifications_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, EngineError> {
        let limit = limit.clamp(1, 500) as i64;
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, user_id, kind, title, body, created_at, read FROM notifications
             WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], |row| {
            let created: String = row.get(5)?;
            let read: i64 = row.get(6)?;
            Ok(NotificationRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                kind: row.get(2)?,
                title: row.get(3)?,
                body: row.get(4)?,
                created_at: parse_rfc3339(&created, 5)?,
                read: read != 0,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    // -- trading accounts ---------------------------------------------------

    pub async fn upsert_trading_account(
        &self,
        account: &TradingAccount,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO trading_accounts (id, user_id, platform, account_number, server,
                balance, currency, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                platform = excluded.platform,
                account_number = excluded.account_number,
                server = excluded.server,
                balance = excluded.balance,
                currency = excluded.currency,
                updated_at = excluded.updated_at",
            params![
                &account.id,
                &account.user_id,
                &account.platform,
                &account.account_number,
                &account.server,
                account.balance,
                &account.currency,
                account.created_at.to_rfc3339(),
                account.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn trading_account(
        &self,
        id: &str,
    ) -> Result<Option<TradingAccount>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, user_id, platform, account_number, server, balance, currency,
                created_at, updated_at
             FROM trading_accounts WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => {
                let created: String = row.get(7)?;
                let updated: String = row.get(8)?;
                Ok(Some(TradingAccount {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    platform: row.get(2)?,
                    account_number: row.get(3)?,
                    server: row.get(4)?,
                    balance: row.get(5)?,
                    currency: row.get(6)?,
                    created_at: parse_rfc3339(&created, 7)?,
                    updated_at: parse_rfc3339(&updated, 8)?,
                }))
            }
            None => Ok(None),
        }
    }

    // -- admin --------------------------------------------------------------

    /// Per-user aggregate across sessions and the trade ledger.
    pub async fn users_overview(&self) -> Result<Vec<UserOverview>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT u.user_id,
                (SELECT COUNT(*) FROM bot_sessions s
                    WHERE s.user_id = u.user_id AND s.status = 'active'),
                (SELECT COUNT(*) FROM trades t
                    WHERE t.user_id = u.user_id AND t.status = 'open'),
                (SELECT COUNT(*) FROM trades t WHERE t.user_id = u.user_id),
                (SELECT COALESCE(SUM(t.profit_loss), 0) FROM trades t
                    WHERE t.user_id = u.user_id AND t.status = 'closed')
             FROM (SELECT user_id FROM trades UNION SELECT user_id FROM bot_sessions) u
             ORDER BY u.user_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UserOverview {
                user_id: row.get(0)?,
                active_sessions: row.get(1)?,
                open_trades: row.get(2)?,
                total_trades: row.get(3)?,
                total_pl: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

const TRADE_COLS: &str = "id, user_id, account_id, session_id, ticket, symbol, side, lot_size,
    open_price, stop_loss, take_profit, close_price, profit_loss, status, opened_at, closed_at";

// -- row mapping ------------------------------------------------------------

fn conversion_err(
    idx: usize,
    message: String,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn parse_rfc3339(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, format!("bad timestamp {raw}: {e}")))
}

fn parse_candle_ts(raw: &str, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, CANDLE_TS_FMT)
        .map_err(|e| conversion_err(idx, format!("bad candle timestamp {raw}: {e}")))
}

fn trade_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradeRecord> {
    let side: String = row.get(6)?;
    let status: String = row.get(13)?;
    let opened: String = row.get(14)?;
    let closed: Option<String> = row.get(15)?;
    Ok(TradeRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        session_id: row.get(3)?,
        ticket: row.get(4)?,
        symbol: row.get(5)?,
        side: side
            .parse()
            .map_err(|e| conversion_err(6, format!("{e}")))?,
        lot_size: row.get(7)?,
        open_price: row.get(8)?,
        stop_loss: row.get(9)?,
        take_profit: row.get(10)?,
        close_price: row.get(11)?,
        profit_loss: row.get(12)?,
        status: match status.as_str() {
            "open" => TradeStatus::Open,
            "closed" => TradeStatus::Closed,
            other => return Err(conversion_err(13, format!("bad trade status {other}"))),
        },
        opened_at: parse_rfc3339(&opened, 14)?,
        closed_at: closed.as_deref().map(|s| parse_rfc3339(s, 15)).transpose()?,
    })
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BotSession> {
    let risk: String = row.get(3)?;
    let mode: String = row.get(4)?;
    let params_json: String = row.get(5)?;
    let status: String = row.get(6)?;
    let started: String = row.get(7)?;
    let stopped: Option<String> = row.get(8)?;
    let last_trade: Option<String> = row.get(10)?;
    Ok(BotSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        risk_level: risk
            .parse()
            .map_err(|e| conversion_err(3, format!("{e}")))?,
        strategy_mode: mode
            .parse()
            .map_err(|e| conversion_err(4, format!("{e}")))?,
        strategy_params: serde_json::from_str(&params_json)
            .map_err(|e| conversion_err(5, format!("bad strategy params: {e}")))?,
        status: match status.as_str() {
            "active" => SessionStatus::Active,
            "stopped" => SessionStatus::Stopped,
            "error" => SessionStatus::Error,
            other => return Err(conversion_err(6, format!("bad session status {other}"))),
        },
        started_at: parse_rfc3339(&started, 7)?,
        stopped_at: stopped.as_deref().map(|s| parse_rfc3339(s, 8)).transpose()?,
        trade_count: row.get(9)?,
        last_trade_at: last_trade
            .as_deref()
            .map(|s| parse_rfc3339(s, 10))
            .transpose()?,
    })
}

fn report_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BacktestReport> {
    let timeframe: String = row.get(3)?;
    let start: String = row.get(4)?;
    let end: String = row.get(5)?;
    let params_json: String = row.get(6)?;
    let risk_json: String = row.get(7)?;
    let created: String = row.get(13)?;

    let risk_value: serde_json::Value = serde_json::from_str(&risk_json)
        .map_err(|e| conversion_err(7, format!("bad risk params: {e}")))?;
    let risk_level: RiskLevel = risk_value
        .get("risk_level")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("medium")
        .parse()
        .map_err(|e| conversion_err(7, format!("{e}")))?;

    Ok(BacktestReport {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        timeframe: timeframe
            .parse()
            .map_err(|e| conversion_err(3, format!("{e}")))?,
        start_date: start
            .parse()
            .map_err(|e| conversion_err(4, format!("bad start date: {e}")))?,
        end_date: end
            .parse()
            .map_err(|e| conversion_err(5, format!("bad end date: {e}")))?,
        strategy_params: serde_json::from_str(&params_json)
            .map_err(|e| conversion_err(6, format!("bad strategy params: {e}")))?,
        risk_level,
        total_trades: row.get(8)?,
        total_pl: row.get(9)?,
        winning_trades: row.get(10)?,
        losing_trades: row.get(11)?,
        win_rate: row.get(12)?,
        created_at: parse_rfc3339(&created, 13)?,
    })
}

fn simulated_trade_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SimulatedTrade> {
    let side: String = row.get(2)?;
    let reason: String = row.get(9)?;
    let opened: String = row.get(10)?;
    let closed: String = row.get(11)?;
    Ok(SimulatedTrade {
        id: row.get(0)?,
        report_id: row.get(1)?,
        side: side
            .parse()
            .map_err(|e| conversion_err(2, format!("{e}")))?,
        lot_size: row.get(3)?,
        entry_price: row.get(4)?,
        exit_price: row.get(5)?,
        stop_loss: row.get(6)?,
        take_profit: row.get(7)?,
        profit_loss: row.get(8)?,
        close_reason: match reason.as_str() {
            "SL" => CloseReason::StopLoss,
            "TP" => CloseReason::TakeProfit,
            "Signal" => CloseReason::Signal,
            "EndOfTest" => CloseReason::EndOfTest,
            other => return Err(conversion_err(9, format!("bad close reason {other}"))),
        },
        opened_at: parse_candle_ts(&opened, 10)?,
        closed_at: parse_candle_ts(&closed, 11)?,
    })
}
