//! Event-driven backtest: serial candle replay with one simulated trade open
//! at a time, stop/take/signal exits, and atomic report persistence.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::RiskLevel;
use crate::data::store::{BacktestReport, CloseReason, SimulatedTrade, Store};
use crate::data::{Candle, Side, Timeframe};
use crate::error::EngineError;
use crate::exec::simulated::profit_for;
use crate::indicators::atr;
use crate::notify::Mailer;
use crate::strategy::{Strategy, StrategyMode, StrategyParams};

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestRequest {
    pub user_id: Option<String>,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub strategy_mode: StrategyMode,
    pub strategy_params: StrategyParams,
    pub risk_level: RiskLevel,
}

pub struct BacktestOutcome {
    pub report: BacktestReport,
    pub trades: Vec<SimulatedTrade>,
}

struct OpenTrade {
    side: Side,
    entry: f64,
    stop: f64,
    take: f64,
    lot: f64,
    entry_time: NaiveDateTime,
}

impl OpenTrade {
    fn close(
        &self,
        report_id: &str,
        exit: f64,
        reason: CloseReason,
        closed_at: NaiveDateTime,
    ) -> SimulatedTrade {
        SimulatedTrade {
            id: Uuid::new_v4().to_string(),
            report_id: report_id.to_string(),
            side: self.side,
            lot_size: self.lot,
            entry_price: self.entry,
            exit_price: exit,
            stop_loss: self.stop,
            take_profit: Some(self.take),
            profit_loss: profit_for(self.side, self.entry, exit, self.lot),
            close_reason: reason,
            opened_at: self.entry_time,
            closed_at,
        }
    }
}

/// Run a backtest over stored candles and persist the report.
///
/// The strategy is passed in so the caller decides the dispatch mode; the
/// replay itself only sees `decide`. Persistence is atomic: if the
/// simulated-trade batch fails, the report row is deleted again before the
/// error is returned.
pub async fn run(
    store: &Store,
    request: &BacktestRequest,
    strategy: &dyn Strategy,
    mailer: Option<&Mailer>,
) -> Result<BacktestOutcome, EngineError> {
    if request.end_date < request.start_date {
        return Err(EngineError::Validation(format!(
            "end date {} precedes start date {}",
            request.end_date, request.start_date
        )));
    }

    let candles = store
        .candles_in_range(
            &request.symbol,
            request.timeframe,
            request.start_date,
            request.end_date,
        )
        .await?;

    let params = &request.strategy_params;
    let min_lookback = params.min_candles();
    if candles.len() < min_lookback {
        return Err(EngineError::InsufficientData {
            required: min_lookback,
            actual: candles.len(),
        });
    }

    let tier = request.risk_level.tier();
    let atr_series = atr(&candles, params.atr_period);
    let report_id = Uuid::new_v4().to_string();

    let mut trades: Vec<SimulatedTrade> = Vec::new();
    let mut open: Option<OpenTrade> = None;

    for i in min_lookback..candles.len() {
        let candle = &candles[i];

        // Exits on the current candle, stop before target.
        if let Some(trade) = &open {
            let stop_hit = match trade.side {
                Side::Buy => candle.low <= trade.stop,
                Side::Sell => candle.high >= trade.stop,
            };
            if stop_hit {
                trades.push(trade.close(
                    &report_id,
                    trade.stop,
                    CloseReason::StopLoss,
                    candle.timestamp,
                ));
                open = None;
            } else {
                let take_hit = match trade.side {
                    Side::Buy => candle.high >= trade.take,
                    Side::Sell => candle.low <= trade.take,
                };
                if take_hit {
                    trades.push(trade.close(
                        &report_id,
                        trade.take,
                        CloseReason::TakeProfit,
                        candle.timestamp,
                    ));
                    open = None;
                }
            }
        }

        let decision_price = candle.open;
        let signal = strategy.decide(&candles[..i], decision_price, params, atr_series[i - 1]);

        match (&open, signal) {
            (Some(trade), Some(signal)) if signal.side == trade.side.opposite() => {
                trades.push(trade.close(
                    &report_id,
                    decision_price,
                    CloseReason::Signal,
                    candle.timestamp,
                ));
                open = None;
            }
            (None, Some(signal)) => {
                open = Some(OpenTrade {
                    side: signal.side,
                    entry: decision_price,
                    stop: signal.stop_loss,
                    take: signal.take_profit,
                    lot: tier.max_lot_size,
                    entry_time: candle.timestamp,
                });
            }
            _ => {}
        }
    }

    // Whatever is still open closes on the last candle.
    if let Some(trade) = &open {
        let last = &candles[candles.len() - 1];
        trades.push(trade.close(
            &report_id,
            last.close,
            CloseReason::EndOfTest,
            last.timestamp,
        ));
    }

    let total_trades = trades.len() as i64;
    let winning = trades.iter().filter(|t| t.profit_loss > 0.0).count() as i64;
    let losing = trades.iter().filter(|t| t.profit_loss < 0.0).count() as i64;
    let total_pl: f64 = trades.iter().map(|t| t.profit_loss).sum();
    let win_rate = if total_trades == 0 {
        0.0
    } else {
        winning as f64 / total_trades as f64 * 100.0
    };

    let report = BacktestReport {
        id: report_id.clone(),
        user_id: request.user_id.clone(),
        symbol: request.symbol.clone(),
        timeframe: request.timeframe,
        start_date: request.start_date,
        end_date: request.end_date,
        strategy_params: params.clone(),
        risk_level: request.risk_level,
        total_trades,
        total_pl,
        winning_trades: winning,
        losing_trades: losing,
        win_rate,
        created_at: Utc::now(),
    };

    store.insert_backtest_report(&report).await?;
    if let Err(e) = store.insert_simulated_trades(&trades).await {
        tracing::warn!(report_id = %report.id, error = %e, "trade insert failed, rolling back report");
        if let Err(del) = store.delete_backtest_report(&report.id).await {
            tracing::error!(report_id = %report.id, error = %del, "report rollback failed");
        }
        return Err(e);
    }

    tracing::info!(
        report_id = %report.id,
        trades = total_trades,
        total_pl,
        win_rate,
        "backtest complete"
    );

    if let Some(mailer) = mailer {
        let body = format!(
            "Backtest {} {} from {} to {}: {} trades, total P&L {:.2}, win rate {:.1}%",
            request.symbol,
            request.timeframe,
            request.start_date,
            request.end_date,
            total_trades,
            total_pl,
            win_rate
        );
        mailer.send_best_effort("Backtest completed", &body).await;
    }

    Ok(BacktestOutcome { report, trades })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::TradeSignal;
    use std::collections::HashMap;

    /// Candle at 15-minute offsets on one day.
    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + chrono::Duration::minutes(15 * i as i64),
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    fn flat_bars(count: usize, price: f64) -> Vec<Candle> {
        (0..count)
            .map(|i| bar(i, price, price + 0.5, price - 0.5, price))
            .collect()
    }

    /// Emits a fixed signal at chosen history lengths, so the replay loop can
    /// be exercised without reverse-engineering indicator inputs.
    struct Scripted {
        signals: HashMap<usize, TradeSignal>,
    }

    impl Strategy for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn decide(
            &self,
            history: &[Candle],
            _decision_price: f64,
            _params: &StrategyParams,
            _current_atr: Option<f64>,
        ) -> Option<TradeSignal> {
            self.signals.get(&history.len()).copied()
        }
    }

    /// Minimal lookbacks so only a couple of warm-up candles are needed.
    fn small_params() -> StrategyParams {
        StrategyParams {
            sma_short: 1,
            sma_long: 2,
            bb_period: 2,
            rsi_period: 2,
            atr_period: 1,
            adx_period: 2,
            ..StrategyParams::default()
        }
    }

    async fn store_with(candles: &[Candle]) -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("engine.db").to_str().unwrap()).unwrap();
        store
            .upsert_candles("XAUUSD", Timeframe::M15, candles)
            .await
            .unwrap();
        (store, dir)
    }

    fn request() -> BacktestRequest {
        BacktestRequest {
            user_id: Some("user-1".into()),
            symbol: "XAUUSD".into(),
            timeframe: Timeframe::M15,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            strategy_mode: StrategyMode::Adaptive,
            strategy_params: small_params(),
            risk_level: RiskLevel::Conservative,
        }
    }

    fn buy_at(stop: f64, take: f64) -> TradeSignal {
        TradeSignal {
            side: Side::Buy,
            stop_loss: stop,
            take_profit: take,
        }
    }

    #[tokio::test]
    async fn stop_loss_exit_closes_at_the_stop() {
        // Open BUY at 2000 with stop 1995; next candle trades through it.
        let mut candles = flat_bars(3, 2000.0);
        candles.push(bar(3, 2000.0, 2002.0, 1999.0, 2001.0)); // entry candle
        candles.push(bar(4, 1998.0, 2001.0, 1994.0, 1998.0)); // low 1994 ≤ 1995
        let (store, _dir) = store_with(&candles).await;

        let strategy = Scripted {
            signals: HashMap::from([(3, buy_at(1995.0, 2010.0))]),
        };
        let outcome = run(&store, &request(), &strategy, None).await.unwrap();

        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert_eq!(trade.entry_price, 2000.0);
        assert_eq!(trade.exit_price, 1995.0);
        assert_eq!(trade.close_reason, CloseReason::StopLoss);
        // (1995 − 2000) · 0.01 · 100
        assert_eq!(trade.profit_loss, -5.0);
        assert_eq!(outcome.report.total_trades, 1);
        assert_eq!(outcome.report.losing_trades, 1);
        assert_eq!(outcome.report.win_rate, 0.0);
    }

    #[tokio::test]
    async fn stop_is_checked_before_take_within_one_candle() {
        // The candle spans both levels; SL wins the tie.
        let mut candles = flat_bars(3, 2000.0);
        candles.push(bar(3, 2000.0, 2001.0, 1999.0, 2000.0));
        candles.push(bar(4, 2000.0, 2012.0, 1994.0, 2005.0));
        let (store, _dir) = store_with(&candles).await;

        let strategy = Scripted {
            signals: HashMap::from([(3, buy_at(1995.0, 2010.0))]),
        };
        let outcome = run(&store, &request(), &strategy, None).await.unwrap();
        assert_eq!(outcome.trades[0].close_reason, CloseReason::StopLoss);
        assert_eq!(outcome.trades[0].exit_price, 1995.0);
    }

    #[tokio::test]
    async fn opposite_signal_closes_at_the_decision_price() {
        let mut candles = flat_bars(3, 2000.0);
        candles.push(bar(3, 2000.0, 2002.0, 1999.0, 2001.0)); // BUY opens at 2000
        candles.push(bar(4, 2003.0, 2004.0, 2001.0, 2002.0)); // SELL signal at open 2003
        let (store, _dir) = store_with(&candles).await;

        let strategy = Scripted {
            signals: HashMap::from([
                (3, buy_at(1990.0, 2020.0)),
                (
                    4,
                    TradeSignal {
                        side: Side::Sell,
                        stop_loss: 2010.0,
                        take_profit: 1995.0,
                    },
                ),
            ]),
        };
        let outcome = run(&store, &request(), &strategy, None).await.unwrap();

        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert_eq!(trade.close_reason, CloseReason::Signal);
        assert_eq!(trade.exit_price, 2003.0);
        // (2003 − 2000) · 0.01 · 100
        assert_eq!(trade.profit_loss, 3.0);
        assert_eq!(outcome.report.winning_trades, 1);
        assert_eq!(outcome.report.win_rate, 100.0);
    }

    #[tokio::test]
    async fn take_profit_exit_closes_at_the_target() {
        let mut candles = flat_bars(3, 2000.0);
        candles.push(bar(3, 2000.0, 2002.0, 1999.0, 2001.0));
        candles.push(bar(4, 2005.0, 2011.0, 2004.0, 2009.0)); // high 2011 ≥ 2010
        let (store, _dir) = store_with(&candles).await;

        let strategy = Scripted {
            signals: HashMap::from([(3, buy_at(1995.0, 2010.0))]),
        };
        let outcome = run(&store, &request(), &strategy, None).await.unwrap();
        let trade = &outcome.trades[0];
        assert_eq!(trade.close_reason, CloseReason::TakeProfit);
        assert_eq!(trade.exit_price, 2010.0);
        assert_eq!(trade.profit_loss, 10.0);
    }

    #[tokio::test]
    async fn end_of_test_closes_at_the_last_close() {
        let mut candles = flat_bars(3, 2000.0);
        candles.push(bar(3, 2000.0, 2002.0, 1999.0, 2001.0));
        candles.push(bar(4, 2002.0, 2003.0, 2001.0, 2002.5));
        let (store, _dir) = store_with(&candles).await;

        let strategy = Scripted {
            signals: HashMap::from([(3, buy_at(1990.0, 2020.0))]),
        };
        let outcome = run(&store, &request(), &strategy, None).await.unwrap();
        let trade = &outcome.trades[0];
        assert_eq!(trade.close_reason, CloseReason::EndOfTest);
        assert_eq!(trade.exit_price, 2002.5);
    }

    #[tokio::test]
    async fn report_and_children_persist_together() {
        let mut candles = flat_bars(3, 2000.0);
        candles.push(bar(3, 2000.0, 2002.0, 1999.0, 2001.0));
        candles.push(bar(4, 1998.0, 2001.0, 1994.0, 1998.0));
        let (store, _dir) = store_with(&candles).await;

        let strategy = Scripted {
            signals: HashMap::from([(3, buy_at(1995.0, 2010.0))]),
        };
        let outcome = run(&store, &request(), &strategy, None).await.unwrap();

        let (report, children) = store
            .backtest_report(&outcome.report.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.total_trades, 1);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].report_id, report.id);
    }

    #[tokio::test]
    async fn too_few_candles_is_insufficient_data() {
        let (store, _dir) = store_with(&flat_bars(1, 2000.0)).await;
        let strategy = Scripted {
            signals: HashMap::new(),
        };
        match run(&store, &request(), &strategy, None).await {
            Err(EngineError::InsufficientData { actual, .. }) => assert_eq!(actual, 1),
            other => panic!("expected insufficient data, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn no_signals_yield_an_empty_report() {
        let (store, _dir) = store_with(&flat_bars(6, 2000.0)).await;
        let strategy = Scripted {
            signals: HashMap::new(),
        };
        let outcome = run(&store, &request(), &strategy, None).await.unwrap();
        assert_eq!(outcome.report.total_trades, 0);
        assert_eq!(outcome.report.win_rate, 0.0);
        assert!(outcome.trades.is_empty());
    }
}
