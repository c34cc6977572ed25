//! Live bot-session runner.
//!
//! One `run_bot_logic` invocation walks every active session sequentially.
//! Each session is processed inside its own error boundary: a failing
//! session is logged, recorded as a `bot_error` notification, and never
//! blocks the rest of the pass.

use serde::Serialize;
use std::sync::Arc;

use super::pips_to_price;
use crate::data::market::MarketDataClient;
use crate::data::store::{BotSession, Store};
use crate::data::{OutputSize, Timeframe, SYMBOL};
use crate::error::EngineError;
use crate::exec::{ExecutionProvider, OrderRequest};
use crate::indicators::atr;
use crate::notify::{Mailer, Notifier, KIND_BOT_ERROR, KIND_TRADE_ERROR, KIND_TRADE_EXECUTED};
use crate::strategy::{Strategy, StrategyDispatcher};

/// Sessions trade on the 15-minute timeframe.
const BOT_TIMEFRAME: Timeframe = Timeframe::M15;

#[derive(Debug, Default, Serialize)]
pub struct RunnerOutcome {
    pub sessions_processed: usize,
    pub trades_opened: usize,
    pub skipped: usize,
    pub errors: usize,
}

enum SessionTick {
    Opened,
    NoSignal,
    SkippedOpenTrade,
    Rejected,
    ExecutionFailed,
}

pub async fn run_bot_logic(
    store: Arc<Store>,
    market: Arc<MarketDataClient>,
    provider: Arc<dyn ExecutionProvider>,
    mailer: Option<Arc<Mailer>>,
) -> Result<RunnerOutcome, EngineError> {
    let sessions = store.active_sessions().await?;
    let notifier = Notifier::new(store.clone());
    let mut outcome = RunnerOutcome::default();

    for session in sessions {
        outcome.sessions_processed += 1;
        match run_session(
            &store,
            &market,
            provider.as_ref(),
            mailer.as_deref(),
            &notifier,
            &session,
        )
        .await
        {
            Ok(SessionTick::Opened) => outcome.trades_opened += 1,
            Ok(SessionTick::NoSignal) => {}
            Ok(SessionTick::SkippedOpenTrade | SessionTick::Rejected) => outcome.skipped += 1,
            Ok(SessionTick::ExecutionFailed) => outcome.errors += 1,
            Err(e) => {
                outcome.errors += 1;
                tracing::warn!(session_id = %session.id, error = %e, "session pass failed");
                notifier
                    .record_best_effort(
                        &session.user_id,
                        KIND_BOT_ERROR,
                        "Bot session error",
                        &format!("Session {} failed: {e}", session.id),
                    )
                    .await;
            }
        }
    }

    tracing::info!(
        sessions = outcome.sessions_processed,
        opened = outcome.trades_opened,
        skipped = outcome.skipped,
        errors = outcome.errors,
        "bot logic pass complete"
    );
    Ok(outcome)
}

async fn run_session(
    store: &Store,
    market: &MarketDataClient,
    provider: &dyn ExecutionProvider,
    mailer: Option<&Mailer>,
    notifier: &Notifier,
    session: &BotSession,
) -> Result<SessionTick, EngineError> {
    // One trade at a time per session.
    if store.count_open_session_trades(&session.id).await? >= 1 {
        tracing::debug!(session_id = %session.id, "open trade exists, skipping");
        return Ok(SessionTick::SkippedOpenTrade);
    }

    let tier = session.risk_level.tier();
    let params = &session.strategy_params;

    let history = market
        .historical_series(BOT_TIMEFRAME, OutputSize::Compact)
        .await?;
    if history.len() < params.min_candles() {
        // Thin history is a no-trade tick, not a session failure.
        tracing::info!(
            session_id = %session.id,
            candles = history.len(),
            required = params.min_candles(),
            "not enough history for analysis"
        );
        return Ok(SessionTick::NoSignal);
    }
    let spot = market.spot_price().await?;

    let current_atr = atr(&history, params.atr_period).last().copied().flatten();
    let dispatcher = StrategyDispatcher::new(session.strategy_mode);
    let Some(mut signal) = dispatcher.decide(&history, spot, params, current_atr) else {
        tracing::debug!(session_id = %session.id, spot, "no entry signal this tick");
        return Ok(SessionTick::NoSignal);
    };

    // The risk tier budgets the stop distance; clamp an ATR stop that asks
    // for more room than the tier allows.
    let max_distance = pips_to_price(tier.stop_loss_pips);
    if (spot - signal.stop_loss).abs() > max_distance {
        signal.stop_loss = spot - signal.side.sign() * max_distance;
    }

    let order = OrderRequest {
        user_id: session.user_id.clone(),
        account_id: session.account_id.clone(),
        symbol: SYMBOL.to_string(),
        side: signal.side,
        lot_size: tier.max_lot_size,
        open_price: spot,
        stop_loss: signal.stop_loss,
        take_profit: Some(signal.take_profit),
        session_id: Some(session.id.clone()),
    };

    match provider.execute_order(&order).await {
        Ok(outcome) if outcome.success => {
            let body = format!(
                "{} {} {} @ {:.2} (stop {:.2}, take {:.2}, session {})",
                signal.side, tier.max_lot_size, SYMBOL, spot, signal.stop_loss,
                signal.take_profit, session.id
            );
            notifier
                .record_best_effort(
                    &session.user_id,
                    KIND_TRADE_EXECUTED,
                    "Bot trade executed",
                    &body,
                )
                .await;
            store
                .record_session_trade(&session.id, chrono::Utc::now())
                .await?;
            if let Some(mailer) = mailer {
                mailer.send_best_effort("Bot trade executed", &body).await;
            }
            Ok(SessionTick::Opened)
        }
        Ok(outcome) => {
            // Guarded insert lost the race: another pass already opened.
            tracing::debug!(
                session_id = %session.id,
                error = outcome.error.as_deref().unwrap_or("rejected"),
                "order rejected, treating as skip"
            );
            Ok(SessionTick::Rejected)
        }
        Err(e) => {
            tracing::warn!(session_id = %session.id, error = %e, "order execution failed");
            notifier
                .record_best_effort(
                    &session.user_id,
                    KIND_TRADE_ERROR,
                    "Bot trade failed",
                    &format!("Session {}: {e}", session.id),
                )
                .await;
            Ok(SessionTick::ExecutionFailed)
        }
    }
}
