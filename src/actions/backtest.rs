//! Backtest actions: run a replay, fetch one report, list reports.

use chrono::NaiveDate;
use garde::Validate;
use serde::Deserialize;

use super::response::{BacktestListResponse, BacktestReportResponse, RunBacktestResponse};
use crate::data::{Timeframe, SYMBOL};
use crate::engine::backtest::{self, BacktestRequest};
use crate::engine::RiskLevel;
use crate::error::EngineError;
use crate::server::AppState;
use crate::strategy::{StrategyDispatcher, StrategyMode, StrategyParams};

#[derive(Debug, Deserialize, Validate)]
pub struct RunBacktestParams {
    #[garde(skip)]
    pub user_id: Option<String>,
    #[garde(inner(length(min = 1, max = 16)))]
    pub symbol: Option<String>,
    #[garde(inner(length(min = 1, max = 10)))]
    pub timeframe: Option<String>,
    #[garde(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$"))]
    pub start_date: String,
    #[garde(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$"))]
    pub end_date: String,
    #[garde(skip)]
    pub strategy_mode: Option<StrategyMode>,
    #[serde(default)]
    #[garde(dive)]
    pub strategy_params: StrategyParams,
    #[garde(skip)]
    pub risk_level: Option<RiskLevel>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GetReportParams {
    #[garde(length(min = 1))]
    pub report_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListReportsParams {
    #[garde(skip)]
    pub user_id: Option<String>,
    #[garde(inner(range(min = 1, max = 500)))]
    pub limit: Option<usize>,
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, EngineError> {
    raw.parse()
        .map_err(|_| EngineError::Validation(format!("{field} is not a valid date: {raw}")))
}

pub async fn run_backtest(
    state: &AppState,
    params: RunBacktestParams,
) -> Result<RunBacktestResponse, EngineError> {
    let timeframe = match &params.timeframe {
        Some(raw) => raw.parse::<Timeframe>()?,
        None => Timeframe::M15,
    };
    let mode = params.strategy_mode.unwrap_or(StrategyMode::Adaptive);
    let request = BacktestRequest {
        user_id: params.user_id,
        symbol: params.symbol.unwrap_or_else(|| SYMBOL.to_string()),
        timeframe,
        start_date: parse_date(&params.start_date, "start_date")?,
        end_date: parse_date(&params.end_date, "end_date")?,
        strategy_mode: mode,
        strategy_params: params.strategy_params,
        risk_level: params.risk_level.unwrap_or(RiskLevel::Medium),
    };

    let dispatcher = StrategyDispatcher::new(mode);
    let outcome =
        backtest::run(&state.store, &request, &dispatcher, state.mailer.as_deref()).await?;
    Ok(RunBacktestResponse {
        trade_count: outcome.trades.len(),
        report: outcome.report,
    })
}

pub async fn get_backtest_report(
    state: &AppState,
    params: GetReportParams,
) -> Result<BacktestReportResponse, EngineError> {
    match state.store.backtest_report(&params.report_id).await? {
        Some((report, trades)) => Ok(BacktestReportResponse { report, trades }),
        None => Err(EngineError::Validation(format!(
            "backtest report {} not found",
            params.report_id
        ))),
    }
}

pub async fn list_backtests(
    state: &AppState,
    params: ListReportsParams,
) -> Result<BacktestListResponse, EngineError> {
    let reports = state
        .store
        .list_backtest_reports(params.user_id.as_deref(), params.limit.unwrap_or(50))
        .await?;
    Ok(BacktestListResponse { reports })
}
