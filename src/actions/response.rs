//! Response shapes for the action router.

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::data::store::{BacktestReport, SimulatedTrade, TradingAccount, UserOverview};
use crate::data::{Candle, Timeframe};
use crate::exec::OpenPosition;

#[derive(Debug, Serialize)]
pub struct SpotResponse {
    pub symbol: &'static str,
    pub price: f64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoricalDataResponse {
    pub symbol: &'static str,
    pub timeframe: Timeframe,
    pub count: usize,
    pub candles: Vec<Candle>,
}

#[derive(Debug, Serialize)]
pub struct UpdatePricesResponse {
    pub symbol: &'static str,
    pub timeframe: Timeframe,
    pub upserted: usize,
}

#[derive(Debug, Serialize)]
pub struct RunBacktestResponse {
    pub report: BacktestReport,
    pub trade_count: usize,
}

#[derive(Debug, Serialize)]
pub struct BacktestReportResponse {
    pub report: BacktestReport,
    pub trades: Vec<SimulatedTrade>,
}

#[derive(Debug, Serialize)]
pub struct BacktestListResponse {
    pub reports: Vec<BacktestReport>,
}

#[derive(Debug, Serialize)]
pub struct PositionsResponse {
    pub positions: Vec<OpenPosition>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account: TradingAccount,
}

/// Presence booleans only; values never leave the process.
#[derive(Debug, Serialize)]
pub struct EnvStatusResponse {
    pub market_api_key: bool,
    pub trade_provider_type: String,
    pub mt_bridge_url: bool,
    pub mt_bridge_api_key: bool,
    pub bridge_enabled: bool,
    pub sendgrid_api_key: bool,
    pub from_email: bool,
    pub notification_email_recipient: bool,
    pub email_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct UsersOverviewResponse {
    pub users: Vec<UserOverview>,
}
