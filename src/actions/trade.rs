//! Direct trade actions against the configured execution provider.

use garde::Validate;
use serde::Deserialize;

use crate::data::{Side, SYMBOL};
use crate::error::EngineError;
use crate::exec::{CloseOutcome, ExecutionOutcome, OrderRequest};
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ExecuteTradeParams {
    #[garde(length(min = 1))]
    pub user_id: String,
    #[garde(length(min = 1))]
    pub account_id: String,
    #[garde(skip)]
    pub side: Side,
    #[garde(range(min = 0.01, max = 10.0))]
    pub lot_size: f64,
    #[garde(range(min = 0.0))]
    pub stop_loss: f64,
    #[garde(inner(range(min = 0.0)))]
    pub take_profit: Option<f64>,
    /// Explicit entry price; the live spot is used when absent.
    #[garde(inner(range(min = 0.0)))]
    pub open_price: Option<f64>,
    #[garde(skip)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CloseTradeParams {
    /// Provider ticket (the ledger row id is accepted too).
    #[garde(length(min = 1))]
    pub ticket: String,
    #[garde(inner(range(min = 0.01)))]
    pub lots: Option<f64>,
}

pub async fn execute_trade(
    state: &AppState,
    params: ExecuteTradeParams,
) -> Result<ExecutionOutcome, EngineError> {
    let open_price = match params.open_price {
        Some(price) => price,
        None => state.market.spot_price().await?,
    };
    let order = OrderRequest {
        user_id: params.user_id,
        account_id: params.account_id,
        symbol: SYMBOL.to_string(),
        side: params.side,
        lot_size: params.lot_size,
        open_price,
        stop_loss: params.stop_loss,
        take_profit: params.take_profit,
        session_id: params.session_id,
    };
    state.provider.execute_order(&order).await
}

pub async fn close_trade(
    state: &AppState,
    params: CloseTradeParams,
) -> Result<CloseOutcome, EngineError> {
    state.provider.close_order(&params.ticket, params.lots).await
}
