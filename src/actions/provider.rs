//! Thin pass-throughs to the execution provider.

use garde::Validate;
use serde::Deserialize;

use super::response::PositionsResponse;
use crate::error::EngineError;
use crate::exec::{AccountSummary, CloseOutcome, ServerTime};
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ProviderCloseParams {
    #[garde(length(min = 1))]
    pub ticket: String,
    #[garde(inner(range(min = 0.01)))]
    pub lots: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AccountScopeParams {
    #[garde(skip)]
    pub account_id: Option<String>,
}

pub async fn close_order(
    state: &AppState,
    params: ProviderCloseParams,
) -> Result<CloseOutcome, EngineError> {
    state.provider.close_order(&params.ticket, params.lots).await
}

pub async fn get_account_summary(
    state: &AppState,
    params: AccountScopeParams,
) -> Result<AccountSummary, EngineError> {
    state
        .provider
        .account_summary(params.account_id.as_deref())
        .await
}

pub async fn list_open_positions(
    state: &AppState,
    params: AccountScopeParams,
) -> Result<PositionsResponse, EngineError> {
    let positions = state
        .provider
        .open_positions(params.account_id.as_deref())
        .await?;
    Ok(PositionsResponse { positions })
}

pub async fn get_server_time(state: &AppState) -> Result<ServerTime, EngineError> {
    state.provider.server_time().await
}
