//! Trading-account maintenance. No credential material is accepted or
//! stored; key management belongs to the deployment.

use chrono::Utc;
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use super::response::AccountResponse;
use crate::data::store::TradingAccount;
use crate::error::EngineError;
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertAccountParams {
    #[garde(skip)]
    pub id: Option<String>,
    #[garde(length(min = 1))]
    pub user_id: String,
    #[garde(inner(length(min = 1, max = 32)))]
    pub platform: Option<String>,
    #[garde(length(min = 1, max = 64))]
    pub account_number: String,
    #[garde(length(min = 1, max = 128))]
    pub server: String,
    #[garde(inner(range(min = 0.0)))]
    pub balance: Option<f64>,
    #[garde(inner(length(min = 3, max = 3)))]
    pub currency: Option<String>,
}

pub async fn upsert_trading_account(
    state: &AppState,
    params: UpsertAccountParams,
) -> Result<AccountResponse, EngineError> {
    let now = Utc::now();
    let id = params.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    // Keep the original creation stamp on update.
    let created_at = match state.store.trading_account(&id).await? {
        Some(existing) => existing.created_at,
        None => now,
    };

    let account = TradingAccount {
        id,
        user_id: params.user_id,
        platform: params.platform.unwrap_or_else(|| "MT5".to_string()),
        account_number: params.account_number,
        server: params.server,
        balance: params.balance.unwrap_or(0.0),
        currency: params.currency.unwrap_or_else(|| "USD".to_string()),
        created_at,
        updated_at: now,
    };
    state.store.upsert_trading_account(&account).await?;
    Ok(AccountResponse { account })
}
