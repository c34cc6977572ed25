//! Operator-facing actions.

use super::response::{EnvStatusResponse, UsersOverviewResponse};
use crate::config::ProviderType;
use crate::error::EngineError;
use crate::server::AppState;

pub fn get_env_variables_status(state: &AppState) -> EnvStatusResponse {
    let config = &state.config;
    EnvStatusResponse {
        market_api_key: !config.market_api_key.is_empty(),
        trade_provider_type: match config.provider_type {
            ProviderType::Simulated => "SIMULATED".to_string(),
            ProviderType::Metatrader => "METATRADER".to_string(),
        },
        mt_bridge_url: config.mt_bridge_url.is_some(),
        mt_bridge_api_key: config.mt_bridge_api_key.is_some(),
        bridge_enabled: config.bridge_configured(),
        sendgrid_api_key: config.sendgrid_api_key.is_some(),
        from_email: config.from_email.is_some(),
        notification_email_recipient: config.notification_email_recipient.is_some(),
        email_enabled: config.email_configured(),
    }
}

pub async fn list_users_overview(state: &AppState) -> Result<UsersOverviewResponse, EngineError> {
    let users = state.store.users_overview().await?;
    Ok(UsersOverviewResponse { users })
}
