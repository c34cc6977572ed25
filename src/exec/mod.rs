//! Execution abstraction: one order/position/account contract with a
//! ledger-backed simulator and an HTTP broker bridge behind it.

pub mod bridge;
pub mod simulated;

pub use bridge::BridgeProvider;
pub use simulated::SimulatedProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, ProviderType};
use crate::data::market::MarketDataClient;
use crate::data::store::Store;
use crate::data::Side;
use crate::error::EngineError;

/// An order to open, as the engine hands it to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user_id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub lot_size: f64,
    pub open_price: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    pub success: bool,
    pub ticket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPosition {
    pub ticket: String,
    pub symbol: String,
    pub side: Side,
    pub lots: f64,
    pub open_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerTime {
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The uniform execution contract. Providers are stateless beyond their
/// handles; a new instance per invocation is acceptable.
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute_order(&self, order: &OrderRequest) -> Result<ExecutionOutcome, EngineError>;

    async fn close_order(
        &self,
        ticket: &str,
        lots: Option<f64>,
    ) -> Result<CloseOutcome, EngineError>;

    async fn account_summary(
        &self,
        account_id: Option<&str>,
    ) -> Result<AccountSummary, EngineError>;

    async fn open_positions(
        &self,
        account_id: Option<&str>,
    ) -> Result<Vec<OpenPosition>, EngineError>;

    async fn server_time(&self) -> Result<ServerTime, EngineError>;
}

/// Build the configured provider. `METATRADER` without a bridge URL and key
/// falls back to the simulator with a warning rather than failing startup.
pub fn provider_from_config(
    config: &Config,
    store: Arc<Store>,
    market: Arc<MarketDataClient>,
) -> Result<Arc<dyn ExecutionProvider>, EngineError> {
    match config.provider_type {
        ProviderType::Simulated => Ok(Arc::new(SimulatedProvider::new(store, market))),
        ProviderType::Metatrader => match (&config.mt_bridge_url, &config.mt_bridge_api_key) {
            (Some(url), Some(key)) => Ok(Arc::new(BridgeProvider::new(url.clone(), key.clone())?)),
            _ => {
                tracing::warn!(
                    "TRADE_PROVIDER_TYPE=METATRADER but MT_BRIDGE_URL/MT_BRIDGE_API_KEY \
                     are not set, falling back to the simulated provider"
                );
                Ok(Arc::new(SimulatedProvider::new(store, market)))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config(provider: ProviderType, url: Option<&str>, key: Option<&str>) -> Config {
        Config {
            database_path: String::new(),
            market_api_key: "k".into(),
            market_api_base_url: Some("http://127.0.0.1:1/query".into()),
            provider_type: provider,
            mt_bridge_url: url.map(String::from),
            mt_bridge_api_key: key.map(String::from),
            sendgrid_api_key: None,
            from_email: None,
            notification_email_recipient: None,
            port: 0,
        }
    }

    fn handles() -> (Arc<Store>, Arc<MarketDataClient>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.db");
        let store = Arc::new(Store::open(path.to_str().unwrap()).unwrap());
        let market = Arc::new(MarketDataClient::new("http://127.0.0.1:1/query", "k").unwrap());
        (store, market, dir)
    }

    #[tokio::test]
    async fn metatrader_without_bridge_url_falls_back_to_simulated() {
        let (store, market, _dir) = handles();
        let cfg = config(ProviderType::Metatrader, None, None);
        let provider = provider_from_config(&cfg, store, market).unwrap();
        assert_eq!(provider.name(), "simulated");
    }

    #[tokio::test]
    async fn metatrader_with_full_bridge_config_uses_the_bridge() {
        let (store, market, _dir) = handles();
        let cfg = config(
            ProviderType::Metatrader,
            Some("http://127.0.0.1:9/bridge"),
            Some("secret"),
        );
        let provider = provider_from_config(&cfg, store, market).unwrap();
        assert_eq!(provider.name(), "metatrader_bridge");
    }

    #[tokio::test]
    async fn simulated_is_the_default() {
        let (store, market, _dir) = handles();
        let cfg = config(ProviderType::Simulated, None, None);
        let provider = provider_from_config(&cfg, store, market).unwrap();
        assert_eq!(provider.name(), "simulated");
    }
}
