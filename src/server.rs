//! Single-entrypoint action router.
//!
//! `POST /engine` takes an `{"action": ..., "data": ...}` envelope and
//! dispatches to the matching handler. Payloads are deserialized and
//! garde-validated here at the boundary, never inside handlers. Errors render
//! as `{"error": ...}` with the taxonomy's status code; preflight OPTIONS
//! requests are answered by the CORS layer without reaching dispatch.

use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use garde::Validate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::actions;
use crate::config::Config;
use crate::data::market::MarketDataClient;
use crate::data::store::Store;
use crate::error::EngineError;
use crate::exec::{provider_from_config, ExecutionProvider};
use crate::notify::Mailer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub market: Arc<MarketDataClient>,
    pub provider: Arc<dyn ExecutionProvider>,
    pub mailer: Option<Arc<Mailer>>,
}

impl AppState {
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        let store = Arc::new(Store::open(&config.database_path)?);
        let market = Arc::new(MarketDataClient::from_config(&config)?);
        let provider = provider_from_config(&config, store.clone(), market.clone())?;
        let mailer = Mailer::from_config(&config).map(Arc::new);
        if mailer.is_none() {
            tracing::info!("email not configured, notifications stay in the store");
        }
        Ok(Self {
            config: Arc::new(config),
            store,
            market,
            provider,
            mailer,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    action: String,
    #[serde(default)]
    data: Value,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/engine", post(dispatch))
        .route("/health", get(|| async { "ok" }))
        .layer(cors)
        .with_state(state)
}

/// Parse the action payload and run its validation before dispatch.
fn parse<T>(action: &str, data: Value) -> Result<T, EngineError>
where
    T: DeserializeOwned + Validate<Context = ()>,
{
    // A missing `data` arrives as null; treat it like an empty object so
    // actions with all-optional payloads work without one.
    let data = if data.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        data
    };
    let parsed: T = serde_json::from_value(data)
        .map_err(|e| EngineError::Validation(format!("invalid {action} payload: {e}")))?;
    parsed.validate()?;
    Ok(parsed)
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Json<Value>, EngineError> {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| EngineError::Store(format!("response encoding failed: {e}")))
}

async fn dispatch(
    State(state): State<AppState>,
    Json(envelope): Json<ActionEnvelope>,
) -> Result<Json<Value>, EngineError> {
    let action = envelope.action.as_str();
    let data = envelope.data;
    tracing::debug!(action, "dispatching");

    match action {
        "execute_trade" => {
            to_json(actions::trade::execute_trade(&state, parse(action, data)?).await?)
        }
        "close_trade" => to_json(actions::trade::close_trade(&state, parse(action, data)?).await?),
        "update_prices" => {
            to_json(actions::price::update_prices(&state, parse(action, data)?).await?)
        }
        "run_bot_logic" => to_json(actions::bot::run_bot_logic(&state).await?),
        "get_current_price_action" => to_json(actions::price::get_current_price(&state).await?),
        "fetch_historical_data_action" => {
            to_json(actions::price::fetch_historical_data(&state, parse(action, data)?).await?)
        }
        "run_backtest_action" => {
            to_json(actions::backtest::run_backtest(&state, parse(action, data)?).await?)
        }
        "get_backtest_report_action" => {
            to_json(actions::backtest::get_backtest_report(&state, parse(action, data)?).await?)
        }
        "list_backtests_action" => {
            to_json(actions::backtest::list_backtests(&state, parse(action, data)?).await?)
        }
        "provider_close_order" => {
            to_json(actions::provider::close_order(&state, parse(action, data)?).await?)
        }
        "provider_get_account_summary" => {
            to_json(actions::provider::get_account_summary(&state, parse(action, data)?).await?)
        }
        "provider_list_open_positions" => {
            to_json(actions::provider::list_open_positions(&state, parse(action, data)?).await?)
        }
        "provider_get_server_time" => to_json(actions::provider::get_server_time(&state).await?),
        "upsert_trading_account_action" => {
            to_json(actions::accounts::upsert_trading_account(&state, parse(action, data)?).await?)
        }
        "admin_get_env_variables_status" => {
            to_json(actions::admin::get_env_variables_status(&state))
        }
        "admin_list_users_overview" => {
            to_json(actions::admin::list_users_overview(&state).await?)
        }
        other => Err(EngineError::UnknownAction(other.to_string())),
    }
}
