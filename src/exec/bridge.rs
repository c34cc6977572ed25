//! MetaTrader bridge provider: one HTTP call per contract operation against
//! a configured base URL, authenticated with a shared-secret header.
//!
//! Non-2xx statuses, unreadable payloads, and `{"success": false}` bodies all
//! surface as provider errors carrying the endpoint name. A 202/204 response
//! counts as success with an empty body. Tickets are stringified whether the
//! bridge sends them as numbers or strings.

use reqwest::Client;
use serde_json::Value;

use super::{
    AccountSummary, CloseOutcome, ExecutionOutcome, ExecutionProvider, OpenPosition, OrderRequest,
    ServerTime,
};
use crate::data::Side;
use crate::error::EngineError;

const TIMEOUT_SECS: u64 = 10;
const API_KEY_HEADER: &str = "X-MT-Bridge-API-Key";

/// Magic number stamped on bridge orders so they are attributable to this
/// engine inside the terminal.
const MAGIC_NUMBER: i64 = 880_031;

pub struct BridgeProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl BridgeProvider {
    pub fn new(base_url: String, api_key: String) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, EngineError> {
        let resp = self
            .client
            .post(format!("{}{endpoint}", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::provider(endpoint, format!("request failed: {e}")))?;
        Self::read_payload(endpoint, resp).await
    }

    async fn get(&self, endpoint: &str) -> Result<Value, EngineError> {
        let resp = self
            .client
            .get(format!("{}{endpoint}", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| EngineError::provider(endpoint, format!("request failed: {e}")))?;
        Self::read_payload(endpoint, resp).await
    }

    async fn read_payload(endpoint: &str, resp: reqwest::Response) -> Result<Value, EngineError> {
        let status = resp.status();

        // Accepted / no-content: success with an empty body.
        if status == reqwest::StatusCode::ACCEPTED || status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        if !status.is_success() {
            return Err(EngineError::provider(
                endpoint,
                format!("bridge returned status {status}"),
            ));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| EngineError::provider(endpoint, format!("unreadable payload: {e}")))?;

        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            let message = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("bridge reported failure")
                .to_string();
            return Err(EngineError::provider(endpoint, message));
        }
        Ok(payload)
    }
}

/// `ticket` fields arrive as numbers or strings depending on the terminal.
fn stringify_ticket(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_f64(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ExecutionProvider for BridgeProvider {
    fn name(&self) -> &'static str {
        "metatrader_bridge"
    }

    async fn execute_order(&self, order: &OrderRequest) -> Result<ExecutionOutcome, EngineError> {
        let endpoint = "/order/execute";
        let mut body = serde_json::json!({
            "symbol": order.symbol,
            "type": order.side.as_str(),
            "lots": order.lot_size,
            "price": order.open_price,
            "stopLossPrice": order.stop_loss,
            "magicNumber": MAGIC_NUMBER,
            "comment": order.session_id.as_deref().unwrap_or("manual"),
        });
        if let Some(tp) = order.take_profit {
            body["takeProfitPrice"] = serde_json::json!(tp);
        }

        let payload = self.post(endpoint, &body).await?;
        let ticket = stringify_ticket(payload.get("ticket"));
        if ticket.is_none() {
            return Err(EngineError::provider(
                endpoint,
                "bridge acknowledged the order without a ticket",
            ));
        }
        Ok(ExecutionOutcome {
            success: true,
            trade_id: None,
            ticket,
            error: None,
        })
    }

    async fn close_order(
        &self,
        ticket: &str,
        lots: Option<f64>,
    ) -> Result<CloseOutcome, EngineError> {
        let endpoint = "/order/close";
        let mut body = serde_json::json!({ "ticket": ticket });
        if let Some(l) = lots {
            body["lots"] = serde_json::json!(l);
        }
        let payload = self.post(endpoint, &body).await?;
        Ok(CloseOutcome {
            success: true,
            ticket: stringify_ticket(payload.get("ticket")).unwrap_or_else(|| ticket.to_string()),
            close_price: field_f64(&payload, "closePrice"),
            profit: field_f64(&payload, "profit"),
            error: None,
        })
    }

    async fn account_summary(
        &self,
        _account_id: Option<&str>,
    ) -> Result<AccountSummary, EngineError> {
        let endpoint = "/account/summary";
        let payload = self.get(endpoint).await?;
        serde_json::from_value(payload)
            .map_err(|e| EngineError::provider(endpoint, format!("unexpected summary shape: {e}")))
    }

    async fn open_positions(
        &self,
        _account_id: Option<&str>,
    ) -> Result<Vec<OpenPosition>, EngineError> {
        let endpoint = "/positions/open";
        let payload = self.get(endpoint).await?;
        let rows = payload
            .get("positions")
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::provider(endpoint, "payload missing positions array"))?;

        let mut positions = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(ticket) = stringify_ticket(row.get("ticket")) else {
                continue;
            };
            let side = row
                .get("type")
                .or_else(|| row.get("side"))
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Side>().ok());
            let Some(side) = side else { continue };
            positions.push(OpenPosition {
                ticket,
                symbol: row
                    .get("symbol")
                    .and_then(Value::as_str)
                    .unwrap_or(crate::data::SYMBOL)
                    .to_string(),
                side,
                lots: field_f64(row, "lots").unwrap_or(0.0),
                open_price: field_f64(row, "openPrice").unwrap_or(0.0),
                stop_loss: field_f64(row, "stopLoss"),
                take_profit: field_f64(row, "takeProfit"),
                profit: field_f64(row, "profit"),
                opened_at: row
                    .get("openTime")
                    .and_then(Value::as_str)
                    .map(String::from),
            });
        }
        Ok(positions)
    }

    async fn server_time(&self) -> Result<ServerTime, EngineError> {
        let endpoint = "/server/time";
        let payload = self.get(endpoint).await?;
        let time = payload
            .get("serverTime")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::provider(endpoint, "payload missing serverTime"))?;
        Ok(ServerTime {
            time: time.to_string(),
            error: None,
        })
    }
}
