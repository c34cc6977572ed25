//! Market-data client for XAU/USD spot and historical OHLC series.
//!
//! Wraps the upstream FX API with:
//!
//! - **Spot caching**: one process-wide slot with a 5-minute TTL; when the
//!   upstream fails, a cache entry younger than 10 minutes is served with a
//!   warning instead of failing the caller.
//! - **Rate-limit detection**: the upstream signals throttling inside a 200
//!   response body; those payloads surface as a retryable error distinct from
//!   a parse failure.
//! - **Schema normalization**: series come back keyed by timestamp with
//!   stringly-typed fields; intraday series carry no volume (defaults to 0).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Candle, OutputSize, Timeframe};
use crate::config::Config;
use crate::error::EngineError;

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
const TIMEOUT_SECS: u64 = 15;
const SPOT_TTL_SECS: i64 = 5 * 60;
const SPOT_STALE_SECS: i64 = 10 * 60;

/// A cached spot observation.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SpotQuote {
    pub price: f64,
    pub fetched_at: DateTime<Utc>,
}

pub struct MarketDataClient {
    client: Client,
    base_url: String,
    api_key: String,
    spot_cache: RwLock<Option<SpotQuote>>,
}

impl MarketDataClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            spot_cache: RwLock::new(None),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let base = config
            .market_api_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::new(base, config.market_api_key.clone())
    }

    /// Current XAU→USD rate, served from the cache when fresh.
    ///
    /// Cache younger than 5 minutes: returned without I/O. On upstream
    /// failure a cache entry younger than 10 minutes is returned with a
    /// warning; older than that, the failure propagates.
    pub async fn spot(&self) -> Result<SpotQuote, EngineError> {
        let now = Utc::now();
        if let Some(cached) = *self.spot_cache.read().await {
            if now - cached.fetched_at < Duration::seconds(SPOT_TTL_SECS) {
                return Ok(cached);
            }
        }

        let mut slot = self.spot_cache.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = *slot {
            if now - cached.fetched_at < Duration::seconds(SPOT_TTL_SECS) {
                return Ok(cached);
            }
        }

        match self.fetch_spot().await {
            Ok(price) => {
                let quote = SpotQuote {
                    price,
                    fetched_at: Utc::now(),
                };
                *slot = Some(quote);
                Ok(quote)
            }
            Err(e) => {
                if let Some(cached) = *slot {
                    if now - cached.fetched_at < Duration::seconds(SPOT_STALE_SECS) {
                        tracing::warn!(
                            error = %e,
                            age_secs = (now - cached.fetched_at).num_seconds(),
                            "spot fetch failed, serving stale cache entry"
                        );
                        return Ok(cached);
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn spot_price(&self) -> Result<f64, EngineError> {
        Ok(self.spot().await?.price)
    }

    async fn fetch_spot(&self) -> Result<f64, EngineError> {
        let params = [
            ("function", "CURRENCY_EXCHANGE_RATE"),
            ("from_currency", "XAU"),
            ("to_currency", "USD"),
            ("apikey", self.api_key.as_str()),
        ];
        let body = self.get_json(&params).await?;
        parse_spot_payload(&body)
    }

    /// Historical OHLC series, ascending by timestamp.
    pub async fn historical_series(
        &self,
        timeframe: Timeframe,
        output_size: OutputSize,
    ) -> Result<Vec<Candle>, EngineError> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        let function = match timeframe {
            Timeframe::Daily => "FX_DAILY",
            Timeframe::Weekly => "FX_WEEKLY",
            Timeframe::Monthly => "FX_MONTHLY",
            _ => "FX_INTRADAY",
        };
        params.push(("function", function));
        params.push(("from_symbol", "XAU"));
        params.push(("to_symbol", "USD"));
        if let Some(interval) = timeframe.api_interval() {
            params.push(("interval", interval));
        }
        params.push(("outputsize", output_size.as_str()));
        params.push(("apikey", self.api_key.as_str()));

        let body = self.get_json(&params).await?;
        parse_series_payload(&body)
    }

    async fn get_json(&self, params: &[(&str, &str)]) -> Result<Value, EngineError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(params)
            .send()
            .await
            .map_err(|e| EngineError::Upstream(format!("market data request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::Upstream(format!(
                "market data API returned status {status}"
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| EngineError::Upstream(format!("market data payload unreadable: {e}")))?;

        if let Some(msg) = rate_limit_message(&body) {
            return Err(EngineError::RateLimited(msg));
        }
        Ok(body)
    }
}

/// Rate-limit notices arrive inside a 200 body under `Note` or `Information`,
/// identified by substring.
fn rate_limit_message(body: &Value) -> Option<String> {
    for key in ["Note", "Information"] {
        if let Some(text) = body.get(key).and_then(Value::as_str) {
            let lowered = text.to_lowercase();
            if lowered.contains("call frequency")
                || lowered.contains("rate limit")
                || lowered.contains("premium")
            {
                return Some(text.to_string());
            }
        }
    }
    None
}

fn parse_spot_payload(body: &Value) -> Result<f64, EngineError> {
    if let Some(msg) = body.get("Error Message").and_then(Value::as_str) {
        return Err(EngineError::Upstream(format!("market data API error: {msg}")));
    }
    body.get("Realtime Currency Exchange Rate")
        .and_then(|r| r.get("5. Exchange Rate"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| EngineError::Upstream("spot payload missing exchange rate".to_string()))
}

fn parse_series_payload(body: &Value) -> Result<Vec<Candle>, EngineError> {
    if let Some(msg) = body.get("Error Message").and_then(Value::as_str) {
        return Err(EngineError::Upstream(format!("market data API error: {msg}")));
    }

    let obj = body
        .as_object()
        .ok_or_else(|| EngineError::Upstream("series payload is not an object".to_string()))?;
    let series = obj
        .iter()
        .find(|(k, _)| k.starts_with("Time Series FX"))
        .map(|(_, v)| v)
        .and_then(Value::as_object)
        .ok_or_else(|| EngineError::Upstream("series payload missing time series".to_string()))?;

    let mut candles = Vec::with_capacity(series.len());
    for (stamp, fields) in series {
        let timestamp = parse_timestamp(stamp)?;
        candles.push(Candle {
            timestamp,
            open: field_f64(fields, "1. open")?,
            high: field_f64(fields, "2. high")?,
            low: field_f64(fields, "3. low")?,
            close: field_f64(fields, "4. close")?,
            // Intraday FX series carry no volume.
            volume: field_f64(fields, "5. volume").unwrap_or(0.0),
        });
    }
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, EngineError> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .map_err(|_| EngineError::Upstream(format!("unparseable series timestamp: {raw}")))
}

fn field_f64(fields: &Value, key: &str) -> Result<f64, EngineError> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| EngineError::Upstream(format!("series row missing field {key}")))
}
