//! Spot and historical price actions.

use garde::Validate;
use serde::Deserialize;

use super::response::{HistoricalDataResponse, SpotResponse, UpdatePricesResponse};
use crate::data::{OutputSize, Timeframe, SYMBOL};
use crate::error::EngineError;
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SeriesParams {
    /// Candle interval code (e.g. "15m", "daily"). Defaults to 15m.
    #[garde(inner(length(min = 1, max = 10)))]
    pub interval: Option<String>,
    #[garde(skip)]
    pub outputsize: Option<OutputSize>,
}

impl SeriesParams {
    fn timeframe(&self) -> Result<Timeframe, EngineError> {
        match &self.interval {
            Some(raw) => raw.parse(),
            None => Ok(Timeframe::M15),
        }
    }
}

pub async fn get_current_price(state: &AppState) -> Result<SpotResponse, EngineError> {
    let quote = state.market.spot().await?;
    Ok(SpotResponse {
        symbol: SYMBOL,
        price: quote.price,
        fetched_at: quote.fetched_at,
    })
}

pub async fn fetch_historical_data(
    state: &AppState,
    params: SeriesParams,
) -> Result<HistoricalDataResponse, EngineError> {
    let timeframe = params.timeframe()?;
    let candles = state
        .market
        .historical_series(timeframe, params.outputsize.unwrap_or_default())
        .await?;
    Ok(HistoricalDataResponse {
        symbol: SYMBOL,
        timeframe,
        count: candles.len(),
        candles,
    })
}

/// Fetch a series and upsert it into the OHLC archive; this is how backtest
/// candles are ingested.
pub async fn update_prices(
    state: &AppState,
    params: SeriesParams,
) -> Result<UpdatePricesResponse, EngineError> {
    let timeframe = params.timeframe()?;
    let candles = state
        .market
        .historical_series(timeframe, params.outputsize.unwrap_or_default())
        .await?;
    let upserted = state
        .store
        .upsert_candles(SYMBOL, timeframe, &candles)
        .await?;
    tracing::info!(timeframe = %timeframe, upserted, "price archive updated");
    Ok(UpdatePricesResponse {
        symbol: SYMBOL,
        timeframe,
        upserted,
    })
}
