//! Strategy contract and shared parameters.
//!
//! A strategy is a value implementing [`Strategy::decide`] over the history
//! up to the signal candle (the last element) and the decision price (next
//! candle's open in a backtest, live spot otherwise). New strategies are
//! additive: the dispatcher is itself a `Strategy` that delegates.

pub mod dispatcher;
pub mod mean_reversion;
pub mod sma_cross;

pub use dispatcher::{StrategyDispatcher, StrategyMode};
pub use mean_reversion::MeanReversion;
pub use sma_cross::SmaCrossover;

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::data::{Candle, Side};

/// A trade decision with its ATR-based protective levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub side: Side,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Tunable strategy parameters, stored per session and per backtest as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyParams {
    #[garde(range(min = 1))]
    pub sma_short: usize,
    #[garde(range(min = 2), custom(long_exceeds_short(self.sma_short)))]
    pub sma_long: usize,
    #[garde(range(min = 2))]
    pub bb_period: usize,
    #[garde(range(min = 0.1))]
    pub bb_std_dev: f64,
    #[garde(range(min = 2))]
    pub rsi_period: usize,
    #[garde(range(min = 1.0, max = 50.0))]
    pub rsi_oversold: f64,
    #[garde(range(min = 50.0, max = 99.0))]
    pub rsi_overbought: f64,
    #[garde(range(min = 1))]
    pub atr_period: usize,
    #[serde(rename = "atrMultSL")]
    #[garde(range(min = 0.1))]
    pub atr_mult_sl: f64,
    #[serde(rename = "atrMultTP")]
    #[garde(range(min = 0.1))]
    pub atr_mult_tp: f64,
    #[garde(range(min = 2))]
    pub adx_period: usize,
    #[garde(range(min = 0.0, max = 100.0))]
    pub adx_trend_threshold: f64,
    #[garde(range(min = 0.0, max = 100.0))]
    pub adx_range_threshold: f64,
}

fn long_exceeds_short(short: usize) -> impl FnOnce(&usize, &()) -> garde::Result {
    move |long: &usize, (): &()| {
        if *long <= short {
            return Err(garde::Error::new(format!(
                "smaLong ({long}) must exceed smaShort ({short})"
            )));
        }
        Ok(())
    }
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            sma_short: 10,
            sma_long: 20,
            bb_period: 20,
            bb_std_dev: 2.0,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            atr_period: 14,
            atr_mult_sl: 1.5,
            atr_mult_tp: 3.0,
            adx_period: 14,
            adx_trend_threshold: 25.0,
            adx_range_threshold: 20.0,
        }
    }
}

impl StrategyParams {
    /// Candles required before the decision candle for every indicator to be
    /// warm at the signal candle.
    pub fn min_candles(&self) -> usize {
        [
            self.sma_long,
            self.bb_period,
            self.rsi_period,
            self.atr_period + 1,
            2 * self.adx_period - 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// History runs up to and including the signal candle. Returns a signal
    /// with protective levels, or `None` when there is nothing to do.
    fn decide(
        &self,
        history: &[Candle],
        decision_price: f64,
        params: &StrategyParams,
        current_atr: Option<f64>,
    ) -> Option<TradeSignal>;
}

/// ATR-based stop and target around the decision price:
/// `stop = decision ∓ atrMultSL·atr`, `take = decision ± atrMultTP·atr`,
/// sign inverted for SELL.
pub(crate) fn protective_levels(
    side: Side,
    decision_price: f64,
    atr: f64,
    params: &StrategyParams,
) -> TradeSignal {
    let sign = side.sign();
    TradeSignal {
        side,
        stop_loss: decision_price - sign * params.atr_mult_sl * atr,
        take_profit: decision_price + sign * params.atr_mult_tp * atr,
    }
}
