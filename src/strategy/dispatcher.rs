//! ADX-adaptive strategy dispatch.
//!
//! In `ADAPTIVE` mode the signal candle's ADX picks the strategy: above the
//! trend threshold the market is trending and the SMA crossover runs; below
//! the range threshold it is ranging and mean reversion runs; in between no
//! strategy fires. Explicit modes bypass the regime check.

use serde::{Deserialize, Serialize};

use super::{MeanReversion, SmaCrossover, Strategy, StrategyParams, TradeSignal};
use crate::data::Candle;
use crate::error::EngineError;
use crate::indicators::adx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyMode {
    #[serde(rename = "ADAPTIVE")]
    Adaptive,
    #[serde(rename = "SMA_ONLY")]
    SmaOnly,
    #[serde(rename = "MEAN_REVERSION_ONLY")]
    MeanReversionOnly,
    /// Reserved: parses and dispatches to nothing.
    #[serde(rename = "BREAKOUT_ONLY")]
    BreakoutOnly,
}

impl StrategyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyMode::Adaptive => "ADAPTIVE",
            StrategyMode::SmaOnly => "SMA_ONLY",
            StrategyMode::MeanReversionOnly => "MEAN_REVERSION_ONLY",
            StrategyMode::BreakoutOnly => "BREAKOUT_ONLY",
        }
    }
}

impl std::str::FromStr for StrategyMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADAPTIVE" => Ok(StrategyMode::Adaptive),
            "SMA_ONLY" => Ok(StrategyMode::SmaOnly),
            "MEAN_REVERSION_ONLY" => Ok(StrategyMode::MeanReversionOnly),
            "BREAKOUT_ONLY" => Ok(StrategyMode::BreakoutOnly),
            other => Err(EngineError::Validation(format!(
                "unknown strategy mode: {other}"
            ))),
        }
    }
}

pub struct StrategyDispatcher {
    mode: StrategyMode,
    sma: SmaCrossover,
    mean_reversion: MeanReversion,
}

impl StrategyDispatcher {
    pub fn new(mode: StrategyMode) -> Self {
        Self {
            mode,
            sma: SmaCrossover,
            mean_reversion: MeanReversion,
        }
    }
}

impl Strategy for StrategyDispatcher {
    fn name(&self) -> &'static str {
        "dispatcher"
    }

    fn decide(
        &self,
        history: &[Candle],
        decision_price: f64,
        params: &StrategyParams,
        current_atr: Option<f64>,
    ) -> Option<TradeSignal> {
        if history.len() < params.min_candles() {
            return None;
        }
        match self.mode {
            StrategyMode::SmaOnly => self.sma.decide(history, decision_price, params, current_atr),
            StrategyMode::MeanReversionOnly => {
                self.mean_reversion
                    .decide(history, decision_price, params, current_atr)
            }
            StrategyMode::BreakoutOnly => None,
            StrategyMode::Adaptive => {
                let regime = adx(history, params.adx_period);
                let adx_now = regime.adx[history.len() - 1]?;
                if adx_now > params.adx_trend_threshold {
                    self.sma.decide(history, decision_price, params, current_atr)
                } else if adx_now < params.adx_range_threshold {
                    self.mean_reversion
                        .decide(history, decision_price, params, current_atr)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::testutil::candles_from_closes;

    /// History long enough for the default lookbacks, with a late V-shape so
    /// both sub-strategies have something to say at the signal candle.
    fn history() -> Vec<Candle> {
        let mut closes: Vec<f64> = (0..30).map(|i| 2000.0 + f64::from(i)).collect();
        closes.extend_from_slice(&[2031.0, 2020.0, 2010.0, 2035.0]);
        candles_from_closes(&closes)
    }

    fn params_with_thresholds(trend: f64, range: f64) -> StrategyParams {
        StrategyParams {
            sma_short: 2,
            sma_long: 3,
            bb_period: 4,
            bb_std_dev: 0.25,
            rsi_period: 3,
            atr_period: 3,
            adx_period: 4,
            adx_trend_threshold: trend,
            adx_range_threshold: range,
            ..StrategyParams::default()
        }
    }

    fn adx_at_signal(history: &[Candle], params: &StrategyParams) -> f64 {
        adx(history, params.adx_period).adx[history.len() - 1].unwrap()
    }

    #[test]
    fn trending_regime_delegates_to_sma_crossover() {
        let history = history();
        let mut params = params_with_thresholds(0.0, 0.0);
        let level = adx_at_signal(&history, &params);
        params.adx_trend_threshold = level - 1.0;
        params.adx_range_threshold = level - 2.0;

        let dispatcher = StrategyDispatcher::new(StrategyMode::Adaptive);
        let direct = SmaCrossover.decide(&history, 2036.0, &params, Some(5.0));
        let dispatched = dispatcher.decide(&history, 2036.0, &params, Some(5.0));
        assert_eq!(dispatched, direct);
    }

    #[test]
    fn ranging_regime_delegates_to_mean_reversion() {
        let history = history();
        let mut params = params_with_thresholds(0.0, 0.0);
        let level = adx_at_signal(&history, &params);
        params.adx_trend_threshold = level + 2.0;
        params.adx_range_threshold = level + 1.0;

        let dispatcher = StrategyDispatcher::new(StrategyMode::Adaptive);
        let direct = MeanReversion.decide(&history, 2036.0, &params, Some(5.0));
        let dispatched = dispatcher.decide(&history, 2036.0, &params, Some(5.0));
        assert_eq!(dispatched, direct);
    }

    #[test]
    fn dead_zone_emits_nothing() {
        let history = history();
        let mut params = params_with_thresholds(0.0, 0.0);
        let level = adx_at_signal(&history, &params);
        params.adx_trend_threshold = level + 1.0;
        params.adx_range_threshold = level - 1.0;

        let dispatcher = StrategyDispatcher::new(StrategyMode::Adaptive);
        assert!(dispatcher
            .decide(&history, 2036.0, &params, Some(5.0))
            .is_none());
    }

    #[test]
    fn explicit_modes_bypass_the_regime_check() {
        let history = history();
        // Thresholds that would park ADAPTIVE in the dead zone.
        let mut params = params_with_thresholds(0.0, 0.0);
        let level = adx_at_signal(&history, &params);
        params.adx_trend_threshold = level + 1.0;
        params.adx_range_threshold = level - 1.0;

        let sma_only = StrategyDispatcher::new(StrategyMode::SmaOnly);
        let direct = SmaCrossover.decide(&history, 2036.0, &params, Some(5.0));
        assert_eq!(sma_only.decide(&history, 2036.0, &params, Some(5.0)), direct);
    }

    #[test]
    fn breakout_mode_is_reserved() {
        let history = history();
        let params = params_with_thresholds(0.0, 100.0);
        let dispatcher = StrategyDispatcher::new(StrategyMode::BreakoutOnly);
        assert!(dispatcher
            .decide(&history, 2036.0, &params, Some(5.0))
            .is_none());
    }

    #[test]
    fn short_history_is_no_signal_in_every_mode() {
        let history = candles_from_closes(&[2000.0, 2001.0, 2002.0]);
        let params = StrategyParams::default();
        for mode in [
            StrategyMode::Adaptive,
            StrategyMode::SmaOnly,
            StrategyMode::MeanReversionOnly,
        ] {
            let dispatcher = StrategyDispatcher::new(mode);
            assert!(dispatcher
                .decide(&history, 2003.0, &params, Some(5.0))
                .is_none());
        }
    }
}
