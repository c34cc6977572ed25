//! Bollinger + RSI mean reversion: fade band touches once RSI turns back.

use super::{protective_levels, Strategy, StrategyParams, TradeSignal};
use crate::data::{Candle, Side};
use crate::indicators::{bollinger, rsi};

pub struct MeanReversion;

impl Strategy for MeanReversion {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn decide(
        &self,
        history: &[Candle],
        decision_price: f64,
        params: &StrategyParams,
        current_atr: Option<f64>,
    ) -> Option<TradeSignal> {
        let atr = current_atr?;
        if history.len() < 2 {
            return None;
        }
        let i = history.len() - 1;

        let bands = bollinger(history, params.bb_period, params.bb_std_dev);
        let rsi_series = rsi(history, params.rsi_period);
        let (upper, lower) = (bands.upper[i]?, bands.lower[i]?);
        let (rsi_now, rsi_prev) = (rsi_series[i]?, rsi_series[i - 1]?);
        let close = history[i].close;

        // RSI turning back from the extreme, not merely sitting in it.
        let side = if close <= lower && rsi_now < params.rsi_oversold && rsi_now > rsi_prev {
            Side::Buy
        } else if close >= upper && rsi_now > params.rsi_overbought && rsi_now < rsi_prev {
            Side::Sell
        } else {
            return None;
        };
        Some(protective_levels(side, decision_price, atr, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::testutil::candles_from_closes;

    fn params() -> StrategyParams {
        StrategyParams {
            bb_period: 4,
            bb_std_dev: 0.25,
            rsi_period: 3,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            atr_mult_sl: 1.5,
            atr_mult_tp: 3.0,
            ..StrategyParams::default()
        }
    }

    #[test]
    fn overbought_band_touch_with_rsi_rollover_sells() {
        // Rally into the upper band, then a small down close: RSI rolls over
        // from 100 to ~95 while the close still sits above the band.
        let history = candles_from_closes(&[2000.0, 2010.0, 2020.0, 2030.0, 2029.0]);
        let signal = MeanReversion
            .decide(&history, 2055.0, &params(), Some(4.0))
            .expect("sell setup should fire");
        assert_eq!(signal.side, Side::Sell);
        assert_eq!(signal.stop_loss, 2061.0);
        assert_eq!(signal.take_profit, 2043.0);
    }

    #[test]
    fn oversold_band_touch_with_rsi_upturn_buys() {
        let history = candles_from_closes(&[2000.0, 1990.0, 1980.0, 1970.0, 1971.0]);
        let signal = MeanReversion
            .decide(&history, 1969.0, &params(), Some(4.0))
            .expect("buy setup should fire");
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.stop_loss, 1963.0);
        assert_eq!(signal.take_profit, 1981.0);
    }

    #[test]
    fn rsi_still_falling_blocks_the_buy() {
        // Monotonic decline: RSI keeps dropping, so no reversal entry.
        let history = candles_from_closes(&[2000.0, 1990.0, 1980.0, 1970.0, 1960.0]);
        assert!(MeanReversion
            .decide(&history, 1959.0, &params(), Some(4.0))
            .is_none());
    }

    #[test]
    fn close_inside_the_bands_is_no_trade() {
        let history = candles_from_closes(&[2000.0, 2001.0, 1999.0, 2000.5, 2000.0]);
        assert!(MeanReversion
            .decide(&history, 2000.0, &params(), Some(4.0))
            .is_none());
    }
}
