//! SMA crossover: trade the short average crossing the long one.

use super::{protective_levels, Strategy, StrategyParams, TradeSignal};
use crate::data::{Candle, Side};
use crate::indicators::sma;

pub struct SmaCrossover;

impl Strategy for SmaCrossover {
    fn name(&self) -> &'static str {
        "sma_crossover"
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

        let short = sma(history, params.sma_short);
        let long = sma(history, params.sma_long);
        let (s, l) = (short[i]?, long[i]?);
        let (prev_s, prev_l) = (short[i - 1]?, long[i - 1]?);

        let side = if prev_s <= prev_l && s > l {
            Side::Buy
        } else if prev_s >= prev_l && s < l {
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

    fn params(short: usize, long: usize, mult_sl: f64, mult_tp: f64) -> StrategyParams {
        StrategyParams {
            sma_short: short,
            sma_long: long,
            atr_mult_sl: mult_sl,
            atr_mult_tp: mult_tp,
            ..StrategyParams::default()
        }
    }

    #[test]
    fn up_cross_buys_with_atr_levels() {
        // Short SMA below the long one at the previous candle, above it at
        // the signal candle.
        let history = candles_from_closes(&[2000.0, 1995.0, 1990.0, 2012.0]);
        let signal = SmaCrossover
            .decide(&history, 2015.0, &params(2, 3, 1.0, 2.0), Some(5.0))
            .expect("up-cross should fire");
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.stop_loss, 2010.0);
        assert_eq!(signal.take_profit, 2025.0);
    }

    #[test]
    fn down_cross_sells() {
        let history = candles_from_closes(&[2000.0, 2005.0, 2010.0, 1988.0]);
        let signal = SmaCrossover
            .decide(&history, 1985.0, &params(2, 3, 1.0, 2.0), Some(4.0))
            .expect("down-cross should fire");
        assert_eq!(signal.side, Side::Sell);
        assert_eq!(signal.stop_loss, 1989.0);
        assert_eq!(signal.take_profit, 1977.0);
    }

    #[test]
    fn no_signal_without_a_fresh_cross() {
        // Steady rally: the short SMA has been above the long one the whole
        // time, so there is no cross at the signal candle.
        let history =
            candles_from_closes(&[1990.0, 1995.0, 2000.0, 2005.0, 2010.0, 2012.0]);
        assert!(SmaCrossover
            .decide(&history, 2015.0, &params(2, 3, 1.0, 2.0), Some(5.0))
            .is_none());
    }

    #[test]
    fn no_signal_without_atr() {
        let history = candles_from_closes(&[2000.0, 1995.0, 1990.0, 2012.0]);
        assert!(SmaCrossover
            .decide(&history, 2015.0, &params(2, 3, 1.0, 2.0), None)
            .is_none());
    }

    #[test]
    fn no_signal_when_averages_are_cold() {
        let history = candles_from_closes(&[2000.0, 2001.0]);
        assert!(SmaCrossover
            .decide(&history, 2002.0, &params(2, 3, 1.0, 2.0), Some(5.0))
            .is_none());
    }
}
