// Volatility: True Range and Wilder-smoothed ATR.

use crate::data::Candle;

/// True Range. Undefined at index 0; afterwards
/// `max(high − low, |high − prevClose|, |low − prevClose|)`.
pub fn true_range(candles: &[Candle]) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    for i in 1..n {
        let c = &candles[i];
        let prev_close = candles[i - 1].close;
        let tr = (c.high - c.low)
            .max((c.high - prev_close).abs())
            .max((c.low - prev_close).abs());
        out[i] = Some(tr);
    }
    out
}

/// Average True Range. The first value, at index `period`, is the arithmetic
/// mean of TR[1..=period]; afterwards Wilder smoothing:
/// `ATR_i = (ATR_{i−1}·(period−1) + TR_i) / period`.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }
    let tr = true_range(candles);

    let seed: f64 = tr[1..=period].iter().map(|v| v.unwrap_or(0.0)).sum::<f64>() / period as f64;
    out[period] = Some(seed);

    let mut prev = seed;
    for i in (period + 1)..n {
        let Some(tr_i) = tr[i] else { continue };
        let next = (prev * (period as f64 - 1.0) + tr_i) / period as f64;
        out[i] = Some(next);
        prev = next;
    }
    out
}
