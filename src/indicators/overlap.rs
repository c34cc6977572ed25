// Overlap studies: SMA, rolling std-dev, Bollinger Bands.

use crate::data::Candle;

/// Simple moving average of the last `period` closes.
pub fn sma(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..n {
        let window = &candles[i + 1 - period..=i];
        let sum: f64 = window.iter().map(|c| c.close).sum();
        out[i] = Some(sum / period as f64);
    }
    out
}

/// Population standard deviation of the last `period` closes around the SMA
/// at the same index.
pub fn std_dev(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 {
        return out;
    }
    let means = sma(candles, period);
    for i in (period - 1)..n {
        let Some(mean) = means[i] else { continue };
        let window = &candles[i + 1 - period..=i];
        let var: f64 = window
            .iter()
            .map(|c| {
                let d = c.close - mean;
                d * d
            })
            .sum::<f64>()
            / period as f64;
        out[i] = Some(var.sqrt());
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub middle: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Bollinger Bands: middle = SMA, upper/lower = middle ± k·stdDev.
pub fn bollinger(candles: &[Candle], period: usize, k: f64) -> BollingerBands {
    let middle = sma(candles, period);
    let deviation = std_dev(candles, period);
    let n = candles.len();
    let mut upper = vec![None; n];
    let mut lower = vec![None; n];
    for i in 0..n {
        if let (Some(m), Some(d)) = (middle[i], deviation[i]) {
            upper[i] = Some(m + k * d);
            lower[i] = Some(m - k * d);
        }
    }
    BollingerBands {
        middle,
        upper,
        lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::testutil::candles_from_closes;

    #[test]
    fn sma_aligns_and_averages() {
        let candles = candles_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let out = sma(&candles, 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(2.0));
        assert_eq!(out[3], Some(3.0));
        assert_eq!(out[4], Some(4.0));
    }

    #[test]
    fn sma_zero_period_yields_nothing() {
        let candles = candles_from_closes(&[1.0, 2.0]);
        assert_eq!(sma(&candles, 0), vec![None, None]);
    }

    #[test]
    fn std_dev_is_population() {
        // Classic population example: mean 5, sigma 2.
        let candles = candles_from_closes(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let out = std_dev(&candles, 8);
        assert_eq!(out[6], None);
        assert!((out[7].unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn bollinger_bands_bracket_the_middle() {
        let candles = candles_from_closes(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let bands = bollinger(&candles, 8, 2.0);
        assert_eq!(bands.middle[7], Some(5.0));
        assert!((bands.upper[7].unwrap() - 9.0).abs() < 1e-12);
        assert!((bands.lower[7].unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(bands.upper[6], None);
        assert_eq!(bands.lower[6], None);
    }
}
