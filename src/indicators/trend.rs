// Trend strength: ADX with its directional components.

use super::volatility::true_range;
use crate::data::Candle;

/// ADX output with the ±DI series it derives from. All three are aligned to
/// the input slice.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalIndex {
    pub adx: Vec<Option<f64>>,
    pub plus_di: Vec<Option<f64>>,
    pub minus_di: Vec<Option<f64>>,
}

/// Average Directional Index.
///
/// ±DM and TR are Wilder-smoothed with a mean seed at index `period`;
/// `+DI = 100·smPDM/smTR`, `−DI = 100·smNDM/smTR`,
/// `DX = 100·|+DI − −DI|/(+DI + −DI)` (0 when the sum is zero), and
/// `ADX = Wilder(DX, period)` seeded so it becomes available once
/// `2·period − 1` candles exist.
pub fn adx(candles: &[Candle], period: usize) -> DirectionalIndex {
    let n = candles.len();
    let empty = DirectionalIndex {
        adx: vec![None; n],
        plus_di: vec![None; n],
        minus_di: vec![None; n],
    };
    if period == 0 || n <= period {
        return empty;
    }

    let tr = true_range(candles);
    let mut pdm = vec![0.0; n];
    let mut ndm = vec![0.0; n];
    for i in 1..n {
        let up = candles[i].high - candles[i - 1].high;
        let down = candles[i - 1].low - candles[i].low;
        if up > down && up > 0.0 {
            pdm[i] = up;
        }
        if down > up && down > 0.0 {
            ndm[i] = down;
        }
    }

    let mut plus_di = vec![None; n];
    let mut minus_di = vec![None; n];
    let mut dx = vec![None; n];

    let p = period as f64;
    let mut sm_tr: f64 = tr[1..=period].iter().map(|v| v.unwrap_or(0.0)).sum::<f64>() / p;
    let mut sm_pdm: f64 = pdm[1..=period].iter().sum::<f64>() / p;
    let mut sm_ndm: f64 = ndm[1..=period].iter().sum::<f64>() / p;

    for i in period..n {
        if i > period {
            let tr_i = tr[i].unwrap_or(0.0);
            sm_tr = (sm_tr * (p - 1.0) + tr_i) / p;
            sm_pdm = (sm_pdm * (p - 1.0) + pdm[i]) / p;
            sm_ndm = (sm_ndm * (p - 1.0) + ndm[i]) / p;
        }
        let (pdi, ndi) = if sm_tr == 0.0 {
            (0.0, 0.0)
        } else {
            (100.0 * sm_pdm / sm_tr, 100.0 * sm_ndm / sm_tr)
        };
        plus_di[i] = Some(pdi);
        minus_di[i] = Some(ndi);
        let sum = pdi + ndi;
        dx[i] = Some(if sum == 0.0 {
            0.0
        } else {
            100.0 * (pdi - ndi).abs() / sum
        });
    }

    // ADX seed over the DX values available through index 2·period − 2, so
    // the series turns on exactly at the 2·period − 1 candle minimum.
    let seed_idx = (2 * period - 2).max(period);
    let mut out_adx = vec![None; n];
    if seed_idx < n {
        let window: Vec<f64> = (period..=seed_idx).filter_map(|i| dx[i]).collect();
        if !window.is_empty() {
            let mut prev = window.iter().sum::<f64>() / window.len() as f64;
            out_adx[seed_idx] = Some(prev);
            for i in (seed_idx + 1)..n {
                let Some(dx_i) = dx[i] else { continue };
                prev = (prev * (p - 1.0) + dx_i) / p;
                out_adx[i] = Some(prev);
            }
        }
    }

    DirectionalIndex {
        adx: out_adx,
        plus_di,
        minus_di,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Candle;
    use chrono::NaiveDate;

    fn bars(rows: &[(f64, f64, f64)]) -> Vec<Candle> {
        rows.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| Candle {
                timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::minutes(15 * i as i64),
                open: close,
                high,
                low,
                close,
                volume: 0.0,
            })
            .collect()
    }

    fn trending_up(n: usize) -> Vec<Candle> {
        bars(
            &(0..n)
                .map(|i| {
                    let base = 2000.0 + 2.0 * i as f64;
                    (base + 1.0, base - 1.0, base)
                })
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn adx_turns_on_at_the_minimum_data_bound() {
        let period = 4;
        // 2·period − 1 candles: last index is 2·period − 2.
        let candles = trending_up(2 * period - 1);
        let out = adx(&candles, period);
        assert!(out.adx[2 * period - 3].is_none());
        assert!(out.adx[2 * period - 2].is_some());
        assert!(out.plus_di[period].is_some());
        assert!(out.plus_di[period - 1].is_none());
    }

    #[test]
    fn uptrend_puts_plus_di_on_top() {
        let candles = trending_up(40);
        let out = adx(&candles, 14);
        let last = candles.len() - 1;
        assert!(out.plus_di[last].unwrap() > out.minus_di[last].unwrap());
        // A clean monotonic trend reads as strong.
        assert!(out.adx[last].unwrap() > 25.0);
    }

    #[test]
    fn adx_and_di_stay_in_range() {
        let rows: Vec<(f64, f64, f64)> = (0..60)
            .map(|i| {
                let base = 2000.0 + f64::from((i * 13) % 9) - f64::from((i * 7) % 5);
                (base + 1.5, base - 1.5, base)
            })
            .collect();
        let out = adx(&bars(&rows), 14);
        for series in [&out.adx, &out.plus_di, &out.minus_di] {
            for v in series.iter().flatten() {
                assert!((0.0..=100.0).contains(v), "out of range: {v}");
            }
        }
    }

    #[test]
    fn flat_market_yields_zero_dx() {
        let rows: Vec<(f64, f64, f64)> = (0..20).map(|_| (2000.0, 2000.0, 2000.0)).collect();
        let out = adx(&bars(&rows), 4);
        let last = rows.len() - 1;
        // No range, no directional movement: DI and ADX are all zero.
        assert_eq!(out.plus_di[last], Some(0.0));
        assert_eq!(out.minus_di[last], Some(0.0));
        assert_eq!(out.adx[last], Some(0.0));
    }
}
