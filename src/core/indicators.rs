use crate::models::Bar;

/// TR[0] = high - low; TR[t] = max(high-low, |high-prev_close|, |low-prev_close|).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, b)| {
            let hl = b.high - b.low;
            if i == 0 {
                return hl;
            }
            let pc = bars[i - 1].close;
            hl.max((b.high - pc).abs()).max((b.low - pc).abs())
        })
        .collect()
}

/// Simple moving average; NaN until `period` values are available.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..n {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// Wilder-smoothed ATR seeded with the mean of the first `period` true ranges.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let tr = true_range(bars);
    let n = tr.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let mut prev = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = prev;
    for i in period..n {
        prev = (prev * (period as f64 - 1.0) + tr[i]) / period as f64;
        out[i] = prev;
    }
    out
}

pub fn last_valid(series: &[f64]) -> Option<f64> {
    series.last().copied().filter(|v| v.is_finite())
}

/// Mean of the last `n` finite values, or None if there are fewer than `n`.
pub fn mean_of_last(series: &[f64], n: usize) -> Option<f64> {
    if n == 0 {
        return None;
    }
    let tail: Vec<f64> = series
        .iter()
        .rev()
        .take(n)
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if tail.len() < n {
        return None;
    }
    Some(tail.iter().sum::<f64>() / n as f64)
}
