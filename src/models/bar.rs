use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.close.max(self.open)
    }

    pub fn lower_wick(&self) -> f64 {
        self.close.min(self.open) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body_top(&self) -> f64 {
        self.close.max(self.open)
    }

    pub fn body_bottom(&self) -> f64 {
        self.close.min(self.open)
    }

    /// Body as a fraction of the full range. Zero for a zero-range bar.
    pub fn body_ratio(&self) -> f64 {
        let range = self.range();
        if range <= 0.0 {
            return 0.0;
        }
        self.body() / range
    }

    pub fn overlaps(&self, top: f64, bottom: f64) -> bool {
        self.low <= top && self.high >= bottom
    }
}

/// Oldest-first window of bars.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    /// Build from a bar store response, which arrives most-recent-first.
    pub fn from_most_recent_first(mut bars: Vec<Bar>) -> Self {
        bars.reverse();
        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn tail(&self, n: usize) -> BarSeries {
        let start = self.bars.len().saturating_sub(n);
        BarSeries::new(self.bars[start..].to_vec())
    }

    pub fn slice(&self, start: usize, end: usize) -> BarSeries {
        let s = start.min(self.bars.len());
        let e = end.min(self.bars.len()).max(s);
        BarSeries::new(self.bars[s..e].to_vec())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    pub fn as_slice(&self) -> &[Bar] {
        &self.bars
    }

    /// The last `n` bars as a slice, without copying.
    pub fn last_n(&self, n: usize) -> &[Bar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }

    pub fn highs_max(&self) -> f64 {
        self.bars
            .iter()
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn lows_min(&self) -> f64 {
        self.bars
            .iter()
            .map(|b| b.low)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn push(&mut self, bar: Bar) {
        self.bars.push(bar);
    }

    /// Aggregate into buckets of `bucket_secs`, aligned to the epoch.
    pub fn resample(&self, bucket_secs: i64) -> BarSeries {
        if self.bars.is_empty() || bucket_secs <= 0 {
            return BarSeries::default();
        }
        let mut result: Vec<Bar> = Vec::new();

        for bar in &self.bars {
            let ts = bar.timestamp.timestamp();
            let bucket_start = ts - ts.rem_euclid(bucket_secs);
            let bucket_ts = DateTime::from_timestamp(bucket_start, 0).unwrap_or(bar.timestamp);

            if let Some(last) = result.last_mut() {
                if last.timestamp == bucket_ts {
                    last.high = last.high.max(bar.high);
                    last.low = last.low.min(bar.low);
                    last.close = bar.close;
                    last.volume += bar.volume;
                    continue;
                }
            }

            result.push(Bar {
                timestamp: bucket_ts,
                ..bar.clone()
            });
        }

        BarSeries::new(result)
    }
}

impl std::ops::Index<usize> for BarSeries {
    type Output = Bar;
    fn index(&self, index: usize) -> &Self::Output {
        &self.bars[index]
    }
}

impl IntoIterator for BarSeries {
    type Item = Bar;
    type IntoIter = std::vec::IntoIter<Bar>;
    fn into_iter(self) -> Self::IntoIter {
        self.bars.into_iter()
    }
}

impl<'a> IntoIterator for &'a BarSeries {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;
    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_bars;

    fn bullish_bar() -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: 100.0,
            high: 115.0,
            low: 95.0,
            close: 110.0,
            volume: 50.0,
        }
    }

    #[test]
    fn bar_body_and_range() {
        let b = bullish_bar();
        assert!((b.body() - 10.0).abs() < 1e-9);
        assert!((b.range() - 20.0).abs() < 1e-9);
        assert!((b.body_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn bar_wicks() {
        let b = bullish_bar(); // O=100, H=115, L=95, C=110
        assert!((b.upper_wick() - 5.0).abs() < 1e-9);
        assert!((b.lower_wick() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn zero_range_bar_has_zero_body_ratio() {
        let b = Bar {
            timestamp: Utc::now(),
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 0.0,
        };
        assert_eq!(b.body_ratio(), 0.0);
        assert!(!b.is_bullish() && !b.is_bearish());
    }

    #[test]
    fn most_recent_first_is_reversed() {
        let s = make_bars(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0),
        ]);
        let mut raw: Vec<Bar> = s.iter().cloned().collect();
        raw.reverse();
        let rebuilt = BarSeries::from_most_recent_first(raw);
        assert_eq!(rebuilt[0], s[0]);
        assert_eq!(rebuilt[1], s[1]);
    }

    #[test]
    fn series_tail_slice_and_extremes() {
        let s = make_bars(&[
            (100.0, 200.0, 50.0, 150.0),
            (150.0, 300.0, 80.0, 250.0),
            (250.0, 280.0, 60.0, 270.0),
        ]);
        assert_eq!(s.tail(2).len(), 2);
        assert_eq!(s.slice(1, 3).len(), 2);
        assert_eq!(s.slice(3, 1).len(), 0);
        assert_eq!(s.last_n(5).len(), 3);
        assert!((s.highs_max() - 300.0).abs() < 1e-9);
        assert!((s.lows_min() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn resample_into_five_minute_buckets() {
        let raw: Vec<(f64, f64, f64, f64)> = (0..6)
            .map(|i| {
                let v = 100.0 + i as f64;
                (v, v + 2.0, v - 1.0, v + 1.0)
            })
            .collect();
        let m5 = make_bars(&raw).resample(300);
        assert_eq!(m5.len(), 2);
        assert!((m5[0].open - 100.0).abs() < 1e-9);
        assert!((m5[0].high - 106.0).abs() < 1e-9);
        assert!((m5[0].low - 99.0).abs() < 1e-9);
        assert!((m5[0].close - 105.0).abs() < 1e-9);
        assert!((m5[0].volume - 500.0).abs() < 1e-9);
        assert!((m5[1].open - 105.0).abs() < 1e-9);
    }
}
