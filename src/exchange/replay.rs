use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::exchange::BarStore;
use crate::models::{Bar, BarSeries, Timeframe};

/// A BarStore that replays pre-loaded bars. A cursor (`now`) controls which
/// bars are visible: only bars with timestamp <= now are returned, simulating
/// a forward walk.
pub struct ReplayBarStore {
    data: HashMap<(String, Timeframe), Vec<Bar>>,
    /// Finest timeframe loaded per instrument
    base: HashMap<String, Timeframe>,
    now: DateTime<Utc>,
}

impl Default for ReplayBarStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayBarStore {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            base: HashMap::new(),
            now: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Load bars for one instrument/timeframe. Input order does not matter.
    /// Higher timeframes that were never loaded are resampled on request
    /// from the finest loaded series, using visible bars only.
    pub fn load(&mut self, instrument: &str, tf: Timeframe, mut bars: Vec<Bar>) {
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);

        let base = self.base.entry(instrument.to_string()).or_insert(tf);
        if tf.as_seconds() < base.as_seconds() {
            *base = tf;
        }
        self.data.insert((instrument.to_string(), tf), bars);
    }

    /// Load a JSON array of bars.
    pub fn load_json_file(&mut self, path: &Path, instrument: &str, tf: Timeframe) -> Result<usize> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading bar file {}", path.display()))?;
        let bars: Vec<Bar> = serde_json::from_str(&content)
            .with_context(|| format!("parsing bar file {}", path.display()))?;
        let n = bars.len();
        self.load(instrument, tf, bars);
        Ok(n)
    }

    pub fn set_time(&mut self, t: DateTime<Utc>) {
        self.now = t;
    }

    /// Timestamps of every loaded bar for a series, oldest first.
    pub fn timeline(&self, instrument: &str, tf: Timeframe) -> Vec<DateTime<Utc>> {
        self.data
            .get(&(instrument.to_string(), tf))
            .map(|bars| bars.iter().map(|b| b.timestamp).collect())
            .unwrap_or_default()
    }

    /// Bar at exactly `t`, regardless of the cursor.
    pub fn bar_at(&self, instrument: &str, tf: Timeframe, t: DateTime<Utc>) -> Option<&Bar> {
        let bars = self.data.get(&(instrument.to_string(), tf))?;
        let idx = bars.binary_search_by_key(&t, |b| b.timestamp).ok()?;
        bars.get(idx)
    }

    fn visible(&self, instrument: &str, tf: Timeframe) -> &[Bar] {
        let Some(all) = self.data.get(&(instrument.to_string(), tf)) else {
            return &[];
        };
        let end = all.partition_point(|b| b.timestamp <= self.now);
        &all[..end]
    }
}

#[async_trait]
impl BarStore for ReplayBarStore {
    async fn get_bars(
        &self,
        instrument: &str,
        tf: Timeframe,
        offset: usize,
        count: usize,
    ) -> Result<Vec<Bar>> {
        let resampled;
        let visible = match self.base.get(instrument) {
            Some(base)
                if !self.data.contains_key(&(instrument.to_string(), tf))
                    && tf.as_seconds() > base.as_seconds() =>
            {
                resampled = BarSeries::new(self.visible(instrument, *base).to_vec())
                    .resample(tf.as_seconds() as i64);
                resampled.as_slice()
            }
            _ => self.visible(instrument, tf),
        };
        let end = visible.len().saturating_sub(offset);
        let start = end.saturating_sub(count);
        Ok(visible[start..end].iter().rev().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_bars;

    fn store() -> (ReplayBarStore, Vec<Bar>) {
        let raw: Vec<(f64, f64, f64, f64)> = (0..30)
            .map(|i| {
                let v = 100.0 + i as f64;
                (v, v + 1.0, v - 1.0, v + 0.5)
            })
            .collect();
        let bars = make_bars(&raw).as_slice().to_vec();
        let mut s = ReplayBarStore::new();
        s.load("EURUSD", Timeframe::M1, bars.clone());
        (s, bars)
    }

    #[tokio::test]
    async fn only_bars_up_to_cursor_are_visible() {
        let (mut s, bars) = store();
        s.set_time(bars[9].timestamp);
        let got = s.get_bars("EURUSD", Timeframe::M1, 0, 5).await.unwrap();
        assert_eq!(got.len(), 5);
        // Most recent first
        assert_eq!(got[0].timestamp, bars[9].timestamp);
        assert_eq!(got[4].timestamp, bars[5].timestamp);
    }

    #[tokio::test]
    async fn offset_and_short_history() {
        let (mut s, bars) = store();
        s.set_time(bars[9].timestamp);
        let got = s.get_bars("EURUSD", Timeframe::M1, 2, 100).await.unwrap();
        assert_eq!(got.len(), 8);
        assert_eq!(got[0].timestamp, bars[7].timestamp);
        assert!(s.get_bars("GBPUSD", Timeframe::M1, 0, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn higher_timeframes_are_resampled() {
        let (mut s, bars) = store();
        s.set_time(bars[29].timestamp);
        let m5 = s.get_bars("EURUSD", Timeframe::M5, 0, 10).await.unwrap();
        assert_eq!(m5.len(), 6);

        // A partial bucket only holds bars seen so far
        s.set_time(bars[26].timestamp);
        let m5 = s.get_bars("EURUSD", Timeframe::M5, 0, 1).await.unwrap();
        assert!((m5[0].close - bars[26].close).abs() < 1e-9);
        assert_eq!(s.timeline("EURUSD", Timeframe::M1).len(), 30);
        assert!(s.bar_at("EURUSD", Timeframe::M1, bars[3].timestamp).is_some());
    }
}
