#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use confluence_trader::config::Config;
use confluence_trader::models::{Bar, BarSeries};

pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Create bars from (open, high, low, close) tuples with auto-incrementing 1m timestamps.
pub fn make_bars(data: &[(f64, f64, f64, f64)]) -> BarSeries {
    let base = base_time();
    let bars: Vec<Bar> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Bar {
            timestamp: base + Duration::minutes(i as i64),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 100.0,
        })
        .collect();

    BarSeries::new(bars)
}

/// Quiet EURUSD-style bars ending in a bullish engulfing pair.
pub fn quiet_then_engulfing(quiet: usize) -> Vec<Bar> {
    let mut data: Vec<(f64, f64, f64, f64)> = (0..quiet)
        .map(|i| {
            let o = if i % 2 == 0 { 1.1000 } else { 1.1001 };
            (o, 1.1004, 1.0997, 1.1001)
        })
        .collect();
    data.push((1.1010, 1.1012, 1.0998, 1.1000));
    data.push((1.0998, 1.1025, 1.0996, 1.1022));
    make_bars(&data).as_slice().to_vec()
}

/// Config from explicit key/value pairs; everything else defaults.
pub fn config_with(pairs: &[(&str, &str)]) -> Config {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| map.get(key).cloned())
}

/// 1m EURUSD config where a strong-enough signal is all it takes to enter.
pub fn permissive_config(data_dir: &str) -> Config {
    permissive_config_with(data_dir, &[])
}

/// `permissive_config` with extra or overriding keys.
pub fn permissive_config_with(data_dir: &str, extra: &[(&str, &str)]) -> Config {
    let mut pairs = vec![
        ("INSTRUMENTS", "EURUSD"),
        ("ENTRY_TIMEFRAME", "1m"),
        ("AGGRESSION_LEVEL", "2"),
        ("ENABLED_FILTERS", "signal_strength,spread,correlation,news"),
        ("MIN_SIGNAL_STRENGTH", "1"),
        ("DATA_DIR", data_dir),
    ];
    pairs.extend_from_slice(extra);
    config_with(&pairs)
}

/// Same bars moved `minutes` later.
pub fn shifted(bars: &[Bar], minutes: i64) -> Vec<Bar> {
    bars.iter()
        .map(|b| Bar {
            timestamp: b.timestamp + Duration::minutes(minutes),
            ..b.clone()
        })
        .collect()
}

pub fn temp_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("confluence_it_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}
