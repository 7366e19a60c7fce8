use chrono::{DateTime, Duration, Utc};

use crate::models::{Bar, BarSeries};

fn base_time() -> DateTime<Utc> {
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

/// Create n rising (bullish) bars starting from `start` price.
pub fn make_bullish_trend(n: usize, start: f64) -> BarSeries {
    let data: Vec<(f64, f64, f64, f64)> = (0..n)
        .map(|i| {
            let open = start + i as f64 * 10.0;
            let close = open + 8.0;
            (open, close + 2.0, open - 1.0, close)
        })
        .collect();
    make_bars(&data)
}

/// Rising waves with a two-bar plateau at each peak, clear for a ±5 swing
/// window, then a final leg through the last peak.
pub fn make_bullish_waves(waves: usize, start: f64) -> BarSeries {
    let mut data = Vec::new();
    for wave in 0..waves {
        let trough = start + wave as f64 * 40.0;
        let peak = trough + 30.0;
        for i in 0..6 {
            let v = trough + i as f64 * 5.0;
            data.push((v, v + 1.0, v - 1.0, v + 0.5));
        }
        for _ in 0..2 {
            data.push((peak, peak + 1.0, peak - 2.0, peak - 1.0));
        }
        for i in 0..6 {
            let v = peak - i as f64 * 3.0;
            data.push((v, v + 0.5, v - 1.0, v - 0.5));
        }
    }
    let final_peak = start + waves as f64 * 40.0;
    for i in 0..8 {
        let v = final_peak - 15.0 + i as f64 * 5.0;
        data.push((v, v + 1.0, v - 0.5, v + 0.5));
    }
    make_bars(&data)
}
