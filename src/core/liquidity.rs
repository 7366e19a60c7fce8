use crate::core::structure::SwingLevel;
use crate::models::{Bar, Direction, SwingType};

/// Raise the priority of swings that sit at (almost) the same price as other
/// swings of the same kind. Clustered equal highs/lows are where resting
/// orders pool.
pub fn boost_priorities(swings: &mut [SwingLevel], tolerance: f64) {
    let prices: Vec<(SwingType, f64)> = swings.iter().map(|s| (s.kind, s.price)).collect();

    for (i, swing) in swings.iter_mut().enumerate() {
        let neighbours = prices
            .iter()
            .enumerate()
            .filter(|(j, (kind, price))| {
                *j != i && *kind == swing.kind && is_equal_level(*price, swing.price, tolerance)
            })
            .count();
        swing.priority = 1 + neighbours as u32;
    }
}

fn is_equal_level(a: f64, b: f64, tolerance: f64) -> bool {
    if b == 0.0 {
        return a == 0.0;
    }
    (a - b).abs() / b.abs() <= tolerance
}

/// A bar among the last `lookback` pierced a swing level and closed back on
/// the original side. Longs look for a sweep of swing lows, shorts for a
/// sweep of swing highs.
pub fn sweep_confirmed(
    direction: Direction,
    bars: &[Bar],
    swings: &[SwingLevel],
    lookback: usize,
) -> bool {
    let start = bars.len().saturating_sub(lookback);
    let kind = match direction {
        Direction::Long => SwingType::Low,
        Direction::Short => SwingType::High,
    };

    swings.iter().filter(|s| s.kind == kind).any(|s| {
        bars.iter()
            .skip(start.max(s.index + 1))
            .any(|b| match direction {
                Direction::Long => b.low < s.price && b.close > s.price,
                Direction::Short => b.high > s.price && b.close < s.price,
            })
    })
}

/// A close beyond a swing level in the trade direction within the last
/// `lookback` bars that the latest close has already given back.
pub fn false_breakout(
    direction: Direction,
    bars: &[Bar],
    swings: &[SwingLevel],
    lookback: usize,
) -> bool {
    let Some(last) = bars.last() else {
        return false;
    };
    let start = bars.len().saturating_sub(lookback.saturating_add(1));
    let end = bars.len().saturating_sub(1);
    let kind = match direction {
        Direction::Long => SwingType::High,
        Direction::Short => SwingType::Low,
    };

    swings.iter().filter(|s| s.kind == kind).any(|s| {
        let broke = bars[start.max(s.index + 1).min(end)..end]
            .iter()
            .any(|b| match direction {
                Direction::Long => b.close > s.price,
                Direction::Short => b.close < s.price,
            });
        let back_inside = match direction {
            Direction::Long => last.close < s.price,
            Direction::Short => last.close > s.price,
        };
        broke && back_inside
    })
}
