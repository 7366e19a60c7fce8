use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StructureSettings;
use crate::core::liquidity::boost_priorities;
use crate::models::{BarSeries, Direction, StructureLabel, SwingType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingLevel {
    pub kind: SwingType,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    /// Position in the bar window the level was derived from
    pub index: usize,
    /// 1 + number of same-kind swings within the equal-level tolerance
    pub priority: u32,
    /// A later bar traded through the level
    pub swept: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureState {
    pub last_hh: Option<f64>,
    pub last_hl: Option<f64>,
    pub last_lh: Option<f64>,
    pub last_ll: Option<f64>,
    pub label: StructureLabel,
}

impl Default for StructureState {
    fn default() -> Self {
        Self {
            last_hh: None,
            last_hl: None,
            last_lh: None,
            last_ll: None,
            label: StructureLabel::Choppy,
        }
    }
}

/// A close through the most recent unbroken swing. `direction` is the side
/// the market broke toward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakEvent {
    pub direction: Direction,
    pub level: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub swings: Vec<SwingLevel>,
    pub state: StructureState,
    pub breaks: Vec<BreakEvent>,
    pub as_of: Option<DateTime<Utc>>,
}

impl StructureSnapshot {
    pub fn is_empty(&self) -> bool {
        self.swings.is_empty()
    }

    pub fn highs(&self) -> impl Iterator<Item = &SwingLevel> {
        self.swings.iter().filter(|s| s.kind == SwingType::High)
    }

    pub fn lows(&self) -> impl Iterator<Item = &SwingLevel> {
        self.swings.iter().filter(|s| s.kind == SwingType::Low)
    }

    /// Break printed by the newest bar of the window, if any.
    pub fn latest_break(&self) -> Option<&BreakEvent> {
        let as_of = self.as_of?;
        self.breaks.iter().rev().find(|b| b.timestamp == as_of)
    }

    /// True when the newest bar broke structure against `direction`.
    pub fn break_against(&self, direction: Direction) -> bool {
        self.latest_break()
            .map(|b| b.direction == direction.opposite())
            .unwrap_or(false)
    }

    /// Nearest swing with priority > 1 (equal highs/lows), measured from `price`.
    pub fn nearest_priority_level(&self, price: f64) -> Option<&SwingLevel> {
        self.swings
            .iter()
            .filter(|s| s.priority > 1 && !s.swept)
            .min_by(|a, b| {
                (a.price - price)
                    .abs()
                    .total_cmp(&(b.price - price).abs())
            })
    }
}

/// Derives swing levels, structure labels and breaks from a bar window.
pub struct StructureMapper {
    pub swing_lookback: usize,
    pub equal_level_tolerance: f64,
}

impl StructureMapper {
    pub fn new(settings: &StructureSettings) -> Self {
        Self {
            swing_lookback: settings.swing_lookback.max(1),
            equal_level_tolerance: settings.equal_level_tolerance,
        }
    }

    pub fn with_lookback(swing_lookback: usize) -> Self {
        Self {
            swing_lookback: swing_lookback.max(1),
            equal_level_tolerance: 0.0005,
        }
    }

    /// Too few bars for a single swing window gives an empty snapshot.
    pub fn map(&self, bars: &BarSeries) -> StructureSnapshot {
        let mut snapshot = StructureSnapshot {
            as_of: bars.last().map(|b| b.timestamp),
            ..StructureSnapshot::default()
        };
        if bars.len() <= self.swing_lookback.saturating_mul(2) {
            return snapshot;
        }

        let mut swings = self.find_swings(bars);
        boost_priorities(&mut swings, self.equal_level_tolerance);
        snapshot.breaks = detect_breaks(bars, &swings);
        snapshot.state = derive_state(&swings);
        snapshot.swings = swings;
        snapshot
    }

    fn find_swings(&self, bars: &BarSeries) -> Vec<SwingLevel> {
        let lb = self.swing_lookback;
        let len = bars.len();
        let mut swings = Vec::new();

        for i in lb..(len - lb) {
            let window = (i - lb)..=(i + lb);

            let high = bars[i].high;
            if window.clone().all(|j| bars[j].high <= high) {
                swings.push(SwingLevel {
                    kind: SwingType::High,
                    price: high,
                    timestamp: bars[i].timestamp,
                    index: i,
                    priority: 1,
                    swept: bars.iter().skip(i + 1).any(|b| b.high > high),
                });
            }

            let low = bars[i].low;
            if window.clone().all(|j| bars[j].low >= low) {
                swings.push(SwingLevel {
                    kind: SwingType::Low,
                    price: low,
                    timestamp: bars[i].timestamp,
                    index: i,
                    priority: 1,
                    swept: bars.iter().skip(i + 1).any(|b| b.low < low),
                });
            }
        }
        swings
    }
}

fn detect_breaks(bars: &BarSeries, swings: &[SwingLevel]) -> Vec<BreakEvent> {
    let mut broken = vec![false; swings.len()];
    let mut events = Vec::new();

    for i in 1..bars.len() {
        let close = bars[i].close;
        let ts = bars[i].timestamp;

        for kind in [SwingType::High, SwingType::Low] {
            let latest = swings
                .iter()
                .enumerate()
                .filter(|(k, s)| s.kind == kind && s.index < i && !broken[*k])
                .max_by_key(|(_, s)| s.index);

            if let Some((k, s)) = latest {
                let crossed = match kind {
                    SwingType::High => close > s.price,
                    SwingType::Low => close < s.price,
                };
                if crossed {
                    broken[k] = true;
                    events.push(BreakEvent {
                        direction: match kind {
                            SwingType::High => Direction::Long,
                            SwingType::Low => Direction::Short,
                        },
                        level: s.price,
                        timestamp: ts,
                    });
                }
            }
        }
    }
    events
}

fn derive_state(swings: &[SwingLevel]) -> StructureState {
    let mut state = StructureState::default();
    let mut last_high_higher: Option<bool> = None;
    let mut last_low_higher: Option<bool> = None;

    let highs: Vec<&SwingLevel> = swings.iter().filter(|s| s.kind == SwingType::High).collect();
    for pair in highs.windows(2) {
        if pair[1].price > pair[0].price {
            state.last_hh = Some(pair[1].price);
            last_high_higher = Some(true);
        } else if pair[1].price < pair[0].price {
            state.last_lh = Some(pair[1].price);
            last_high_higher = Some(false);
        }
    }

    let lows: Vec<&SwingLevel> = swings.iter().filter(|s| s.kind == SwingType::Low).collect();
    for pair in lows.windows(2) {
        if pair[1].price > pair[0].price {
            state.last_hl = Some(pair[1].price);
            last_low_higher = Some(true);
        } else if pair[1].price < pair[0].price {
            state.last_ll = Some(pair[1].price);
            last_low_higher = Some(false);
        }
    }

    state.label = match (last_high_higher, last_low_higher) {
        (Some(true), Some(true)) => StructureLabel::Bullish,
        (Some(false), Some(false)) => StructureLabel::Bearish,
        _ => StructureLabel::Choppy,
    };
    state
}
