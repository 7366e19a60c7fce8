use serde::{Deserialize, Serialize};

use crate::config::{InstrumentSpec, RiskSettings};
use crate::core::structure::{StructureSnapshot, SwingLevel};
use crate::models::{Direction, SwingType};

/// Protective and target levels for a new position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPlan {
    pub direction: Direction,
    pub entry: f64,
    pub stop: f64,
    pub targets: Vec<f64>,
    /// |entry - stop|, never below the configured minimum
    pub risk_distance: f64,
    pub reason: String,
}

pub struct StopPlanner {
    atr_buffer: f64,
    fallback_atr: f64,
    pub min_distance: f64,
}

impl StopPlanner {
    pub fn new(risk: &RiskSettings, spec: &InstrumentSpec) -> Self {
        Self {
            atr_buffer: risk.stop_atr_buffer,
            fallback_atr: risk.fallback_stop_atr,
            min_distance: min_stop_distance(risk, spec),
        }
    }

    /// Stop beyond the most recent protective swing plus an ATR buffer; with
    /// no usable swing, a fixed ATR multiple. Targets sit at 1R, 2R and 3R
    /// scaled by the profile's target multiplier.
    pub fn plan(
        &self,
        direction: Direction,
        entry: f64,
        snapshot: &StructureSnapshot,
        atr: Option<f64>,
        target_multiplier: f64,
    ) -> EntryPlan {
        let atr = atr.filter(|a| a.is_finite() && *a > 0.0).unwrap_or(0.0);
        let sign = direction.sign();

        let swing = snapshot
            .swings
            .iter()
            .filter(|s| match direction {
                Direction::Long => s.kind == SwingType::Low && s.price < entry,
                Direction::Short => s.kind == SwingType::High && s.price > entry,
            })
            .max_by_key(|s| s.index);

        let (raw_stop, reason) = match swing {
            Some(s) => (
                s.price - sign * atr * self.atr_buffer,
                format!("beyond swing {} @ {:.5}", s.kind, s.price),
            ),
            None => (
                entry - sign * atr * self.fallback_atr,
                format!("{:.1} x ATR fallback", self.fallback_atr),
            ),
        };

        let distance = clamp_distance((entry - raw_stop) * sign, self.min_distance);
        let stop = entry - sign * distance;
        let multiplier = if target_multiplier > 0.0 { target_multiplier } else { 1.0 };
        let targets = (1..=3)
            .map(|k| entry + sign * distance * multiplier * k as f64)
            .collect();

        EntryPlan {
            direction,
            entry,
            stop,
            targets,
            risk_distance: distance,
            reason,
        }
    }

    /// Most recent favourable swing that would tighten the stop, if any.
    /// Longs trail under swing lows, shorts over swing highs. Only the
    /// `lookback` newest swings of that kind are considered, and the level
    /// must sit between the current stop and the current price.
    pub fn trailing_level(
        &self,
        direction: Direction,
        current_stop: f64,
        price: f64,
        snapshot: &StructureSnapshot,
        lookback: usize,
    ) -> Option<f64> {
        let kind = match direction {
            Direction::Long => SwingType::Low,
            Direction::Short => SwingType::High,
        };
        let mut recent: Vec<&SwingLevel> =
            snapshot.swings.iter().filter(|s| s.kind == kind).collect();
        recent.sort_by_key(|s| std::cmp::Reverse(s.index));

        recent
            .into_iter()
            .take(lookback.max(1))
            .find(|s| match direction {
                Direction::Long => s.price > current_stop && s.price < price,
                Direction::Short => s.price < current_stop && s.price > price,
            })
            .map(|s| s.price)
    }
}

pub fn min_stop_distance(risk: &RiskSettings, spec: &InstrumentSpec) -> f64 {
    (spec.tick_size * risk.min_stop_ticks).max(f64::EPSILON)
}

/// Stop distance used anywhere as a divisor: positive and at least `min`.
pub fn clamp_distance(distance: f64, min: f64) -> f64 {
    if distance.is_finite() {
        distance.max(min)
    } else {
        min
    }
}
