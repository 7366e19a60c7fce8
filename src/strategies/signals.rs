use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Direction, Timeframe};

pub const MIN_STRENGTH: u8 = 1;
pub const MAX_STRENGTH: u8 = 5;

/// Directional pattern read off the latest bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub pattern: String,
    pub direction: Direction,
    /// 1..=5
    pub strength: u8,
    pub reference_price: f64,
    pub detected_at: DateTime<Utc>,
    pub timeframe: Timeframe,
    /// Bars elapsed since detection
    #[serde(default)]
    pub age_bars: u32,
}

impl Signal {
    pub fn new(
        pattern: &str,
        direction: Direction,
        strength: u8,
        reference_price: f64,
        detected_at: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Self {
        Self {
            pattern: pattern.to_string(),
            direction,
            strength: strength.clamp(MIN_STRENGTH, MAX_STRENGTH),
            reference_price,
            detected_at,
            timeframe,
            age_bars: 0,
        }
    }

    pub fn age(&mut self) {
        self.age_bars = self.age_bars.saturating_add(1);
    }

    pub fn is_stale(&self, decay_bars: u32) -> bool {
        self.age_bars >= decay_bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_is_clamped() {
        let s = Signal::new("x", Direction::Long, 9, 1.0, Utc::now(), Timeframe::M15);
        assert_eq!(s.strength, 5);
        let s = Signal::new("x", Direction::Long, 0, 1.0, Utc::now(), Timeframe::M15);
        assert_eq!(s.strength, 1);
    }

    #[test]
    fn decays_after_configured_bars() {
        let mut s = Signal::new("x", Direction::Short, 3, 1.0, Utc::now(), Timeframe::M15);
        assert!(!s.is_stale(2));
        s.age();
        assert!(!s.is_stale(2));
        s.age();
        assert!(s.is_stale(2));
        assert_eq!(s.strength, 3);
    }
}
