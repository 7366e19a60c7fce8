use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::config::AdaptationSettings;
use crate::models::{Regime, VolatilityRegime};
use crate::strategies::profiles::AggressionProfile;
use crate::trading::trade_record::TradeOutcome;

/// Veto applies below this win rate once enough samples exist.
pub const VETO_WIN_RATE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPerformanceRecord {
    pub pattern: String,
    pub regime: Regime,
    pub trades: u32,
    pub wins: u32,
    pub win_rate: f64,
}

impl PatternPerformanceRecord {
    pub fn new(pattern: &str, regime: Regime) -> Self {
        Self {
            pattern: pattern.to_string(),
            regime,
            trades: 0,
            wins: 0,
            win_rate: 0.0,
        }
    }

    pub fn record(&mut self, win: bool) {
        self.trades += 1;
        if win {
            self.wins += 1;
        }
        self.recompute();
    }

    /// Derive the win rate from the counts. Stored rates are never trusted.
    pub fn recompute(&mut self) {
        self.wins = self.wins.min(self.trades);
        self.win_rate = if self.trades > 0 {
            self.wins as f64 / self.trades as f64
        } else {
            0.0
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_trades: u32,
    pub total_wins: u32,
    pub win_rate: f64,
    pub vetoed: Vec<String>,
    pub records: Vec<PatternPerformanceRecord>,
}

/// Per (pattern, regime) win/loss tally.
pub struct PerformanceTracker {
    records: BTreeMap<(String, Regime), PatternPerformanceRecord>,
    min_samples: u32,
    dirty: bool,
}

impl PerformanceTracker {
    pub fn new(min_samples: u32) -> Self {
        Self {
            records: BTreeMap::new(),
            min_samples,
            dirty: false,
        }
    }

    pub fn from_records(records: Vec<PatternPerformanceRecord>, min_samples: u32) -> Self {
        let mut tracker = Self::new(min_samples);
        for mut r in records {
            r.recompute();
            let key = (r.pattern.clone(), r.regime);
            match tracker.records.get_mut(&key) {
                // Duplicate keys in a hand-edited file are merged
                Some(existing) => {
                    existing.trades += r.trades;
                    existing.wins += r.wins;
                    existing.recompute();
                }
                None => {
                    tracker.records.insert(key, r);
                }
            }
        }
        tracker
    }

    pub fn record(&mut self, outcome: &TradeOutcome) {
        let key = (outcome.pattern.clone(), outcome.regime);
        let rec = self
            .records
            .entry(key)
            .or_insert_with(|| PatternPerformanceRecord::new(&outcome.pattern, outcome.regime));
        rec.record(outcome.is_win());
        self.dirty = true;

        info!(
            "Performance {}/{}: {}/{} wins ({:.0}%)",
            rec.pattern,
            rec.regime,
            rec.wins,
            rec.trades,
            rec.win_rate * 100.0
        );
    }

    pub fn get(&self, pattern: &str, regime: Regime) -> Option<&PatternPerformanceRecord> {
        self.records.get(&(pattern.to_string(), regime))
    }

    /// Vetoed only with enough history and a losing record.
    pub fn is_vetoed(&self, pattern: &str, regime: Regime) -> bool {
        self.get(pattern, regime)
            .map(|r| r.trades >= self.min_samples && r.win_rate < VETO_WIN_RATE)
            .unwrap_or(false)
    }

    pub fn records(&self) -> Vec<PatternPerformanceRecord> {
        self.records.values().cloned().collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn set_min_samples(&mut self, min_samples: u32) {
        self.min_samples = min_samples;
    }

    pub fn summary(&self) -> PerformanceSummary {
        let total_trades = self.records.values().map(|r| r.trades).sum::<u32>();
        let total_wins = self.records.values().map(|r| r.wins).sum::<u32>();
        let vetoed = self
            .records
            .values()
            .filter(|r| self.is_vetoed(&r.pattern, r.regime))
            .map(|r| format!("{}/{}", r.pattern, r.regime))
            .collect();

        PerformanceSummary {
            total_trades,
            total_wins,
            win_rate: if total_trades > 0 {
                total_wins as f64 / total_trades as f64
            } else {
                0.0
            },
            vetoed,
            records: self.records(),
        }
    }
}

/// Streak- and volatility-driven confluence threshold.
///
/// Effective threshold is `base + streak_offset + volatility bump`, clamped
/// to `[base, profile max]`.
#[derive(Debug, Clone)]
pub struct ThresholdController {
    base: u32,
    max: u32,
    loss_step: u32,
    win_step: u32,
    volatility_bump: u32,
    streak_offset: u32,
    losses: u32,
    wins: u32,
}

impl ThresholdController {
    pub fn new(profile: &AggressionProfile, settings: &AdaptationSettings) -> Self {
        Self {
            base: profile.confluence_threshold,
            max: profile.max_confluence_threshold.max(profile.confluence_threshold),
            loss_step: settings.loss_streak_step.max(1),
            win_step: settings.win_streak_step.max(1),
            volatility_bump: settings.high_volatility_bump,
            streak_offset: 0,
            losses: 0,
            wins: 0,
        }
    }

    /// Rebase on a new profile; the streak state carries over.
    pub fn rebase(&mut self, profile: &AggressionProfile) {
        self.base = profile.confluence_threshold;
        self.max = profile.max_confluence_threshold.max(self.base);
        self.streak_offset = self.streak_offset.min(self.max - self.base);
    }

    pub fn on_outcome(&mut self, win: bool) {
        if win {
            self.wins += 1;
            self.losses = 0;
            if self.wins % self.win_step == 0 && self.streak_offset > 0 {
                self.streak_offset -= 1;
                info!(
                    "{} consecutive wins: threshold offset lowered to {}",
                    self.wins, self.streak_offset
                );
            }
        } else {
            self.losses += 1;
            self.wins = 0;
            if self.losses % self.loss_step == 0 && self.base + self.streak_offset < self.max {
                self.streak_offset += 1;
                info!(
                    "{} consecutive losses: threshold offset raised to {}",
                    self.losses, self.streak_offset
                );
            }
        }
    }

    pub fn streak_offset(&self) -> u32 {
        self.streak_offset
    }

    pub fn effective(&self, volatility: VolatilityRegime) -> u32 {
        let bump = if volatility == VolatilityRegime::High {
            self.volatility_bump
        } else {
            0
        };
        (self.base + self.streak_offset + bump).clamp(self.base, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{CloseReason, Direction};
    use chrono::Utc;

    fn outcome(pattern: &str, regime: Regime, pnl: f64) -> TradeOutcome {
        TradeOutcome {
            position_id: 1,
            instrument: "EURUSD".into(),
            pattern: pattern.into(),
            regime,
            direction: Direction::Long,
            entry: 1.0,
            exit: 1.0,
            pnl,
            r_multiple: pnl.signum(),
            reason: CloseReason::TargetHit,
            opened_at: None,
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn veto_needs_min_samples() {
        let mut t = PerformanceTracker::new(10);
        for _ in 0..9 {
            t.record(&outcome("pin_bar", Regime::Range, -1.0));
        }
        assert!(!t.is_vetoed("pin_bar", Regime::Range));
        t.record(&outcome("pin_bar", Regime::Range, -1.0));
        assert!(t.is_vetoed("pin_bar", Regime::Range));
        // Other regime is tracked separately
        assert!(!t.is_vetoed("pin_bar", Regime::Trend));
    }

    #[test]
    fn exactly_half_is_not_vetoed() {
        let mut t = PerformanceTracker::new(4);
        for pnl in [1.0, -1.0, 1.0, -1.0] {
            t.record(&outcome("engulfing", Regime::Trend, pnl));
        }
        assert!(!t.is_vetoed("engulfing", Regime::Trend));
        let s = t.summary();
        assert_eq!(s.total_trades, 4);
        assert!((s.win_rate - 0.5).abs() < 1e-12);
        assert!(s.vetoed.is_empty());
    }

    #[test]
    fn stored_rates_are_recomputed() {
        let mut bogus = PatternPerformanceRecord::new("star", Regime::Trend);
        bogus.trades = 4;
        bogus.wins = 1;
        bogus.win_rate = 0.9;
        let t = PerformanceTracker::from_records(vec![bogus], 1);
        assert!((t.get("star", Regime::Trend).map(|r| r.win_rate).unwrap_or(0.0) - 0.25).abs() < 1e-12);
    }

    fn controller() -> ThresholdController {
        ThresholdController::new(&AggressionProfile::balanced(), &Config::default().adaptation)
    }

    #[test]
    fn third_loss_raises_threshold() {
        let mut c = controller();
        c.on_outcome(false);
        c.on_outcome(false);
        assert_eq!(c.effective(VolatilityRegime::Normal), 5);
        c.on_outcome(false);
        assert_eq!(c.effective(VolatilityRegime::Normal), 6);
        assert_eq!(c.effective(VolatilityRegime::High), 7);
    }

    #[test]
    fn threshold_stays_within_bounds() {
        let mut c = controller();
        for _ in 0..30 {
            c.on_outcome(false);
        }
        assert_eq!(c.effective(VolatilityRegime::High), 8);
        for _ in 0..100 {
            c.on_outcome(true);
        }
        assert_eq!(c.streak_offset(), 0);
        assert_eq!(c.effective(VolatilityRegime::Normal), 5);
    }

    #[test]
    fn fifth_win_lowers_offset() {
        let mut c = controller();
        for _ in 0..6 {
            c.on_outcome(false);
        }
        assert_eq!(c.streak_offset(), 2);
        for _ in 0..4 {
            c.on_outcome(true);
        }
        assert_eq!(c.streak_offset(), 2);
        c.on_outcome(true);
        assert_eq!(c.streak_offset(), 1);
    }
}
