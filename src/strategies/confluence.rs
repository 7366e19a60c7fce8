use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{FilterSettings, StructureSettings};
use crate::core::liquidity;
use crate::core::regime::RegimeReading;
use crate::core::sessions::SessionReading;
use crate::core::structure::StructureSnapshot;
use crate::core::zones::ZoneBook;
use crate::models::{Bar, Bias, Direction, Regime, Verdict};
use crate::strategies::profiles::AggressionProfile;
use crate::strategies::signals::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterName {
    RegimeAligned,
    BiasAligned,
    StructureProximity,
    SignalStrength,
    Volume,
    Spread,
    Session,
    MultiTimeframe,
    Correlation,
    News,
    LiquiditySweep,
    FalseBreakout,
    HistoricalPerformance,
}

impl FilterName {
    pub const ALL: [FilterName; 13] = [
        FilterName::RegimeAligned,
        FilterName::BiasAligned,
        FilterName::StructureProximity,
        FilterName::SignalStrength,
        FilterName::Volume,
        FilterName::Spread,
        FilterName::Session,
        FilterName::MultiTimeframe,
        FilterName::Correlation,
        FilterName::News,
        FilterName::LiquiditySweep,
        FilterName::FalseBreakout,
        FilterName::HistoricalPerformance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterName::RegimeAligned => "regime_aligned",
            FilterName::BiasAligned => "bias_aligned",
            FilterName::StructureProximity => "structure_proximity",
            FilterName::SignalStrength => "signal_strength",
            FilterName::Volume => "volume",
            FilterName::Spread => "spread",
            FilterName::Session => "session",
            FilterName::MultiTimeframe => "multi_timeframe",
            FilterName::Correlation => "correlation",
            FilterName::News => "news",
            FilterName::LiquiditySweep => "liquidity_sweep",
            FilterName::FalseBreakout => "false_breakout",
            FilterName::HistoricalPerformance => "historical_performance",
        }
    }
}

impl fmt::Display for FilterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown filter '{0}'")]
pub struct UnknownFilter(pub String);

impl FromStr for FilterName {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FilterName::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| UnknownFilter(s.to_string()))
    }
}

/// Best bid/ask at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn spread(&self) -> f64 {
        (self.ask - self.bid).max(0.0)
    }
}

/// Everything a filter may look at, gathered once per evaluation.
pub struct ConfluenceContext<'a> {
    pub signal: &'a Signal,
    pub bars: &'a [Bar],
    pub regime: &'a RegimeReading,
    pub structure: &'a StructureSnapshot,
    pub zones: &'a ZoneBook,
    pub session: &'a SessionReading,
    pub quote: Option<Quote>,
    pub typical_spread: f64,
    pub higher_tf_bias: Option<Bias>,
    /// Open positions in the signal direction across the instrument's
    /// correlation group
    pub correlated_exposure: usize,
    pub news_clear: bool,
    pub pattern_vetoed: bool,
    pub min_signal_strength: u8,
    pub filters: &'a FilterSettings,
    pub structure_settings: &'a StructureSettings,
}

impl ConfluenceContext<'_> {
    /// Latest volume over the mean of the `period` bars before it.
    pub fn volume_ratio(&self) -> Option<f64> {
        volume_ratio(self.bars, self.filters.volume_period)
    }
}

pub fn volume_ratio(bars: &[Bar], period: usize) -> Option<f64> {
    let (last, prior) = bars.split_last()?;
    if period == 0 || prior.len() < period {
        return None;
    }
    let window = &prior[prior.len() - period..];
    let mean = window.iter().map(|b| b.volume).sum::<f64>() / period as f64;
    if mean > 0.0 {
        Some(last.volume / mean)
    } else {
        None
    }
}

pub trait ConfluenceFilter: Send + Sync {
    fn name(&self) -> FilterName;
    fn evaluate(&self, ctx: &ConfluenceContext<'_>) -> bool;
}

/// The stock rule behind each named factor.
pub struct BuiltinFilter(pub FilterName);

impl ConfluenceFilter for BuiltinFilter {
    fn name(&self) -> FilterName {
        self.0
    }

    fn evaluate(&self, ctx: &ConfluenceContext<'_>) -> bool {
        let dir = ctx.signal.direction;
        match self.0 {
            FilterName::RegimeAligned => match ctx.regime.regime {
                Regime::Trend => ctx.regime.bias.to_direction() == Some(dir),
                Regime::Range => true,
                Regime::Transition => false,
            },
            FilterName::BiasAligned => ctx.regime.bias.to_direction() == Some(dir),
            FilterName::StructureProximity => {
                let Some(atr) = ctx.regime.atr.filter(|a| *a > 0.0) else {
                    return false;
                };
                let price = ctx.signal.reference_price;
                let distance = atr * ctx.filters.proximity_atr;
                let priority_level = ctx
                    .structure
                    .nearest_priority_level(price)
                    .map(|s| (s.price - price).abs() <= distance)
                    .unwrap_or(false);
                ctx.zones.near_supporting_zone(price, dir, distance) || priority_level
            }
            FilterName::SignalStrength => ctx.signal.strength >= ctx.min_signal_strength,
            FilterName::Volume => ctx
                .volume_ratio()
                .map(|r| r >= ctx.filters.volume_ratio_min)
                .unwrap_or(false),
            // Bar-only feeds carry no quote; the spread is then unknown, not wide
            FilterName::Spread => ctx
                .quote
                .map(|q| q.spread() <= ctx.typical_spread * ctx.filters.max_spread_factor)
                .unwrap_or(true),
            FilterName::Session => ctx.session.tradable,
            FilterName::MultiTimeframe => {
                ctx.higher_tf_bias.and_then(Bias::to_direction) == Some(dir)
            }
            FilterName::Correlation => ctx.correlated_exposure < ctx.filters.max_correlated,
            FilterName::News => ctx.news_clear,
            FilterName::LiquiditySweep => liquidity::sweep_confirmed(
                dir,
                ctx.bars,
                &ctx.structure.swings,
                ctx.structure_settings.sweep_lookback,
            ),
            FilterName::FalseBreakout => !liquidity::false_breakout(
                dir,
                ctx.bars,
                &ctx.structure.swings,
                ctx.structure_settings.false_breakout_lookback,
            ),
            FilterName::HistoricalPerformance => !ctx.pattern_vetoed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceResult {
    pub instrument: String,
    pub pattern: Option<String>,
    pub direction: Option<Direction>,
    pub score: u32,
    pub threshold: u32,
    pub passed: Vec<FilterName>,
    pub failed: Vec<FilterName>,
    pub verdict: Verdict,
    pub rationale: String,
    pub evaluated_at: DateTime<Utc>,
}

impl ConfluenceResult {
    pub fn is_enter(&self) -> bool {
        self.verdict == Verdict::Enter
    }
}

/// ENTER at or above the threshold, WAIT one point short, SKIP otherwise.
pub fn verdict_for(score: u32, threshold: u32) -> Verdict {
    if score >= threshold {
        Verdict::Enter
    } else if score + 1 == threshold {
        Verdict::Wait
    } else {
        Verdict::Skip
    }
}

pub struct ConfluenceScorer {
    filters: Vec<Box<dyn ConfluenceFilter>>,
    enabled: BTreeSet<FilterName>,
    decay_bars: u32,
}

impl ConfluenceScorer {
    pub fn new(enabled: BTreeSet<FilterName>, decay_bars: u32) -> Self {
        let filters = FilterName::ALL
            .iter()
            .map(|f| Box::new(BuiltinFilter(*f)) as Box<dyn ConfluenceFilter>)
            .collect();
        Self {
            filters,
            enabled,
            decay_bars,
        }
    }

    /// Replace the rule behind a factor.
    pub fn register(&mut self, filter: Box<dyn ConfluenceFilter>) {
        let name = filter.name();
        match self.filters.iter_mut().find(|f| f.name() == name) {
            Some(slot) => *slot = filter,
            None => self.filters.push(filter),
        }
    }

    /// Swap the enabled set and decay; registered filters are kept.
    pub fn reconfigure(&mut self, enabled: BTreeSet<FilterName>, decay_bars: u32) {
        self.enabled = enabled;
        self.decay_bars = decay_bars;
    }

    pub fn enabled(&self) -> &BTreeSet<FilterName> {
        &self.enabled
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled.len()
    }

    /// Score a signal. Every enabled factor is evaluated even after a
    /// mandatory failure so the breakdown is always complete.
    pub fn evaluate(
        &self,
        instrument: &str,
        ctx: Option<&ConfluenceContext<'_>>,
        profile: &AggressionProfile,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> ConfluenceResult {
        let enabled_in_order = || {
            self.filters
                .iter()
                .filter(|f| self.enabled.contains(&f.name()))
        };

        let ctx = match ctx {
            Some(c) if !c.signal.is_stale(self.decay_bars) => c,
            stale => {
                let why = if stale.is_some() {
                    "signal stale"
                } else {
                    "no signal"
                };
                return ConfluenceResult {
                    instrument: instrument.to_string(),
                    pattern: stale.map(|c| c.signal.pattern.clone()),
                    direction: stale.map(|c| c.signal.direction),
                    score: 0,
                    threshold,
                    passed: Vec::new(),
                    failed: enabled_in_order().map(|f| f.name()).collect(),
                    verdict: Verdict::Skip,
                    rationale: why.to_string(),
                    evaluated_at: now,
                };
            }
        };

        let mut passed = Vec::new();
        let mut failed = Vec::new();
        for filter in enabled_in_order() {
            if filter.evaluate(ctx) {
                passed.push(filter.name());
            } else {
                failed.push(filter.name());
            }
        }

        let score = passed.len() as u32;
        let mandatory_failed: Vec<FilterName> = failed
            .iter()
            .copied()
            .filter(|f| profile.mandatory_filters.contains(f))
            .collect();

        let verdict = if mandatory_failed.is_empty() {
            verdict_for(score, threshold)
        } else {
            Verdict::Skip
        };

        let mut rationale = format!(
            "{} {} str={} score {}/{} -> {}",
            ctx.signal.pattern, ctx.signal.direction, ctx.signal.strength, score, threshold, verdict
        );
        if !mandatory_failed.is_empty() {
            rationale.push_str(&format!("; mandatory failed: {}", join(&mandatory_failed)));
        }
        if !failed.is_empty() {
            rationale.push_str(&format!("; failed: {}", join(&failed)));
        }

        ConfluenceResult {
            instrument: instrument.to_string(),
            pattern: Some(ctx.signal.pattern.clone()),
            direction: Some(ctx.signal.direction),
            score,
            threshold,
            passed,
            failed,
            verdict,
            rationale,
            evaluated_at: now,
        }
    }
}

fn join(names: &[FilterName]) -> String {
    names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(",")
}
