use tracing::warn;

use crate::models::{Bar, BarSeries, Direction, Timeframe};
use crate::strategies::signals::Signal;

/// A pure predicate over the last few bars.
pub trait PatternMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// How many trailing bars `matches` inspects (1..=5).
    fn bars_required(&self) -> usize;

    /// `bars` holds exactly `bars_required()` bars, oldest first.
    fn matches(&self, bars: &[Bar]) -> Option<(Direction, u8)>;
}

fn any_zero_range(bars: &[Bar]) -> bool {
    bars.iter().any(|b| b.range() <= 0.0)
}

/// Three-bar reversal: strong bar, indecision bar, strong bar back through
/// the first body's midpoint.
pub struct StarMatcher;

impl PatternMatcher for StarMatcher {
    fn name(&self) -> &'static str {
        "star"
    }

    fn bars_required(&self) -> usize {
        3
    }

    fn matches(&self, bars: &[Bar]) -> Option<(Direction, u8)> {
        let [first, middle, last] = bars else {
            return None;
        };
        if any_zero_range(bars) || first.body_ratio() < 0.5 {
            return None;
        }
        if middle.body() > first.body() * 0.3 {
            return None;
        }
        let first_mid = (first.open + first.close) / 2.0;

        if first.is_bearish() && last.is_bullish() && last.close > first_mid {
            let strength = if last.close >= first.open { 5 } else { 4 };
            return Some((Direction::Long, strength));
        }
        if first.is_bullish() && last.is_bearish() && last.close < first_mid {
            let strength = if last.close <= first.open { 5 } else { 4 };
            return Some((Direction::Short, strength));
        }
        None
    }
}

/// Three consecutive strong bars in one direction, each opening inside the
/// previous body.
pub struct ThreeSoldiersMatcher;

impl PatternMatcher for ThreeSoldiersMatcher {
    fn name(&self) -> &'static str {
        "three_soldiers"
    }

    fn bars_required(&self) -> usize {
        3
    }

    fn matches(&self, bars: &[Bar]) -> Option<(Direction, u8)> {
        if bars.len() != 3 || any_zero_range(bars) {
            return None;
        }
        if bars.iter().any(|b| b.body_ratio() < 0.5) {
            return None;
        }
        let opens_inside = bars
            .windows(2)
            .all(|w| w[1].open >= w[0].body_bottom() && w[1].open <= w[0].body_top());
        if !opens_inside {
            return None;
        }

        if bars.iter().all(|b| b.is_bullish()) && bars.windows(2).all(|w| w[1].close > w[0].close)
        {
            let clean = bars.iter().all(|b| b.upper_wick() <= b.range() * 0.1);
            return Some((Direction::Long, if clean { 5 } else { 4 }));
        }
        if bars.iter().all(|b| b.is_bearish()) && bars.windows(2).all(|w| w[1].close < w[0].close)
        {
            let clean = bars.iter().all(|b| b.lower_wick() <= b.range() * 0.1);
            return Some((Direction::Short, if clean { 5 } else { 4 }));
        }
        None
    }
}

/// Second body swallows the first, opposite-coloured body.
pub struct EngulfingMatcher;

impl PatternMatcher for EngulfingMatcher {
    fn name(&self) -> &'static str {
        "engulfing"
    }

    fn bars_required(&self) -> usize {
        2
    }

    fn matches(&self, bars: &[Bar]) -> Option<(Direction, u8)> {
        let [prev, curr] = bars else {
            return None;
        };
        if any_zero_range(bars) || curr.body() <= prev.body() {
            return None;
        }
        let body_engulfed =
            curr.body_bottom() <= prev.body_bottom() && curr.body_top() >= prev.body_top();
        if !body_engulfed {
            return None;
        }

        let direction = if prev.is_bearish() && curr.is_bullish() {
            Direction::Long
        } else if prev.is_bullish() && curr.is_bearish() {
            Direction::Short
        } else {
            return None;
        };

        let range_engulfed = curr.high >= prev.high && curr.low <= prev.low;
        let strong_body = curr.body_ratio() >= 0.6;
        let strength = match (range_engulfed, strong_body) {
            (true, true) => 5,
            (false, true) => 4,
            _ => 3,
        };
        Some((direction, strength))
    }
}

/// Piercing line (bullish) / dark cloud cover (bearish): a partial reversal
/// through the midpoint of the prior body.
pub struct PiercingMatcher;

impl PatternMatcher for PiercingMatcher {
    fn name(&self) -> &'static str {
        "piercing"
    }

    fn bars_required(&self) -> usize {
        2
    }

    fn matches(&self, bars: &[Bar]) -> Option<(Direction, u8)> {
        let [prev, curr] = bars else {
            return None;
        };
        if any_zero_range(bars) || prev.body_ratio() < 0.5 {
            return None;
        }
        let prev_mid = (prev.open + prev.close) / 2.0;

        if prev.is_bearish()
            && curr.is_bullish()
            && curr.open <= prev.close
            && curr.close > prev_mid
            && curr.close < prev.open
        {
            return Some((Direction::Long, 3));
        }
        if prev.is_bullish()
            && curr.is_bearish()
            && curr.open >= prev.close
            && curr.close < prev_mid
            && curr.close > prev.open
        {
            return Some((Direction::Short, 3));
        }
        None
    }
}

/// Long rejection wick with a small body at the other end.
pub struct PinBarMatcher;

impl PatternMatcher for PinBarMatcher {
    fn name(&self) -> &'static str {
        "pin_bar"
    }

    fn bars_required(&self) -> usize {
        1
    }

    fn matches(&self, bars: &[Bar]) -> Option<(Direction, u8)> {
        let [bar] = bars else {
            return None;
        };
        let range = bar.range();
        if range <= 0.0 {
            return None;
        }
        let body = bar.body();
        let (lower, upper) = (bar.lower_wick(), bar.upper_wick());

        if lower >= body * 2.0 && lower >= range * 0.6 && upper <= range * 0.25 {
            return Some((Direction::Long, if lower >= range * 0.75 { 4 } else { 3 }));
        }
        if upper >= body * 2.0 && upper >= range * 0.6 && lower <= range * 0.25 {
            return Some((Direction::Short, if upper >= range * 0.75 { 4 } else { 3 }));
        }
        None
    }
}

/// Mother bar, inside bar, then a close outside the mother bar's range.
pub struct InsideBarBreakoutMatcher;

impl PatternMatcher for InsideBarBreakoutMatcher {
    fn name(&self) -> &'static str {
        "inside_bar_breakout"
    }

    fn bars_required(&self) -> usize {
        3
    }

    fn matches(&self, bars: &[Bar]) -> Option<(Direction, u8)> {
        let [mother, inside, breakout] = bars else {
            return None;
        };
        if any_zero_range(bars) {
            return None;
        }
        if inside.high > mother.high || inside.low < mother.low {
            return None;
        }
        if breakout.close > mother.high {
            Some((Direction::Long, 3))
        } else if breakout.close < mother.low {
            Some((Direction::Short, 3))
        } else {
            None
        }
    }
}

/// Single wide-bodied bar.
pub struct MomentumBarMatcher;

impl PatternMatcher for MomentumBarMatcher {
    fn name(&self) -> &'static str {
        "momentum_bar"
    }

    fn bars_required(&self) -> usize {
        1
    }

    fn matches(&self, bars: &[Bar]) -> Option<(Direction, u8)> {
        let [bar] = bars else {
            return None;
        };
        let ratio = bar.body_ratio();
        if ratio < 0.8 {
            return None;
        }
        let strength = if ratio >= 0.9 { 2 } else { 1 };
        if bar.is_bullish() {
            Some((Direction::Long, strength))
        } else if bar.is_bearish() {
            Some((Direction::Short, strength))
        } else {
            None
        }
    }
}

fn default_matchers() -> Vec<Box<dyn PatternMatcher>> {
    vec![
        Box::new(StarMatcher),
        Box::new(ThreeSoldiersMatcher),
        Box::new(EngulfingMatcher),
        Box::new(PiercingMatcher),
        Box::new(PinBarMatcher),
        Box::new(InsideBarBreakoutMatcher),
        Box::new(MomentumBarMatcher),
    ]
}

/// Ordered matcher list; the first match for a bar wins.
pub struct PatternDetector {
    matchers: Vec<Box<dyn PatternMatcher>>,
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self {
            matchers: default_matchers(),
        }
    }
}

impl PatternDetector {
    pub fn new(matchers: Vec<Box<dyn PatternMatcher>>) -> Self {
        Self { matchers }
    }

    /// Reorder the built-in matchers. Named matchers come first in the given
    /// order; any not named keep their default relative order after them.
    pub fn with_ranking(ranking: &[String]) -> Self {
        let mut pool: Vec<Option<Box<dyn PatternMatcher>>> =
            default_matchers().into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(pool.len());

        for name in ranking {
            match pool
                .iter_mut()
                .find(|m| m.as_ref().is_some_and(|m| m.name() == name.as_str()))
            {
                Some(slot) => ordered.extend(slot.take()),
                None => warn!("Unknown or duplicate pattern '{}' in ranking, ignored", name),
            }
        }
        ordered.extend(pool.into_iter().flatten());
        Self { matchers: ordered }
    }

    pub fn ranking(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|m| m.name()).collect()
    }

    pub fn detect(&self, bars: &BarSeries, timeframe: Timeframe) -> Option<Signal> {
        let last = bars.last()?;
        for matcher in &self.matchers {
            let needed = matcher.bars_required();
            if needed == 0 || bars.len() < needed {
                continue;
            }
            if let Some((direction, strength)) = matcher.matches(bars.last_n(needed)) {
                return Some(Signal::new(
                    matcher.name(),
                    direction,
                    strength,
                    last.close,
                    last.timestamp,
                    timeframe,
                ));
            }
        }
        None
    }
}
