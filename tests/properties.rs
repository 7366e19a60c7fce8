//! Property tests for scoring and risk invariants.
//!
//! 1. Signal strength always lands in 1..=5
//! 2. Verdict rule: ENTER at threshold, WAIT one short, SKIP below
//! 3. Broker clamping keeps sizes on the lot grid inside [min, max]
//! 4. Stops only ever move in the position's favour
//! 5. The adaptive threshold never leaves [base, max]
//! 6. Win rates are derived from the counts
//! 7. Imbalance fill percentage never decreases
//! 8. An invalidated origin zone stays invalidated
//! 9. Every enabled factor is either scored or reported as failed
//! 10. Lifecycle-managed stops only ever tighten

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeSet;

use confluence_trader::config::{Config, InstrumentSpec};
use confluence_trader::core::regime::RegimeClassifier;
use confluence_trader::core::sessions::SessionReading;
use confluence_trader::core::stops::StopPlanner;
use confluence_trader::core::structure::{StructureMapper, StructureSnapshot, SwingLevel};
use confluence_trader::core::zones::{ImbalanceZone, OriginZone, ZoneBook};
use confluence_trader::models::{
    Bar, BarSeries, Bias, Direction, LifecycleState, Regime, SwingType, Timeframe, Verdict,
    VolatilityRegime,
};
use confluence_trader::strategies::confluence::{
    verdict_for, ConfluenceContext, ConfluenceScorer, FilterName, Quote,
};
use confluence_trader::strategies::profiles::AggressionProfile;
use confluence_trader::strategies::signals::{Signal, MAX_STRENGTH, MIN_STRENGTH};
use confluence_trader::trading::adaptation::{PatternPerformanceRecord, ThresholdController};
use confluence_trader::trading::lifecycle::{LifecycleManager, Position};
use confluence_trader::trading::risk::clamp_to_broker;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

fn arb_volatility() -> impl Strategy<Value = VolatilityRegime> {
    prop_oneof![
        Just(VolatilityRegime::Low),
        Just(VolatilityRegime::Normal),
        Just(VolatilityRegime::High),
    ]
}

fn position(direction: Direction) -> Position {
    let entry = 1.1000;
    let stop = entry - direction.sign() * 0.0020;
    Position {
        id: 1,
        instrument: "EURUSD".into(),
        handle: 1,
        direction,
        entry,
        initial_stop: stop,
        stop,
        targets: vec![entry + direction.sign() * 0.0020],
        size: 1.0,
        remaining_size: 1.0,
        state: LifecycleState::Open,
        partial_realized: false,
        profit_locked: false,
        pattern: "engulfing".into(),
        regime: Regime::Trend,
        opened_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        best_price: entry,
        realized_pnl: 0.0,
    }
}

fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((95.0..105.0_f64, 0.0..3.0_f64, 0.0..3.0_f64), 1..60).prop_map(|raw| {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        raw.into_iter()
            .enumerate()
            .map(|(i, (mid, up, down))| Bar {
                timestamp: base + Duration::minutes(i as i64 + 1),
                open: mid,
                high: mid + up,
                low: mid - down,
                close: mid,
                volume: 100.0,
            })
            .collect()
    })
}

// ── 1. Strength range ────────────────────────────────────────────────

proptest! {
    #[test]
    fn strength_is_clamped(raw in any::<u8>(), dir in arb_direction()) {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let s = Signal::new("pin_bar", dir, raw, 1.1, at, Timeframe::M15);
        prop_assert!(s.strength >= MIN_STRENGTH && s.strength <= MAX_STRENGTH);
        if (MIN_STRENGTH..=MAX_STRENGTH).contains(&raw) {
            prop_assert_eq!(s.strength, raw);
        }
    }
}

// ── 2. Verdict rule ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn verdict_follows_threshold(score in 0u32..14, threshold in 1u32..14) {
        let v = verdict_for(score, threshold);
        if score >= threshold {
            prop_assert_eq!(v, Verdict::Enter);
        } else if score + 1 == threshold {
            prop_assert_eq!(v, Verdict::Wait);
        } else {
            prop_assert_eq!(v, Verdict::Skip);
        }
    }
}

// ── 3. Broker clamping ───────────────────────────────────────────────

proptest! {
    #[test]
    fn clamped_size_is_on_grid(
        size in -10.0..200.0_f64,
        min in 0.001..2.0_f64,
        step in prop_oneof![Just(0.01), Just(0.02), Just(0.05), Just(0.1)],
        max_steps in 1u32..5000,
    ) {
        let max = min + max_steps as f64 * step;
        let out = clamp_to_broker(size, min, max, step);
        prop_assert!(out >= min - 1e-7 && out <= max + 1e-7);
        let steps = out / step;
        prop_assert!((steps - steps.round()).abs() < 1e-6, "not a step multiple: {}", out);
        if size >= min + step && size <= max {
            prop_assert!(out <= size + 1e-9);
            prop_assert!(size - out < step + 1e-9);
        }
    }
}

// ── 4. Stop ratchet ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn stops_only_tighten(
        dir in arb_direction(),
        moves in prop::collection::vec(-0.0050..0.0050_f64, 1..40),
    ) {
        let mut pos = position(dir);
        let sign = dir.sign();
        for offset in moves {
            let before = pos.stop;
            let moved = pos.move_stop(pos.entry + offset);
            prop_assert!((pos.stop - before) * sign >= 0.0);
            if !moved {
                prop_assert_eq!(pos.stop, before);
            }
        }
    }
}

// ── 5. Adaptive threshold bounds ─────────────────────────────────────

proptest! {
    #[test]
    fn threshold_stays_in_band(
        index in 0i64..3,
        outcomes in prop::collection::vec(any::<bool>(), 0..60),
        vol in arb_volatility(),
    ) {
        let cfg = Config::default();
        let profile = AggressionProfile::select(index);
        let mut ctl = ThresholdController::new(&profile, &cfg.adaptation);
        for win in outcomes {
            ctl.on_outcome(win);
            let t = ctl.effective(vol);
            prop_assert!(t >= profile.confluence_threshold);
            prop_assert!(t <= profile.max_confluence_threshold);
        }
    }
}

// ── 6. Derived win rates ─────────────────────────────────────────────

proptest! {
    #[test]
    fn win_rate_matches_counts(results in prop::collection::vec(any::<bool>(), 1..100)) {
        let mut rec = PatternPerformanceRecord::new("star", Regime::Range);
        for win in &results {
            rec.record(*win);
        }
        let wins = results.iter().filter(|w| **w).count() as u32;
        prop_assert_eq!(rec.trades, results.len() as u32);
        prop_assert_eq!(rec.wins, wins);
        prop_assert_eq!(rec.win_rate.to_bits(), (wins as f64 / rec.trades as f64).to_bits());
    }
}

// ── 7. Monotone fill ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn fill_percentage_is_monotone(dir in arb_direction(), bars in arb_bars()) {
        let mut zone = ImbalanceZone {
            top: 101.0,
            bottom: 99.0,
            direction: dir,
            filled: false,
            fill_percentage: 0.0,
            visit_count: 0,
            first_visit: None,
            last_visit: None,
            formed_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        };
        for bar in &bars {
            let before = zone.fill_percentage;
            let was_filled = zone.filled;
            zone.update(bar);
            prop_assert!(zone.fill_percentage >= before);
            prop_assert!(zone.fill_percentage <= 100.0);
            prop_assert!(!was_filled || zone.filled);
        }
    }
}

// ── 8. Origin invalidation ───────────────────────────────────────────

proptest! {
    #[test]
    fn invalidation_is_permanent(max_tests in 1u32..5, bars in arb_bars()) {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let mut zone = OriginZone::new(100.5, 99.5, Direction::Long, at);
        let mut seen_invalid = false;
        for bar in &bars {
            zone.update(bar, max_tests);
            prop_assert!(zone.test_count <= max_tests);
            if seen_invalid {
                prop_assert!(!zone.is_active());
            }
            seen_invalid = zone.invalidated;
        }
    }
}

// ── 9. Score accounting ──────────────────────────────────────────────

fn arb_bias() -> impl Strategy<Value = Option<Bias>> {
    prop_oneof![
        Just(None),
        Just(Some(Bias::Bullish)),
        Just(Some(Bias::Bearish)),
        Just(Some(Bias::Neutral)),
    ]
}

proptest! {
    #[test]
    fn score_and_failures_cover_enabled_filters(
        mask in prop::collection::vec(any::<bool>(), FilterName::ALL.len()),
        bars in arb_bars(),
        dir in arb_direction(),
        strength in 1u8..=5,
        spread in prop::option::of(0.0..0.01_f64),
        higher_tf_bias in arb_bias(),
        correlated in 0usize..3,
        news_clear in any::<bool>(),
        vetoed in any::<bool>(),
    ) {
        let cfg = Config::default();
        let enabled: BTreeSet<FilterName> = FilterName::ALL
            .iter()
            .zip(&mask)
            .filter(|(_, on)| **on)
            .map(|(f, _)| *f)
            .collect();

        let series = BarSeries::new(bars);
        let last = series.last().cloned().unwrap();
        let signal =
            Signal::new("engulfing", dir, strength, last.close, last.timestamp, Timeframe::M15);
        let regime = RegimeClassifier::new(&cfg.regime).classify(&series);
        let structure = StructureMapper::new(&cfg.structure).map(&series);
        let mut zones = ZoneBook::new(&cfg.structure);
        zones.refresh(&series);
        let session = SessionReading {
            name: "london".into(),
            tradable: true,
            volatility_weight: 1.5,
        };

        let ctx = ConfluenceContext {
            signal: &signal,
            bars: series.as_slice(),
            regime: &regime,
            structure: &structure,
            zones: &zones,
            session: &session,
            quote: spread.map(|sp| Quote { bid: last.close, ask: last.close + sp }),
            typical_spread: 0.0001,
            higher_tf_bias,
            correlated_exposure: correlated,
            news_clear,
            pattern_vetoed: vetoed,
            min_signal_strength: 3,
            filters: &cfg.filters,
            structure_settings: &cfg.structure,
        };

        let scorer = ConfluenceScorer::new(enabled.clone(), cfg.signal_decay_bars);
        let profile = AggressionProfile::aggressive();
        let result = scorer.evaluate("EURUSD", Some(&ctx), &profile, 4, last.timestamp);

        prop_assert_eq!(result.score as usize + result.failed.len(), enabled.len());
        prop_assert_eq!(result.passed.len(), result.score as usize);
        prop_assert!(result.passed.iter().all(|f| !result.failed.contains(f)));
        prop_assert!(result.passed.iter().chain(&result.failed).all(|f| enabled.contains(f)));
    }
}

// ── 10. Managed stop ratchet ─────────────────────────────────────────

fn arb_swings() -> impl Strategy<Value = Vec<SwingLevel>> {
    prop::collection::vec((any::<bool>(), -0.0030..0.0090_f64), 0..8).prop_map(|raw| {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        raw.into_iter()
            .enumerate()
            .map(|(i, (high, offset))| SwingLevel {
                kind: if high { SwingType::High } else { SwingType::Low },
                price: 1.1000 + offset,
                timestamp: at + Duration::minutes(i as i64),
                index: i,
                priority: 1,
                swept: false,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn managed_stops_only_tighten(
        dir in arb_direction(),
        path in prop::collection::vec(-0.0030..0.0090_f64, 1..40),
        swings in arb_swings(),
    ) {
        let cfg = Config::default();
        let spec = InstrumentSpec::with_defaults("EURUSD");
        let planner = StopPlanner::new(&cfg.risk, &spec);
        let manager = LifecycleManager::new(&cfg.lifecycle);
        let snapshot = StructureSnapshot {
            swings,
            ..StructureSnapshot::default()
        };
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 13, 0, 0).unwrap();

        let mut pos = position(dir);
        let sign = dir.sign();
        for offset in path {
            let price = pos.entry + sign * offset;
            pos.observe(price);
            let actions = manager.plan(&pos, price, &snapshot, &planner, &spec);
            for action in &actions {
                let before = pos.stop;
                manager.commit(&mut pos, action, price, at, &spec);
                prop_assert!((pos.stop - before) * sign >= 0.0);
            }
            prop_assert!(pos.is_open());
        }
    }
}
