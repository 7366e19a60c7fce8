use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

use crate::models::Timeframe;
use crate::strategies::confluence::FilterName;
use crate::strategies::profiles::ProfileOverrides;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWindow {
    pub name: String,
    /// (hour, minute) in the session timezone
    pub start: (u32, u32),
    pub end: (u32, u32),
    pub tradable: bool,
    pub volatility_weight: f64,
}

impl SessionWindow {
    fn new(name: &str, start: (u32, u32), end: (u32, u32), tradable: bool, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            start,
            end,
            tradable,
            volatility_weight: weight,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub tick_size: f64,
    /// Account-currency value of one tick for one lot
    pub tick_value: f64,
    pub lot_min: f64,
    pub lot_max: f64,
    pub lot_step: f64,
    pub typical_spread: f64,
}

impl InstrumentSpec {
    pub fn with_defaults(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            tick_size: 0.0001,
            tick_value: 10.0,
            lot_min: 0.01,
            lot_max: 50.0,
            lot_step: 0.01,
            typical_spread: 0.0001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSettings {
    pub window: usize,
    pub swing_lookback: usize,
    pub equal_level_tolerance: f64,
    pub min_gap_percent: f64,
    pub origin_min_run: usize,
    pub origin_max_tests: u32,
    pub zone_capacity: usize,
    pub sweep_lookback: usize,
    pub false_breakout_lookback: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSettings {
    pub ma_period: usize,
    pub slope_lookback: usize,
    pub atr_period: usize,
    pub atr_baseline: usize,
    /// |slope| in ATR units above which the market is trending
    pub trend_slope: f64,
    /// |slope| in ATR units at or below which the market is ranging
    pub range_slope: f64,
    pub vol_low: f64,
    pub vol_high: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSettings {
    pub enabled: BTreeSet<FilterName>,
    pub volume_period: usize,
    pub volume_ratio_min: f64,
    /// Spread acceptable while it stays under this multiple of the typical spread
    pub max_spread_factor: f64,
    /// Entry must sit within this many ATRs of a zone or priority swing
    pub proximity_atr: f64,
    pub correlation_groups: Vec<Vec<String>>,
    pub max_correlated: usize,
    pub news_events: Vec<DateTime<Utc>>,
    pub news_window_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SizingMode {
    FixedLot { lot: f64, min: f64, max: f64 },
    EquityPercent { percent: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettings {
    pub sizing: SizingMode,
    /// Fraction of period-start balance
    pub daily_loss_limit: f64,
    pub weekly_loss_limit: f64,
    pub max_per_instrument: usize,
    pub drawdown_threshold: f64,
    pub drawdown_factor: f64,
    pub loss_streak_threshold: u32,
    pub loss_streak_factor: f64,
    pub high_volatility_factor: f64,
    pub min_risk_multiplier: f64,
    /// Minimum stop distance in ticks; every divisor is clamped to this
    pub min_stop_ticks: f64,
    pub stop_atr_buffer: f64,
    pub fallback_stop_atr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    pub breakeven_trigger_r: f64,
    pub breakeven_buffer_ticks: f64,
    pub trail_trigger_r: f64,
    pub trail_lookback: usize,
    pub partial_fraction: f64,
    pub lock_trigger_r: f64,
    pub lock_trigger_money: Option<f64>,
    pub lock_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationSettings {
    pub min_samples: u32,
    pub loss_streak_step: u32,
    pub win_streak_step: u32,
    pub high_volatility_bump: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub instruments: Vec<InstrumentSpec>,
    pub entry_timeframe: Timeframe,
    pub initial_balance: f64,

    // Aggression profile
    pub profile_index: i64,
    pub profile_overrides: ProfileOverrides,

    // Patterns
    pub pattern_ranking: Vec<String>,
    pub signal_decay_bars: u32,

    // Sessions
    pub session_tz: Tz,
    pub sessions: Vec<SessionWindow>,
    pub off_session_tradable: bool,
    pub off_session_weight: f64,

    pub structure: StructureSettings,
    pub regime: RegimeSettings,
    pub filters: FilterSettings,
    pub risk: RiskSettings,
    pub lifecycle: LifecycleSettings,
    pub adaptation: AdaptationSettings,

    // Persistence / runtime
    pub data_dir: String,
    pub flush_interval_secs: u64,
    pub gateway_timeout_ms: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Missing or unparsable values fall
    /// back to defaults; out-of-range values are clamped with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        let instruments: Vec<InstrumentSpec> = split_list(&env("INSTRUMENTS", "EURUSD"))
            .iter()
            .map(|symbol| {
                let mut spec = InstrumentSpec::with_defaults(symbol);
                spec.tick_size = env("TICK_SIZE", "0.0001").parse().unwrap_or(spec.tick_size);
                spec.tick_value = env("TICK_VALUE", "10").parse().unwrap_or(spec.tick_value);
                spec.lot_min = env("LOT_MIN", "0.01").parse().unwrap_or(spec.lot_min);
                spec.lot_max = env("LOT_MAX", "50").parse().unwrap_or(spec.lot_max);
                spec.lot_step = env("LOT_STEP", "0.01").parse().unwrap_or(spec.lot_step);
                spec.typical_spread = env("TYPICAL_SPREAD", "0.0001")
                    .parse()
                    .unwrap_or(spec.typical_spread);
                sanitize_instrument(spec)
            })
            .collect();

        let entry_timeframe = match Timeframe::from_str_loose(&env("ENTRY_TIMEFRAME", "15m")) {
            Some(tf) => tf,
            None => {
                warn!("Unknown ENTRY_TIMEFRAME, using 15m");
                Timeframe::M15
            }
        };

        let session_tz = match env("SESSION_TZ", "America/New_York").parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!("Unknown SESSION_TZ, using America/New_York");
                chrono_tz::America::New_York
            }
        };

        let sessions = vec![
            SessionWindow::new("asian", (19, 0), (2, 0), false, 0.5),
            SessionWindow::new("london", (2, 0), (5, 0), true, 1.5),
            SessionWindow::new("new_york", (7, 0), (11, 0), true, 1.5),
            SessionWindow::new("ny_afternoon", (11, 0), (16, 0), true, 1.0),
        ];

        let enabled = match lookup("ENABLED_FILTERS") {
            Some(raw) => parse_filter_set(&raw),
            None => FilterName::ALL.iter().copied().collect(),
        };

        let profile_overrides = ProfileOverrides {
            confluence_threshold: lookup("CONFLUENCE_THRESHOLD").and_then(|v| v.parse().ok()),
            risk_multiplier: lookup("RISK_MULTIPLIER").and_then(|v| v.parse().ok()),
            min_signal_strength: lookup("MIN_SIGNAL_STRENGTH").and_then(|v| v.parse().ok()),
            mandatory_filters: lookup("MANDATORY_FILTERS").map(|v| parse_filter_set(&v)),
            max_positions: lookup("MAX_POSITIONS").and_then(|v| v.parse().ok()),
            target_multiplier: lookup("TARGET_MULTIPLIER").and_then(|v| v.parse().ok()),
        };

        let sizing = match env("SIZING_MODE", "equity_percent").as_str() {
            "fixed_lot" => SizingMode::FixedLot {
                lot: env("FIXED_LOT", "0.1").parse().unwrap_or(0.1),
                min: env("FIXED_LOT_MIN", "0.01").parse().unwrap_or(0.01),
                max: env("FIXED_LOT_MAX", "1.0").parse().unwrap_or(1.0),
            },
            "equity_percent" => SizingMode::EquityPercent {
                percent: env("RISK_PERCENT", "1.0").parse().unwrap_or(1.0),
            },
            other => {
                warn!("Unknown SIZING_MODE '{}', using equity_percent", other);
                SizingMode::EquityPercent {
                    percent: env("RISK_PERCENT", "1.0").parse().unwrap_or(1.0),
                }
            }
        };

        let partial_fraction = clamp_warn(
            "PARTIAL_FRACTION",
            env("PARTIAL_FRACTION", "0.5").parse().unwrap_or(0.5),
            0.0,
            1.0,
        );
        let lock_fraction = clamp_warn(
            "LOCK_FRACTION",
            env("LOCK_FRACTION", "0.5").parse().unwrap_or(0.5),
            0.0,
            1.0,
        );

        Config {
            instruments,
            entry_timeframe,
            initial_balance: env("INITIAL_BALANCE", "10000").parse().unwrap_or(10_000.0),
            profile_index: env("AGGRESSION_LEVEL", "1").parse().unwrap_or(1),
            profile_overrides,
            pattern_ranking: lookup("PATTERN_RANKING")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            signal_decay_bars: env("SIGNAL_DECAY_BARS", "3").parse().unwrap_or(3),
            session_tz,
            sessions,
            off_session_tradable: env("OFF_SESSION_TRADABLE", "false").to_lowercase() == "true",
            off_session_weight: 0.3,
            structure: StructureSettings {
                window: env("STRUCTURE_WINDOW", "100").parse().unwrap_or(100),
                swing_lookback: env("SWING_LOOKBACK", "5").parse().unwrap_or(5),
                equal_level_tolerance: env("EQUAL_LEVEL_TOLERANCE", "0.0005")
                    .parse()
                    .unwrap_or(0.0005),
                min_gap_percent: env("MIN_GAP_PERCENT", "0.0002").parse().unwrap_or(0.0002),
                origin_min_run: env("ORIGIN_MIN_RUN", "3").parse().unwrap_or(3),
                origin_max_tests: env("ORIGIN_MAX_TESTS", "3").parse::<u32>().unwrap_or(3).max(1),
                zone_capacity: env("ZONE_CAPACITY", "50").parse::<usize>().unwrap_or(50).max(1),
                sweep_lookback: env("SWEEP_LOOKBACK", "5").parse().unwrap_or(5),
                false_breakout_lookback: env("FALSE_BREAKOUT_LOOKBACK", "3")
                    .parse()
                    .unwrap_or(3),
            },
            regime: RegimeSettings {
                ma_period: env("MA_PERIOD", "50").parse().unwrap_or(50),
                slope_lookback: env("SLOPE_LOOKBACK", "10").parse().unwrap_or(10),
                atr_period: env("ATR_PERIOD", "14").parse().unwrap_or(14),
                atr_baseline: env("ATR_BASELINE", "50").parse().unwrap_or(50),
                trend_slope: env("TREND_SLOPE", "1.0").parse().unwrap_or(1.0),
                range_slope: env("RANGE_SLOPE", "0.3").parse().unwrap_or(0.3),
                vol_low: env("VOL_LOW", "0.7").parse().unwrap_or(0.7),
                vol_high: env("VOL_HIGH", "1.5").parse().unwrap_or(1.5),
            },
            filters: FilterSettings {
                enabled,
                volume_period: env("VOLUME_PERIOD", "20").parse().unwrap_or(20),
                volume_ratio_min: env("VOLUME_RATIO_MIN", "1.5").parse().unwrap_or(1.5),
                max_spread_factor: env("MAX_SPREAD_FACTOR", "2.0").parse().unwrap_or(2.0),
                proximity_atr: env("PROXIMITY_ATR", "1.0").parse().unwrap_or(1.0),
                correlation_groups: parse_groups(&env("CORRELATION_GROUPS", "")),
                max_correlated: env("MAX_CORRELATED", "1").parse().unwrap_or(1),
                news_events: parse_timestamps(&env("NEWS_EVENTS", "")),
                news_window_minutes: env("NEWS_WINDOW_MINUTES", "30").parse().unwrap_or(30),
            },
            risk: RiskSettings {
                sizing,
                daily_loss_limit: env("DAILY_LOSS_LIMIT", "0.03").parse().unwrap_or(0.03),
                weekly_loss_limit: env("WEEKLY_LOSS_LIMIT", "0.06").parse().unwrap_or(0.06),
                max_per_instrument: env("MAX_PER_INSTRUMENT", "1").parse().unwrap_or(1),
                drawdown_threshold: env("DRAWDOWN_THRESHOLD", "0.10").parse().unwrap_or(0.10),
                drawdown_factor: 0.5,
                loss_streak_threshold: env("LOSS_STREAK_THRESHOLD", "3").parse().unwrap_or(3),
                loss_streak_factor: 0.5,
                high_volatility_factor: 0.75,
                min_risk_multiplier: env("MIN_RISK_MULTIPLIER", "0.25")
                    .parse()
                    .unwrap_or(0.25),
                min_stop_ticks: env("MIN_STOP_TICKS", "5").parse::<f64>().unwrap_or(5.0).max(1.0),
                stop_atr_buffer: env("STOP_ATR_BUFFER", "0.2").parse().unwrap_or(0.2),
                fallback_stop_atr: env("FALLBACK_STOP_ATR", "1.5").parse().unwrap_or(1.5),
            },
            lifecycle: LifecycleSettings {
                breakeven_trigger_r: env("BREAKEVEN_TRIGGER_R", "1.0").parse().unwrap_or(1.0),
                breakeven_buffer_ticks: env("BREAKEVEN_BUFFER_TICKS", "2").parse().unwrap_or(2.0),
                trail_trigger_r: env("TRAIL_TRIGGER_R", "2.0").parse().unwrap_or(2.0),
                trail_lookback: env("TRAIL_LOOKBACK", "3").parse().unwrap_or(3),
                partial_fraction,
                lock_trigger_r: env("LOCK_TRIGGER_R", "3.0").parse().unwrap_or(3.0),
                lock_trigger_money: lookup("LOCK_TRIGGER_MONEY").and_then(|v| v.parse().ok()),
                lock_fraction,
            },
            adaptation: AdaptationSettings {
                min_samples: env("MIN_PATTERN_SAMPLES", "10").parse().unwrap_or(10),
                loss_streak_step: env("LOSS_STREAK_STEP", "3").parse::<u32>().unwrap_or(3).max(1),
                win_streak_step: env("WIN_STREAK_STEP", "5").parse::<u32>().unwrap_or(5).max(1),
                high_volatility_bump: env("HIGH_VOL_THRESHOLD_BUMP", "1").parse().unwrap_or(1),
            },
            data_dir: env("DATA_DIR", "data"),
            flush_interval_secs: env("PERFORMANCE_FLUSH_SECS", "300").parse().unwrap_or(300),
            gateway_timeout_ms: env("GATEWAY_TIMEOUT_MS", "2000").parse().unwrap_or(2000),
            log_level: env("LOG_LEVEL", "INFO"),
        }
    }

    pub fn instrument(&self, symbol: &str) -> Option<&InstrumentSpec> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }

    /// Correlation group containing `symbol`, if any.
    pub fn correlation_group(&self, symbol: &str) -> Option<&[String]> {
        self.filters
            .correlation_groups
            .iter()
            .find(|g| g.iter().any(|s| s == symbol))
            .map(|g| g.as_slice())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_filter_set(raw: &str) -> BTreeSet<FilterName> {
    split_list(raw)
        .iter()
        .filter_map(|name| match name.parse::<FilterName>() {
            Ok(f) => Some(f),
            Err(_) => {
                warn!("Ignoring unknown filter name '{}'", name);
                None
            }
        })
        .collect()
}

/// "EURUSD|GBPUSD;XAUUSD|XAGUSD"
fn parse_groups(raw: &str) -> Vec<Vec<String>> {
    raw.split(';')
        .map(|g| {
            g.split('|')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|g| g.len() > 1)
        .collect()
}

fn parse_timestamps(raw: &str) -> Vec<DateTime<Utc>> {
    split_list(raw)
        .iter()
        .filter_map(|s| match DateTime::parse_from_rfc3339(s) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(_) => {
                warn!("Ignoring unparsable news timestamp '{}'", s);
                None
            }
        })
        .collect()
}

fn clamp_warn(key: &str, value: f64, min: f64, max: f64) -> f64 {
    if value < min || value > max || value.is_nan() {
        let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
        warn!("{}={} out of range [{}, {}], clamped to {}", key, value, min, max, clamped);
        clamped
    } else {
        value
    }
}

fn sanitize_instrument(mut spec: InstrumentSpec) -> InstrumentSpec {
    if spec.tick_size <= 0.0 {
        warn!("{}: non-positive tick size, using 0.0001", spec.symbol);
        spec.tick_size = 0.0001;
    }
    if spec.lot_step <= 0.0 {
        warn!("{}: non-positive lot step, using 0.01", spec.symbol);
        spec.lot_step = 0.01;
    }
    if spec.lot_min > spec.lot_max {
        warn!("{}: lot_min above lot_max, swapping", spec.symbol);
        std::mem::swap(&mut spec.lot_min, &mut spec.lot_max);
    }
    spec
}
