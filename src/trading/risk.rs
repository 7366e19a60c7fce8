use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{InstrumentSpec, RiskSettings, SizingMode};
use crate::core::stops::{clamp_distance, min_stop_distance};
use crate::models::VolatilityRegime;

/// Why a new entry was refused.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Refusal {
    #[error("daily loss {loss:.2} reached limit {limit:.2}")]
    DailyLoss { loss: f64, limit: f64 },

    #[error("weekly loss {loss:.2} reached limit {limit:.2}")]
    WeeklyLoss { loss: f64, limit: f64 },

    #[error("{open} open positions, profile cap {cap}")]
    MaxPositions { open: usize, cap: usize },

    #[error("{open} open on {instrument}, cap {cap}")]
    PerInstrument {
        instrument: String,
        open: usize,
        cap: usize,
    },

    #[error("{open} correlated positions in the same direction, cap {cap}")]
    Correlation { open: usize, cap: usize },
}

/// Open-position counts relevant to a prospective entry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Exposure {
    pub total: usize,
    pub on_instrument: usize,
    /// Same-direction positions across the instrument's correlation group
    pub correlated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub day_key: Option<NaiveDate>,
    pub day_start_balance: f64,
    /// ISO (year, week)
    pub week_key: Option<(i32, u32)>,
    pub week_start_balance: f64,
    pub consecutive_wins: u32,
    pub consecutive_losses: u32,
    pub peak_balance: f64,
    pub risk_multiplier: f64,
}

impl RiskState {
    pub fn new(balance: f64) -> Self {
        Self {
            day_key: None,
            day_start_balance: balance,
            week_key: None,
            week_start_balance: balance,
            consecutive_wins: 0,
            consecutive_losses: 0,
            peak_balance: balance,
            risk_multiplier: 1.0,
        }
    }
}

pub struct RiskManager {
    settings: RiskSettings,
    pub state: RiskState,
}

impl RiskManager {
    pub fn new(settings: &RiskSettings, balance: f64) -> Self {
        Self {
            settings: settings.clone(),
            state: RiskState::new(balance),
        }
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    /// New limits; period balances and streaks carry over.
    pub fn reconfigure(&mut self, settings: &RiskSettings) {
        self.settings = settings.clone();
    }

    /// Start a new daily / weekly period when the calendar key changes.
    /// Calling this repeatedly inside one period is a no-op.
    pub fn roll_periods(&mut self, now: DateTime<Utc>, balance: f64) {
        let day = now.date_naive();
        if self.state.day_key != Some(day) {
            if self.state.day_key.is_some() {
                info!("New trading day {}: start balance {:.2}", day, balance);
            }
            self.state.day_key = Some(day);
            self.state.day_start_balance = balance;
        }

        let iso = now.iso_week();
        let week = (iso.year(), iso.week());
        if self.state.week_key != Some(week) {
            if self.state.week_key.is_some() {
                info!("New trading week {}-W{:02}: start balance {:.2}", week.0, week.1, balance);
            }
            self.state.week_key = Some(week);
            self.state.week_start_balance = balance;
        }
    }

    pub fn daily_loss(&self, balance: f64) -> f64 {
        (self.state.day_start_balance - balance).max(0.0)
    }

    pub fn weekly_loss(&self, balance: f64) -> f64 {
        (self.state.week_start_balance - balance).max(0.0)
    }

    /// Gate a new entry. Loss limits are checked first since they halt
    /// trading outright.
    pub fn check_entry(
        &mut self,
        now: DateTime<Utc>,
        balance: f64,
        instrument: &str,
        exposure: Exposure,
        max_positions: usize,
        max_correlated: usize,
    ) -> Result<(), Refusal> {
        self.roll_periods(now, balance);

        let limit = self.state.day_start_balance * self.settings.daily_loss_limit;
        let loss = self.daily_loss(balance);
        if limit > 0.0 && loss >= limit {
            return Err(Refusal::DailyLoss { loss, limit });
        }

        let limit = self.state.week_start_balance * self.settings.weekly_loss_limit;
        let loss = self.weekly_loss(balance);
        if limit > 0.0 && loss >= limit {
            return Err(Refusal::WeeklyLoss { loss, limit });
        }

        if exposure.total >= max_positions {
            return Err(Refusal::MaxPositions {
                open: exposure.total,
                cap: max_positions,
            });
        }

        if exposure.on_instrument >= self.settings.max_per_instrument {
            return Err(Refusal::PerInstrument {
                instrument: instrument.to_string(),
                open: exposure.on_instrument,
                cap: self.settings.max_per_instrument,
            });
        }

        if exposure.correlated >= max_correlated {
            return Err(Refusal::Correlation {
                open: exposure.correlated,
                cap: max_correlated,
            });
        }

        Ok(())
    }

    /// Multiplicative reductions for drawdown, loss streak and high
    /// volatility, floored at `min_risk_multiplier`.
    pub fn update_multiplier(&mut self, balance: f64, volatility: VolatilityRegime) -> f64 {
        let s = &self.settings;
        let mut m = 1.0;

        let peak = self.state.peak_balance;
        if peak > 0.0 && (peak - balance) / peak > s.drawdown_threshold {
            m *= s.drawdown_factor;
        }
        if s.loss_streak_threshold > 0 && self.state.consecutive_losses >= s.loss_streak_threshold {
            m *= s.loss_streak_factor;
        }
        if volatility == VolatilityRegime::High {
            m *= s.high_volatility_factor;
        }

        let m = m.max(s.min_risk_multiplier);
        if (m - self.state.risk_multiplier).abs() > 1e-12 {
            info!("Risk multiplier {:.3} -> {:.3}", self.state.risk_multiplier, m);
        }
        self.state.risk_multiplier = m;
        m
    }

    /// Lot size for a trade with the given stop distance (price units).
    pub fn position_size(
        &self,
        balance: f64,
        stop_distance: f64,
        spec: &InstrumentSpec,
        profile_multiplier: f64,
    ) -> f64 {
        let distance = clamp_distance(stop_distance, min_stop_distance(&self.settings, spec));

        let base = match &self.settings.sizing {
            SizingMode::FixedLot { lot, min, max } => lot.clamp(*min, max.max(*min)),
            SizingMode::EquityPercent { percent } => {
                let risk_amount = balance.max(0.0) * percent / 100.0;
                let ticks = distance / spec.tick_size.max(f64::EPSILON);
                let per_lot = ticks * spec.tick_value;
                if per_lot > 0.0 {
                    risk_amount / per_lot
                } else {
                    warn!("{}: zero tick value, sizing at broker minimum", spec.symbol);
                    spec.lot_min
                }
            }
        };

        let raw = base * profile_multiplier * self.state.risk_multiplier;
        clamp_to_broker(raw, spec.lot_min, spec.lot_max, spec.lot_step)
    }

    /// Update streaks and the equity peak after a close.
    pub fn record_close(&mut self, pnl: f64, balance: f64) {
        if pnl > 0.0 {
            self.state.consecutive_wins += 1;
            self.state.consecutive_losses = 0;
        } else {
            self.state.consecutive_losses += 1;
            self.state.consecutive_wins = 0;
        }
        self.state.peak_balance = self.state.peak_balance.max(balance);
    }
}

/// Round down to a whole multiple of `step` and keep within `[min, max]`.
/// The bounds themselves are snapped inward onto the step grid.
pub fn clamp_to_broker(size: f64, min: f64, max: f64, step: f64) -> f64 {
    let max = max.max(min);
    let size = if size.is_finite() { size } else { min };
    if step <= 0.0 {
        return round8(size.clamp(min, max));
    }
    let lo = (min / step - 1e-9).ceil() * step;
    let hi = (max / step + 1e-9).floor() * step;
    if lo > hi {
        // No multiple of the step fits the broker range
        return round8(min);
    }
    let stepped = (size / step + 1e-9).floor() * step;
    round8(stepped.clamp(lo, hi))
}

fn round8(x: f64) -> f64 {
    (x * 1e8).round() / 1e8
}
