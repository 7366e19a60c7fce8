use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{InstrumentSpec, LifecycleSettings};
use crate::core::stops::StopPlanner;
use crate::core::structure::StructureSnapshot;
use crate::exchange::PositionHandle;
use crate::models::{CloseReason, Direction, LifecycleState, Regime};
use crate::trading::risk::clamp_to_broker;
use crate::trading::trade_record::TradeOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub instrument: String,
    pub handle: PositionHandle,
    pub direction: Direction,
    pub entry: f64,
    pub initial_stop: f64,
    pub stop: f64,
    pub targets: Vec<f64>,
    pub size: f64,
    pub remaining_size: f64,
    pub state: LifecycleState,
    pub partial_realized: bool,
    pub profit_locked: bool,
    pub pattern: String,
    pub regime: Regime,
    pub opened_at: DateTime<Utc>,
    /// Most favourable price seen since entry
    pub best_price: f64,
    #[serde(default)]
    pub realized_pnl: f64,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.state != LifecycleState::Closed
    }

    pub fn initial_risk(&self) -> f64 {
        (self.entry - self.initial_stop).abs()
    }

    /// Favourable move from entry in units of initial risk.
    pub fn r_multiple(&self, price: f64) -> f64 {
        let risk = self.initial_risk();
        if risk > 0.0 {
            (price - self.entry) * self.direction.sign() / risk
        } else {
            0.0
        }
    }

    pub fn unrealized_pnl(&self, price: f64, spec: &InstrumentSpec) -> f64 {
        money(self.direction, self.entry, price, self.remaining_size, spec)
    }

    /// Track the best price. Returns true if it moved.
    pub fn observe(&mut self, price: f64) -> bool {
        if (price - self.best_price) * self.direction.sign() > 0.0 {
            self.best_price = price;
            true
        } else {
            false
        }
    }

    pub fn target_reached(&self, price: f64) -> bool {
        self.targets
            .first()
            .map(|t| (price - t) * self.direction.sign() >= 0.0)
            .unwrap_or(false)
    }

    /// Move the stop. Only profit-protecting moves are accepted.
    pub fn move_stop(&mut self, stop: f64) -> bool {
        if is_protective_move(self.direction, self.stop, stop) {
            self.stop = stop;
            true
        } else {
            false
        }
    }

    pub fn realize_partial(&mut self, size: f64, price: f64, spec: &InstrumentSpec) -> f64 {
        let size = size.min(self.remaining_size);
        let pnl = money(self.direction, self.entry, price, size, spec);
        self.remaining_size = round8(self.remaining_size - size);
        self.realized_pnl += pnl;
        self.partial_realized = true;
        pnl
    }

    /// Close what remains and build the outcome handed to adaptation and risk.
    pub fn close(
        &mut self,
        price: f64,
        reason: CloseReason,
        at: DateTime<Utc>,
        spec: &InstrumentSpec,
    ) -> TradeOutcome {
        let pnl = money(self.direction, self.entry, price, self.remaining_size, spec);
        self.realized_pnl += pnl;
        self.remaining_size = 0.0;
        self.state = LifecycleState::Closed;

        let risk_money = money(
            self.direction,
            self.initial_stop,
            self.entry,
            self.size,
            spec,
        );
        let r_multiple = if risk_money > 0.0 {
            self.realized_pnl / risk_money
        } else {
            0.0
        };

        TradeOutcome {
            position_id: self.id,
            instrument: self.instrument.clone(),
            pattern: self.pattern.clone(),
            regime: self.regime,
            direction: self.direction,
            entry: self.entry,
            exit: price,
            pnl: self.realized_pnl,
            r_multiple,
            reason,
            opened_at: Some(self.opened_at),
            closed_at: at,
        }
    }
}

/// Money value of a move from `from` to `to` for `size` lots.
pub fn money(direction: Direction, from: f64, to: f64, size: f64, spec: &InstrumentSpec) -> f64 {
    let ticks = (to - from) * direction.sign() / spec.tick_size.max(f64::EPSILON);
    ticks * spec.tick_value * size
}

/// A stop move that reduces risk: up for longs, down for shorts.
pub fn is_protective_move(direction: Direction, current: f64, proposed: f64) -> bool {
    proposed.is_finite() && (proposed - current) * direction.sign() > 0.0
}

/// One step the lifecycle wants taken. Gateway-backed actions are applied to
/// the position only after the gateway confirms them.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleAction {
    CloseAll { reason: CloseReason },
    ClosePartial { size: f64 },
    /// Split below lot minimum; the partial is marked done without an order
    SkipPartial,
    ModifyStop {
        stop: f64,
        state: LifecycleState,
        lock: bool,
    },
    /// State advance with no better stop to send
    Advance { state: LifecycleState },
}

pub struct LifecycleManager {
    settings: LifecycleSettings,
}

impl LifecycleManager {
    pub fn new(settings: &LifecycleSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Work out what to do with a position at `price`. Pure: nothing is
    /// changed until [`LifecycleManager::commit`].
    pub fn plan(
        &self,
        pos: &Position,
        price: f64,
        snapshot: &StructureSnapshot,
        planner: &StopPlanner,
        spec: &InstrumentSpec,
    ) -> Vec<LifecycleAction> {
        if !pos.is_open() {
            return Vec::new();
        }
        if snapshot.break_against(pos.direction) {
            return vec![LifecycleAction::CloseAll {
                reason: CloseReason::StructureBreak,
            }];
        }

        let s = &self.settings;
        let sign = pos.direction.sign();
        let mut actions = Vec::new();

        if !pos.partial_realized && pos.target_reached(price) {
            let wanted = clamp_partial(pos.remaining_size * s.partial_fraction, spec);
            let left = pos.remaining_size - wanted;
            if wanted >= spec.lot_min && left >= spec.lot_min - 1e-9 {
                actions.push(LifecycleAction::ClosePartial { size: wanted });
            } else {
                actions.push(LifecycleAction::SkipPartial);
            }
        }

        let best = if (price - pos.best_price) * sign > 0.0 {
            price
        } else {
            pos.best_price
        };
        let r = pos.r_multiple(price);
        let better = |a: Option<f64>, b: f64| match a {
            Some(a) if (a - b) * sign >= 0.0 => Some(a),
            _ => Some(b),
        };

        let mut candidate: Option<f64> = None;
        let mut state = pos.state;
        let mut lock = false;

        if pos.state == LifecycleState::Open && r >= s.breakeven_trigger_r {
            let level = pos.entry + sign * s.breakeven_buffer_ticks * spec.tick_size;
            candidate = better(candidate, level);
            state = LifecycleState::BreakevenArmed;
        }

        if r >= s.trail_trigger_r {
            let from = candidate.unwrap_or(pos.stop);
            let from = if (pos.stop - from) * sign > 0.0 { pos.stop } else { from };
            let level =
                planner.trailing_level(pos.direction, from, price, snapshot, s.trail_lookback);
            if let Some(level) = level {
                candidate = better(candidate, level);
            }
            state = LifecycleState::Trailing;
        }

        if !pos.profit_locked {
            let by_r = pos.r_multiple(best) >= s.lock_trigger_r;
            let by_money = s
                .lock_trigger_money
                .map(|m| pos.unrealized_pnl(price, spec) >= m)
                .unwrap_or(false);
            if by_r || by_money {
                let excursion = (best - pos.entry) * sign;
                let level = pos.entry + sign * s.lock_fraction * excursion;
                candidate = better(candidate, level);
                lock = true;
            }
        }

        match candidate {
            Some(stop) if is_protective_move(pos.direction, pos.stop, stop) => {
                actions.push(LifecycleAction::ModifyStop { stop, state, lock });
            }
            _ if state != pos.state => actions.push(LifecycleAction::Advance { state }),
            _ => {}
        }

        actions
    }

    /// Apply an action the gateway has accepted. Returns the outcome when
    /// the position closed.
    pub fn commit(
        &self,
        pos: &mut Position,
        action: &LifecycleAction,
        price: f64,
        at: DateTime<Utc>,
        spec: &InstrumentSpec,
    ) -> Option<TradeOutcome> {
        match action {
            LifecycleAction::CloseAll { reason } => {
                let outcome = pos.close(price, *reason, at, spec);
                info!(
                    "Position #{} {} {} closed ({}) @ {:.5}: pnl {:.2} ({:+.2}R)",
                    pos.id, pos.instrument, pos.direction, reason, price, outcome.pnl, outcome.r_multiple
                );
                Some(outcome)
            }
            LifecycleAction::ClosePartial { size } => {
                let pnl = pos.realize_partial(*size, price, spec);
                info!(
                    "Position #{} partial {:.2} lots @ {:.5}: pnl {:.2}, {:.2} remaining",
                    pos.id, size, price, pnl, pos.remaining_size
                );
                None
            }
            LifecycleAction::SkipPartial => {
                pos.partial_realized = true;
                debug!("Position #{} partial skipped: size cannot be split", pos.id);
                None
            }
            LifecycleAction::ModifyStop { stop, state, lock } => {
                let old = pos.stop;
                if pos.move_stop(*stop) {
                    pos.state = *state;
                    if *lock {
                        pos.profit_locked = true;
                    }
                    info!(
                        "Position #{} stop {:.5} -> {:.5} [{}]",
                        pos.id, old, stop, pos.state
                    );
                }
                None
            }
            LifecycleAction::Advance { state } => {
                pos.state = *state;
                None
            }
        }
    }
}

fn clamp_partial(size: f64, spec: &InstrumentSpec) -> f64 {
    if size < spec.lot_min {
        return 0.0;
    }
    clamp_to_broker(size, spec.lot_min, spec.lot_max, spec.lot_step)
}

fn round8(x: f64) -> f64 {
    (x * 1e8).round() / 1e8
}
