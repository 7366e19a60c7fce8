use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CloseReason, Direction, Regime};

/// What a closed position hands to adaptation and risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub position_id: u64,
    pub instrument: String,
    pub pattern: String,
    pub regime: Regime,
    pub direction: Direction,
    pub entry: f64,
    pub exit: f64,
    /// Realized P&L including any partial close
    pub pnl: f64,
    /// P&L in units of initial risk
    pub r_multiple: f64,
    pub reason: CloseReason,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: DateTime<Utc>,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
