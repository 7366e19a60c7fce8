use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::{Config, SessionWindow};

pub const OFF_SESSION: &str = "off_session";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReading {
    pub name: String,
    pub tradable: bool,
    pub volatility_weight: f64,
}

/// Buckets a timestamp into the configured sessions. Windows are checked in
/// declaration order and the first match wins.
pub struct SessionManager {
    tz: Tz,
    windows: Vec<SessionWindow>,
    off_session_tradable: bool,
    off_session_weight: f64,
}

impl SessionManager {
    pub fn new(cfg: &Config) -> Self {
        Self {
            tz: cfg.session_tz,
            windows: cfg.sessions.clone(),
            off_session_tradable: cfg.off_session_tradable,
            off_session_weight: cfg.off_session_weight,
        }
    }

    pub fn classify(&self, utc_now: DateTime<Utc>) -> SessionReading {
        let local = utc_now.with_timezone(&self.tz);
        let minute_of_day = local.hour() * 60 + local.minute();

        for window in &self.windows {
            let start = window.start.0 * 60 + window.start.1;
            let end = window.end.0 * 60 + window.end.1;

            let inside = if start < end {
                minute_of_day >= start && minute_of_day < end
            } else {
                // Wraps midnight
                minute_of_day >= start || minute_of_day < end
            };

            if inside {
                return SessionReading {
                    name: window.name.clone(),
                    tradable: window.tradable,
                    volatility_weight: window.volatility_weight,
                };
            }
        }

        SessionReading {
            name: OFF_SESSION.to_string(),
            tradable: self.off_session_tradable,
            volatility_weight: self.off_session_weight,
        }
    }
}
