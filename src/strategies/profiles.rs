use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::strategies::confluence::FilterName;
use crate::strategies::signals::{MAX_STRENGTH, MIN_STRENGTH};

/// How permissive the engine is. Built once and swapped wholesale on
/// reconfiguration, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggressionProfile {
    pub name: String,
    pub confluence_threshold: u32,
    /// Ceiling for the adaptive threshold
    pub max_confluence_threshold: u32,
    pub risk_multiplier: f64,
    pub min_signal_strength: u8,
    pub mandatory_filters: BTreeSet<FilterName>,
    pub max_positions: usize,
    pub target_multiplier: f64,
}

/// Operator overrides applied on top of a preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileOverrides {
    pub confluence_threshold: Option<u32>,
    pub risk_multiplier: Option<f64>,
    pub min_signal_strength: Option<u8>,
    pub mandatory_filters: Option<BTreeSet<FilterName>>,
    pub max_positions: Option<usize>,
    pub target_multiplier: Option<f64>,
}

pub const PRESET_NAMES: [&str; 3] = ["conservative", "balanced", "aggressive"];

impl AggressionProfile {
    pub fn conservative() -> Self {
        Self {
            name: "conservative".to_string(),
            confluence_threshold: 7,
            max_confluence_threshold: 10,
            risk_multiplier: 0.5,
            min_signal_strength: 4,
            mandatory_filters: [FilterName::RegimeAligned, FilterName::Session, FilterName::News]
                .into_iter()
                .collect(),
            max_positions: 1,
            target_multiplier: 2.0,
        }
    }

    pub fn balanced() -> Self {
        Self {
            name: "balanced".to_string(),
            confluence_threshold: 5,
            max_confluence_threshold: 8,
            risk_multiplier: 1.0,
            min_signal_strength: 3,
            mandatory_filters: [FilterName::Session, FilterName::News].into_iter().collect(),
            max_positions: 3,
            target_multiplier: 1.5,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            name: "aggressive".to_string(),
            confluence_threshold: 4,
            max_confluence_threshold: 7,
            risk_multiplier: 1.5,
            min_signal_strength: 2,
            mandatory_filters: [FilterName::News].into_iter().collect(),
            max_positions: 5,
            target_multiplier: 1.0,
        }
    }

    /// Preset by index; out-of-range indices clamp to the nearest preset.
    pub fn select(index: i64) -> Self {
        let last = PRESET_NAMES.len() as i64 - 1;
        let clamped = index.clamp(0, last);
        if clamped != index {
            warn!(
                "Aggression level {} out of range 0..={}, using {}",
                index, last, PRESET_NAMES[clamped as usize]
            );
        }
        match clamped {
            0 => Self::conservative(),
            1 => Self::balanced(),
            _ => Self::aggressive(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        PRESET_NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| Self::select(i as i64))
    }

    pub fn with_overrides(mut self, o: &ProfileOverrides) -> Self {
        if let Some(t) = o.confluence_threshold {
            self.confluence_threshold = t;
        }
        if let Some(r) = o.risk_multiplier {
            self.risk_multiplier = r;
        }
        if let Some(s) = o.min_signal_strength {
            self.min_signal_strength = s;
        }
        if let Some(m) = &o.mandatory_filters {
            self.mandatory_filters = m.clone();
        }
        if let Some(p) = o.max_positions {
            self.max_positions = p;
        }
        if let Some(t) = o.target_multiplier {
            self.target_multiplier = t;
        }
        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        let s = self.min_signal_strength.clamp(MIN_STRENGTH, MAX_STRENGTH);
        if s != self.min_signal_strength {
            warn!("min_signal_strength {} clamped to {}", self.min_signal_strength, s);
            self.min_signal_strength = s;
        }
        if self.confluence_threshold == 0 {
            warn!("confluence_threshold 0 clamped to 1");
            self.confluence_threshold = 1;
        }
        if self.max_confluence_threshold < self.confluence_threshold {
            self.max_confluence_threshold = self.confluence_threshold;
        }
        if !(self.risk_multiplier.is_finite() && self.risk_multiplier > 0.0) {
            warn!("risk_multiplier {} invalid, using 1.0", self.risk_multiplier);
            self.risk_multiplier = 1.0;
        }
        if !(self.target_multiplier.is_finite() && self.target_multiplier > 0.0) {
            warn!("target_multiplier {} invalid, using 1.0", self.target_multiplier);
            self.target_multiplier = 1.0;
        }
        if self.max_positions == 0 {
            warn!("max_positions 0 clamped to 1");
            self.max_positions = 1;
        }
        self
    }

    /// Resolve contradictions between the profile and the enabled filter
    /// set: a mandatory filter that is disabled gets enabled, and a threshold
    /// no score could reach is lowered to the number of enabled filters.
    pub fn reconcile(mut self, enabled: &mut BTreeSet<FilterName>) -> Self {
        for f in &self.mandatory_filters {
            if enabled.insert(*f) {
                warn!("Mandatory filter '{}' was disabled, enabling it", f);
            }
        }
        let reachable = enabled.len() as u32;
        if self.confluence_threshold > reachable {
            warn!(
                "Confluence threshold {} exceeds {} enabled filters, clamping",
                self.confluence_threshold, reachable
            );
            self.confluence_threshold = reachable.max(1);
        }
        self.max_confluence_threshold = self
            .max_confluence_threshold
            .clamp(self.confluence_threshold, reachable.max(self.confluence_threshold));
        self
    }

    /// Profile selected by configuration, with overrides and filter
    /// reconciliation applied.
    pub fn resolve(cfg: &Config, enabled: &mut BTreeSet<FilterName>) -> Self {
        let profile = Self::select(cfg.profile_index)
            .with_overrides(&cfg.profile_overrides)
            .reconcile(enabled);
        info!(
            "Aggression profile '{}': threshold={} (max {}), risk x{:.2}, min strength {}, max positions {}",
            profile.name,
            profile.confluence_threshold,
            profile.max_confluence_threshold,
            profile.risk_multiplier,
            profile.min_signal_strength,
            profile.max_positions
        );
        profile
    }
}
