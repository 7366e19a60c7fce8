use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::config::StructureSettings;
use crate::models::{Bar, BarSeries, Direction};

/// Three-bar gap left open by a displacement move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImbalanceZone {
    pub top: f64,
    pub bottom: f64,
    pub direction: Direction,
    pub filled: bool,
    /// 0..=100, never decreases
    pub fill_percentage: f64,
    pub visit_count: u32,
    pub first_visit: Option<DateTime<Utc>>,
    pub last_visit: Option<DateTime<Utc>>,
    pub formed_at: DateTime<Utc>,
}

impl ImbalanceZone {
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Fold one later bar into the zone. Once filled the zone is frozen.
    pub fn update(&mut self, bar: &Bar) {
        if self.filled {
            return;
        }
        let height = self.height();
        // A bullish gap fills from the top down, a bearish one from the bottom up.
        let depth = match self.direction {
            Direction::Long => self.top - bar.low,
            Direction::Short => bar.high - self.bottom,
        };
        if depth > 0.0 {
            self.visit_count += 1;
            if self.first_visit.is_none() {
                self.first_visit = Some(bar.timestamp);
            }
            self.last_visit = Some(bar.timestamp);
        }

        let pct = if height > 0.0 {
            (depth / height * 100.0).clamp(0.0, 100.0)
        } else {
            100.0
        };
        self.fill_percentage = self.fill_percentage.max(pct);
        if self.fill_percentage >= 100.0 {
            self.fill_percentage = 100.0;
            self.filled = true;
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.bottom && price <= self.top
    }
}

/// Last opposite-direction bar before a directional run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginZone {
    pub top: f64,
    pub bottom: f64,
    pub direction: Direction,
    pub test_count: u32,
    pub invalidated: bool,
    pub formed_at: DateTime<Utc>,
    inside: bool,
}

impl OriginZone {
    pub fn new(top: f64, bottom: f64, direction: Direction, formed_at: DateTime<Utc>) -> Self {
        Self {
            top,
            bottom,
            direction,
            test_count: 0,
            invalidated: false,
            formed_at,
            inside: false,
        }
    }

    /// Count a test each time price re-enters the zone from outside.
    /// Reaching `max_tests` invalidates the zone for good.
    pub fn update(&mut self, bar: &Bar, max_tests: u32) {
        if self.invalidated {
            return;
        }
        let in_range = bar.overlaps(self.top, self.bottom);
        if in_range && !self.inside {
            self.test_count += 1;
            if self.test_count >= max_tests {
                self.invalidated = true;
            }
        }
        self.inside = in_range;
    }

    pub fn is_active(&self) -> bool {
        !self.invalidated
    }
}

/// Per-instrument zone memory, bounded by a fixed capacity per kind. When
/// full, the oldest zone is evicted.
#[derive(Debug, Clone)]
pub struct ZoneBook {
    pub imbalances: VecDeque<ImbalanceZone>,
    pub origins: VecDeque<OriginZone>,
    capacity: usize,
    min_gap_percent: f64,
    origin_min_run: usize,
    origin_max_tests: u32,
    last_processed: Option<DateTime<Utc>>,
}

impl ZoneBook {
    pub fn new(settings: &StructureSettings) -> Self {
        Self {
            imbalances: VecDeque::with_capacity(settings.zone_capacity),
            origins: VecDeque::with_capacity(settings.zone_capacity),
            capacity: settings.zone_capacity.max(1),
            min_gap_percent: settings.min_gap_percent,
            origin_min_run: settings.origin_min_run.max(1),
            origin_max_tests: settings.origin_max_tests.max(1),
            last_processed: None,
        }
    }

    /// Process every bar of the window newer than the last one seen. Existing
    /// zones are updated with each new bar before zones completed by that bar
    /// are added. Returns the imbalance zones retired as filled.
    pub fn refresh(&mut self, bars: &BarSeries) -> Vec<ImbalanceZone> {
        let mut retired = Vec::new();

        for i in 0..bars.len() {
            let bar = &bars[i];
            if self.last_processed.is_some_and(|t| bar.timestamp <= t) {
                continue;
            }

            for zone in self.imbalances.iter_mut() {
                zone.update(bar);
            }
            for zone in self.origins.iter_mut() {
                zone.update(bar, self.origin_max_tests);
            }
            let (done, open): (Vec<_>, Vec<_>) =
                self.imbalances.drain(..).partition(|z| z.filled);
            self.imbalances = open.into();
            retired.extend(done);

            if let Some(zone) = self.gap_completed_at(bars, i) {
                push_bounded(&mut self.imbalances, zone, self.capacity);
            }
            if let Some(zone) = self.origin_completed_at(bars, i) {
                push_bounded(&mut self.origins, zone, self.capacity);
            }
            self.last_processed = Some(bar.timestamp);
        }

        if !retired.is_empty() {
            debug!("Retired {} filled imbalance zone(s)", retired.len());
        }
        retired
    }

    fn gap_completed_at(&self, bars: &BarSeries, i: usize) -> Option<ImbalanceZone> {
        if i < 2 {
            return None;
        }
        let c1 = &bars[i - 2];
        let c3 = &bars[i];

        let (top, bottom, direction) = if c3.low > c1.high {
            (c3.low, c1.high, Direction::Long)
        } else if c3.high < c1.low {
            (c1.low, c3.high, Direction::Short)
        } else {
            return None;
        };
        if bottom <= 0.0 || (top - bottom) / bottom < self.min_gap_percent {
            return None;
        }
        Some(ImbalanceZone {
            top,
            bottom,
            direction,
            filled: false,
            fill_percentage: 0.0,
            visit_count: 0,
            first_visit: None,
            last_visit: None,
            formed_at: c3.timestamp,
        })
    }

    fn origin_completed_at(&self, bars: &BarSeries, i: usize) -> Option<OriginZone> {
        let run = self.origin_min_run;
        if i < run {
            return None;
        }
        let origin = &bars[i - run];
        let run_bars = &bars.as_slice()[(i + 1 - run)..=i];
        let last = &bars[i];

        let direction = if origin.is_bearish()
            && run_bars.iter().all(|b| b.is_bullish())
            && last.close > origin.high
        {
            Direction::Long
        } else if origin.is_bullish()
            && run_bars.iter().all(|b| b.is_bearish())
            && last.close < origin.low
        {
            Direction::Short
        } else {
            return None;
        };

        let mut zone = OriginZone::new(origin.high, origin.low, direction, last.timestamp);
        zone.inside = last.overlaps(zone.top, zone.bottom);
        Some(zone)
    }

    pub fn active_origins(&self, direction: Direction) -> impl Iterator<Item = &OriginZone> {
        self.origins
            .iter()
            .filter(move |z| z.is_active() && z.direction == direction)
    }

    pub fn open_imbalances(&self, direction: Direction) -> impl Iterator<Item = &ImbalanceZone> {
        self.imbalances
            .iter()
            .filter(move |z| !z.filled && z.direction == direction)
    }

    /// Any live zone supporting `direction` within `distance` of `price`.
    pub fn near_supporting_zone(&self, price: f64, direction: Direction, distance: f64) -> bool {
        let near = |top: f64, bottom: f64| price >= bottom - distance && price <= top + distance;
        self.open_imbalances(direction).any(|z| near(z.top, z.bottom))
            || self.active_origins(direction).any(|z| near(z.top, z.bottom))
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, capacity: usize) {
    if buf.len() >= capacity {
        buf.pop_front();
    }
    buf.push_back(item);
}
