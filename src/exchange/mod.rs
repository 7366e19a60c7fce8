pub mod paper;
pub mod replay;

pub use paper::PaperGateway;
pub use replay::ReplayBarStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExecResult;
use crate::models::{Bar, CloseReason, Direction, Timeframe};

pub type PositionHandle = u64;

/// Historical bar source.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Up to `count` bars, most recent first, skipping the `offset` most
    /// recent. Fewer than requested means the history is short.
    async fn get_bars(
        &self,
        instrument: &str,
        tf: Timeframe,
        offset: usize,
        count: usize,
    ) -> Result<Vec<Bar>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub direction: Direction,
    pub size: f64,
    /// Reference price the decision was made at
    pub price: f64,
    pub stop: f64,
    pub target: Option<f64>,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub handle: PositionHandle,
    pub instrument: String,
    pub direction: Direction,
    pub size: f64,
    pub entry: f64,
    pub stop: f64,
    pub target: Option<f64>,
}

/// A stop or target the venue filled on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillReport {
    pub handle: PositionHandle,
    pub instrument: String,
    pub price: f64,
    pub reason: CloseReason,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PositionFilter {
    pub instrument: Option<String>,
    pub direction: Option<Direction>,
}

impl PositionFilter {
    pub fn instrument(symbol: &str) -> Self {
        Self {
            instrument: Some(symbol.to_string()),
            direction: None,
        }
    }

    pub fn matches(&self, pos: &OpenPosition) -> bool {
        self.instrument.as_ref().map_or(true, |i| *i == pos.instrument)
            && self.direction.map_or(true, |d| d == pos.direction)
    }
}

/// Order routing. Every call may fail; callers leave their state untouched
/// on error.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn open_position(&mut self, req: &OrderRequest) -> ExecResult<OpenPosition>;
    async fn modify_position(
        &mut self,
        handle: PositionHandle,
        stop: f64,
        target: Option<f64>,
    ) -> ExecResult<()>;
    /// Returns the fill price.
    async fn close_position(&mut self, handle: PositionHandle) -> ExecResult<f64>;
    async fn close_partial(&mut self, handle: PositionHandle, size: f64) -> ExecResult<f64>;
    async fn list_open_positions(&self, filter: &PositionFilter) -> ExecResult<Vec<OpenPosition>>;
    /// Stop/target fills since the last poll.
    async fn poll_fills(&mut self) -> ExecResult<Vec<FillReport>>;
}

pub trait NewsCalendar: Send + Sync {
    fn is_clear(&self, instrument: &str, at: DateTime<Utc>) -> bool;
}

/// Fixed list of high-impact event times with a blackout window either side.
pub struct ScheduledBlackouts {
    events: Vec<DateTime<Utc>>,
    window: Duration,
}

impl ScheduledBlackouts {
    pub fn new(events: Vec<DateTime<Utc>>, window_minutes: i64) -> Self {
        Self {
            events,
            window: Duration::minutes(window_minutes.max(0)),
        }
    }
}

impl NewsCalendar for ScheduledBlackouts {
    fn is_clear(&self, _instrument: &str, at: DateTime<Utc>) -> bool {
        !self
            .events
            .iter()
            .any(|e| {
                let d = at - *e;
                d <= self.window && d >= -self.window
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn blackout_window_is_symmetric() {
        let event = Utc.with_ymd_and_hms(2024, 1, 15, 13, 30, 0).unwrap();
        let cal = ScheduledBlackouts::new(vec![event], 30);
        assert!(!cal.is_clear("EURUSD", event - Duration::minutes(30)));
        assert!(!cal.is_clear("EURUSD", event + Duration::minutes(10)));
        assert!(cal.is_clear("EURUSD", event + Duration::minutes(31)));
        assert!(ScheduledBlackouts::new(Vec::new(), 30).is_clear("EURUSD", event));
    }

    #[test]
    fn filter_matching() {
        let pos = OpenPosition {
            handle: 1,
            instrument: "EURUSD".into(),
            direction: Direction::Long,
            size: 1.0,
            entry: 1.1,
            stop: 1.09,
            target: None,
        };
        assert!(PositionFilter::default().matches(&pos));
        assert!(PositionFilter::instrument("EURUSD").matches(&pos));
        assert!(!PositionFilter::instrument("GBPUSD").matches(&pos));
        let shorts = PositionFilter {
            instrument: None,
            direction: Some(Direction::Short),
        };
        assert!(!shorts.matches(&pos));
    }
}
