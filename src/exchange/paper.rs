use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{ExecResult, ExecutionError};
use crate::exchange::{
    ExecutionGateway, FillReport, OpenPosition, OrderRequest, PositionFilter, PositionHandle,
};
use crate::models::{Bar, CloseReason, Direction};

/// Simulated venue. Orders fill immediately at the request price plus
/// adverse slippage; stops and targets fill when a marked bar trades
/// through them, stop first.
pub struct PaperGateway {
    positions: Vec<OpenPosition>,
    next_handle: PositionHandle,
    pending_fills: Vec<FillReport>,
    last_price: HashMap<String, f64>,
    /// Price units added against the trader on every fill
    slippage: f64,
    sim_time: DateTime<Utc>,
    fail_next: Option<ExecutionError>,
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl PaperGateway {
    pub fn new(slippage: f64) -> Self {
        Self {
            positions: Vec::new(),
            next_handle: 1,
            pending_fills: Vec::new(),
            last_price: HashMap::new(),
            slippage: slippage.max(0.0),
            sim_time: Utc::now(),
            fail_next: None,
        }
    }

    /// Make the next gateway call fail with `err`.
    pub fn fail_next(&mut self, err: ExecutionError) {
        self.fail_next = Some(err);
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position(&self, handle: PositionHandle) -> Option<&OpenPosition> {
        self.positions.iter().find(|p| p.handle == handle)
    }

    /// Feed a new bar: records the price and fills any stop or target the
    /// bar traded through.
    pub fn mark(&mut self, instrument: &str, bar: &Bar) {
        self.sim_time = bar.timestamp;
        self.last_price.insert(instrument.to_string(), bar.close);

        let mut i = 0;
        while i < self.positions.len() {
            let p = &self.positions[i];
            if p.instrument != instrument {
                i += 1;
                continue;
            }

            let stop_hit = match p.direction {
                Direction::Long => bar.low <= p.stop,
                Direction::Short => bar.high >= p.stop,
            };
            let target_hit = p.target.is_some_and(|t| match p.direction {
                Direction::Long => bar.high >= t,
                Direction::Short => bar.low <= t,
            });

            let fill = if stop_hit {
                Some((p.stop, CloseReason::StopHit))
            } else if target_hit {
                p.target.map(|t| (t, CloseReason::TargetHit))
            } else {
                None
            };

            match fill {
                Some((price, reason)) => {
                    let p = self.positions.remove(i);
                    info!(
                        "Paper fill: #{} {} {} {} @ {:.5}",
                        p.handle, p.instrument, p.direction, reason, price
                    );
                    self.pending_fills.push(FillReport {
                        handle: p.handle,
                        instrument: p.instrument,
                        price,
                        reason,
                        at: bar.timestamp,
                    });
                }
                None => i += 1,
            }
        }
    }

    fn check_failure(&mut self) -> ExecResult<()> {
        match self.fail_next.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn adverse(&self, direction: Direction, price: f64, entering: bool) -> f64 {
        let sign = if entering { direction.sign() } else { -direction.sign() };
        price + sign * self.slippage
    }

    fn index_of(&self, handle: PositionHandle) -> ExecResult<usize> {
        self.positions
            .iter()
            .position(|p| p.handle == handle)
            .ok_or(ExecutionError::UnknownHandle(handle))
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn open_position(&mut self, req: &OrderRequest) -> ExecResult<OpenPosition> {
        self.check_failure()?;
        if !(req.size > 0.0) {
            return Err(ExecutionError::Rejected(format!("size {} not positive", req.size)));
        }
        if (req.price - req.stop) * req.direction.sign() <= 0.0 {
            return Err(ExecutionError::Rejected(format!(
                "stop {:.5} on wrong side of {:.5} for {}",
                req.stop, req.price, req.direction
            )));
        }

        let handle = self.next_handle;
        self.next_handle += 1;
        let pos = OpenPosition {
            handle,
            instrument: req.instrument.clone(),
            direction: req.direction,
            size: req.size,
            entry: self.adverse(req.direction, req.price, true),
            stop: req.stop,
            target: req.target,
        };
        self.last_price.insert(req.instrument.clone(), req.price);
        self.positions.push(pos.clone());
        info!(
            "Paper open #{}: {} {} {:.2} lots @ {:.5} (SL {:.5})",
            handle, req.instrument, req.direction, req.size, pos.entry, req.stop
        );
        Ok(pos)
    }

    async fn modify_position(
        &mut self,
        handle: PositionHandle,
        stop: f64,
        target: Option<f64>,
    ) -> ExecResult<()> {
        self.check_failure()?;
        let idx = self.index_of(handle)?;
        let p = &self.positions[idx];
        if let Some(price) = self.last_price.get(&p.instrument) {
            if (price - stop) * p.direction.sign() <= 0.0 {
                return Err(ExecutionError::Rejected(format!(
                    "stop {:.5} through market {:.5}",
                    stop, price
                )));
            }
        }
        let p = &mut self.positions[idx];
        p.stop = stop;
        if target.is_some() {
            p.target = target;
        }
        debug!("Paper modify #{}: SL {:.5}", handle, stop);
        Ok(())
    }

    async fn close_position(&mut self, handle: PositionHandle) -> ExecResult<f64> {
        self.check_failure()?;
        let idx = self.index_of(handle)?;
        let p = self.positions.remove(idx);
        let mkt = self.last_price.get(&p.instrument).copied().unwrap_or(p.entry);
        let price = self.adverse(p.direction, mkt, false);
        info!("Paper close #{} @ {:.5}", handle, price);
        Ok(price)
    }

    async fn close_partial(&mut self, handle: PositionHandle, size: f64) -> ExecResult<f64> {
        self.check_failure()?;
        let idx = self.index_of(handle)?;
        let p = &self.positions[idx];
        if !(size > 0.0 && size < p.size) {
            return Err(ExecutionError::Rejected(format!(
                "partial {} of {} lots",
                size, p.size
            )));
        }
        let mkt = self.last_price.get(&p.instrument).copied().unwrap_or(p.entry);
        let price = self.adverse(p.direction, mkt, false);
        let p = &mut self.positions[idx];
        p.size = ((p.size - size) * 1e8).round() / 1e8;
        info!("Paper partial #{}: {:.2} lots @ {:.5}", handle, size, price);
        Ok(price)
    }

    async fn list_open_positions(&self, filter: &PositionFilter) -> ExecResult<Vec<OpenPosition>> {
        Ok(self
            .positions
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn poll_fills(&mut self) -> ExecResult<Vec<FillReport>> {
        Ok(std::mem::take(&mut self.pending_fills))
    }
}
