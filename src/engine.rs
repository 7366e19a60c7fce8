use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Config, InstrumentSpec, StructureSettings};
use crate::core::regime::{RegimeClassifier, RegimeReading};
use crate::core::sessions::{SessionManager, SessionReading, OFF_SESSION};
use crate::core::stops::StopPlanner;
use crate::core::structure::{StructureMapper, StructureSnapshot};
use crate::core::zones::ZoneBook;
use crate::error::{ExecResult, ExecutionError};
use crate::exchange::{
    BarStore, ExecutionGateway, NewsCalendar, OrderRequest, PositionFilter, ScheduledBlackouts,
};
use crate::models::{BarSeries, Bias, Direction, LifecycleState, VolatilityRegime};
use crate::strategies::confluence::{
    ConfluenceContext, ConfluenceFilter, ConfluenceResult, ConfluenceScorer, FilterName, Quote,
};
use crate::strategies::patterns::PatternDetector;
use crate::strategies::profiles::AggressionProfile;
use crate::strategies::signals::Signal;
use crate::trading::adaptation::{
    PatternPerformanceRecord, PerformanceTracker, ThresholdController,
};
use crate::trading::lifecycle::{LifecycleAction, LifecycleManager, Position};
use crate::trading::performance_store::{load_or_empty, PerformanceStore};
use crate::trading::risk::{Exposure, RiskManager};
use crate::trading::trade_record::TradeOutcome;

/// Receives every confluence decision.
pub trait DecisionSink: Send + Sync {
    fn emit(&self, result: &ConfluenceResult);
}

/// Decisions as structured tracing events under the `decisions` target.
pub struct TracingDecisionSink;

impl DecisionSink for TracingDecisionSink {
    fn emit(&self, r: &ConfluenceResult) {
        if r.pattern.is_none() {
            debug!(target: "decisions", instrument = %r.instrument, verdict = %r.verdict, "{}", r.rationale);
            return;
        }
        info!(
            target: "decisions",
            instrument = %r.instrument,
            verdict = %r.verdict,
            score = r.score,
            threshold = r.threshold,
            passed = ?r.passed,
            failed = ?r.failed,
            "{}",
            r.rationale
        );
    }
}

/// Per-instrument analysis state, rebuilt bar by bar.
pub struct InstrumentState {
    pub bars: BarSeries,
    pub snapshot: StructureSnapshot,
    pub zones: ZoneBook,
    pub regime: RegimeReading,
    pub session: SessionReading,
    pub signal: Option<Signal>,
    pub quote: Option<Quote>,
    pub last_bar_at: Option<DateTime<Utc>>,
    pub last_decision: Option<ConfluenceResult>,
}

impl InstrumentState {
    fn new(settings: &StructureSettings) -> Self {
        Self {
            bars: BarSeries::default(),
            snapshot: StructureSnapshot::default(),
            zones: ZoneBook::new(settings),
            regime: RegimeReading::neutral(),
            session: SessionReading {
                name: OFF_SESSION.to_string(),
                tradable: false,
                volatility_weight: 0.0,
            },
            signal: None,
            quote: None,
            last_bar_at: None,
            last_decision: None,
        }
    }
}

/// Everything mutable the engine owns.
pub struct EngineState {
    pub balance: f64,
    pub profile: AggressionProfile,
    pub enabled_filters: BTreeSet<FilterName>,
    pub instruments: BTreeMap<String, InstrumentState>,
    /// Open positions only; closed ones move to `closed` as outcomes
    pub positions: Vec<Position>,
    pub closed: Vec<TradeOutcome>,
    pub risk: RiskManager,
    pub tracker: PerformanceTracker,
    pub threshold: ThresholdController,
    next_position_id: u64,
}

impl EngineState {
    pub fn open_on(&self, instrument: &str) -> impl Iterator<Item = &Position> {
        let instrument = instrument.to_string();
        self.positions
            .iter()
            .filter(move |p| p.is_open() && p.instrument == instrument)
    }
}

/// The signal-to-decision pipeline. Bar and tick events are processed to
/// completion, one at a time, in arrival order.
pub struct Engine<B: BarStore, G: ExecutionGateway> {
    cfg: Config,
    bars: B,
    gateway: G,
    news: Box<dyn NewsCalendar>,
    custom_news: bool,
    store: Box<dyn PerformanceStore>,
    /// Records of a previous profile whose save failed, retried on flush
    unsaved: BTreeMap<String, Vec<PatternPerformanceRecord>>,
    sink: Box<dyn DecisionSink>,

    mapper: StructureMapper,
    classifier: RegimeClassifier,
    sessions: SessionManager,
    detector: PatternDetector,
    scorer: ConfluenceScorer,
    lifecycle: LifecycleManager,

    state: EngineState,
}

impl<B: BarStore, G: ExecutionGateway> Engine<B, G> {
    pub fn new(cfg: Config, bars: B, gateway: G, store: Box<dyn PerformanceStore>) -> Self {
        let mut enabled = cfg.filters.enabled.clone();
        let profile = AggressionProfile::resolve(&cfg, &mut enabled);
        let records = load_or_empty(store.as_ref(), &profile.name);

        let state = EngineState {
            balance: cfg.initial_balance,
            enabled_filters: enabled.clone(),
            instruments: BTreeMap::new(),
            positions: Vec::new(),
            closed: Vec::new(),
            risk: RiskManager::new(&cfg.risk, cfg.initial_balance),
            tracker: PerformanceTracker::from_records(records, cfg.adaptation.min_samples),
            threshold: ThresholdController::new(&profile, &cfg.adaptation),
            profile,
            next_position_id: 1,
        };

        Self {
            news: Box::new(ScheduledBlackouts::new(
                cfg.filters.news_events.clone(),
                cfg.filters.news_window_minutes,
            )),
            custom_news: false,
            store,
            unsaved: BTreeMap::new(),
            sink: Box::new(TracingDecisionSink),
            mapper: StructureMapper::new(&cfg.structure),
            classifier: RegimeClassifier::new(&cfg.regime),
            sessions: SessionManager::new(&cfg),
            detector: PatternDetector::with_ranking(&cfg.pattern_ranking),
            scorer: ConfluenceScorer::new(enabled, cfg.signal_decay_bars),
            lifecycle: LifecycleManager::new(&cfg.lifecycle),
            bars,
            gateway,
            state,
            cfg,
        }
    }

    pub fn with_news(mut self, news: Box<dyn NewsCalendar>) -> Self {
        self.news = news;
        self.custom_news = true;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn DecisionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn ConfluenceFilter>) -> Self {
        self.scorer.register(filter);
        self
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn bar_store_mut(&mut self) -> &mut B {
        &mut self.bars
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub async fn start(&mut self) -> ExecResult<()> {
        info!("{}", "=".repeat(60));
        info!("Confluence engine starting up");
        info!(
            "Instruments: {}",
            self.cfg
                .instruments
                .iter()
                .map(|i| i.symbol.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        info!("Entry timeframe: {}", self.cfg.entry_timeframe);
        info!("Profile: {}", self.state.profile.name);
        info!(
            "Filters: {}",
            self.state
                .enabled_filters
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        info!("Patterns: {}", self.detector.ranking().join(" > "));
        info!("{}", "=".repeat(60));

        let ms = self.cfg.gateway_timeout_ms;
        let open = bounded(ms, self.gateway.list_open_positions(&PositionFilter::default())).await?;
        if !open.is_empty() {
            warn!("{} positions already open at the venue are not managed", open.len());
        }
        Ok(())
    }

    /// Run the pipeline for the newest bar of `instrument`. Returns the
    /// decision, or `None` when there was nothing new to decide on.
    pub async fn on_bar(&mut self, instrument: &str, now: DateTime<Utc>) -> Option<ConfluenceResult> {
        let Some(spec) = self.cfg.instrument(instrument).cloned() else {
            warn!("Bar for unconfigured instrument {}", instrument);
            return None;
        };
        let tf = self.cfg.entry_timeframe;
        let window = self.cfg.structure.window.max(self.classifier.min_bars());

        let raw = match self.bars.get_bars(instrument, tf, 0, window).await {
            Ok(b) => b,
            Err(e) => {
                warn!("{} bar fetch failed: {}", instrument, e);
                return None;
            }
        };
        let series = BarSeries::from_most_recent_first(raw);
        let Some(last) = series.last().cloned() else {
            debug!("{}: no bars yet", instrument);
            return None;
        };
        if series.len() < window {
            debug!("{}: {} of {} bars, analysis degraded", instrument, series.len(), window);
        }

        self.process_fills().await;

        let inst = self
            .state
            .instruments
            .entry(instrument.to_string())
            .or_insert_with(|| InstrumentState::new(&self.cfg.structure));
        if inst.last_bar_at == Some(last.timestamp) {
            return None;
        }
        inst.last_bar_at = Some(last.timestamp);

        if let Some(sig) = inst.signal.as_mut() {
            sig.age();
        }
        inst.snapshot = self.mapper.map(&series.tail(self.cfg.structure.window));
        let retired = inst.zones.refresh(&series);
        if !retired.is_empty() {
            debug!("{}: {} imbalance zones filled", instrument, retired.len());
        }
        inst.regime = self.classifier.classify(&series);
        inst.session = self.sessions.classify(last.timestamp);
        if let Some(sig) = self.detector.detect(&series, tf) {
            info!(
                "{} signal: {} {} strength {} @ {:.5}",
                instrument, sig.pattern, sig.direction, sig.strength, sig.reference_price
            );
            inst.signal = Some(sig);
        }
        inst.bars = series;
        let volatility = inst.regime.volatility;

        let bar_quote = Quote {
            bid: last.close,
            ask: last.close,
        };
        self.manage_positions(instrument, bar_quote, last.timestamp).await;

        let balance = self.state.balance;
        self.state.risk.roll_periods(now, balance);
        self.state.risk.update_multiplier(balance, volatility);

        let higher_tf_bias = self.higher_tf_bias(instrument).await;
        let threshold = self.state.threshold.effective(volatility);
        let result = self.evaluate(instrument, &spec, higher_tf_bias, threshold, now);
        self.sink.emit(&result);

        if result.is_enter() {
            let signal = self
                .state
                .instruments
                .get(instrument)
                .and_then(|i| i.signal.clone());
            if let Some(signal) = signal {
                if self.try_enter(instrument, &spec, &signal, now).await {
                    if let Some(inst) = self.state.instruments.get_mut(instrument) {
                        inst.signal = None;
                    }
                }
            }
        }

        if let Some(inst) = self.state.instruments.get_mut(instrument) {
            inst.last_decision = Some(result.clone());
        }
        Some(result)
    }

    /// Quote update: refresh the spread and run position management.
    pub async fn on_tick(&mut self, instrument: &str, bid: f64, ask: f64, at: DateTime<Utc>) {
        let quote = Quote { bid, ask };
        if let Some(inst) = self.state.instruments.get_mut(instrument) {
            inst.quote = Some(quote);
        }
        self.process_fills().await;
        self.manage_positions(instrument, quote, at).await;
    }

    fn evaluate(
        &self,
        instrument: &str,
        spec: &InstrumentSpec,
        higher_tf_bias: Option<Bias>,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> ConfluenceResult {
        let inst = self.state.instruments.get(instrument);
        let signal = inst.and_then(|i| i.signal.as_ref().map(|s| (i, s)));

        let ctx = signal.map(|(inst, signal)| ConfluenceContext {
            signal,
            bars: inst.bars.last_n(self.cfg.structure.window),
            regime: &inst.regime,
            structure: &inst.snapshot,
            zones: &inst.zones,
            session: &inst.session,
            quote: inst.quote,
            typical_spread: spec.typical_spread,
            higher_tf_bias,
            correlated_exposure: self.exposure(instrument, signal.direction).correlated,
            news_clear: self.news.is_clear(instrument, now),
            pattern_vetoed: self.state.tracker.is_vetoed(&signal.pattern, inst.regime.regime),
            min_signal_strength: self.state.profile.min_signal_strength,
            filters: &self.cfg.filters,
            structure_settings: &self.cfg.structure,
        });

        self.scorer
            .evaluate(instrument, ctx.as_ref(), &self.state.profile, threshold, now)
    }

    async fn higher_tf_bias(&self, instrument: &str) -> Option<Bias> {
        let htf = self.cfg.entry_timeframe.higher()?;
        let needed = self.classifier.min_bars();
        let raw = match self.bars.get_bars(instrument, htf, 0, needed).await {
            Ok(b) => b,
            Err(e) => {
                debug!("{} {} bars unavailable: {}", instrument, htf, e);
                return None;
            }
        };
        if raw.len() < needed {
            return None;
        }
        Some(self.classifier.classify(&BarSeries::from_most_recent_first(raw)).bias)
    }

    fn exposure(&self, instrument: &str, direction: Direction) -> Exposure {
        let group = self.cfg.correlation_group(instrument);
        let open: Vec<&Position> = self.state.positions.iter().filter(|p| p.is_open()).collect();
        Exposure {
            total: open.len(),
            on_instrument: open.iter().filter(|p| p.instrument == instrument).count(),
            correlated: open
                .iter()
                .filter(|p| {
                    p.direction == direction
                        && p.instrument != instrument
                        && group.is_some_and(|g| g.iter().any(|s| *s == p.instrument))
                })
                .count(),
        }
    }

    async fn try_enter(
        &mut self,
        instrument: &str,
        spec: &InstrumentSpec,
        signal: &Signal,
        now: DateTime<Utc>,
    ) -> bool {
        let exposure = self.exposure(instrument, signal.direction);
        let max_positions = self.state.profile.max_positions;
        let max_correlated = self.cfg.filters.max_correlated;
        let balance = self.state.balance;
        if let Err(refusal) =
            self.state
                .risk
                .check_entry(now, balance, instrument, exposure, max_positions, max_correlated)
        {
            info!("{} entry refused: {}", instrument, refusal);
            return false;
        }

        let Some(inst) = self.state.instruments.get(instrument) else {
            return false;
        };
        if inst.snapshot.break_against(signal.direction) {
            info!("{} entry skipped: structure just broke against {}", instrument, signal.direction);
            return false;
        }

        let price = match (inst.quote, signal.direction) {
            (Some(q), Direction::Long) => q.ask,
            (Some(q), Direction::Short) => q.bid,
            (None, _) => signal.reference_price,
        };
        let planner = StopPlanner::new(&self.cfg.risk, spec);
        let plan = planner.plan(
            signal.direction,
            price,
            &inst.snapshot,
            inst.regime.atr,
            self.state.profile.target_multiplier,
        );
        let regime = inst.regime.regime;
        let size = self.state.risk.position_size(
            balance,
            plan.risk_distance,
            spec,
            self.state.profile.risk_multiplier,
        );

        let req = OrderRequest {
            instrument: instrument.to_string(),
            direction: signal.direction,
            size,
            price,
            stop: plan.stop,
            target: plan.targets.last().copied(),
            comment: format!("{} {}", signal.pattern, self.state.profile.name),
        };

        let ms = self.cfg.gateway_timeout_ms;
        let opened = match bounded(ms, self.gateway.open_position(&req)).await {
            Ok(o) => o,
            Err(e) => {
                warn!("{} order failed: {}", instrument, e);
                return false;
            }
        };

        let id = self.state.next_position_id;
        self.state.next_position_id += 1;

        info!("{}", "=".repeat(60));
        info!("ENTRY #{} {} {}", id, instrument, signal.direction);
        info!("  Pattern: {} (strength {})", signal.pattern, signal.strength);
        info!("  Entry: {:.5}  Size: {:.2} lots", opened.entry, opened.size);
        info!("  Stop: {:.5} [{}]", plan.stop, plan.reason);
        for (i, t) in plan.targets.iter().enumerate() {
            info!("  T{}: {:.5}", i + 1, t);
        }
        info!("{}", "=".repeat(60));

        self.state.positions.push(Position {
            id,
            instrument: instrument.to_string(),
            handle: opened.handle,
            direction: signal.direction,
            entry: opened.entry,
            initial_stop: plan.stop,
            stop: plan.stop,
            targets: plan.targets,
            size: opened.size,
            remaining_size: opened.size,
            state: LifecycleState::Open,
            partial_realized: false,
            profit_locked: false,
            pattern: signal.pattern.clone(),
            regime,
            opened_at: now,
            best_price: opened.entry,
            realized_pnl: 0.0,
        });
        true
    }

    /// Walk every open position on `instrument` through the lifecycle. A
    /// failed gateway call stops that position's pass; it is retried on the
    /// next event.
    async fn manage_positions(&mut self, instrument: &str, quote: Quote, at: DateTime<Utc>) {
        let Some(spec) = self.cfg.instrument(instrument).cloned() else {
            return;
        };
        let planner = StopPlanner::new(&self.cfg.risk, &spec);
        let snapshot = self
            .state
            .instruments
            .get(instrument)
            .map(|i| i.snapshot.clone())
            .unwrap_or_default();
        let ids: Vec<u64> = self.state.open_on(instrument).map(|p| p.id).collect();
        let ms = self.cfg.gateway_timeout_ms;

        for id in ids {
            let Some(idx) = self.state.positions.iter().position(|p| p.id == id) else {
                continue;
            };
            let price = match self.state.positions[idx].direction {
                Direction::Long => quote.bid,
                Direction::Short => quote.ask,
            };
            self.state.positions[idx].observe(price);
            let actions =
                self.lifecycle
                    .plan(&self.state.positions[idx], price, &snapshot, &planner, &spec);

            for action in actions {
                let handle = self.state.positions[idx].handle;
                let sent: ExecResult<Option<f64>> = match &action {
                    LifecycleAction::CloseAll { .. } => {
                        bounded(ms, self.gateway.close_position(handle)).await.map(Some)
                    }
                    LifecycleAction::ClosePartial { size } => {
                        bounded(ms, self.gateway.close_partial(handle, *size))
                            .await
                            .map(Some)
                    }
                    LifecycleAction::ModifyStop { stop, .. } => {
                        bounded(ms, self.gateway.modify_position(handle, *stop, None))
                            .await
                            .map(|_| None)
                    }
                    LifecycleAction::SkipPartial | LifecycleAction::Advance { .. } => Ok(None),
                };

                match sent {
                    Ok(fill) => {
                        let pos = &mut self.state.positions[idx];
                        let before = pos.realized_pnl;
                        let outcome =
                            self.lifecycle
                                .commit(pos, &action, fill.unwrap_or(price), at, &spec);
                        self.state.balance += pos.realized_pnl - before;
                        if let Some(outcome) = outcome {
                            self.finish(outcome);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Position #{} {:?} failed, state unchanged: {}", id, action, e);
                        break;
                    }
                }
            }
        }

        self.state.positions.retain(|p| p.is_open());
    }

    /// Close positions whose stop or target the venue filled.
    async fn process_fills(&mut self) {
        let ms = self.cfg.gateway_timeout_ms;
        let fills = match bounded(ms, self.gateway.poll_fills()).await {
            Ok(f) => f,
            Err(e) => {
                warn!("Fill poll failed: {}", e);
                return;
            }
        };

        for fill in fills {
            let Some(idx) = self.state.positions.iter().position(|p| p.handle == fill.handle) else {
                debug!("Fill for unmanaged handle {}", fill.handle);
                continue;
            };
            let Some(spec) = self.cfg.instrument(&fill.instrument).cloned() else {
                continue;
            };
            let pos = &mut self.state.positions[idx];
            let before = pos.realized_pnl;
            let outcome = pos.close(fill.price, fill.reason, fill.at, &spec);
            self.state.balance += pos.realized_pnl - before;
            info!(
                "Position #{} {} {} @ {:.5}: pnl {:.2} ({:+.2}R)",
                outcome.position_id,
                outcome.instrument,
                fill.reason,
                fill.price,
                outcome.pnl,
                outcome.r_multiple
            );
            self.finish(outcome);
        }

        self.state.positions.retain(|p| p.is_open());
    }

    fn finish(&mut self, outcome: TradeOutcome) {
        let balance = self.state.balance;
        self.state.risk.record_close(outcome.pnl, balance);
        self.state.tracker.record(&outcome);
        self.state.threshold.on_outcome(outcome.is_win());
        info!(
            "Balance {:.2} | streak W{} L{} | threshold now {}",
            balance,
            self.state.risk.state.consecutive_wins,
            self.state.risk.state.consecutive_losses,
            self.state.threshold.effective(VolatilityRegime::Normal)
        );
        self.state.closed.push(outcome);
    }

    /// Apply a new configuration. The profile object is replaced wholesale;
    /// performance history follows the profile name.
    pub fn reconfigure(&mut self, cfg: Config) {
        let mut enabled = cfg.filters.enabled.clone();
        let profile = AggressionProfile::resolve(&cfg, &mut enabled);

        self.flush_performance();
        let min_samples = cfg.adaptation.min_samples;
        if profile.name != self.state.profile.name {
            if self.state.tracker.is_dirty() {
                warn!(
                    "Keeping unsaved performance records for '{}' until the store recovers",
                    self.state.profile.name
                );
                self.unsaved
                    .insert(self.state.profile.name.clone(), self.state.tracker.records());
            }
            self.state.tracker = match self.unsaved.remove(&profile.name) {
                Some(pending) => {
                    let mut tracker = PerformanceTracker::from_records(pending, min_samples);
                    tracker.mark_dirty();
                    tracker
                }
                None => PerformanceTracker::from_records(
                    load_or_empty(self.store.as_ref(), &profile.name),
                    min_samples,
                ),
            };
        } else {
            self.state.tracker.set_min_samples(min_samples);
        }
        self.state.threshold.rebase(&profile);
        self.state.risk.reconfigure(&cfg.risk);

        self.mapper = StructureMapper::new(&cfg.structure);
        self.classifier = RegimeClassifier::new(&cfg.regime);
        self.sessions = SessionManager::new(&cfg);
        self.detector = PatternDetector::with_ranking(&cfg.pattern_ranking);
        self.scorer.reconfigure(enabled.clone(), cfg.signal_decay_bars);
        self.lifecycle = LifecycleManager::new(&cfg.lifecycle);
        if !self.custom_news {
            self.news = Box::new(ScheduledBlackouts::new(
                cfg.filters.news_events.clone(),
                cfg.filters.news_window_minutes,
            ));
        }

        info!("Reconfigured: profile '{}' -> '{}'", self.state.profile.name, profile.name);
        self.state.profile = profile;
        self.state.enabled_filters = enabled;
        self.cfg = cfg;
    }

    /// Save performance records if anything changed. Failures are logged
    /// and the records stay dirty for the next attempt. Returns true when
    /// anything was written.
    pub fn flush_performance(&mut self) -> bool {
        let mut saved = self.retry_unsaved();
        if !self.state.tracker.is_dirty() {
            return saved;
        }
        let records = self.state.tracker.records();
        match self.store.save(&self.state.profile.name, &records) {
            Ok(()) => {
                self.state.tracker.mark_clean();
                debug!("Flushed {} performance records", records.len());
                saved = true;
            }
            Err(e) => warn!("Performance flush failed: {}", e),
        }
        saved
    }

    fn retry_unsaved(&mut self) -> bool {
        let store = &self.store;
        let before = self.unsaved.len();
        self.unsaved
            .retain(|profile, records| match store.save(profile, records) {
                Ok(()) => {
                    info!("Saved pending performance records for '{}'", profile);
                    false
                }
                Err(e) => {
                    warn!("Performance save for '{}' still failing: {}", profile, e);
                    true
                }
            });
        self.unsaved.len() < before
    }

    pub async fn shutdown(&mut self) {
        info!("Shutting down...");
        self.flush_performance();

        let summary = self.state.tracker.summary();
        info!("{}", "=".repeat(60));
        info!("SESSION SUMMARY");
        info!("  Balance: {:.2}", self.state.balance);
        info!("  Closed trades: {}", self.state.closed.len());
        info!("  Open positions: {}", self.state.positions.len());
        info!(
            "  History: {} trades, {:.1}% wins",
            summary.total_trades,
            summary.win_rate * 100.0
        );
        for r in &summary.records {
            info!(
                "    {}/{}: {}/{} ({:.0}%)",
                r.pattern,
                r.regime,
                r.wins,
                r.trades,
                r.win_rate * 100.0
            );
        }
        if !summary.vetoed.is_empty() {
            info!("  Vetoed: {}", summary.vetoed.join(", "));
        }
        info!("{}", "=".repeat(60));
    }
}

/// Await a gateway call for at most `ms` milliseconds.
pub async fn bounded<T, F>(ms: u64, fut: F) -> ExecResult<T>
where
    F: Future<Output = ExecResult<T>>,
{
    match tokio::time::timeout(Duration::from_millis(ms), fut).await {
        Ok(r) => r,
        Err(_) => Err(ExecutionError::Timeout(ms)),
    }
}
