use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use common::{closed_only, Candle, CandleSource, Config, EngineCommand, EngineState};
use strategy::{OneShotLedger, RegisteredStrategy, StrategyRegistry};

use crate::pipeline::{Disposition, SignalPipeline};

/// Orchestrator knobs taken from [`Config`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub pairs: Vec<String>,
    pub poll_interval: Duration,
    /// Candles requested on each steady-state refresh.
    pub window_limit: usize,
    /// Candles requested while warming up.
    pub warmup_limit: usize,
}

impl From<&Config> for OrchestratorConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            pairs: cfg.pairs.clone(),
            poll_interval: cfg.poll_interval,
            window_limit: cfg.window_limit,
            warmup_limit: cfg.warmup_limit,
        }
    }
}

/// Counters shared with the API and Telegram `/status`.
#[derive(Debug, Default)]
pub struct EngineStats {
    sweeps: AtomicU64,
    overruns: AtomicU64,
    accepted: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    pair_errors: AtomicU64,
    last_sweep_ms: AtomicI64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub sweeps: u64,
    pub overruns: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub pair_errors: u64,
    /// Unix ms of the last completed sweep, 0 before the first.
    pub last_sweep_ms: i64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            pair_errors: self.pair_errors.load(Ordering::Relaxed),
            last_sweep_ms: self.last_sweep_ms.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable handle passed to other crates (Telegram, API).
#[derive(Clone)]
pub struct OrchestratorHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    stats: Arc<EngineStats>,
}

impl OrchestratorHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!(?cmd, "Orchestrator is gone, command dropped");
        }
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Warmup,
    Steady,
}

type PairKey = (String, String);

/// Result of one (symbol, strategy) tick, applied after the sweep joins.
struct PairOutcome {
    key: PairKey,
    phase: Phase,
    fired: bool,
}

/// Polls every (symbol, strategy) pair on a fixed cadence and pushes
/// candidates through the [`SignalPipeline`].
///
/// Each (symbol, timeframe) group within a sweep runs concurrently; one
/// group's failure is logged and never aborts the sweep. A pair is never evaluated twice at once because a
/// sweep finishes before the next one starts.
pub struct Orchestrator {
    cfg: OrchestratorConfig,
    source: Arc<dyn CandleSource>,
    registry: StrategyRegistry,
    pipeline: SignalPipeline,
    state: Arc<RwLock<EngineState>>,
    stats: Arc<EngineStats>,
    command_rx: mpsc::Receiver<EngineCommand>,
    #[allow(dead_code)] // kept to prevent channel close
    command_tx: mpsc::Sender<EngineCommand>,
    phases: HashMap<PairKey, Phase>,
    ledger: OneShotLedger,
}

impl Orchestrator {
    pub fn new(
        cfg: OrchestratorConfig,
        source: Arc<dyn CandleSource>,
        registry: StrategyRegistry,
        pipeline: SignalPipeline,
    ) -> (Self, OrchestratorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(EngineState::Stopped));
        let stats = Arc::new(EngineStats::default());

        let handle = OrchestratorHandle {
            command_tx: command_tx.clone(),
            state: state.clone(),
            stats: stats.clone(),
        };

        let orchestrator = Self {
            cfg,
            source,
            registry,
            pipeline,
            state,
            stats,
            command_rx,
            command_tx,
            phases: HashMap::new(),
            ledger: OneShotLedger::new(),
        };

        (orchestrator, handle)
    }

    /// Run until a `Stop` command arrives. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            pairs = ?self.cfg.pairs,
            strategies = ?self.registry.names(),
            interval_ms = self.cfg.poll_interval.as_millis() as u64,
            "Orchestrator running"
        );
        *self.state.write().await = EngineState::Running;

        'outer: loop {
            while let Ok(cmd) = self.command_rx.try_recv() {
                if !self.apply(cmd).await {
                    break 'outer;
                }
            }

            let started = Instant::now();
            if *self.state.read().await == EngineState::Running {
                self.sweep().await;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.cfg.poll_interval {
                // Overrun: start the next sweep straight away rather than drop pairs.
                if *self.state.read().await == EngineState::Running {
                    self.stats.overruns.fetch_add(1, Ordering::Relaxed);
                    warn!(elapsed_ms = elapsed.as_millis() as u64, "Sweep overran poll interval");
                }
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.cfg.poll_interval - elapsed) => {}
                Some(cmd) = self.command_rx.recv() => {
                    if !self.apply(cmd).await {
                        break 'outer;
                    }
                }
            }
        }

        *self.state.write().await = EngineState::Stopped;
        info!("Orchestrator stopped");
    }

    /// Apply a command. Returns `false` when the loop should exit.
    async fn apply(&mut self, cmd: EngineCommand) -> bool {
        let mut state = self.state.write().await;
        match cmd {
            EngineCommand::Pause => {
                if *state == EngineState::Running {
                    info!("Orchestrator paused, sweeps suppressed");
                    *state = EngineState::Paused;
                }
                true
            }
            EngineCommand::Resume => {
                if *state == EngineState::Paused {
                    info!("Orchestrator resumed");
                    *state = EngineState::Running;
                }
                true
            }
            EngineCommand::Stop => {
                info!("Stop requested, no further sweeps will start");
                false
            }
        }
    }

    /// One pass over the symbol x strategy cross product.
    ///
    /// Strategies sharing a (symbol, timeframe) read one fetched window, so a
    /// sweep makes at most one kline request per (symbol, timeframe).
    pub(crate) async fn sweep(&mut self) {
        let mut groups: BTreeMap<(String, String), Vec<(&RegisteredStrategy, Phase)>> = BTreeMap::new();
        for symbol in &self.cfg.pairs {
            for entry in self.registry.iter().filter(|e| e.applies_to(symbol)) {
                if entry.fire_once && self.ledger.has_fired(entry.name(), symbol) {
                    continue;
                }
                let key = (symbol.clone(), entry.name().to_string());
                let phase = self.phases.get(&key).copied().unwrap_or(Phase::Warmup);
                groups
                    .entry((symbol.clone(), entry.strategy.timeframe().to_string()))
                    .or_default()
                    .push((entry, phase));
            }
        }

        let jobs = groups
            .into_iter()
            .map(|((symbol, timeframe), members)| self.tick_group(symbol, timeframe, members));
        let outcomes = join_all(jobs).await;

        for outcome in outcomes.into_iter().flatten() {
            if outcome.fired {
                self.ledger.mark_fired(&outcome.key.1, &outcome.key.0);
            }
            self.phases.insert(outcome.key, outcome.phase);
        }

        self.stats.sweeps.fetch_add(1, Ordering::Relaxed);
        self.stats.last_sweep_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Fetch one window for a (symbol, timeframe) and tick every strategy on it.
    /// A fetch error is logged here and counted against each member, leaving
    /// their phases unchanged.
    async fn tick_group(
        &self,
        symbol: String,
        timeframe: String,
        members: Vec<(&RegisteredStrategy, Phase)>,
    ) -> Vec<PairOutcome> {
        let limit = members
            .iter()
            .map(|(entry, phase)| {
                let min = entry.strategy.min_candles();
                match phase {
                    Phase::Warmup => self.cfg.warmup_limit.max(min + 1),
                    Phase::Steady => self.cfg.window_limit.max(min + 1),
                }
            })
            .max()
            .unwrap_or(self.cfg.window_limit);

        let raw = match self.source.recent_candles(&symbol, &timeframe, limit).await {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.pair_errors.fetch_add(members.len() as u64, Ordering::Relaxed);
                error!(symbol = %symbol, timeframe = %timeframe, error = %e, "Kline fetch failed, skipping this cycle");
                return Vec::new();
            }
        };
        let window = closed_only(raw, Utc::now().timestamp_millis());

        let mut outcomes = Vec::with_capacity(members.len());
        for (entry, phase) in members {
            let key = (symbol.clone(), entry.name().to_string());
            let (phase, fired) = self.tick(&key, entry, phase, &window).await;
            outcomes.push(PairOutcome { key, phase, fired });
        }
        outcomes
    }

    /// Evaluate one pair on an already fetched window. A warming pair whose
    /// window reaches `min_candles` turns steady and is evaluated on the same tick.
    async fn tick(&self, key: &PairKey, entry: &RegisteredStrategy, phase: Phase, window: &[Candle]) -> (Phase, bool) {
        let (symbol, name) = (&key.0, &key.1);
        let strategy = &entry.strategy;
        let min = strategy.min_candles();

        if phase == Phase::Warmup {
            if window.len() < min {
                debug!(symbol = %symbol, strategy = %name, have = window.len(), need = min, "Still warming up");
                return (Phase::Warmup, false);
            }
            info!(symbol = %symbol, strategy = %name, candles = window.len(), "Warm-up complete");
        }

        let mut fired = false;
        for signal in strategy.evaluate(window, symbol) {
            if entry.fire_once && fired {
                break;
            }
            match self.pipeline.process(signal, window).await {
                Disposition::Accepted(_) => {
                    self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                    fired = true;
                }
                Disposition::Duplicate => {
                    self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                }
                Disposition::Rejected(_) => {
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        (Phase::Steady, fired && entry.fire_once)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use common::{Candle, Error, FailurePolicy, PricedSignal, Result, Side, Signal, SignalSink};
    use dedup::{DedupGate, MemoryDedupStore};
    use risk::RiskAttacher;
    use std::sync::atomic::AtomicUsize;
    use strategy::Strategy;
    use tokio::sync::Mutex;

    const MIN: i64 = 60_000;

    /// `n` closed one-minute candles aligned to the minute, plus the one still forming.
    fn window(n: usize) -> Vec<Candle> {
        let now = Utc::now().timestamp_millis();
        let first_open = now / MIN * MIN - n as i64 * MIN;
        (0..=n as i64)
            .map(|i| Candle {
                open_time: first_open + i * MIN,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0 + i as f64 * 0.01,
                volume: 1.0,
                close_time: first_open + (i + 1) * MIN - 1,
            })
            .collect()
    }

    struct FakeSource {
        failing: Vec<String>,
        calls: AtomicUsize,
        len: usize,
    }

    #[async_trait]
    impl CandleSource for FakeSource {
        async fn recent_candles(&self, symbol: &str, _interval: &str, _limit: usize) -> Result<Vec<Candle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.iter().any(|s| s == symbol) {
                return Err(Error::RateLimited { status: 429 });
            }
            Ok(window(self.len))
        }

        async fn candles_between(
            &self,
            _symbol: &str,
            _interval: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Candle>> {
            Ok(Vec::new())
        }
    }

    /// Emits one LONG per evaluation, with a reason derived from the last closed bar.
    struct EveryBar {
        name: String,
        seen_last_close_time: std::sync::Mutex<Vec<i64>>,
    }

    impl EveryBar {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                seen_last_close_time: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl Strategy for EveryBar {
        fn name(&self) -> &str {
            &self.name
        }
        fn timeframe(&self) -> &str {
            "1m"
        }
        fn min_candles(&self) -> usize {
            10
        }
        fn evaluate(&self, candles: &[Candle], symbol: &str) -> Vec<Signal> {
            let Some(last) = candles.last() else { return Vec::new() };
            if let Ok(mut seen) = self.seen_last_close_time.lock() {
                seen.push(last.close_time);
            }
            vec![Signal::new(symbol, Side::Long, &self.name, "1m", format!("bar {}", last.open_time))]
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<PricedSignal>>);

    #[async_trait]
    impl SignalSink for Collect {
        fn name(&self) -> &str {
            "collect"
        }
        async fn deliver(&self, signal: &PricedSignal) -> Result<()> {
            self.0.lock().await.push(signal.clone());
            Ok(())
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        handle: OrchestratorHandle,
        sink: Arc<Collect>,
        strategy: Arc<EveryBar>,
        source: Arc<FakeSource>,
    }

    fn harness(pairs: &[&str], failing: &[&str], fire_once: bool) -> Harness {
        harness_with(pairs, failing, fire_once, 50, &[])
    }

    /// `extra` registers further 1m strategies next to `every_bar`.
    fn harness_with(pairs: &[&str], failing: &[&str], fire_once: bool, len: usize, extra: &[&str]) -> Harness {
        let strategy = Arc::new(EveryBar::new("every_bar"));
        let mut registry = StrategyRegistry::default();
        let mut entry = RegisteredStrategy::new(strategy.clone());
        entry.fire_once = fire_once;
        registry.register(entry).unwrap();
        for name in extra {
            registry.register(RegisteredStrategy::new(Arc::new(EveryBar::new(name)))).unwrap();
        }

        let sink = Arc::new(Collect::default());
        let gate = DedupGate::new(Arc::new(MemoryDedupStore::new()), Duration::from_secs(3600), FailurePolicy::Closed);
        let pipeline = SignalPipeline::new(RiskAttacher::default(), gate, sink.clone());
        let source = Arc::new(FakeSource {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
            len,
        });

        let cfg = OrchestratorConfig {
            pairs: pairs.iter().map(|s| s.to_string()).collect(),
            poll_interval: Duration::from_millis(10),
            window_limit: 50,
            warmup_limit: 50,
        };
        let (orchestrator, handle) = Orchestrator::new(cfg, source.clone(), registry, pipeline);
        Harness { orchestrator, handle, sink, strategy, source }
    }

    #[tokio::test]
    async fn ready_warmup_window_is_evaluated_on_first_sweep() {
        let mut h = harness(&["BTCUSDT"], &[], false);
        h.orchestrator.sweep().await;
        assert_eq!(h.sink.0.lock().await.len(), 1);
        assert_eq!(h.handle.stats().accepted, 1);
    }

    #[tokio::test]
    async fn short_history_keeps_pair_warming() {
        let mut h = harness_with(&["BTCUSDT"], &[], false, 5, &[]);
        h.orchestrator.sweep().await;
        h.orchestrator.sweep().await;
        assert!(h.sink.0.lock().await.is_empty());
        assert!(h.strategy.seen_last_close_time.lock().unwrap().is_empty());
        let key = ("BTCUSDT".to_string(), "every_bar".to_string());
        assert_eq!(h.orchestrator.phases.get(&key), Some(&Phase::Warmup));
    }

    #[tokio::test]
    async fn strategies_on_one_timeframe_share_a_fetch() {
        let mut h = harness_with(&["BTCUSDT", "ETHUSDT"], &[], false, 50, &["second", "third"]);
        h.orchestrator.sweep().await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.sink.0.lock().await.len(), 6);

        h.orchestrator.sweep().await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unclosed_candle_is_never_evaluated() {
        let mut h = harness(&["BTCUSDT"], &[], false);
        h.orchestrator.sweep().await;
        h.orchestrator.sweep().await;
        let now = Utc::now().timestamp_millis();
        let seen = h.strategy.seen_last_close_time.lock().unwrap().clone();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|&t| t <= now));
    }

    #[tokio::test]
    async fn failing_pair_does_not_block_others() {
        let mut h = harness(&["BTCUSDT", "ETHUSDT", "SOLUSDT"], &["ETHUSDT"], false);
        h.orchestrator.sweep().await;

        let delivered = h.sink.0.lock().await;
        let mut symbols: Vec<_> = delivered.iter().map(|s| s.symbol.clone()).collect();
        symbols.sort();
        assert_eq!(symbols, vec!["BTCUSDT", "SOLUSDT"]);
        assert_eq!(h.handle.stats().pair_errors, 1);
    }

    #[tokio::test]
    async fn fire_once_is_tracked_by_orchestrator() {
        let mut h = harness(&["BTCUSDT"], &[], true);
        for _ in 0..5 {
            h.orchestrator.sweep().await;
        }
        assert_eq!(h.sink.0.lock().await.len(), 1);
        assert!(h.orchestrator.ledger.has_fired("every_bar", "BTCUSDT"));
    }

    #[tokio::test]
    async fn same_window_is_deduplicated_across_sweeps() {
        let mut h = harness(&["BTCUSDT"], &[], false);
        h.orchestrator.sweep().await;
        h.orchestrator.sweep().await;
        h.orchestrator.sweep().await;
        let stats = h.handle.stats();
        // Windows only change once a minute, so later evaluations are repeats
        // unless a minute boundary fell between sweeps.
        assert_eq!(stats.accepted + stats.duplicates, 3);
        assert!(stats.accepted >= 1);
    }

    #[tokio::test]
    async fn pause_resume_and_stop() {
        let h = harness(&["BTCUSDT"], &[], false);
        let handle = h.handle.clone();
        let task = tokio::spawn(h.orchestrator.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state().await, EngineState::Running);

        handle.send(EngineCommand::Pause).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.state().await, EngineState::Paused);
        let sweeps_paused = handle.stats().sweeps;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.stats().sweeps, sweeps_paused);

        handle.send(EngineCommand::Resume).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.state().await, EngineState::Running);

        handle.send(EngineCommand::Stop).await;
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert_eq!(handle.state().await, EngineState::Stopped);
        assert!(handle.stats().sweeps > sweeps_paused);
    }
}
