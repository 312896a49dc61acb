//! ---
//! fleetsim_section: "11-simulation"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Tick driver tying generation, failover, and emission together."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::time::{Duration, Instant};

use fleetsim_common::config::{ConfigError, FleetConfig};
use fleetsim_metrics::SimulatorMetrics;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::failover::{FailoverController, FailoverDecision, FailoverEvent};
use crate::generator::SignalSource;
use crate::sample::{Sample, SampleBatch, CPU_USAGE, DB_IS_ACTIVE};
use crate::server::Server;
use crate::sink::MetricSink;
use crate::state::SimulationState;

/// Fixed-period pacing between ticks. Missed periods are delayed, not bunched.
#[derive(Debug)]
pub struct RateLimiter {
    interval: tokio::time::Interval,
}

impl RateLimiter {
    /// `None` for a zero period, which disables pacing.
    pub fn new(period: Duration) -> Option<Self> {
        if period.is_zero() {
            return None;
        }
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(Self { interval })
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Between-tick cancellation. A closed channel means "never cancelled".
#[derive(Debug)]
struct ShutdownSignal {
    rx: Option<broadcast::Receiver<()>>,
}

impl ShutdownSignal {
    fn new(rx: Option<broadcast::Receiver<()>>) -> Self {
        Self { rx }
    }

    fn requested(&mut self) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            return false;
        };
        match rx.try_recv() {
            Ok(()) | Err(TryRecvError::Lagged(_)) => true,
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Closed) => {
                self.rx = None;
                false
            }
        }
    }

    async fn wait(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            match rx.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => return,
                Err(RecvError::Closed) => self.rx = None,
            }
        }
        std::future::pending::<()>().await
    }
}

/// What happened during one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    /// Utilization generated for the database that was active when the tick began.
    pub primary_load: u8,
    /// Active database after this tick's failover evaluation.
    pub active_primary: String,
    pub decision: FailoverDecision,
    pub batches: Vec<SampleBatch>,
    pub emission_failures: usize,
}

impl TickReport {
    pub fn failover(&self) -> Option<&FailoverEvent> {
        self.decision.event()
    }

    pub fn batch(&self, metric_name: &str) -> Option<&SampleBatch> {
        self.batches
            .iter()
            .find(|batch| batch.metric_name == metric_name)
    }
}

/// Totals for a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub ticks: u64,
    pub failovers: Vec<FailoverEvent>,
    pub emission_failures: u64,
    pub active_primary: String,
    pub cancelled: bool,
}

/// Drives ticks sequentially: generate, evaluate failover, emit.
pub struct SimulationLoop<S, K> {
    roster: Vec<Server>,
    state: SimulationState,
    controller: FailoverController,
    source: S,
    sink: K,
    job: String,
    iterations: Option<u64>,
    pacing: Duration,
    metrics: Option<SimulatorMetrics>,
}

impl<S, K> std::fmt::Debug for SimulationLoop<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationLoop")
            .field("roster", &self.roster)
            .field("state", &self.state)
            .field("controller", &self.controller)
            .field("job", &self.job)
            .field("iterations", &self.iterations)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl<S: SignalSource, K: MetricSink> SimulationLoop<S, K> {
    /// Build a loop from validated configuration. Invalid configuration is fatal.
    pub fn from_config(config: &FleetConfig, source: S, sink: K) -> Result<Self, ConfigError> {
        config.validate()?;
        let roster: Vec<Server> = config.servers.iter().map(Server::from).collect();
        let primary = config
            .initial_primary()
            .ok_or(ConfigError::NoDatabase)?
            .to_owned();
        let controller = FailoverController::from_config(&config.failover, &roster);
        Ok(Self {
            roster,
            state: SimulationState::new(primary),
            controller,
            source,
            sink,
            job: config.simulation.job.clone(),
            iterations: config.iteration_limit()?,
            pacing: config.simulation.pacing_interval,
            metrics: None,
        })
    }

    /// Build a loop from parts. `state.active_primary` must name a database in `roster`.
    pub fn new(
        roster: Vec<Server>,
        state: SimulationState,
        controller: FailoverController,
        source: S,
        sink: K,
    ) -> Result<Self, ConfigError> {
        if roster.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        let mut names = HashSet::with_capacity(roster.len());
        if let Some(duplicate) = roster.iter().find(|server| !names.insert(&server.name)) {
            return Err(ConfigError::DuplicateServer(duplicate.name.clone()));
        }
        match roster
            .iter()
            .find(|server| server.name == state.active_primary)
        {
            None => return Err(ConfigError::UnknownPrimary(state.active_primary)),
            Some(server) if !server.is_database() => {
                return Err(ConfigError::PrimaryNotDatabase(state.active_primary))
            }
            Some(_) => {}
        }
        Ok(Self {
            roster,
            state,
            controller,
            source,
            sink,
            job: "exporter".to_owned(),
            iterations: None,
            pacing: Duration::ZERO,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: SimulatorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Execute exactly one tick and advance the tick counter.
    pub async fn step(&mut self) -> TickReport {
        let started = Instant::now();
        let tick = self.state.tick;

        let mut values = Vec::with_capacity(self.roster.len());
        let mut primary_load = 0u8;
        for server in &self.roster {
            let is_active = server.is_database() && self.state.is_active(&server.name);
            let value = self.source.sample(server, is_active, tick);
            if is_active {
                primary_load = value;
            }
            values.push(value);
        }

        let decision = self.controller.evaluate(&mut self.state, primary_load);
        if let (Some(event), Some(metrics)) = (decision.event(), &self.metrics) {
            metrics.record_failover(&event.demoted, &event.promoted);
        }

        // Activity reflects the post-decision primary, so a failover is
        // visible in the same tick that triggered it.
        let mut utilization = SampleBatch::new(tick, CPU_USAGE);
        let mut activity = SampleBatch::new(tick, DB_IS_ACTIVE);
        for (server, value) in self.roster.iter().zip(values) {
            utilization.push(Sample::utilization(server, &self.job, value));
            if server.is_database() {
                let active = self.state.is_active(&server.name);
                activity.push(Sample::activity(server, &self.job, active));
                if let Some(metrics) = &self.metrics {
                    metrics.set_active(&server.name, active);
                }
            }
        }

        let batches = vec![utilization, activity];
        let mut emission_failures = 0;
        for batch in &batches {
            if !self.emit(batch).await {
                emission_failures += 1;
            }
        }

        self.state.tick += 1;
        if let Some(metrics) = &self.metrics {
            metrics.observe_tick(started.elapsed());
        }
        trace!(
            tick,
            primary_load,
            active = %self.state.active_primary,
            cooldown = self.state.failover_cooldown,
            emission_failures,
            "tick complete"
        );

        TickReport {
            tick,
            primary_load,
            active_primary: self.state.active_primary.clone(),
            decision,
            batches,
            emission_failures,
        }
    }

    async fn emit(&self, batch: &SampleBatch) -> bool {
        if batch.is_empty() {
            return true;
        }
        let delivered = match self.sink.push(batch).await {
            Ok(outcome) if outcome.success => true,
            Ok(outcome) => {
                warn!(
                    tick = batch.tick,
                    metric = %batch.metric_name,
                    status = ?outcome.status_code,
                    "metric sink rejected batch"
                );
                false
            }
            Err(err) => {
                warn!(
                    tick = batch.tick,
                    metric = %batch.metric_name,
                    error = %err,
                    "metric sink push failed"
                );
                false
            }
        };
        if !delivered {
            if let Some(metrics) = &self.metrics {
                metrics.record_emission_failure(&batch.metric_name);
            }
        }
        delivered
    }

    /// Run until the iteration limit is reached or `shutdown` fires.
    ///
    /// Cancellation is only observed between ticks.
    pub async fn run(&mut self, shutdown: Option<broadcast::Receiver<()>>) -> RunSummary {
        let mut shutdown = ShutdownSignal::new(shutdown);
        let mut limiter = RateLimiter::new(self.pacing);
        let mut summary = RunSummary::default();

        info!(
            servers = self.roster.len(),
            iterations = ?self.iterations,
            pacing_ms = self.pacing.as_millis() as u64,
            active = %self.state.active_primary,
            "simulation starting"
        );

        loop {
            if self.iterations.is_some_and(|limit| summary.ticks >= limit) {
                break;
            }
            if shutdown.requested() {
                summary.cancelled = true;
                break;
            }
            match limiter.as_mut() {
                Some(limiter) => tokio::select! {
                    biased;
                    _ = shutdown.wait() => {
                        summary.cancelled = true;
                        break;
                    }
                    _ = limiter.tick() => {}
                },
                // Unpaced ticks never suspend on their own; let the task that
                // delivers shutdown run on a single-threaded runtime.
                None => tokio::task::yield_now().await,
            }

            let report = self.step().await;
            summary.ticks += 1;
            summary.emission_failures += report.emission_failures as u64;
            if let FailoverDecision::Promoted(event) = report.decision {
                summary.failovers.push(event);
            }
        }

        summary.active_primary = self.state.active_primary.clone();
        if summary.cancelled {
            debug!(tick = self.state.tick, "shutdown observed between ticks");
        }
        info!(
            ticks = summary.ticks,
            failovers = summary.failovers.len(),
            emission_failures = summary.emission_failures,
            active = %summary.active_primary,
            cancelled = summary.cancelled,
            "simulation finished"
        );
        summary
    }
}
