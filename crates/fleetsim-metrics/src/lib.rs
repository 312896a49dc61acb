//! ---
//! fleetsim_section: "03-observability"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Simulator self-instrumentation and scrape endpoint."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Bind `listen` and serve `registry` at `/metrics` until [`MetricsExporter::shutdown`].
///
/// Port 0 is allowed; the resolved address is available from the handle.
pub async fn serve_metrics(
    registry: SharedRegistry,
    listen: SocketAddr,
) -> Result<MetricsExporter> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind metrics exporter on {listen}"))?;
    let addr = listener
        .local_addr()
        .context("failed to resolve metrics exporter address")?;

    let app = Router::new()
        .route("/metrics", get(scrape))
        .with_state(registry);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    info!(address = %addr, "metrics exporter listening");
    Ok(MetricsExporter {
        addr,
        stop: Some(stop_tx),
        task,
    })
}

async fn scrape(State(registry): State<SharedRegistry>) -> Response {
    match TextEncoder::new().encode_to_string(&registry.gather()) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode simulator metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// Running `/metrics` endpoint.
#[derive(Debug)]
pub struct MetricsExporter {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl MetricsExporter {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting scrapes and wait for in-flight ones to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task
            .await
            .context("metrics exporter task panicked")?
            .context("metrics exporter failed")
    }
}

/// Metrics describing the simulator's own progress, not the simulated fleet.
#[derive(Clone)]
pub struct SimulatorMetrics {
    registry: SharedRegistry,
    ticks_total: IntCounter,
    failovers_total: IntCounterVec,
    emission_failures_total: IntCounterVec,
    active_primary: IntGaugeVec,
    tick_duration_seconds: Histogram,
}

impl SimulatorMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let ticks_total = IntCounter::with_opts(Opts::new(
            "fleetsim_ticks_total",
            "Number of simulation ticks completed",
        ))?;
        registry.register(Box::new(ticks_total.clone()))?;

        let failovers_total = IntCounterVec::new(
            Opts::new(
                "fleetsim_failovers_total",
                "Database failovers triggered by simulated overload",
            ),
            &["demoted", "promoted"],
        )?;
        registry.register(Box::new(failovers_total.clone()))?;

        let emission_failures_total = IntCounterVec::new(
            Opts::new(
                "fleetsim_emission_failures_total",
                "Sample batches the metric sink failed to accept",
            ),
            &["metric"],
        )?;
        registry.register(Box::new(emission_failures_total.clone()))?;

        let active_primary = IntGaugeVec::new(
            Opts::new(
                "fleetsim_active_primary",
                "Indicator (0/1) whether a database server currently holds the primary role",
            ),
            &["server"],
        )?;
        registry.register(Box::new(active_primary.clone()))?;

        let buckets = prometheus::exponential_buckets(0.0005, 2.0, 14)
            .context("failed to construct histogram buckets")?;
        let tick_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "fleetsim_tick_duration_seconds",
                "Time spent generating, evaluating, and emitting one tick",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(tick_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            ticks_total,
            failovers_total,
            emission_failures_total,
            active_primary,
            tick_duration_seconds,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn observe_tick(&self, duration: Duration) {
        self.ticks_total.inc();
        self.tick_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_failover(&self, demoted: &str, promoted: &str) {
        self.failovers_total
            .with_label_values(&[demoted, promoted])
            .inc();
    }

    pub fn record_emission_failure(&self, metric: &str) {
        self.emission_failures_total
            .with_label_values(&[metric])
            .inc();
    }

    pub fn set_active(&self, server: &str, active: bool) {
        self.active_primary
            .with_label_values(&[server])
            .set(if active { 1 } else { 0 });
    }

    pub fn ticks(&self) -> u64 {
        self.ticks_total.get()
    }
}

impl std::fmt::Debug for SimulatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatorMetrics").finish_non_exhaustive()
    }
}
