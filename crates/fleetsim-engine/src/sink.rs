//! ---
//! fleetsim_section: "11-simulation"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Metric sink seam between the tick loop and transports."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::sample::SampleBatch;

/// Result of a push the transport completed, successfully or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
}

impl PushOutcome {
    pub fn from_status(status_code: u16) -> Self {
        Self {
            success: (200..300).contains(&status_code),
            status_code: Some(status_code),
        }
    }

    pub fn accepted() -> Self {
        Self::from_status(204)
    }
}

/// Transport-level failure where no status was obtained.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("metric transport failed: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),
}

impl SinkError {
    pub fn transport(err: impl StdError + Send + Sync + 'static) -> Self {
        SinkError::Transport(Box::new(err))
    }
}

/// Accepts labeled sample batches in tick order.
///
/// A non-success [`PushOutcome`] and an `Err` are both reported by the loop
/// and never stop it.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn push(&self, batch: &SampleBatch) -> Result<PushOutcome, SinkError>;
}

#[async_trait]
impl<T: MetricSink + ?Sized> MetricSink for Arc<T> {
    async fn push(&self, batch: &SampleBatch) -> Result<PushOutcome, SinkError> {
        (**self).push(batch).await
    }
}

#[async_trait]
impl<T: MetricSink + ?Sized> MetricSink for Box<T> {
    async fn push(&self, batch: &SampleBatch) -> Result<PushOutcome, SinkError> {
        (**self).push(batch).await
    }
}

#[derive(Debug, Default)]
struct MemorySinkInner {
    batches: Vec<SampleBatch>,
    scripted: VecDeque<Result<u16, String>>,
}

/// In-process sink that records every batch, for scripted scenarios.
///
/// Responses default to 204; [`MemorySink::respond_with`] queues statuses or
/// transport errors that are consumed one per push.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemorySinkInner>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next responses. `Err(message)` simulates a transport error.
    pub fn respond_with(&self, responses: impl IntoIterator<Item = Result<u16, String>>) {
        self.inner.lock().scripted.extend(responses);
    }

    pub fn batches(&self) -> Vec<SampleBatch> {
        self.inner.lock().batches.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().batches.is_empty()
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct ScriptedTransportError(String);

#[async_trait]
impl MetricSink for MemorySink {
    async fn push(&self, batch: &SampleBatch) -> Result<PushOutcome, SinkError> {
        let mut inner = self.inner.lock();
        inner.batches.push(batch.clone());
        debug!(
            tick = batch.tick,
            metric = %batch.metric_name,
            samples = batch.len(),
            "memory sink recorded batch"
        );
        match inner.scripted.pop_front() {
            Some(Ok(status)) => Ok(PushOutcome::from_status(status)),
            Some(Err(message)) => Err(SinkError::transport(ScriptedTransportError(message))),
            None => Ok(PushOutcome::accepted()),
        }
    }
}

/// Sink that accepts every batch and keeps only totals. Memory use is
/// constant, so it suits unbounded dry runs.
#[derive(Debug, Clone, Default)]
pub struct CountingSink {
    batches: Arc<AtomicU64>,
    samples: Arc<AtomicU64>,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MetricSink for CountingSink {
    async fn push(&self, batch: &SampleBatch) -> Result<PushOutcome, SinkError> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.samples.fetch_add(batch.len() as u64, Ordering::Relaxed);
        Ok(PushOutcome::accepted())
    }
}
