//! ---
//! fleetsim_section: "11-simulation"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Labeled samples and per-metric batches handed to sinks."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use indexmap::IndexMap;

use crate::server::Server;

/// Utilization metric emitted for every server.
pub const CPU_USAGE: &str = "cpu_usage";
/// Active (1) / passive (0) indicator emitted for database servers.
pub const DB_IS_ACTIVE: &str = "db_is_active";

pub const LABEL_NAME: &str = "__name__";
pub const LABEL_JOB: &str = "job";
pub const LABEL_INSTANCE: &str = "instance";
pub const LABEL_ROLE: &str = "role";

/// One labeled value for one server.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub server: Server,
    pub metric_name: String,
    pub value: u8,
    /// Ordered as `__name__`, `job`, `instance`, `role`.
    pub labels: IndexMap<String, String>,
}

impl Sample {
    pub fn new(server: &Server, metric_name: &str, job: &str, value: u8) -> Self {
        let mut labels = IndexMap::with_capacity(4);
        labels.insert(LABEL_NAME.to_owned(), metric_name.to_owned());
        labels.insert(LABEL_JOB.to_owned(), job.to_owned());
        labels.insert(LABEL_INSTANCE.to_owned(), server.name.clone());
        labels.insert(LABEL_ROLE.to_owned(), server.role.as_str().to_owned());
        Self {
            server: server.clone(),
            metric_name: metric_name.to_owned(),
            value: value.min(100),
            labels,
        }
    }

    pub fn utilization(server: &Server, job: &str, value: u8) -> Self {
        Self::new(server, CPU_USAGE, job, value)
    }

    pub fn activity(server: &Server, job: &str, active: bool) -> Self {
        Self::new(server, DB_IS_ACTIVE, job, u8::from(active))
    }
}

/// Samples sharing one metric name, produced by a single tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub tick: u64,
    pub metric_name: String,
    pub samples: Vec<Sample>,
}

impl SampleBatch {
    pub fn new(tick: u64, metric_name: impl Into<String>) -> Self {
        Self {
            tick,
            metric_name: metric_name.into(),
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Value recorded for `server`, if the batch carries one.
    pub fn value_for(&self, server: &str) -> Option<u8> {
        self.samples
            .iter()
            .find(|sample| sample.server.name == server)
            .map(|sample| sample.value)
    }
}
