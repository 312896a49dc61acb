//! ---
//! fleetsim_section: "02-transport"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Remote-write metric sink."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
//! Pushes simulator batches to a Prometheus-compatible remote-write endpoint
//! (protobuf `WriteRequest`, snappy block compression, protocol 0.1.0).

pub mod proto;

use async_trait::async_trait;
use chrono::Utc;
use fleetsim_common::config::RemoteWriteConfig;
use fleetsim_engine::{MetricSink, PushOutcome, SampleBatch, SinkError};
use prost::Message;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

pub const REMOTE_WRITE_VERSION: &str = "0.1.0";
const VERSION_HEADER: &str = "x-prometheus-remote-write-version";

#[derive(Debug, Error)]
pub enum RemoteWriteError {
    #[error("snappy compression failed: {0}")]
    Compress(#[from] snap::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<RemoteWriteError> for SinkError {
    fn from(err: RemoteWriteError) -> Self {
        SinkError::transport(err)
    }
}

/// Convert a batch into a write request, one series per sample.
///
/// Labels are sorted by name as the protocol requires.
pub fn encode_batch(batch: &SampleBatch, timestamp_ms: i64) -> proto::WriteRequest {
    let timeseries = batch
        .samples
        .iter()
        .map(|sample| {
            let mut labels: Vec<proto::Label> = sample
                .labels
                .iter()
                .map(|(name, value)| proto::Label {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect();
            labels.sort_by(|a, b| a.name.cmp(&b.name));
            proto::TimeSeries {
                labels,
                samples: vec![proto::Sample {
                    value: f64::from(sample.value),
                    timestamp: timestamp_ms,
                }],
            }
        })
        .collect();
    proto::WriteRequest { timeseries }
}

/// Serialise and snappy-compress a write request into a request body.
pub fn compress_request(request: &proto::WriteRequest) -> Result<Vec<u8>, RemoteWriteError> {
    let encoded = request.encode_to_vec();
    Ok(snap::raw::Encoder::new().compress_vec(&encoded)?)
}

/// [`MetricSink`] speaking the remote-write protocol over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteWriteSink {
    client: reqwest::Client,
    url: Url,
}

impl RemoteWriteSink {
    pub fn new(config: &RemoteWriteConfig) -> Result<Self, RemoteWriteError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("snappy"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-protobuf"),
        );
        headers.insert(
            VERSION_HEADER,
            HeaderValue::from_static(REMOTE_WRITE_VERSION),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("fleetsim/", env!("CARGO_PKG_VERSION"))),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    async fn send(&self, batch: &SampleBatch) -> Result<PushOutcome, RemoteWriteError> {
        let request = encode_batch(batch, Utc::now().timestamp_millis());
        let body = compress_request(&request)?;
        trace!(
            tick = batch.tick,
            metric = %batch.metric_name,
            series = request.timeseries.len(),
            bytes = body.len(),
            "sending remote-write request"
        );
        let response = self.client.post(self.url.clone()).body(body).send().await?;
        let outcome = PushOutcome::from_status(response.status().as_u16());
        debug!(
            tick = batch.tick,
            metric = %batch.metric_name,
            status = response.status().as_u16(),
            "remote-write response"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl MetricSink for RemoteWriteSink {
    async fn push(&self, batch: &SampleBatch) -> Result<PushOutcome, SinkError> {
        Ok(self.send(batch).await?)
    }
}
