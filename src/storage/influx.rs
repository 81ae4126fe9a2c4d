//! InfluxDB v2 writer
//!
//! `InfluxWriter::write` encodes the point to line protocol and pushes it onto
//! a bounded channel with `try_send`. A background flusher drains the channel
//! and POSTs batches to `/api/v2/write`. A full queue drops the point; a
//! failed batch is dropped whole. Both are counted, never retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::line_protocol::encode_point;
use super::{PointSink, WriteStats, WriteStatsSnapshot};
use crate::config::InfluxConfig;
use crate::types::EvaluatedPoint;

/// Errors from the InfluxDB HTTP API
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("InfluxDB rejected write with status {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Handle to the write queue. Cheap to share behind an `Arc<dyn PointSink>`.
pub struct InfluxWriter {
    tx: mpsc::Sender<String>,
    measurement: String,
    stats: Arc<WriteStats>,
}

impl InfluxWriter {
    /// Build the HTTP client and start the flusher task.
    ///
    /// The flusher stops when `cancel` fires, after draining and flushing
    /// whatever is still queued.
    pub fn spawn(
        config: &InfluxConfig,
        cancel: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), SinkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(WriteStats::default());

        let client = InfluxClient {
            http,
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
        };

        let flusher = Flusher {
            client,
            rx,
            stats: Arc::clone(&stats),
            batch_size: config.batch_size.max(1),
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
        };

        info!(
            url = %config.url,
            org = %config.org,
            bucket = %config.bucket,
            measurement = %config.measurement,
            batch_size = config.batch_size,
            "InfluxDB writer started"
        );

        let handle = tokio::spawn(flusher.run(cancel));

        Ok((
            Self {
                tx,
                measurement: config.measurement.clone(),
                stats,
            },
            handle,
        ))
    }
}

impl PointSink for InfluxWriter {
    fn write(&self, point: &EvaluatedPoint) {
        let line = encode_point(&self.measurement, point);
        match self.tx.try_send(line) {
            Ok(()) => self.stats.record_enqueued(),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.record_dropped(1);
                warn!(sensor = %point.sensor_name, "Write queue full, point dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.record_dropped(1);
                debug!(sensor = %point.sensor_name, "Writer closed, point dropped");
            }
        }
    }

    fn stats(&self) -> WriteStatsSnapshot {
        self.stats.snapshot()
    }

    fn backend_name(&self) -> &'static str {
        "influxdb"
    }
}

// ============================================================================
// HTTP client
// ============================================================================

struct InfluxClient {
    http: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxClient {
    async fn write_lines(&self, body: String) -> Result<(), SinkError> {
        let resp = self
            .http
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(SinkError::Rejected { status, body })
    }
}

// ============================================================================
// Background flusher
// ============================================================================

struct Flusher {
    client: InfluxClient,
    rx: mpsc::Receiver<String>,
    stats: Arc<WriteStats>,
    batch_size: usize,
    flush_interval: Duration,
}

impl Flusher {
    async fn run(mut self, cancel: CancellationToken) {
        let mut batch: Vec<String> = Vec::with_capacity(self.batch_size);
        let mut tick = tokio::time::interval(self.flush_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.rx.close();
                    while let Ok(line) = self.rx.try_recv() {
                        batch.push(line);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    self.flush(&mut batch).await;
                    break;
                }
                received = self.rx.recv() => match received {
                    Some(line) => {
                        batch.push(line);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => {
                        self.flush(&mut batch).await;
                        break;
                    }
                },
                _ = tick.tick() => {
                    self.flush(&mut batch).await;
                }
            }
        }

        let stats = self.stats.snapshot();
        info!(
            written = stats.written,
            dropped = stats.dropped,
            "InfluxDB writer stopped"
        );
    }

    async fn flush(&self, batch: &mut Vec<String>) {
        if batch.is_empty() {
            return;
        }

        let count = batch.len() as u64;
        let body = batch.join("\n");
        batch.clear();

        match self.client.write_lines(body).await {
            Ok(()) => {
                self.stats.record_written(count);
                debug!(points = count, "Flushed batch to InfluxDB");
            }
            Err(e) => {
                self.stats.record_dropped(count);
                warn!(error = %e, points = count, "InfluxDB write failed, batch dropped");
            }
        }
    }
}
