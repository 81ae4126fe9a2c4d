//! Message processing loop shared across all input modes.
//!
//! Pulls one message at a time from a [`MessageSource`], runs it through the
//! [`IngestionPipeline`] and publishes the outcome into [`AppState`]. A message
//! is fully processed before the next is read.

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::processor::{IngestionPipeline, MessageOutcome};
use super::source::{MessageEvent, MessageSource};
use super::{AppState, PipelineStats, SystemStatus};
use crate::config::defaults::PROGRESS_LOG_INTERVAL;

/// Owns everything the loop needs; consumed by [`run()`](ProcessingLoop::run).
pub struct ProcessingLoop {
    pipeline: IngestionPipeline,
    app_state: Arc<RwLock<AppState>>,
    topic: String,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    /// `topic` filters incoming messages; anything else is counted and ignored.
    pub fn new(
        pipeline: IngestionPipeline,
        app_state: Arc<RwLock<AppState>>,
        topic: impl Into<String>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            app_state,
            topic: topic.into(),
            cancel_token,
        }
    }

    /// Run until the source is exhausted or cancellation.
    ///
    /// Returns final pipeline statistics.
    pub async fn run<S: MessageSource + ?Sized>(self, source: &mut S) -> PipelineStats {
        info!(source = source.source_name(), topic = %self.topic, "Processing messages");
        self.app_state.write().await.status = SystemStatus::Ingesting;

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                result = source.next_message() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!(error = %e, "Source error");
                            break;
                        }
                    }
                }
            };

            let (topic, payload) = match event {
                MessageEvent::Message { topic, payload } => (topic, payload),
                MessageEvent::Eof => {
                    info!(source = source.source_name(), "Source reached end");
                    break;
                }
            };

            self.handle(&topic, &payload).await;
        }

        let stats = {
            let mut state = self.app_state.write().await;
            state.status = SystemStatus::Stopped;
            state.stats(self.pipeline.sink().stats())
        };
        log_final_stats(&stats);
        stats
    }

    async fn handle(&self, topic: &str, payload: &[u8]) {
        if topic != self.topic {
            debug!(topic = %topic, "Ignoring message on unexpected topic");
            let mut state = self.app_state.write().await;
            state.messages_received += 1;
            state.messages_ignored += 1;
            return;
        }

        let outcome = self.pipeline.process(payload);

        let mut state = self.app_state.write().await;
        state.messages_received += 1;
        match outcome {
            MessageOutcome::Completed { results, skipped } => {
                state.messages_processed += 1;
                state.sensor_extraction_failures += skipped.len() as u64;
                state.latest_results = results;
                state.last_message_time = Some(chrono::Utc::now());
            }
            MessageOutcome::ParseFailed(_) => {
                state.parse_failures += 1;
            }
        }

        if state.messages_received % PROGRESS_LOG_INTERVAL == 0 {
            let writes = self.pipeline.sink().stats();
            info!(
                messages = state.messages_received,
                processed = state.messages_processed,
                malformed = state.parse_failures,
                written = writes.written,
                dropped = writes.dropped,
                "Progress"
            );
        }
    }
}

fn log_final_stats(stats: &PipelineStats) {
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("FINAL STATISTICS");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("   Messages Received:    {}", stats.messages_received);
    info!("   Messages Processed:   {}", stats.messages_processed);
    info!("   Malformed Payloads:   {}", stats.parse_failures);
    info!("   Ignored (topic):      {}", stats.messages_ignored);
    info!("   Sensor Skips:         {}", stats.sensor_extraction_failures);
    info!("   Points Written:       {}", stats.writes.written);
    info!("   Points Dropped:       {}", stats.writes.dropped);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ReplaySource;
    use crate::sensors::SensorRegistry;
    use crate::storage::{MemorySink, PointSink};

    fn build(cancel: CancellationToken) -> (ProcessingLoop, Arc<RwLock<AppState>>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let pipeline = IngestionPipeline::new(
            Arc::new(SensorRegistry::standard()),
            Arc::clone(&sink) as Arc<dyn PointSink>,
        );
        let state = Arc::new(RwLock::new(AppState::default()));
        let processing = ProcessingLoop::new(pipeline, Arc::clone(&state), "water/quality", cancel);
        (processing, state, sink)
    }

    #[tokio::test]
    async fn test_counts_and_latest_results() {
        let (processing, state, sink) = build(CancellationToken::new());
        let mut source = ReplaySource::new(
            vec![
                ("water/quality".to_string(), br#"{"ph": 7.0, "tds": 250, "temperature": 25}"#.to_vec()),
                ("water/other".to_string(), br#"{"ph": 7.0}"#.to_vec()),
                ("water/quality".to_string(), b"{oops".to_vec()),
                ("water/quality".to_string(), br#"{"ph": 6.3}"#.to_vec()),
            ],
            0,
        );

        let stats = processing.run(&mut source).await;

        assert_eq!(stats.messages_received, 4);
        assert_eq!(stats.messages_processed, 2);
        assert_eq!(stats.parse_failures, 1);
        assert_eq!(stats.messages_ignored, 1);
        assert_eq!(stats.sensor_extraction_failures, 2);
        assert_eq!(stats.writes.written, 4);
        assert_eq!(sink.len(), 4);

        let state = state.read().await;
        assert_eq!(state.status, SystemStatus::Stopped);
        assert_eq!(state.latest_results.len(), 1);
        assert_eq!(state.latest_results[0].sensor, "pH");
        assert_eq!(state.latest_results[0].status, "Danger");
    }

    #[tokio::test]
    async fn test_cancelled_loop_stops() {
        let cancel = CancellationToken::new();
        let (processing, state, _sink) = build(cancel.clone());
        let mut source = ReplaySource::on_topic("water/quality", [r#"{"ph": 7.0}"#]);
        cancel.cancel();

        let stats = processing.run(&mut source).await;
        assert!(stats.messages_received <= 1);
        assert_eq!(state.read().await.status, SystemStatus::Stopped);
    }
}
