//! Message source abstraction for payload ingestion.
//!
//! Provides a unified trait for reading raw messages from different sources:
//! the MQTT broker (production), stdin (offline replay), and an in-memory
//! list (tests).

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::acquisition::MqttSubscriber;

/// Events produced by a message source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    /// A raw message body arrived on `topic`.
    Message { topic: String, payload: Vec<u8> },
    /// Source reached end of data (EOF for stdin/replay, shutdown for MQTT).
    Eof,
}

/// Trait abstracting where messages come from.
///
/// Implementations handle reconnection and pacing internally.
/// The processing loop calls [`next_message`](MessageSource::next_message)
/// in a select! with cancellation.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Read the next message from the source.
    ///
    /// Returns `MessageEvent::Eof` when no more data is available.
    /// Returns `Err` on unrecoverable errors.
    async fn next_message(&mut self) -> Result<MessageEvent>;

    /// Human-readable name for logging (e.g. "MQTT", "stdin", "replay").
    fn source_name(&self) -> &str;

    /// Release the underlying connection. Called once after the last read.
    async fn close(&mut self) {}
}

// ============================================================================
// MQTT Source
// ============================================================================

/// Reads publishes from a connected [`MqttSubscriber`].
pub struct MqttSource {
    subscriber: MqttSubscriber,
    cancel: CancellationToken,
}

impl MqttSource {
    pub fn new(subscriber: MqttSubscriber, cancel: CancellationToken) -> Self {
        Self { subscriber, cancel }
    }
}

#[async_trait]
impl MessageSource for MqttSource {
    async fn next_message(&mut self) -> Result<MessageEvent> {
        match self.subscriber.next_message(&self.cancel).await {
            Some((topic, payload)) => Ok(MessageEvent::Message { topic, payload }),
            None => Ok(MessageEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "MQTT"
    }

    /// Unsubscribe and disconnect from the broker.
    async fn close(&mut self) {
        self.subscriber.shutdown().await;
    }
}

// ============================================================================
// Stdin Source (one JSON payload per line)
// ============================================================================

/// Reads one payload per line from stdin, attributed to a fixed topic.
///
/// Lines are forwarded untouched so malformed input exercises the same
/// parse-failure path as a bad publish:
/// `cat readings.jsonl | simoka --stdin`
pub struct StdinSource {
    reader: tokio::io::BufReader<tokio::io::Stdin>,
    line_buffer: String,
    topic: String,
}

impl StdinSource {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            reader: tokio::io::BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(1024),
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl MessageSource for StdinSource {
    async fn next_message(&mut self) -> Result<MessageEvent> {
        use tokio::io::AsyncBufReadExt;
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(MessageEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            return Ok(MessageEvent::Message {
                topic: self.topic.clone(),
                payload: line.as_bytes().to_vec(),
            });
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

// ============================================================================
// Replay Source (in-memory)
// ============================================================================

/// Replays pre-loaded messages with optional inter-message delay.
pub struct ReplaySource {
    messages: std::vec::IntoIter<(String, Vec<u8>)>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(messages: Vec<(String, Vec<u8>)>, delay_ms: u64) -> Self {
        Self {
            messages: messages.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }

    /// Replay `payloads` on one topic with no delay.
    pub fn on_topic<I, P>(topic: &str, payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let messages = payloads
            .into_iter()
            .map(|p| (topic.to_string(), p.into()))
            .collect();
        Self::new(messages, 0)
    }
}

#[async_trait]
impl MessageSource for ReplaySource {
    async fn next_message(&mut self) -> Result<MessageEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.messages.next() {
            Some((topic, payload)) => {
                self.yielded_first = true;
                Ok(MessageEvent::Message { topic, payload })
            }
            None => Ok(MessageEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}
