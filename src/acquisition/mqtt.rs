//! MQTT subscriber with connect retry and resubscribe on reconnect
//!
//! Startup blocks until the broker acknowledges the connection, retrying with
//! exponential backoff up to `max_connect_attempts`. Exhausting those attempts
//! is the one fatal error of the ingestion service.
//!
//! Once running, connection errors are retried forever with capped backoff.
//! The client uses a clean session, so the topic is resubscribed after every
//! `ConnAck`.
//!
//! A publish larger than `max_packet_size_bytes` is a protocol error in
//! rumqttc: the connection is dropped and re-established, and that one
//! message is lost. Other messages are not affected.

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::defaults::{MQTT_DISCONNECT_TIMEOUT_SECS, MQTT_REQUEST_CHANNEL_CAPACITY};
use crate::config::MqttConfig;

/// Messaging channel errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Broker {address} unreachable after {attempts} attempts: {last_error}")]
    ConnectExhausted {
        address: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Subscribe to '{topic}' failed: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },

    #[error("Connection cancelled before broker acknowledged")]
    Cancelled,
}

/// Delay before retry number `attempt` (1-based): `initial * 2^(attempt-1)`, capped at `max`.
pub fn backoff_delay(attempt: u32, initial_ms: u64, max_ms: u64) -> Duration {
    let exp = attempt.saturating_sub(1).min(32);
    let delay = initial_ms.saturating_mul(2u64.saturating_pow(exp)).min(max_ms);
    Duration::from_millis(delay)
}

/// Client options: clean session, keep-alive of at least 5s, symmetric packet limit.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_session(true);
    options.set_max_packet_size(config.max_packet_size_bytes, config.max_packet_size_bytes);
    options
}

/// Live subscription to one topic
pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    address: String,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    /// Consecutive failed polls since the last ConnAck
    retry_attempt: u32,
    messages_received: u64,
    reconnections: u64,
}

impl MqttSubscriber {
    /// Connect, wait for the broker's ConnAck, and subscribe.
    pub async fn connect(config: &MqttConfig, cancel: &CancellationToken) -> Result<Self, MqttError> {
        let address = format!("{}:{}", config.host, config.port);

        let (client, mut eventloop) =
            AsyncClient::new(mqtt_options(config), MQTT_REQUEST_CHANNEL_CAPACITY);

        tracing::info!(address = %address, client_id = %config.client_id, "Connecting to MQTT broker");

        let max_attempts = config.max_connect_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MqttError::Cancelled),
                polled = eventloop.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    tracing::info!(address = %address, code = ?ack.code, "MQTT connection established");
                    break;
                }
                Ok(_) => {
                    // Outgoing Connect and similar; not a failed attempt
                    attempt -= 1;
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        tracing::error!(
                            address = %address,
                            max_attempts = max_attempts,
                            "MQTT connection exhausted, all attempts failed"
                        );
                        return Err(MqttError::ConnectExhausted {
                            address,
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let delay = backoff_delay(attempt, config.initial_backoff_ms, config.max_backoff_ms);
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "MQTT connect failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(MqttError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        client
            .subscribe(&config.topic, QoS::AtLeastOnce)
            .await
            .map_err(|source| MqttError::Subscribe {
                topic: config.topic.clone(),
                source,
            })?;
        tracing::info!(topic = %config.topic, "Subscribed");

        Ok(Self {
            client,
            eventloop,
            topic: config.topic.clone(),
            address,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            retry_attempt: 0,
            messages_received: 0,
            reconnections: 0,
        })
    }

    /// Subscribed topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Total publishes received
    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Wait for the next publish. Returns `None` once `cancel` fires.
    ///
    /// Reconnects internally; never gives up while running.
    pub async fn next_message(&mut self, cancel: &CancellationToken) -> Option<(String, Vec<u8>)> {
        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                polled = self.eventloop.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.messages_received += 1;
                    return Some((publish.topic, publish.payload.to_vec()));
                }
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    // Only a ConnAck after a failure is a reconnect
                    if self.retry_attempt > 0 {
                        self.reconnections += 1;
                        tracing::info!(
                            address = %self.address,
                            total_reconnections = self.reconnections,
                            "MQTT reconnection successful"
                        );
                    }
                    self.retry_attempt = 0;
                    if !ack.session_present {
                        self.resubscribe();
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    tracing::debug!(topic = %self.topic, "Subscription acknowledged");
                }
                Ok(_) => {}
                Err(e) => self.backoff_after(e, cancel).await?,
            }
        }
    }

    fn resubscribe(&self) {
        // try_subscribe: we are the only poller, awaiting a full channel would deadlock
        match self.client.try_subscribe(&self.topic, QoS::AtLeastOnce) {
            Ok(()) => tracing::info!(topic = %self.topic, "Resubscribed after reconnect"),
            Err(e) => tracing::warn!(topic = %self.topic, error = %e, "Resubscribe failed"),
        }
    }

    async fn backoff_after(&mut self, e: ConnectionError, cancel: &CancellationToken) -> Option<()> {
        self.retry_attempt = self.retry_attempt.saturating_add(1);
        let delay = backoff_delay(self.retry_attempt, self.initial_backoff_ms, self.max_backoff_ms);
        tracing::warn!(
            address = %self.address,
            attempt = self.retry_attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "MQTT connection lost, reconnecting"
        );
        tokio::select! {
            _ = cancel.cancelled() => None,
            _ = tokio::time::sleep(delay) => Some(()),
        }
    }

    /// Unsubscribe, disconnect, and drive the event loop until the
    /// Disconnect packet is sent (bounded by a timeout).
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.client.try_unsubscribe(&self.topic) {
            tracing::debug!(error = %e, "Unsubscribe request not queued");
        }
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "Disconnect request not queued");
        }

        let drain = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };

        if tokio::time::timeout(Duration::from_secs(MQTT_DISCONNECT_TIMEOUT_SECS), drain)
            .await
            .is_err()
        {
            tracing::warn!(address = %self.address, "MQTT disconnect timed out");
        }

        tracing::info!(
            address = %self.address,
            messages_received = self.messages_received,
            reconnections = self.reconnections,
            "MQTT connection closed"
        );
    }
}
