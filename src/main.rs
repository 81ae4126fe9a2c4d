//! SIMOKA - Water Quality Ingestion Service
//!
//! Main entry point. Subscribes to `water/quality`, evaluates every registered
//! sensor per message and writes classified points to InfluxDB.
//!
//! ## Usage
//!
//! ```bash
//! # Broker and InfluxDB from ./simoka.toml (or built-in defaults)
//! simoka
//!
//! # Explicit config, no database
//! simoka --config /etc/simoka/simoka.toml --dry-run
//!
//! # Offline replay, one JSON payload per line
//! cat readings.jsonl | simoka --stdin --dry-run
//! ```
//!
//! ## Environment Variables
//!
//! - `SIMOKA_CONFIG`: Config file path when `--config` is not given
//! - `SIMOKA_MQTT_HOST`, `SIMOKA_MQTT_PORT`: Broker address overrides
//! - `SIMOKA_INFLUX_URL`, `SIMOKA_INFLUX_TOKEN`: InfluxDB overrides
//! - `SIMOKA_CORS_ORIGINS`: Comma-separated origins allowed by the HTTP API
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use simoka::api::{create_app, DashboardState};
use simoka::config::defaults::SHUTDOWN_GRACE_SECS;
use simoka::config::MonitorConfig;
use simoka::pipeline::{
    AppState, IngestionPipeline, MessageSource, MqttSource, ProcessingLoop, StdinSource,
};
use simoka::{InfluxWriter, MemorySink, MqttError, MqttSubscriber, PointSink, SensorRegistry};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simoka")]
#[command(about = "SIMOKA water quality ingestion service")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides $SIMOKA_CONFIG and ./simoka.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read payloads from stdin (one JSON object per line) instead of MQTT
    #[arg(long)]
    stdin: bool,

    /// Override the HTTP server address (default: "0.0.0.0:5000")
    #[arg(short, long)]
    addr: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Keep points in memory instead of writing to InfluxDB
    #[arg(long)]
    dry_run: bool,
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskName {
    HttpServer,
    MessageProcessor,
    InfluxWriter,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::MessageProcessor => write!(f, "MessageProcessor"),
            TaskName::InfluxWriter => write!(f, "InfluxWriter"),
        }
    }
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!(error = %e, "[HttpServer] Server error");
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the message processor. When the source ends (stdin EOF) the whole
/// service shuts down.
///
/// `writer_cancel` is only cancelled once the source is closed, so every point
/// produced before shutdown reaches the writer queue before it drains.
fn spawn_processor<S: MessageSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    processing_loop: ProcessingLoop,
    mut source: S,
    cancel_token: CancellationToken,
    writer_cancel: CancellationToken,
) {
    // Cancels the writer on every exit path, abort included
    let writer_guard = writer_cancel.drop_guard();

    task_set.spawn(async move {
        info!("[MessageProcessor] Task starting");
        let stats = processing_loop.run(&mut source).await;
        source.close().await;
        info!(%stats, "[MessageProcessor] Finished");

        drop(writer_guard);
        cancel_token.cancel();
        Ok(TaskName::MessageProcessor)
    });
}

/// Map a failed startup connect to the process result.
///
/// Cancellation (Ctrl+C while still connecting) is a clean exit; anything
/// else means the broker was never reached.
fn startup_connect_outcome(e: MqttError) -> Result<()> {
    match e {
        MqttError::Cancelled => {
            info!("Shutdown requested before the broker connected");
            Ok(())
        }
        other => Err(anyhow::Error::new(other).context("MQTT broker unavailable")),
    }
}

/// Watch tasks until cancellation or a task failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!(task = %task_name, "Supervisor: Task completed normally");
                    }
                    Some(Ok(Err(e))) => {
                        error!(error = %e, "Supervisor: Task failed");
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Supervisor: Task panicked");
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Wait for remaining tasks to wind down, aborting stragglers after the grace period.
async fn drain_tasks(task_set: &mut JoinSet<Result<TaskName>>) {
    let grace = Duration::from_secs(SHUTDOWN_GRACE_SECS);
    let drained = tokio::time::timeout(grace, async {
        while let Some(result) = task_set.join_next().await {
            match result {
                Ok(Ok(task_name)) => info!(task = %task_name, "Task stopped"),
                Ok(Err(e)) => warn!(error = %e, "Task stopped with error"),
                Err(e) => warn!(error = %e, "Task aborted"),
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(grace_secs = SHUTDOWN_GRACE_SECS, "Tasks still running after grace period, aborting");
        task_set.abort_all();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let mut config =
        MonitorConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  SIMOKA - Water Quality Ingestion");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let registry = Arc::new(SensorRegistry::from_config(&config.sensors));
    for def in registry.list() {
        info!(
            sensor = %def.name,
            field = %def.field,
            unit = %def.unit,
            min = def.safe_range.min,
            max = def.safe_range.max,
            "Sensor registered"
        );
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    // Cancelled by the processor task after its source is closed
    let writer_cancel = CancellationToken::new();
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    let sink: Arc<dyn PointSink> = if args.dry_run || !config.influx.enabled {
        info!("Point sink: in-memory (dry run, nothing is persisted)");
        Arc::new(MemorySink::default())
    } else {
        let (writer, handle) = InfluxWriter::spawn(&config.influx, writer_cancel.clone())
            .context("Failed to start InfluxDB writer")?;
        task_set.spawn(async move {
            handle.await.context("InfluxDB writer task failed")?;
            Ok(TaskName::InfluxWriter)
        });
        Arc::new(writer)
    };

    let app_state = Arc::new(RwLock::new(AppState::default()));

    if config.server.enabled {
        let listener = tokio::net::TcpListener::bind(&config.server.addr)
            .await
            .with_context(|| format!("Failed to bind to {}", config.server.addr))?;
        info!(addr = %config.server.addr, "HTTP server listening");

        let dashboard_state =
            DashboardState::new(Arc::clone(&app_state), Arc::clone(&registry), Arc::clone(&sink));
        spawn_http_server(&mut task_set, listener, create_app(dashboard_state), cancel_token.clone());
    }

    let pipeline = IngestionPipeline::new(Arc::clone(&registry), Arc::clone(&sink));
    let processing_loop = ProcessingLoop::new(
        pipeline,
        Arc::clone(&app_state),
        config.mqtt.topic.clone(),
        cancel_token.clone(),
    );

    if args.stdin {
        info!("Input: stdin (one JSON payload per line)");
        let source = StdinSource::new(config.mqtt.topic.clone());
        spawn_processor(&mut task_set, processing_loop, source, cancel_token.clone(), writer_cancel);
    } else {
        info!(host = %config.mqtt.host, port = config.mqtt.port, topic = %config.mqtt.topic, "Input: MQTT");
        let subscriber = match MqttSubscriber::connect(&config.mqtt, &cancel_token).await {
            Ok(subscriber) => subscriber,
            Err(e) => {
                cancel_token.cancel();
                writer_cancel.cancel();
                drain_tasks(&mut task_set).await;
                return startup_connect_outcome(e);
            }
        };
        let source = MqttSource::new(subscriber, cancel_token.clone());
        spawn_processor(&mut task_set, processing_loop, source, cancel_token.clone(), writer_cancel);
    }

    let result = run_supervisor(&mut task_set, cancel_token.clone()).await;

    // The processor task cancels the writer once its source is closed
    cancel_token.cancel();
    drain_tasks(&mut task_set).await;

    let writes = sink.stats();
    info!(
        written = writes.written,
        dropped = writes.dropped,
        pending = writes.pending(),
        "Shutdown complete"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use simoka::config::MqttConfig;
    use simoka::pipeline::MessageEvent;

    /// Source that is already exhausted and records the writer token at close time.
    struct SlowClosingSource {
        writer_cancel: CancellationToken,
        writer_cancelled_during_close: Arc<AtomicBool>,
    }

    #[async_trait]
    impl MessageSource for SlowClosingSource {
        async fn next_message(&mut self) -> Result<MessageEvent> {
            Ok(MessageEvent::Eof)
        }

        fn source_name(&self) -> &str {
            "slow-close"
        }

        async fn close(&mut self) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.writer_cancelled_during_close
                .store(self.writer_cancel.is_cancelled(), Ordering::SeqCst);
        }
    }

    fn processing_loop(cancel: CancellationToken) -> ProcessingLoop {
        let sink: Arc<dyn PointSink> = Arc::new(MemorySink::default());
        let pipeline = IngestionPipeline::new(Arc::new(SensorRegistry::standard()), sink);
        ProcessingLoop::new(
            pipeline,
            Arc::new(RwLock::new(AppState::default())),
            "water/quality",
            cancel,
        )
    }

    #[tokio::test]
    async fn test_writer_cancelled_only_after_source_closed() {
        let cancel = CancellationToken::new();
        let writer_cancel = CancellationToken::new();
        let observed = Arc::new(AtomicBool::new(true));
        let source = SlowClosingSource {
            writer_cancel: writer_cancel.clone(),
            writer_cancelled_during_close: Arc::clone(&observed),
        };

        // Shutdown already requested, as after Ctrl+C
        cancel.cancel();

        let mut task_set = JoinSet::new();
        spawn_processor(
            &mut task_set,
            processing_loop(cancel.clone()),
            source,
            cancel.clone(),
            writer_cancel.clone(),
        );
        assert!(!writer_cancel.is_cancelled());

        let task = task_set.join_next().await.unwrap().unwrap().unwrap();
        assert_eq!(task, TaskName::MessageProcessor);
        assert!(!observed.load(Ordering::SeqCst), "writer stopped before the source closed");
        assert!(writer_cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_aborted_processor_still_cancels_writer() {
        let cancel = CancellationToken::new();
        let writer_cancel = CancellationToken::new();
        let source = SlowClosingSource {
            writer_cancel: writer_cancel.clone(),
            writer_cancelled_during_close: Arc::new(AtomicBool::new(false)),
        };

        let mut task_set = JoinSet::new();
        spawn_processor(
            &mut task_set,
            processing_loop(cancel.clone()),
            source,
            cancel,
            writer_cancel.clone(),
        );
        task_set.abort_all();
        while task_set.join_next().await.is_some() {}

        assert!(writer_cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_startup_connect_is_clean_exit() {
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
            ..MqttConfig::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = MqttSubscriber::connect(&config, &cancel).await.err().unwrap();
        assert!(startup_connect_outcome(err).is_ok());
    }

    #[test]
    fn test_exhausted_startup_connect_is_fatal() {
        let err = startup_connect_outcome(MqttError::ConnectExhausted {
            address: "localhost:1883".to_string(),
            attempts: 10,
            last_error: "connection refused".to_string(),
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "MQTT broker unavailable");
        assert!(matches!(
            err.downcast_ref::<MqttError>(),
            Some(MqttError::ConnectExhausted { attempts: 10, .. })
        ));
    }
}
