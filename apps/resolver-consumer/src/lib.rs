//! Resolver Consumer Service
//!
//! Drains records from a queue and feeds them to the record-matching engine.
//!
//! ## Architecture
//!
//! ```text
//! Queue (Redis Stream, consumer group)
//!   ↓ (prefetch credit)
//! Consumer fetch loop
//!   ↓ (bounded worker pool)
//! EngineGateway (HTTP)
//!   ↓ (completion: success / data error / fatal)
//! ack · dead-letter · drain-and-exit
//! ```
//!
//! ## Behavior
//!
//! - Bounded parallelism: worker count and prefetch credit are explicit
//! - Rejected records are dead-lettered and consumed, never retried
//! - Any fatal engine or queue error drains in-flight work, then exits
//!   non-zero; a stop signal drains and exits zero
//! - Long-running records are reported periodically until they resolve

mod config;

pub use config::AppConfig;

use clap::Parser;
use core_config::{env_or_default, Environment};
use engine_gateway::{EngineGateway, HttpEngineGateway};
use eyre::{Result, WrapErr};
use queue_worker::{
    metrics, Consumer, Dispatcher, RedisQueue, RedisQueueConfig, StatsReporter, StdoutInfoSink,
    WorkTracker,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Command-line options; environment variables cover the rest.
#[derive(Parser, Debug)]
#[command(
    name = "resolver-consumer",
    about = "Queue consumer feeding the record-matching engine"
)]
pub struct Args {
    /// Queue connection string (overrides RESOLVER_QUEUE_URL)
    #[arg(short, long)]
    pub queue: Option<String>,

    /// Emit the engine's enrichment output for each record
    #[arg(short, long)]
    pub info: bool,

    /// Verbose engine tracing
    #[arg(short = 't', long)]
    pub debug_trace: bool,
}

/// Run the consumer service.
///
/// Wiring order matters: configuration and the engine come up before the
/// first fetch, so a broken deployment exits without touching the queue.
///
/// # Errors
///
/// Returns an error if:
/// - Required configuration is missing or malformed
/// - The engine heartbeat fails
/// - The queue connection fails
/// - The consumer stops on a fatal error (after draining)
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let args = Args::parse();

    let environment = Environment::from_env();
    let log_level = if args.debug_trace {
        "debug".to_string()
    } else {
        env_or_default("RESOLVER_LOG_LEVEL", "info")
    };
    core_config::tracing::init_tracing(&environment, &log_level);

    // Initialize Prometheus metrics
    metrics::init_metrics();

    info!("Starting resolver consumer");
    info!("Environment: {:?}", environment);

    let app_config = AppConfig::load(&args).wrap_err("Failed to load configuration")?;
    info!(
        queue = %app_config.queue_name,
        workers = app_config.workers,
        prefetch = app_config.prefetch,
        long_record_secs = app_config.long_record_secs,
        with_info = app_config.with_info,
        "Configuration loaded"
    );

    // Engine first: there is nothing to consume for without it
    info!("Initializing record-matching engine");
    let engine = HttpEngineGateway::connect(&app_config.engine)
        .await
        .wrap_err("Failed to initialize record-matching engine")?;
    let engine: Arc<dyn EngineGateway> = Arc::new(engine);

    let queue_config = RedisQueueConfig::new(&app_config.queue_url, &app_config.queue_name)
        .with_consumer_group(&app_config.consumer_group)
        .with_dead_letter_stream(&app_config.dead_letter_stream);
    let transport = Arc::new(
        RedisQueue::connect(queue_config)
            .await
            .wrap_err("Failed to connect to queue")?,
    );

    let consumer_config = app_config.consumer_config();
    let tracker = WorkTracker::new();
    let (dispatcher, completions) =
        Dispatcher::new(engine.clone(), tracker.clone(), &consumer_config);
    let reporter = StatsReporter::new(engine.clone(), tracker.clone(), &consumer_config);
    let consumer = Consumer::new(
        transport,
        dispatcher,
        tracker,
        Arc::new(StdoutInfoSink),
        consumer_config,
    );

    // Set up the shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    // The reporter is a pure observer; it dies with the consumer
    let reporter_handle = tokio::spawn(reporter.run(shutdown_rx.clone()));

    let result = consumer.run(completions, shutdown_rx).await;
    reporter_handle.abort();

    result.wrap_err("Consumer stopped on fatal error")?;
    info!("Receive is done");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
