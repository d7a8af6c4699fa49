//! Service configuration
//!
//! Everything comes from `RESOLVER_*` environment variables; the few CLI
//! flags override their env counterparts. A missing queue URL, queue name,
//! or engine configuration blob is a startup error.

use crate::Args;
use core_config::{env_flag, env_or_default, env_parse_or, env_required};
use engine_gateway::EngineConfig;
use eyre::{Result, WrapErr};
use queue_worker::{default_parallelism, ConsumerConfig};
use std::time::Duration;

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub queue_url: String,
    pub queue_name: String,
    pub consumer_group: String,
    pub dead_letter_stream: String,
    pub engine: EngineConfig,
    pub workers: usize,
    pub prefetch: usize,
    pub long_record_secs: u64,
    pub with_info: bool,
    pub abandon_on_fatal: bool,
}

impl AppConfig {
    /// Load configuration from the environment, applying CLI overrides.
    pub fn load(args: &Args) -> Result<Self> {
        let queue_url = match &args.queue {
            Some(url) => url.clone(),
            None => env_required("RESOLVER_QUEUE_URL")
                .wrap_err("A queue connection string is required (-q or RESOLVER_QUEUE_URL)")?,
        };
        let queue_name = env_required("RESOLVER_QUEUE_NAME")?;

        let blob = env_required("RESOLVER_ENGINE_CONFIG_JSON").wrap_err(
            "RESOLVER_ENGINE_CONFIG_JSON must be set with a proper JSON configuration",
        )?;
        let mut engine = EngineConfig::from_json(&blob)?;
        if args.debug_trace {
            engine.verbose_logging = true;
        }

        // 0 and unset both mean "pick for me"
        let workers = match env_parse_or("RESOLVER_WORKERS", 0usize)? {
            0 => default_parallelism(),
            n => n,
        };
        let prefetch = match env_parse_or("RESOLVER_PREFETCH", 0usize)? {
            0 => workers,
            n => n,
        };

        let long_record_secs = env_parse_or("RESOLVER_LONG_RECORD_SECS", 300u64)?;
        let with_info = args.info || env_flag("RESOLVER_WITH_INFO", false)?;

        let consumer_group = env_or_default("RESOLVER_CONSUMER_GROUP", "resolver_workers");
        let dead_letter_stream =
            env_or_default("RESOLVER_DLQ_STREAM", &format!("{queue_name}:dlq"));
        let abandon_on_fatal = env_flag("RESOLVER_ABANDON_ON_FATAL", false)?;

        Ok(Self {
            queue_url,
            queue_name,
            consumer_group,
            dead_letter_stream,
            engine,
            workers,
            prefetch,
            long_record_secs,
            with_info,
            abandon_on_fatal,
        })
    }

    /// The consumer-core view of this configuration.
    pub fn consumer_config(&self) -> ConsumerConfig {
        let threshold = Duration::from_secs(self.long_record_secs);
        ConsumerConfig::new(&self.queue_name)
            .with_workers(self.workers)
            .with_prefetch(self.prefetch)
            .with_long_record_threshold(threshold)
            .with_stats_interval(threshold / 2)
            .with_info(self.with_info)
            .with_abandon_on_fatal(self.abandon_on_fatal)
    }
}
