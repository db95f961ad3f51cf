//! Application entry point for the `codemetal-sensorflow-relay` worker.
//!
//! This binary orchestrates the startup sequence for the relay, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Connecting to Redis and checking it answers
//! - Logging in once to the ingestion API for a bearer token
//! - Handing everything to the consumer loop in `worker`
//!
//! Any failure before the loop starts is fatal and exits non-zero. Once the
//! loop runs, nothing stops it short of process termination.
//!
//! # Environment Variables
//! - `REDIS_HOST`, `REDIS_PORT` (**required**) – queue location
//! - `NESTJS_API_URL` (**required**) – full ingestion URL
//! - `ADMIN_EMAIL`, `ADMIN_PASSWORD` (**required**) – login credentials
//! - `AI_SERVICE_URL` (optional) – secondary receiver
//! - `WORKER_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `WORKER_SPAN_EVENTS` (optional) – span event mode for tracing
use std::env;

use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

mod auth;
mod config;
mod delivery;
mod models;
mod queue;
mod retry;
mod worker;

use config::API_TIMEOUT;
use delivery::{DeliveryClient, Receiver};
use queue::RedisQueue;
use worker::{Worker, WorkerSettings};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to Redis: {}:{}", cfg.redis_host, cfg.redis_port);

    let queue = RedisQueue::connect(&cfg.redis_url(), cfg.queue_name.clone())
        .await
        .map_err(|e| {
            anyhow!(
                "Failed to connect to Redis '{}:{}': {}",
                cfg.redis_host,
                cfg.redis_port,
                e
            )
        })?;

    tracing::info!("Successfully connected to Redis, queue '{}'", queue.key());

    let http = reqwest::Client::builder().timeout(API_TIMEOUT).build()?;

    tracing::info!("Logging in to ingestion API at {}", cfg.login_url);
    let token = auth::login(&http, &cfg.credentials, &cfg.login_url)
        .await
        .map_err(|e| anyhow!("Failed to obtain access token: {}", e))?;
    tracing::info!("Login succeeded");

    let primary = Receiver::primary(cfg.ingest_url.clone(), token);
    let secondary = cfg.secondary_url.clone().map(Receiver::secondary);

    Worker::new(
        queue,
        DeliveryClient::new(http),
        primary,
        secondary,
        WorkerSettings::new(cfg.schema_version),
    )
    .run()
    .await;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `WORKER_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `WORKER_LOG_LEVEL` env var, with HTTP and
///   Redis client internals held at `warn`
///
/// Called once at startup before any logging macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("WORKER_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to WORKER_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("WORKER_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},hyper=warn,hyper_util=warn,reqwest=warn,redis=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
