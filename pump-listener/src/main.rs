//! Pump Listener - Sensor notification aggregation for the prediction backend
//!
//! Subscribes to the pump's Postgres NOTIFY channels, groups readings by
//! sampling instant, and posts one consolidated record per instant to the
//! prediction backend once enough fields have arrived. The same binary
//! serves both pump variants; `PUMP_LISTENER_CONFIG` selects the variant
//! file (configs/pump_a.yaml or configs/pump_b.yaml).

mod config;
mod health;
mod pg;

use anyhow::{Context, Result};
use listener_engine::{
    AggregationBuffer, EngineConfig, HttpForwarder, SinkTarget, StatusTracker, Supervisor,
};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; env vars set by the orchestrator win.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "pump_listener=info,listener_engine=info".to_string()),
        )
        .init();

    let cfg = config::load_variant_config()?;
    cfg.validate()?;
    let dsn = config::database_dsn()?;
    let base_url = cfg.resolve_base_url()?;
    info!(
        variant = %cfg.variant,
        channels = cfg.channels.len(),
        threshold = cfg.threshold,
        "pump listener starting"
    );

    let registry = cfg.registry();
    let buffer = AggregationBuffer::new(registry.clone(), cfg.buffer_policy());
    let forwarder = HttpForwarder::new(Duration::from_secs(cfg.forward_timeout_secs))
        .context("failed to build HTTP client")?;
    let status = StatusTracker::new();

    // Health endpoint runs on its own task so probes keep answering through
    // reconnect cycles.
    let health_port = config::health_port(&cfg);
    let health_status = status.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_port, health_status).await {
            error!(error = %e, "health endpoint failed");
        }
    });

    let engine_cfg = EngineConfig {
        record_target: SinkTarget::new(format!("{base_url}{}", cfg.record_route)),
        per_channel_base: cfg.per_channel_forward.then(|| base_url.clone()),
        poll_timeout: Duration::from_secs(cfg.poll_timeout_secs),
        backoff: cfg.backoff.clone(),
        forward_mode: cfg.forward_mode,
    };

    let transport = pg::PgTransport::new(dsn);
    let mut supervisor =
        Supervisor::new(engine_cfg, transport, forwarder, registry, buffer, status);
    supervisor.run().await.context("listener pipeline stopped")?;
    Ok(())
}
