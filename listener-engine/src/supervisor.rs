use crate::backoff::BackoffPolicy;
use crate::buffer::{AggregationBuffer, Ingest};
use crate::forwarder::{ForwardOutcome, Forwarder, SinkTarget};
use crate::models::{Reading, Record};
use crate::registry::ChannelRegistry;
use crate::status::StatusTracker;
use crate::transport::{Notification, Transport, TransportConn, TransportError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Connection lifecycle states. `Degraded` means liveness is lost (failed
/// heartbeat or stream error) and teardown is about to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Listening,
    Degraded,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Listening => "listening",
            Self::Degraded => "degraded",
        }
    }
}

/// How the forward attempt relates to the pipeline thread. `Blocking`
/// reproduces the original synchronous behavior; `Spawned` dispatches the
/// call on its own task so a slow sink cannot stall notification
/// consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardMode {
    #[default]
    Blocking,
    Spawned,
}

/// Fatal pipeline conditions. Everything else is recovered locally.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("initial connection retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted { attempts: u32 },
    #[error("reconnect ceiling reached after {attempts} consecutive failures")]
    ReconnectCeilingReached { attempts: u32 },
}

/// Engine wiring for one pump variant.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sink endpoint for the consolidated record.
    pub record_target: SinkTarget,
    /// Base URL for the best-effort per-channel forwards; `None` disables
    /// them.
    pub per_channel_base: Option<String>,
    /// Idle window after which the heartbeat probe runs.
    pub poll_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub forward_mode: ForwardMode,
}

/// Owns the connection lifecycle and drives the aggregation pipeline:
/// connect + subscribe, poll, hand each notification to the buffer in
/// arrival order, dispatch completed records to the forwarder, reconnect
/// with backoff when liveness is lost.
pub struct Supervisor<T, F> {
    cfg: EngineConfig,
    transport: T,
    forwarder: F,
    registry: ChannelRegistry,
    buffer: AggregationBuffer,
    status: StatusTracker,
    channels: Vec<String>,
    state: ConnectionState,
}

impl<T, F> Supervisor<T, F>
where
    T: Transport,
    F: Forwarder + Clone + 'static,
{
    pub fn new(
        cfg: EngineConfig,
        transport: T,
        forwarder: F,
        registry: ChannelRegistry,
        buffer: AggregationBuffer,
        status: StatusTracker,
    ) -> Self {
        let mut channels = registry.channels();
        channels.sort();
        Self {
            cfg,
            transport,
            forwarder,
            registry,
            buffer,
            status,
            channels,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn buffer(&self) -> &AggregationBuffer {
        &self.buffer
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    /// Run until the retry budget is exhausted. Returns only on a fatal
    /// condition; transport trouble is handled here with reconnect +
    /// backoff.
    pub async fn run(&mut self) -> Result<(), PipelineError> {
        let mut consecutive_failures: u32 = 0;
        let mut ever_listened = false;

        loop {
            if consecutive_failures > 0 {
                let delay = self.cfg.backoff.delay_for(consecutive_failures);
                info!(
                    failures = consecutive_failures,
                    delay_ms = delay.as_millis() as u64,
                    "waiting before reconnect"
                );
                tokio::time::sleep(delay).await;
                self.status.record_reconnect();
            }

            self.transition(ConnectionState::Connecting);
            match self.transport.connect(&self.channels).await {
                Ok(mut conn) => {
                    consecutive_failures = 0;
                    ever_listened = true;
                    self.transition(ConnectionState::Listening);
                    info!(
                        channels = self.channels.len(),
                        "listener started, waiting for notifications"
                    );

                    let reason = self.listen(&mut conn).await;
                    self.transition(ConnectionState::Degraded);
                    warn!(error = %reason, "connection degraded, tearing down");
                    conn.close().await;
                }
                Err(e) => warn!(error = %e, "connect attempt failed"),
            }
            self.transition(ConnectionState::Disconnected);
            consecutive_failures += 1;

            // The initial phase has a bounded budget; once listening has
            // succeeded, reconnects go on forever unless a ceiling is set.
            let limit = if ever_listened {
                self.cfg.backoff.steady_retry_ceiling
            } else {
                Some(self.cfg.backoff.initial_retry_budget)
            };
            if let Some(limit) = limit {
                if consecutive_failures >= limit {
                    let err = if ever_listened {
                        PipelineError::ReconnectCeilingReached {
                            attempts: consecutive_failures,
                        }
                    } else {
                        PipelineError::RetryBudgetExhausted {
                            attempts: consecutive_failures,
                        }
                    };
                    error!(%err, "giving up");
                    return Err(err);
                }
            }
        }
    }

    /// Consume notifications until the connection proves dead; returns the
    /// error that degraded it.
    async fn listen(&mut self, conn: &mut T::Conn) -> TransportError {
        loop {
            match conn.next_notification(self.cfg.poll_timeout).await {
                Ok(Some(note)) => self.handle_notification(note).await,
                Ok(None) => {
                    debug!("idle poll window elapsed, probing connection");
                    if let Err(e) = conn.heartbeat().await {
                        return e;
                    }
                }
                Err(e) => return e,
            }
        }
    }

    async fn handle_notification(&mut self, note: Notification) {
        debug!(channel = %note.channel, "notification received");
        let reading: Reading = match serde_json::from_str(&note.payload) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(channel = %note.channel, error = %e, "undecodable payload discarded");
                return;
            }
        };

        if self.cfg.per_channel_base.is_some() {
            self.forward_single(&note.channel, &reading).await;
        }

        match self.buffer.ingest(&note.channel, reading) {
            Ingest::Completed { key, record } => self.forward_record(key, record).await,
            Ingest::Pending { key, present } => {
                debug!(%key, present, "reading stored, group pending")
            }
            Ingest::Discarded(reason) => {
                warn!(channel = %note.channel, %reason, "reading discarded")
            }
        }
        self.status.set_groups_pending(self.buffer.len());
    }

    /// Primary forward of a completed record. The group is already gone from
    /// the buffer; the outcome is logged and counted, nothing more.
    async fn forward_record(&self, key: String, record: Record) {
        let target = self.cfg.record_target.clone();
        let body = serde_json::Value::Object(record.into_iter().collect());
        match self.cfg.forward_mode {
            ForwardMode::Blocking => {
                let outcome = self.forwarder.forward(&target, &body).await;
                self.status.record_forward(outcome.is_success());
                log_record_outcome(&key, &target, &outcome);
            }
            ForwardMode::Spawned => {
                let forwarder = self.forwarder.clone();
                let status = self.status.clone();
                tokio::spawn(async move {
                    let outcome = forwarder.forward(&target, &body).await;
                    status.record_forward(outcome.is_success());
                    log_record_outcome(&key, &target, &outcome);
                });
            }
        }
    }

    /// Best-effort single-field forward to the channel's own endpoint, kept
    /// for compatibility with the per-channel backend routes. Its outcome
    /// never touches the aggregation path and is never retried.
    async fn forward_single(&self, channel: &str, reading: &Reading) {
        let Some(base) = &self.cfg.per_channel_base else {
            return;
        };
        let Some(route) = self.registry.route_for(channel) else {
            return;
        };
        let target = SinkTarget::new(format!("{base}{route}"));
        let body = serde_json::json!({
            "sensor_id": reading.sensor_id,
            "value": reading.value,
        });
        match self.cfg.forward_mode {
            ForwardMode::Blocking => {
                let outcome = self.forwarder.forward(&target, &body).await;
                log_single_outcome(channel, &target, &outcome);
            }
            ForwardMode::Spawned => {
                let forwarder = self.forwarder.clone();
                let channel = channel.to_string();
                tokio::spawn(async move {
                    let outcome = forwarder.forward(&target, &body).await;
                    log_single_outcome(&channel, &target, &outcome);
                });
            }
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!(from = self.state.as_str(), to = next.as_str(), "connection state changed");
            self.state = next;
            self.status.set_connection_state(next);
        }
    }
}

fn log_record_outcome(key: &str, target: &SinkTarget, outcome: &ForwardOutcome) {
    match outcome {
        ForwardOutcome::Success { status } => {
            info!(%key, url = %target.url, status, "record forwarded")
        }
        ForwardOutcome::Failure { reason } => {
            warn!(%key, url = %target.url, %reason, "record forward failed, group already removed")
        }
    }
}

fn log_single_outcome(channel: &str, target: &SinkTarget, outcome: &ForwardOutcome) {
    match outcome {
        ForwardOutcome::Success { status } => {
            debug!(%channel, url = %target.url, status, "channel forward succeeded")
        }
        ForwardOutcome::Failure { reason } => {
            warn!(%channel, url = %target.url, %reason, "channel forward failed (best effort)")
        }
    }
}
