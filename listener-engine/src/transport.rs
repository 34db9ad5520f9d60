use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// One notification as delivered by the pub/sub source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
}

/// Transport failures, by phase. The supervisor recovers from all of these
/// with reconnect + backoff; none is fatal on its own.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("subscribe to '{channel}' failed: {reason}")]
    Subscribe { channel: String, reason: String },
    #[error("notification stream failed: {0}")]
    Stream(String),
    #[error("heartbeat probe failed: {0}")]
    Heartbeat(String),
}

/// Factory for pub/sub connections. `connect` must establish the connection
/// and subscribe to every channel; a partial subscription failure is a
/// connect failure for the whole attempt.
#[async_trait]
pub trait Transport: Send {
    type Conn: TransportConn;

    async fn connect(&mut self, channels: &[String]) -> Result<Self::Conn, TransportError>;
}

/// One live subscribed connection.
#[async_trait]
pub trait TransportConn: Send {
    /// Wait up to `timeout` for the next notification. `Ok(None)` means the
    /// idle window elapsed with nothing pending; it is not evidence of a dead
    /// connection (that is what `heartbeat` is for).
    async fn next_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Notification>, TransportError>;

    /// Trivial round-trip query; an error is proof the connection is dead.
    async fn heartbeat(&mut self) -> Result<(), TransportError>;

    /// Best-effort teardown; close errors are swallowed by implementations.
    async fn close(&mut self);
}
