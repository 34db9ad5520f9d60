use async_trait::async_trait;
use futures::StreamExt;
use listener_engine::{Notification, Transport, TransportConn, TransportError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_postgres::{AsyncMessage, NoTls};
use tracing::{info, warn};

/// Postgres LISTEN/NOTIFY transport. One connection per session; every
/// configured channel gets a LISTEN, and the liveness probe is a `SELECT 1`
/// round trip.
pub struct PgTransport {
    dsn: String,
}

impl PgTransport {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self { dsn: dsn.into() }
    }
}

/// Channel names come from config, but quote the identifier anyway so names
/// with dots, dashes or mixed case subscribe unmangled.
fn listen_statement(channel: &str) -> String {
    format!("LISTEN \"{}\";", channel.replace('"', "\"\""))
}

#[async_trait]
impl Transport for PgTransport {
    type Conn = PgConn;

    async fn connect(&mut self, channels: &[String]) -> Result<PgConn, TransportError> {
        let (client, mut connection) = tokio_postgres::connect(&self.dsn, NoTls)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        // The connection future must be driven for the client to work at
        // all; notifications surface there, so funnel them into a channel
        // the supervisor can poll with a timeout.
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(async move {
            let mut messages = futures::stream::poll_fn(move |cx| connection.poll_message(cx));
            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notification(n)) => {
                        let note = Notification {
                            channel: n.channel().to_string(),
                            payload: n.payload().to_string(),
                        };
                        if tx.send(note).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "postgres connection task failed");
                        break;
                    }
                }
            }
        });

        // All-or-nothing: one failed LISTEN fails the whole attempt and the
        // supervisor retries from scratch.
        for channel in channels {
            client
                .batch_execute(&listen_statement(channel))
                .await
                .map_err(|e| TransportError::Subscribe {
                    channel: channel.clone(),
                    reason: e.to_string(),
                })?;
            info!(%channel, "listening on channel");
        }

        Ok(PgConn {
            client,
            notifications: rx,
            driver,
        })
    }
}

pub struct PgConn {
    client: tokio_postgres::Client,
    notifications: mpsc::UnboundedReceiver<Notification>,
    driver: JoinHandle<()>,
}

#[async_trait]
impl TransportConn for PgConn {
    async fn next_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Notification>, TransportError> {
        match tokio::time::timeout(timeout, self.notifications.recv()).await {
            Ok(Some(note)) => Ok(Some(note)),
            // The driver task ended: the socket is gone.
            Ok(None) => Err(TransportError::Stream("notification stream closed".into())),
            Err(_) => Ok(None),
        }
    }

    async fn heartbeat(&mut self) -> Result<(), TransportError> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Heartbeat(e.to_string()))
    }

    async fn close(&mut self) {
        // Dropping the client closes the socket; stopping the driver task is
        // the only explicit cleanup needed.
        self.driver.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_statement_quotes_identifier() {
        assert_eq!(
            listen_statement("canal_sensores_corriente"),
            r#"LISTEN "canal_sensores_corriente";"#
        );
        assert_eq!(
            listen_statement("Mixed.Case-name"),
            r#"LISTEN "Mixed.Case-name";"#
        );
        assert_eq!(listen_statement(r#"odd"name"#), r#"LISTEN "odd""name";"#);
    }
}
