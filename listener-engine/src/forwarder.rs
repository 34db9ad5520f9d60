use async_trait::async_trait;
use std::time::Duration;

/// One sink endpoint, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    pub url: String,
}

impl SinkTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Result of one forward attempt. Failures are values, never panics or
/// errors propagated to the pipeline: the aggregation path treats every
/// outcome as advisory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    Success { status: u16 },
    Failure { reason: String },
}

impl ForwardOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[async_trait]
pub trait Forwarder: Send + Sync {
    /// POST `body` to `target`. Exactly one attempt; no retries here.
    async fn forward(&self, target: &SinkTarget, body: &serde_json::Value) -> ForwardOutcome;
}

/// Production forwarder: one shared reqwest client with a request timeout so
/// a slow sink cannot hold the pipeline forever.
#[derive(Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, target: &SinkTarget, body: &serde_json::Value) -> ForwardOutcome {
        match self.client.post(&target.url).json(body).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    ForwardOutcome::Success {
                        status: status.as_u16(),
                    }
                } else {
                    // Body may carry diagnostic text; logged upstream, never
                    // parsed for control flow.
                    let body = response.text().await.unwrap_or_default();
                    let diagnostic: String = body.chars().take(200).collect();
                    ForwardOutcome::Failure {
                        reason: format!("status {}: {diagnostic}", status.as_u16()),
                    }
                }
            }
            Err(e) => ForwardOutcome::Failure {
                reason: e.to_string(),
            },
        }
    }
}
