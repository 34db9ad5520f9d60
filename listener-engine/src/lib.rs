//! Listener Engine - Notification aggregation core for the pump listeners
//!
//! One variant-agnostic engine, instantiated per pump variant with its own
//! channel registry, completeness policy and sink targets:
//! - `ChannelRegistry` : channel id -> field name (+ optional per-channel route)
//! - `AggregationBuffer` : correlation-key grouping, backfill, staleness eviction
//! - `Supervisor` : connection state machine, backoff, ordered delivery
//! - `Forwarder` : outbound HTTP call to the prediction sink, outcome-valued
//!
//! The transport (Postgres LISTEN/NOTIFY in production) is injected behind the
//! `Transport` trait so the whole pipeline is testable without a live server.

pub mod backoff;
pub mod buffer;
pub mod forwarder;
pub mod models;
pub mod registry;
pub mod status;
pub mod supervisor;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use buffer::{AggregationBuffer, BufferPolicy, DiscardReason, Ingest};
pub use forwarder::{ForwardOutcome, Forwarder, HttpForwarder, SinkTarget};
pub use models::{Reading, Record};
pub use registry::ChannelRegistry;
pub use status::{EngineHealth, StatusTracker};
pub use supervisor::{ConnectionState, EngineConfig, ForwardMode, PipelineError, Supervisor};
pub use transport::{Notification, Transport, TransportConn, TransportError};
