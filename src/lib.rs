//! Hub Publisher - send one test event to a streaming broker hub
//!
//! Connects to a broker, publishes a single JSON test message in one batch
//! and reports the outcome, so a downstream trigger can be verified by hand.
//!
//! - `config`: environment/CLI configuration and target resolution
//! - `connection_string`: credential parsing
//! - `broker`: connector/connection seam and the in-memory broker
//! - `nats`: NATS JetStream backend
//! - `events`: message body and size-bounded batches
//! - `publisher`: the publish flow
//! - `console`: the human-readable report

pub mod broker;
pub mod config;
pub mod connection_string;
pub mod console;
pub mod error;
pub mod events;
pub mod nats;
pub mod publisher;

pub use broker::{BrokerConnector, Connection, Connector, MemoryBroker};
pub use config::{Cli, ConnectionConfig, LogFormat, PublisherConfig};
pub use console::Console;
pub use error::PublisherError;
pub use events::{EventBatch, EventData, TestPayload};
pub use publisher::send_test_message;
