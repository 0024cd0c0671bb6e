//! Broker seam
//!
//! The publish flow talks to a broker only through `Connector` and
//! `Connection`. `BrokerConnector` picks the backend from the resolved
//! endpoint scheme: NATS JetStream for `nats://`, `tls://` and `sb://`,
//! the in-process broker for `memory://`.

pub mod memory;

use crate::config::{ConnectionConfig, Transport};
use crate::error::PublisherError;
use crate::events::EventBatch;
use crate::nats::NatsConnection;
use async_trait::async_trait;

pub use memory::{Fault, MemoryBroker, MemoryConnection};

/// Opens sessions to a broker
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection;

    /// Establish a session to the configured hub
    ///
    /// Fails with `InvalidCredential` or `Connection`. Every returned
    /// connection must be released with `Connection::close`.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, PublisherError>;
}

/// An open session scoped to one hub
#[async_trait]
pub trait Connection: Send + Sync {
    /// Create the hub on the broker if it does not exist yet
    async fn ensure_hub(&self) -> Result<(), PublisherError>;

    /// Allocate an empty batch sized to the broker's current limits
    fn create_batch(&self) -> Result<EventBatch, PublisherError>;

    /// Transmit every event of `batch` in one broker message
    ///
    /// Either the whole batch is acknowledged or the call fails with
    /// `PublisherError::Send`. An empty batch is not transmitted.
    async fn send(&self, batch: EventBatch) -> Result<(), PublisherError>;

    /// Release the session. Calls after the first are ignored.
    ///
    /// A connection dropped without `close`, e.g. when the publish future
    /// is cancelled, releases itself and logs a warning.
    async fn close(&self);
}

/// Connector used by the binary: dispatches on the endpoint scheme
#[derive(Clone, Default)]
pub struct BrokerConnector {
    memory: MemoryBroker,
}

impl BrokerConnector {
    pub fn new(memory: MemoryBroker) -> Self {
        Self { memory }
    }
}

/// Connection returned by `BrokerConnector`
pub enum BrokerConnection {
    Nats(NatsConnection),
    Memory(MemoryConnection),
}

#[async_trait]
impl Connector for BrokerConnector {
    type Connection = BrokerConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, PublisherError> {
        let target = config.target()?;

        match target.transport {
            Transport::Memory => Ok(BrokerConnection::Memory(self.memory.open(&target)?)),
            Transport::Nats | Transport::Tls => Ok(BrokerConnection::Nats(
                NatsConnection::open(&target, config.connect_timeout).await?,
            )),
        }
    }
}

#[async_trait]
impl Connection for BrokerConnection {
    async fn ensure_hub(&self) -> Result<(), PublisherError> {
        match self {
            Self::Nats(conn) => conn.ensure_hub().await,
            Self::Memory(conn) => conn.ensure_hub().await,
        }
    }

    fn create_batch(&self) -> Result<EventBatch, PublisherError> {
        match self {
            Self::Nats(conn) => conn.create_batch(),
            Self::Memory(conn) => conn.create_batch(),
        }
    }

    async fn send(&self, batch: EventBatch) -> Result<(), PublisherError> {
        match self {
            Self::Nats(conn) => conn.send(batch).await,
            Self::Memory(conn) => conn.send(batch).await,
        }
    }

    async fn close(&self) {
        match self {
            Self::Nats(conn) => conn.close().await,
            Self::Memory(conn) => conn.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(endpoint: &str) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: Some(endpoint.to_string()),
            hub_name: "eh1".to_string(),
            credential: String::new(),
            connect_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_memory_scheme_routes_to_memory_broker() {
        let memory = MemoryBroker::new().with_hub("eh1");
        let connector = BrokerConnector::new(memory.clone());

        let conn = connector.connect(&config("memory://local")).await.unwrap();
        assert!(matches!(conn, BrokerConnection::Memory(_)));
        conn.close().await;

        assert_eq!(memory.stats().connects, 1);
        assert_eq!(memory.stats().closes, 1);
    }

    #[tokio::test]
    async fn test_bad_credential_fails_before_any_backend() {
        let memory = MemoryBroker::new().with_hub("eh1");
        let connector = BrokerConnector::new(memory.clone());

        let mut cfg = config("memory://local");
        cfg.credential = "not-a-connection-string".to_string();

        let err = connector.connect(&cfg).await.err().unwrap();
        assert!(matches!(err, PublisherError::InvalidCredential(_)));
        assert_eq!(memory.stats().connects, 0);
    }
}
