//! Single-message publish flow
//!
//! connect → [ensure hub] → create batch → build message → add → send,
//! then report and release. No retries: the first failure ends the
//! attempt. The connection is closed exactly once on every path that
//! opened it; if the flow is cancelled mid-publish, dropping the
//! connection releases it instead.

use crate::broker::{Connection, Connector};
use crate::config::PublisherConfig;
use crate::console::Console;
use crate::error::PublisherError;
use crate::events::{EventData, TestPayload};
use rand::Rng;
use std::io::Write;
use tracing::{error, info};

/// Publish one freshly generated test message to the configured hub
///
/// Returns the payload that was delivered. Every outcome is also written
/// to `console`.
pub async fn send_test_message<C, R, O, E>(
    connector: &C,
    config: &PublisherConfig,
    rng: &mut R,
    console: &mut Console<O, E>,
) -> Result<TestPayload, PublisherError>
where
    C: Connector,
    R: Rng,
    O: Write,
    E: Write,
{
    let hub = config.connection.hub_name.as_str();

    console.announce(hub);
    info!(hub, "Sending test message");

    let connection = match connector.connect(&config.connection).await {
        Ok(connection) => connection,
        Err(e) => {
            report_failure(console, &e);
            return Err(e);
        }
    };

    let result = publish_once(&connection, config, rng).await;

    match &result {
        Ok(payload) => {
            info!(hub, test_number = payload.test_number, "Message sent");
            console.success(payload);
        }
        Err(e) => report_failure(console, e),
    }

    connection.close().await;
    result
}

async fn publish_once<C, R>(
    connection: &C,
    config: &PublisherConfig,
    rng: &mut R,
) -> Result<TestPayload, PublisherError>
where
    C: Connection,
    R: Rng,
{
    if config.ensure_hub {
        connection.ensure_hub().await?;
    }

    let mut batch = connection.create_batch()?;

    let payload = TestPayload::now(config.message.as_str(), rng);
    let event = EventData::from_body(&payload)?;
    let size = event.len();

    if !batch.try_add(event) {
        return Err(PublisherError::EventTooLarge {
            size,
            max: batch.max_event_size(),
        });
    }

    connection.send(batch).await?;
    Ok(payload)
}

fn report_failure<O: Write, E: Write>(console: &mut Console<O, E>, e: &PublisherError) {
    error!(error = %e, error_type = e.error_type_label(), "Failed to send test message");
    console.failure(e);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::config::{ConnectionConfig, LogFormat};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    fn config(ensure_hub: bool) -> PublisherConfig {
        PublisherConfig {
            connection: ConnectionConfig {
                endpoint: Some("memory://local".to_string()),
                hub_name: "eh1".to_string(),
                credential: String::new(),
                connect_timeout: Duration::from_secs(1),
            },
            message: "unit".to_string(),
            ensure_hub,
            seed: None,
            log_level: "warn".to_string(),
            log_format: LogFormat::Text,
        }
    }

    #[tokio::test]
    async fn test_ensure_hub_provisions_before_sending() {
        let broker = MemoryBroker::new();
        let mut console = Console::new(Vec::new(), Vec::new());

        let payload = send_test_message(
            &broker,
            &config(true),
            &mut StdRng::seed_from_u64(1),
            &mut console,
        )
        .await
        .unwrap();

        let delivered = broker.delivered("eh1");
        assert_eq!(delivered, vec![serde_json::to_value(&payload).unwrap()]);
    }

    #[tokio::test]
    async fn test_oversized_message_is_reported_and_connection_released() {
        let broker = MemoryBroker::new().with_hub("eh1").with_max_batch_bytes(16);
        let mut console = Console::new(Vec::new(), Vec::new());

        let err = send_test_message(
            &broker,
            &config(false),
            &mut StdRng::seed_from_u64(1),
            &mut console,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PublisherError::EventTooLarge { max: 14, .. }));
        assert_eq!(broker.stats().sends, 0);
        assert_eq!(broker.stats().closes, 1);
    }
}
