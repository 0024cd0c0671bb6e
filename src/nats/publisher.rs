//! NATS JetStream hub connection
//!
//! A hub is a JetStream subject; the stream capturing it carries the
//! hub's name, uppercased and sanitised. Each batch is one JetStream
//! publish, acknowledged by the stream before `send` returns.

use crate::config::{BrokerTarget, Transport};
use crate::connection_string::Auth;
use crate::error::PublisherError;
use crate::events::EventBatch;
use async_nats::connection::State;
use async_nats::jetstream::context::PublishErrorKind;
use async_nats::jetstream::{self, Context as JsContext};
use async_nats::{Client, ConnectOptions, HeaderMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::fmt::Hyphenated;

/// Client name reported to the server
pub const CLIENT_NAME: &str = "hub-publisher";

/// Batch limit used when the server does not advertise one
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Header names set on every batch
pub mod header_names {
    /// JetStream de-duplication id: the batch id
    pub const MESSAGE_ID: &str = "Nats-Msg-Id";
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// Number of events in the frame
    pub const EVENT_COUNT: &str = "Event-Count";
}

const CONTENT_TYPE_JSON: &str = "application/json";

/// Version line opening every HPUB header block
const HEADER_VERSION_LINE: &str = "NATS/1.0\r\n";

fn batch_header_fields<'a>(
    batch_id: &'a str,
    event_count: &'a str,
) -> [(&'static str, &'a str); 3] {
    [
        (header_names::MESSAGE_ID, batch_id),
        (header_names::CONTENT_TYPE, CONTENT_TYPE_JSON),
        (header_names::EVENT_COUNT, event_count),
    ]
}

/// Bytes the header block occupies on the wire:
/// version line, `Name: Value\r\n` per field, blank line
fn encoded_header_len(fields: &[(&str, &str)]) -> usize {
    let lines: usize = fields
        .iter()
        .map(|(name, value)| name.len() + ": ".len() + value.len() + "\r\n".len())
        .sum();
    HEADER_VERSION_LINE.len() + lines + "\r\n".len()
}

/// Largest header block a batch can carry
///
/// The server counts headers against `max_payload`, so this is reserved
/// out of every batch.
pub fn header_budget() -> usize {
    let widest_id = "0".repeat(Hyphenated::LENGTH);
    let widest_count = usize::MAX.to_string();
    encoded_header_len(&batch_header_fields(&widest_id, &widest_count))
}

/// Frame limit for a server advertising `max_payload`
pub fn batch_limit(max_payload: usize) -> usize {
    max_payload.saturating_sub(header_budget())
}

/// Open JetStream session scoped to one hub
pub struct NatsConnection {
    client: Client,
    jetstream: JsContext,
    hub: String,
    closed: AtomicBool,
}

impl NatsConnection {
    /// Connect to the target's server
    pub async fn open(target: &BrokerTarget, timeout: Duration) -> Result<Self, PublisherError> {
        info!(url = %target.url, hub = %target.hub, "Connecting to NATS");

        let options = match &target.auth {
            Auth::Anonymous => ConnectOptions::new(),
            Auth::SharedKey { name, key } => {
                ConnectOptions::with_user_and_password(name.clone(), key.clone())
            }
            Auth::Signature(token) => ConnectOptions::with_token(token.clone()),
        }
        .name(CLIENT_NAME)
        .connection_timeout(timeout)
        .require_tls(target.transport == Transport::Tls);

        let client = options
            .connect(target.url.as_str())
            .await
            .map_err(|e| PublisherError::Connection {
                endpoint: target.url.clone(),
                source: Box::new(e),
            })?;

        let jetstream = jetstream::new(client.clone());

        info!(url = %target.url, "Connected to NATS JetStream");

        Ok(Self {
            client,
            jetstream,
            hub: target.hub.clone(),
            closed: AtomicBool::new(false),
        })
    }

    /// Create the hub's stream if missing
    pub async fn ensure_hub(&self) -> Result<(), PublisherError> {
        use async_nats::jetstream::stream::{Config, RetentionPolicy, StorageType};

        let config = Config {
            name: stream_name(&self.hub),
            subjects: vec![self.hub.clone()],
            retention: RetentionPolicy::Limits,
            max_age: Duration::from_secs(24 * 60 * 60),
            storage: StorageType::File,
            ..Default::default()
        };

        match self.jetstream.get_or_create_stream(config).await {
            Ok(_) => {
                info!(hub = %self.hub, stream = %stream_name(&self.hub), "Hub stream ready");
                Ok(())
            }
            Err(e) => {
                warn!(hub = %self.hub, error = %e, "Failed to provision hub stream");
                Err(PublisherError::HubProvisioning {
                    hub: self.hub.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Allocate a batch bounded by the server's max payload, less the
    /// header budget
    pub fn create_batch(&self) -> Result<EventBatch, PublisherError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublisherError::BatchCreation {
                hub: self.hub.clone(),
                reason: "connection is closed".to_string(),
            });
        }

        if !matches!(self.client.connection_state(), State::Connected) {
            return Err(PublisherError::BatchCreation {
                hub: self.hub.clone(),
                reason: "connection is not ready".to_string(),
            });
        }

        let max_payload = match self.client.server_info().max_payload {
            0 => DEFAULT_MAX_PAYLOAD,
            advertised => advertised,
        };

        Ok(EventBatch::new(self.hub.clone(), batch_limit(max_payload)))
    }

    /// Publish the batch as one message and wait for the stream's ack
    pub async fn send(&self, batch: EventBatch) -> Result<(), PublisherError> {
        if batch.is_empty() {
            warn!(hub = %self.hub, "Skipping send of empty batch");
            return Ok(());
        }

        if self.closed.load(Ordering::SeqCst) {
            return Err(PublisherError::Send {
                hub: self.hub.clone(),
                source: "connection is closed".into(),
            });
        }

        let batch_id = batch.id().to_string();
        let event_count = batch.len().to_string();

        let mut headers = HeaderMap::new();
        for (name, value) in batch_header_fields(&batch_id, &event_count) {
            headers.insert(name, value);
        }

        let frame = batch.to_frame();

        debug!(
            hub = %self.hub,
            batch_id = %batch_id,
            events = batch.len(),
            bytes = frame.len(),
            "Publishing batch"
        );

        let ack = self
            .jetstream
            .publish_with_headers(self.hub.clone(), headers, frame.into())
            .await
            .map_err(|e| self.send_error(e))?
            .await
            .map_err(|e| self.send_error(e))?;

        if ack.duplicate {
            warn!(hub = %self.hub, batch_id = %batch_id, "Broker reported batch as duplicate");
        }

        info!(
            hub = %self.hub,
            stream = %ack.stream,
            seq = ack.sequence,
            "Batch published"
        );
        Ok(())
    }

    fn send_error(&self, e: jetstream::context::PublishError) -> PublisherError {
        if matches!(e.kind(), PublishErrorKind::StreamNotFound) {
            warn!(hub = %self.hub, "Hub not found: no stream captures this subject");
        } else {
            warn!(hub = %self.hub, error = %e, "Failed to publish batch");
        }

        PublisherError::Send {
            hub: self.hub.clone(),
            source: Box::new(e),
        }
    }

    /// Drain and close the connection
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!(hub = %self.hub, "Connection already closed");
            return;
        }

        info!("Closing NATS connection");
        if let Err(e) = self.client.drain().await {
            warn!(error = %e, "Failed to drain NATS connection");
        }
    }
}

impl Drop for NatsConnection {
    fn drop(&mut self) {
        // Dropping the last client handle shuts the connection down, but
        // without the drain unacknowledged publishes are lost
        if !*self.closed.get_mut() {
            warn!(hub = %self.hub, "Connection dropped without close");
        }
    }
}

/// Stream name for a hub: uppercase, with characters invalid in stream
/// names replaced by `_`
pub fn stream_name(hub: &str) -> String {
    hub.chars()
        .map(|c| match c {
            '.' | '*' | '>' | '/' | '\\' => '_',
            c if c.is_whitespace() => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}
