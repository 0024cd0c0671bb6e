//! Domain error types for the hub publisher
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All library code returns Result<T, PublisherError>.

use thiserror::Error;

/// Publisher domain errors
///
/// Every variant carries structured context fields for diagnostics.
/// Callers can pattern-match on the variant to tell which stage of the
/// publish flow failed without parsing message strings.
///
/// Example:
/// ```text
/// PublisherError::EventTooLarge { size: 2048, max: 1024 }
/// → "event of 2048 bytes does not fit an empty batch (max 1024 bytes)"
/// ```
#[derive(Error, Debug)]
pub enum PublisherError {
    /// Configuration error (environment variable or flag missing or invalid)
    #[error("configuration error: {0}")]
    Config(String),

    /// The connection credential could not be parsed or does not match the hub
    #[error("invalid connection credential: {0}")]
    InvalidCredential(String),

    /// Broker endpoint unreachable or handshake rejected
    #[error("failed to connect to broker at '{endpoint}'")]
    Connection {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Batch could not be allocated on the connection
    #[error("cannot create batch for hub '{hub}': {reason}")]
    BatchCreation { hub: String, reason: String },

    /// A single event is larger than an empty batch can hold
    #[error("event of {size} bytes does not fit an empty batch (max {max} bytes)")]
    EventTooLarge { size: usize, max: usize },

    /// Batch transmission failed (network, authorization, hub not found)
    #[error("failed to send batch to hub '{hub}'")]
    Send {
        hub: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Hub stream could not be looked up or created
    #[error("failed to provision hub '{hub}'")]
    HubProvisioning {
        hub: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Event body serialization failed
    #[error("event serialization failed")]
    Serialization(#[from] serde_json::Error),
}

impl PublisherError {
    /// Returns a static label string for the `error_type` log field.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InvalidCredential(_) => "credential",
            Self::Connection { .. } => "connection",
            Self::BatchCreation { .. } => "batch_creation",
            Self::EventTooLarge { .. } => "event_too_large",
            Self::Send { .. } => "send",
            Self::HubProvisioning { .. } => "hub_provisioning",
            Self::Serialization(_) => "serialization",
        }
    }

    /// True for failures raised while establishing the session.
    ///
    /// No connection exists after these, so there is nothing to release.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::InvalidCredential(_) | Self::Connection { .. })
    }

    /// Renders the error with its full source chain, `outer: inner: ...`.
    pub fn chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_error() -> Box<dyn std::error::Error + Send + Sync> {
        Box::new(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"))
    }

    #[test]
    fn every_variant_has_distinct_error_type_label() {
        let labels = [
            PublisherError::Config("test".to_string()).error_type_label(),
            PublisherError::InvalidCredential("test".to_string()).error_type_label(),
            PublisherError::Connection {
                endpoint: "nats://localhost:4222".to_string(),
                source: test_error(),
            }
            .error_type_label(),
            PublisherError::BatchCreation {
                hub: "eh1".to_string(),
                reason: "closed".to_string(),
            }
            .error_type_label(),
            PublisherError::EventTooLarge { size: 2, max: 1 }.error_type_label(),
            PublisherError::Send {
                hub: "eh1".to_string(),
                source: test_error(),
            }
            .error_type_label(),
            PublisherError::HubProvisioning {
                hub: "eh1".to_string(),
                source: test_error(),
            }
            .error_type_label(),
            PublisherError::Serialization(serde_json::from_str::<()>("invalid").unwrap_err())
                .error_type_label(),
        ];

        let mut unique = labels.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(labels.len(), unique.len(), "Duplicate error_type_label found");
    }

    #[test]
    fn error_messages_contain_context() {
        let err = PublisherError::Send {
            hub: "eh1".to_string(),
            source: test_error(),
        };
        assert!(err.to_string().contains("'eh1'"));

        let err = PublisherError::EventTooLarge { size: 2048, max: 1024 };
        let msg = err.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn chain_includes_source() {
        let err = PublisherError::Connection {
            endpoint: "nats://localhost:4222".to_string(),
            source: test_error(),
        };
        assert_eq!(
            err.chain(),
            "failed to connect to broker at 'nats://localhost:4222': connection refused"
        );
    }

    #[test]
    fn connect_failures_are_classified() {
        assert!(PublisherError::InvalidCredential("x".to_string()).is_connect_failure());
        assert!(PublisherError::Connection {
            endpoint: "nats://x".to_string(),
            source: test_error(),
        }
        .is_connect_failure());
        assert!(!PublisherError::BatchCreation {
            hub: "eh1".to_string(),
            reason: "closed".to_string(),
        }
        .is_connect_failure());
    }
}
