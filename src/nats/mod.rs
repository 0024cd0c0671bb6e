//! NATS JetStream integration
//!
//! Network backend for hub connections.

mod publisher;

pub use publisher::{stream_name, NatsConnection};
