//! Event handling module
//!
//! Provides the test message body and the size-bounded batches it is sent in.

pub mod batch;
pub mod payload;

pub use batch::{EventBatch, EventData};
pub use payload::TestPayload;
