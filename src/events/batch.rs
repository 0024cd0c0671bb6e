//! Size-bounded event batches
//!
//! A batch travels as one broker message whose payload is a JSON array of
//! the event bodies. Size accounting is done against that frame.

use crate::error::PublisherError;
use serde::Serialize;
use uuid::Uuid;

/// Frame bytes of an empty batch: `[]`
const EMPTY_FRAME: usize = 2;

/// A single event with its pre-encoded JSON body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    body: Vec<u8>,
}

impl EventData {
    /// Encode `body` as JSON
    pub fn from_body<T: Serialize>(body: &T) -> Result<Self, PublisherError> {
        Ok(Self {
            body: serde_json::to_vec(body)?,
        })
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Outbound batch for one hub
///
/// Owned by the publisher until it is handed to `send`, which consumes it.
#[derive(Debug)]
pub struct EventBatch {
    id: Uuid,
    hub: String,
    max_size_in_bytes: usize,
    size_in_bytes: usize,
    events: Vec<EventData>,
}

impl EventBatch {
    /// Create an empty batch bounded by `max_size_in_bytes`
    pub fn new(hub: impl Into<String>, max_size_in_bytes: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            hub: hub.into(),
            max_size_in_bytes,
            size_in_bytes: EMPTY_FRAME,
            events: Vec::new(),
        }
    }

    /// Append `event` if the frame stays within the size limit
    ///
    /// Returns `false` and leaves the batch untouched when it is full.
    pub fn try_add(&mut self, event: EventData) -> bool {
        let separator = usize::from(!self.events.is_empty());
        let new_size = self.size_in_bytes + separator + event.len();

        if new_size > self.max_size_in_bytes {
            return false;
        }

        self.size_in_bytes = new_size;
        self.events.push(event);
        true
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn hub(&self) -> &str {
        &self.hub
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Current frame size
    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    pub fn max_size_in_bytes(&self) -> usize {
        self.max_size_in_bytes
    }

    /// Largest single event an empty batch of this size accepts
    pub fn max_event_size(&self) -> usize {
        self.max_size_in_bytes.saturating_sub(EMPTY_FRAME)
    }

    /// Encode the batch into its wire frame
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.size_in_bytes);
        frame.push(b'[');
        for (i, event) in self.events.iter().enumerate() {
            if i > 0 {
                frame.push(b',');
            }
            frame.extend_from_slice(event.body());
        }
        frame.push(b']');
        frame
    }
}
