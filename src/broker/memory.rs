//! In-process broker
//!
//! Backs `memory://` endpoints and the publish flow tests. Hubs must be
//! registered (or provisioned through `ensure_hub`) before they accept
//! batches, and a single fault can be injected at connect, hub
//! provisioning, batch creation or send.

use super::{Connection, Connector};
use crate::config::{BrokerTarget, ConnectionConfig};
use crate::error::PublisherError;
use crate::events::EventBatch;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Default batch limit, matching the usual broker payload ceiling
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1024 * 1024;

/// Failure to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Endpoint unreachable
    Connect,
    /// Hub cannot be created
    EnsureHub,
    /// Connection not ready for batches
    CreateBatch,
    /// Transmission rejected
    Send,
    /// Transmission never completes
    StallSend,
}

/// Operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub connects: usize,
    pub closes: usize,
    pub batches_created: usize,
    pub sends: usize,
}

#[derive(Default)]
struct BrokerState {
    hubs: HashMap<String, Vec<serde_json::Value>>,
    max_batch_bytes: Option<usize>,
    fault: Option<Fault>,
    stats: BrokerStats,
}

/// Shared handle to an in-process broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hub that accepts batches
    pub fn with_hub(self, hub: impl Into<String>) -> Self {
        self.lock().hubs.entry(hub.into()).or_default();
        self
    }

    pub fn with_max_batch_bytes(self, max: usize) -> Self {
        self.lock().max_batch_bytes = Some(max);
        self
    }

    pub fn with_fault(self, fault: Fault) -> Self {
        self.lock().fault = Some(fault);
        self
    }

    pub fn stats(&self) -> BrokerStats {
        self.lock().stats
    }

    /// Event bodies delivered to `hub`, in arrival order
    pub fn delivered(&self, hub: &str) -> Vec<serde_json::Value> {
        self.lock().hubs.get(hub).cloned().unwrap_or_default()
    }

    /// Open a session for an already resolved target
    pub fn open(&self, target: &BrokerTarget) -> Result<MemoryConnection, PublisherError> {
        let mut state = self.lock();

        if state.fault == Some(Fault::Connect) {
            return Err(PublisherError::Connection {
                endpoint: target.url.clone(),
                source: Box::new(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )),
            });
        }

        state.stats.connects += 1;
        info!(url = %target.url, hub = %target.hub, "Opened in-memory broker session");

        Ok(MemoryConnection {
            broker: self.clone(),
            hub: target.hub.clone(),
            closed: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    type Connection = MemoryConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, PublisherError> {
        let target = config.target()?;
        self.open(&target)
    }
}

/// Session on a `MemoryBroker`
pub struct MemoryConnection {
    broker: MemoryBroker,
    hub: String,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn send_error(&self, kind: io::ErrorKind, reason: &str) -> PublisherError {
        PublisherError::Send {
            hub: self.hub.clone(),
            source: Box::new(io::Error::new(kind, reason.to_string())),
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn ensure_hub(&self) -> Result<(), PublisherError> {
        let mut state = self.broker.lock();
        if state.fault == Some(Fault::EnsureHub) {
            warn!(hub = %self.hub, "Failed to provision hub");
            return Err(PublisherError::HubProvisioning {
                hub: self.hub.clone(),
                source: Box::new(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "not authorized to create hubs",
                )),
            });
        }

        state.hubs.entry(self.hub.clone()).or_default();
        info!(hub = %self.hub, "Hub ready");
        Ok(())
    }

    fn create_batch(&self) -> Result<EventBatch, PublisherError> {
        let batch_error = |reason: &str| PublisherError::BatchCreation {
            hub: self.hub.clone(),
            reason: reason.to_string(),
        };

        if self.closed.load(Ordering::SeqCst) {
            return Err(batch_error("connection is closed"));
        }

        let mut state = self.broker.lock();
        if state.fault == Some(Fault::CreateBatch) {
            return Err(batch_error("connection is not ready"));
        }

        state.stats.batches_created += 1;
        let max = state.max_batch_bytes.unwrap_or(DEFAULT_MAX_BATCH_BYTES);
        Ok(EventBatch::new(self.hub.clone(), max))
    }

    async fn send(&self, batch: EventBatch) -> Result<(), PublisherError> {
        if batch.is_empty() {
            warn!(hub = %self.hub, "Skipping send of empty batch");
            return Ok(());
        }

        if self.closed.load(Ordering::SeqCst) {
            return Err(self.send_error(io::ErrorKind::NotConnected, "connection is closed"));
        }

        let fault = {
            let mut state = self.broker.lock();
            state.stats.sends += 1;
            state.fault
        };

        match fault {
            Some(Fault::Send) => {
                return Err(self.send_error(io::ErrorKind::BrokenPipe, "transmission failed"));
            }
            Some(Fault::StallSend) => {
                debug!(hub = %self.hub, "Send stalled");
                std::future::pending::<()>().await;
            }
            _ => {}
        }

        let events: Vec<serde_json::Value> = serde_json::from_slice(&batch.to_frame())?;

        let mut state = self.broker.lock();
        let Some(delivered) = state.hubs.get_mut(batch.hub()) else {
            warn!(hub = %batch.hub(), "Hub not found");
            return Err(self.send_error(io::ErrorKind::NotFound, "hub not found"));
        };

        debug!(
            hub = %batch.hub(),
            batch_id = %batch.id(),
            events = events.len(),
            "Batch delivered"
        );
        delivered.extend(events);
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!(hub = %self.hub, "Connection already closed");
            return;
        }

        self.broker.lock().stats.closes += 1;
        info!(hub = %self.hub, "Closed in-memory broker session");
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if !*self.closed.get_mut() {
            warn!(hub = %self.hub, "Connection dropped without close, releasing");
            self.broker.lock().stats.closes += 1;
        }
    }
}
