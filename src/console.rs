//! Human-readable run report
//!
//! Progress and success lines go to `out`, failures to `err`. Write errors
//! are logged and otherwise ignored: the report must never change the
//! outcome of a publish.

use crate::error::PublisherError;
use crate::events::TestPayload;
use std::io::{self, Write};
use tracing::warn;

pub const SUCCESS_LINE: &str = "✅ Message sent successfully!";
pub const FAILURE_PREFIX: &str = "❌ Error sending message:";

/// Console report sink
pub struct Console<O, E> {
    out: O,
    err: E,
}

impl Console<io::Stdout, io::Stderr> {
    /// Report to the process's stdout and stderr
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> Console<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self { out, err }
    }

    pub fn announce(&mut self, hub: &str) {
        let result = writeln!(self.out, "🚀 Sending test message to hub '{hub}'...");
        log_write_failure(result);
    }

    pub fn success(&mut self, payload: &TestPayload) {
        let body = payload
            .to_pretty_json()
            .unwrap_or_else(|e| format!("<unrenderable body: {e}>"));

        let result = writeln!(self.out, "{SUCCESS_LINE}")
            .and_then(|_| writeln!(self.out, "📋 Message content: {body}"))
            .and_then(|_| writeln!(self.out, "👀 Check your trigger's logs for the execution..."))
            .and_then(|_| self.out.flush());
        log_write_failure(result);
    }

    pub fn failure(&mut self, error: &PublisherError) {
        let result = writeln!(self.err, "{FAILURE_PREFIX} {}", error.chain())
            .and_then(|_| self.err.flush());
        log_write_failure(result);
    }

    /// Give back the writers
    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}

fn log_write_failure(result: io::Result<()>) {
    if let Err(e) = result {
        warn!(error = %e, "Failed to write console report");
    }
}
