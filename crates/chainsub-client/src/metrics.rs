//! Per-subscription counters.

use std::sync::{Arc, Mutex};

/// Metrics snapshot for one subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub statuses: u64,
    pub transactions: u64,
    pub mempool: u64,
    pub decode_errors: u64,
    /// Publications for a capability the handler does not have.
    pub dropped: u64,
    /// Completed teardown-and-rebuild cycles.
    pub reconnects: u64,
    pub reconnect_failures: u64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MetricsRecorder {
    inner: Arc<Mutex<SessionMetrics>>,
}

impl MetricsRecorder {
    pub(crate) fn record(&self, f: impl FnOnce(&mut SessionMetrics)) {
        f(&mut self.inner.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub(crate) fn snapshot(&self) -> SessionMetrics {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
