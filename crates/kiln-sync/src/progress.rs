use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

/// Cumulative write progress for one transport during a send.
///
/// Counts only grow: for a given transport, each event reports at least as
/// many objects and bytes as the one before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub transport: String,
    /// Chunks written so far.
    pub objects: u64,
    /// Payload bytes written so far.
    pub bytes: u64,
    /// Chunks this send will write to the transport in total.
    pub total_objects: u64,
}

impl ProgressEvent {
    pub fn is_complete(&self) -> bool {
        self.objects >= self.total_objects
    }
}

/// Per-transport counters shared by that transport's write tasks.
pub(crate) struct ProgressTracker {
    transport: String,
    total_objects: u64,
    sender: Option<UnboundedSender<ProgressEvent>>,
    counts: Mutex<(u64, u64)>,
}

impl ProgressTracker {
    pub(crate) fn new(
        transport: impl Into<String>,
        total_objects: u64,
        sender: Option<UnboundedSender<ProgressEvent>>,
    ) -> Self {
        Self {
            transport: transport.into(),
            total_objects,
            sender,
            counts: Mutex::new((0, 0)),
        }
    }

    /// Count one written chunk and report the new totals.
    pub(crate) fn record(&self, bytes: u64) -> (u64, u64) {
        // Sending under the lock keeps events in counter order.
        let mut counts = self.counts.lock().expect("lock poisoned");
        counts.0 += 1;
        counts.1 += bytes;
        if let Some(sender) = &self.sender {
            let _ = sender.send(ProgressEvent {
                transport: self.transport.clone(),
                objects: counts.0,
                bytes: counts.1,
                total_objects: self.total_objects,
            });
        }
        *counts
    }

    pub(crate) fn totals(&self) -> (u64, u64) {
        *self.counts.lock().expect("lock poisoned")
    }
}
