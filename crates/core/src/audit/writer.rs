use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};

impl From<AuditEventEnvelope> for AuditRecord {
    fn from(envelope: AuditEventEnvelope) -> Self {
        Self {
            id: 0,
            timestamp: envelope.timestamp,
            event_type: envelope.event.event_type().to_string(),
            deposit_id: envelope.event.deposit_id().map(String::from),
            user_id: envelope.event.user_id().map(String::from),
            data: envelope.event,
        }
    }
}

/// Background task draining the audit channel into an [`AuditStore`].
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Consume events until every [`AuditHandle`] has been dropped.
    pub async fn run(mut self) {
        info!("Audit writer started");

        while let Some(envelope) = self.rx.recv().await {
            let record = AuditRecord::from(envelope);
            if let Err(e) = self.store.insert(&record) {
                error!(event_type = %record.event_type, "Failed to write audit event: {}", e);
            }
        }

        info!("Audit writer shutting down");
    }
}

/// Create a handle/writer pair connected by a channel of `buffer_size`.
///
/// Spawn the writer with `tokio::spawn(writer.run())` and clone the handle
/// into every component that emits events.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}
