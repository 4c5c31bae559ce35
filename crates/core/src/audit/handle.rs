use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::error;

use super::AuditEvent;

/// An audit event stamped with the time it was emitted.
#[derive(Debug, Clone)]
pub struct AuditEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditEventEnvelope {
    fn now(event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Cloneable sender half of the audit channel.
///
/// Emitting never fails the caller: a full or closed channel is logged and
/// the event dropped.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditEventEnvelope>,
}

impl AuditHandle {
    pub fn new(tx: mpsc::Sender<AuditEventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit from async code, waiting for channel capacity.
    pub async fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.tx.send(AuditEventEnvelope::now(event)).await {
            error!("Failed to emit audit event: {}", e);
        }
    }

    /// Emit from a thread outside the runtime (e.g. `spawn_blocking`).
    pub fn emit_blocking(&self, event: AuditEvent) {
        if let Err(e) = self.tx.blocking_send(AuditEventEnvelope::now(event)) {
            error!("Failed to emit audit event: {}", e);
        }
    }

    /// Emit without waiting. Returns whether the event was queued.
    pub fn try_emit(&self, event: AuditEvent) -> bool {
        match self.tx.try_send(AuditEventEnvelope::now(event)) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to emit audit event: {}", e);
                false
            }
        }
    }
}
