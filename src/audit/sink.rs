// src/audit/sink.rs

use tokio::sync::mpsc;
use tracing::info;

use super::AuditEvent;

/// External collaborator that receives audit events as they are appended.
///
/// Called from the scheduler loop, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &AuditEvent);
}

/// Forwards every event to `tracing` at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &AuditEvent) {
        info!(
            workflow = %event.workflow_id(),
            event_id = event.event_id(),
            event = %event.event_type(),
            task = event.task_id().unwrap_or("-"),
            "{}",
            event.description()
        );
    }
}

/// Streams events into an unbounded channel. A closed receiver is ignored.
impl EventSink for mpsc::UnboundedSender<AuditEvent> {
    fn publish(&self, event: &AuditEvent) {
        let _ = self.send(event.clone());
    }
}
