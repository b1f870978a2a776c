// src/audit/log.rs

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use chrono::Utc;
use tracing::debug;

use super::{AuditEvent, EventSink, EventType};

/// Writer side of the audit log.
///
/// There is exactly one `AuditLog` per workflow and it is moved along with
/// the workflow state, so appends are naturally single-writer.
pub struct AuditLog {
    workflow_id: String,
    events: Arc<RwLock<Vec<AuditEvent>>>,
    next_id: u64,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog")
            .field("workflow_id", &self.workflow_id)
            .field("next_id", &self.next_id)
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

impl AuditLog {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            events: Arc::new(RwLock::new(Vec::new())),
            next_id: 1,
            sinks: Vec::new(),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Stamp subsequent events with a new workflow id. Earlier events keep
    /// the id they were recorded under.
    pub fn set_workflow_id(&mut self, workflow_id: impl Into<String>) {
        self.workflow_id = workflow_id.into();
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Append one event and push it to every sink. Returns its id.
    pub fn record(
        &mut self,
        event_type: EventType,
        description: impl Into<String>,
        task_id: Option<&str>,
    ) -> u64 {
        let event = AuditEvent {
            event_id: self.next_id,
            timestamp: Utc::now(),
            workflow_id: self.workflow_id.clone(),
            task_id: task_id.map(str::to_string),
            event_type,
            description: description.into(),
        };
        self.next_id += 1;

        debug!(
            workflow = %self.workflow_id,
            event_id = event.event_id,
            event = %event.event_type,
            task = ?event.task_id,
            "{}",
            event.description
        );

        for sink in &self.sinks {
            sink.publish(&event);
        }

        let id = event.event_id;
        self.events
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        id
    }

    pub fn trail(&self) -> AuditTrail {
        AuditTrail {
            events: Arc::clone(&self.events),
        }
    }
}

/// Read-only, cloneable view of a workflow's audit log.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl AuditTrail {
    fn read(&self) -> RwLockReadGuard<'_, Vec<AuditEvent>> {
        self.events
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of every event recorded so far, in order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.read().clone()
    }

    /// Events with an id greater than `event_id`.
    pub fn since(&self, event_id: u64) -> Vec<AuditEvent> {
        self.read()
            .iter()
            .filter(|e| e.event_id() > event_id)
            .cloned()
            .collect()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// Events concerning one task, in order.
    pub fn for_task(&self, task_id: &str) -> Vec<AuditEvent> {
        self.read()
            .iter()
            .filter(|e| e.task_id() == Some(task_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<u64>>);

    impl EventSink for Collect {
        fn publish(&self, event: &AuditEvent) {
            self.0.lock().unwrap().push(event.event_id());
        }
    }

    #[test]
    fn ids_are_monotonic_and_sinks_see_every_event() {
        let sink = Arc::new(Collect::default());
        let mut log = AuditLog::new("wf");
        log.add_sink(sink.clone());
        let trail = log.trail();

        log.record(EventType::WorkflowCreated, "created", None);
        log.record(EventType::TaskStarted, "attempt 1", Some("a"));
        log.record(EventType::TaskCompleted, "done", Some("a"));

        let ids: Vec<u64> = trail.events().iter().map(|e| e.event_id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(*sink.0.lock().unwrap(), ids);
        assert_eq!(trail.for_task("a").len(), 2);
        assert_eq!(trail.since(1).len(), 2);
        assert_eq!(trail.count(EventType::TaskCompleted), 1);
        assert!(trail.events()[0].timestamp() <= trail.events()[2].timestamp());
    }
}
