// src/context/mod.rs

//! Run context: the workflow variables shared by all tasks of one run.
//!
//! Tasks never write here directly. A handler returns its writes in
//! `TaskOutput::context_updates` and the scheduler commits them in one step
//! when the task reaches `COMPLETED`, so concurrently running siblings only
//! see a writer's values after it has finished.

pub mod condition;
pub mod value;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use condition::Condition;
pub use value::Value;

/// Immutable view of the run context handed to a task at dispatch time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSnapshot(Arc<BTreeMap<String, Value>>);

impl ContextSnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mutable run context owned by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    initial: BTreeMap<String, Value>,
    values: BTreeMap<String, Value>,
    /// Cached snapshot; invalidated by every write.
    snapshot: Option<ContextSnapshot>,
}

impl RunContext {
    pub fn new(initial: BTreeMap<String, Value>) -> Self {
        Self {
            values: initial.clone(),
            initial,
            snapshot: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.snapshot = None;
        self.values.insert(key.into(), value.into())
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn snapshot(&mut self) -> ContextSnapshot {
        if let Some(snapshot) = &self.snapshot {
            return snapshot.clone();
        }
        let snapshot = ContextSnapshot(Arc::new(self.values.clone()));
        self.snapshot = Some(snapshot.clone());
        snapshot
    }

    /// Apply a completed task's writes atomically.
    ///
    /// Returns the keys whose value actually changed.
    pub fn commit(&mut self, updates: BTreeMap<String, Value>) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in updates {
            if self.values.get(&key) != Some(&value) {
                changed.push(key.clone());
                self.values.insert(key, value);
            }
        }
        if !changed.is_empty() {
            self.snapshot = None;
        }
        changed
    }

    /// Forget everything written during a run and restore the initial variables.
    pub fn reset(&mut self) {
        self.values = self.initial.clone();
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_reports_changed_keys_and_refreshes_snapshot() {
        let mut initial = BTreeMap::new();
        initial.insert("region".to_string(), Value::from("eu"));
        let mut ctx = RunContext::new(initial);

        let before = ctx.snapshot();
        let mut updates = BTreeMap::new();
        updates.insert("region".to_string(), Value::from("eu"));
        updates.insert("rows".to_string(), Value::from(10));
        let changed = ctx.commit(updates);

        assert_eq!(changed, vec!["rows".to_string()]);
        assert!(!before.contains_key("rows"));
        assert_eq!(ctx.snapshot().get("rows"), Some(&Value::Int(10)));
    }

    #[test]
    fn reset_restores_initial_variables() {
        let mut ctx = RunContext::default();
        ctx.set("tmp", true);
        ctx.reset();
        assert!(ctx.get("tmp").is_none());
        assert!(ctx.snapshot().is_empty());
    }
}
