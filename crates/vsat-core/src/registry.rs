//! Task registry.
//!
//! Maps task names to their definitions. A registry is process-local: every
//! process that executes work must register each task name it can receive
//! before its workers start.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{CoreError, TaskDefinition};

/// Name -> definition mapping shared by producers and workers of a process.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<TaskDefinition>>>,
}

impl TaskRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a definition under its name.
    ///
    /// If the name is already taken the existing definition is returned and
    /// `definition` is dropped: the first registration wins, whatever body
    /// the later one carries.
    pub fn register(&self, definition: TaskDefinition) -> Arc<TaskDefinition> {
        let mut tasks = self.tasks.write();

        if let Some(existing) = tasks.get(definition.name()) {
            tracing::debug!(task = %definition.name(), "Task already registered");
            return existing.clone();
        }

        let name = definition.name().to_string();
        let definition = Arc::new(definition);
        tasks.insert(name.clone(), definition.clone());

        tracing::info!(task = %name, "Registered task");
        definition
    }

    /// Look up a definition by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<TaskDefinition>, CoreError> {
        self.tasks
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownTask(name.to_string()))
    }

    /// Checks if a task is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.read().contains_key(name)
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}
