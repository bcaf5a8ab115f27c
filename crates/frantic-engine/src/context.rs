//! The engine as seen from inside a task callback

use crate::engine::{ExecutionSummary, TaskEngine};
use crate::error::{EngineError, EngineResult};
use crate::event::MessageLevel;
use crate::property::PropertyValue;
use crate::task::{TaskId, TaskNode, TaskRef, TaskTree};

/// Handed to `init` and `execute`; scoped to the task being run
///
/// Property operations act on the engine's current property frame, which is
/// the task's own scope when it is a property container.
pub struct TaskContext<'a> {
    engine: &'a mut TaskEngine,
    tree: &'a TaskTree,
    task: TaskId,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(engine: &'a mut TaskEngine, tree: &'a TaskTree, task: TaskId) -> Self {
        Self { engine, tree, task }
    }

    pub fn task_id(&self) -> TaskId {
        self.task
    }

    pub fn task_ref(&self) -> TaskRef {
        self.tree.task_ref(self.task)
    }

    /// Qualified name of the running task
    pub fn task_name(&self) -> &'a str {
        self.tree
            .node(self.task)
            .map(TaskNode::qualified_name)
            .unwrap_or_default()
    }

    pub fn tree(&self) -> &'a TaskTree {
        self.tree
    }

    pub fn engine(&self) -> &TaskEngine {
        self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TaskEngine {
        self.engine
    }

    /// Emit an info-level message tagged with this task
    pub fn message(&self, text: impl Into<String>) {
        self.engine.message(&self.task_ref(), text);
    }

    pub fn log(&self, level: MessageLevel, text: impl Into<String>) {
        self.engine.log(&self.task_ref(), level, text);
    }

    /// Substituted value of a property
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.engine.property_value(name)
    }

    /// Substituted value of a property that must exist
    pub fn require_property(&self, name: &str) -> EngineResult<PropertyValue> {
        self.engine
            .property_value(name)
            .ok_or_else(|| EngineError::UndefinedProperty {
                name: name.to_string(),
            })
    }

    pub fn set_property(&self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.engine.set_property_value(name, value);
    }

    pub fn remove_property(&self, name: &str) -> Option<PropertyValue> {
        self.engine.remove_property_value(name)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.engine.property_names()
    }

    pub fn substitute(&self, text: &str) -> String {
        self.engine.substitute(text)
    }

    pub fn try_substitute(&self, text: &str) -> EngineResult<String> {
        self.engine.try_substitute(text)
    }

    /// Top of the engine's execution stack
    pub fn next_execute_task(&self) -> Option<TaskId> {
        self.engine.next_execute_task()
    }

    /// Run a nested build on the same tree
    pub fn execute(&mut self, task: TaskId) -> EngineResult<ExecutionSummary> {
        self.engine.execute(self.tree, task)
    }

    pub fn execute_from(&mut self, root: TaskId, task: TaskId) -> EngineResult<ExecutionSummary> {
        self.engine.execute_from(self.tree, root, task)
    }

    /// Run this task's normal children, in declaration order
    ///
    /// Each child is a nested `execute`, so its own priority children run
    /// before it. Priority children are skipped; the engine already ran them.
    pub fn execute_children(&mut self) -> EngineResult<ExecutionSummary> {
        let tree = self.tree;
        let mut summary = ExecutionSummary::default();
        for &child in tree.children(self.task) {
            if tree.get(child)?.is_priority() {
                continue;
            }
            summary.absorb(self.engine.execute(tree, child)?);
        }
        Ok(summary)
    }
}
