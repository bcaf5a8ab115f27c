//! Task execution engine
//!
//! [`TaskEngine::execute_from`] walks the path from a root task down to a
//! target task. Each node on the path is popped off an explicit execution
//! stack and driven through its lifecycle:
//!
//! 1. fire task-start, open a property scope if the node is a container
//! 2. `init`
//! 3. run every priority child, depth first, through this same lifecycle
//! 4. `validate`, fire task-execute, `execute`
//! 5. close the node's scope, fire task-exception on failure, fire task-finish
//!
//! A [`BuildFailure`] from any callback is contained at the node that raised
//! it; the rest of the stack still runs. Only an invalid root/target pair
//! aborts a call, before any task callback runs.

use crate::context::TaskContext;
use crate::error::{BuildFailure, EngineError, EngineResult, TaskResult};
use crate::event::{EngineId, EventKind, MessageLevel};
use crate::listener::{EngineListener, ListenerRegistry};
use crate::property::{PropertyScope, PropertyValue};
use crate::substitute::{self, MissingProperty};
use crate::task::{TaskId, TaskNode, TaskRef, TaskTree};
use frantic_config::Settings;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum replacements per substitution (cycle guard)
    pub max_substitutions: usize,
    /// Catch listener panics instead of propagating them
    pub isolate_listeners: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_substitutions: frantic_config::settings::DEFAULT_MAX_SUBSTITUTIONS,
            isolate_listeners: false,
        }
    }
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_substitutions: settings.max_substitutions(),
            isolate_listeners: settings.isolate_listeners(),
        }
    }
}

/// A failure reported during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub task: TaskRef,
    pub message: String,
}

/// What one `execute` call did
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionSummary {
    /// Tasks in the order they started
    pub executed: Vec<TaskRef>,
    /// Failures in the order they were reported
    pub failures: Vec<TaskFailure>,
    /// Wall-clock time of the call
    pub duration: Duration,
}

impl ExecutionSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.executed.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Qualified names of the executed tasks
    pub fn executed_names(&self) -> Vec<&str> {
        self.executed.iter().map(|t| t.name.as_str()).collect()
    }

    /// Append another summary (e.g. of a nested call)
    pub fn absorb(&mut self, other: ExecutionSummary) {
        self.executed.extend(other.executed);
        self.failures.extend(other.failures);
        self.duration += other.duration;
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Result of driving one node through its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Completed,
    /// The failure was reported and contained; traversal continues
    Failed(BuildFailure),
}

impl NodeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Fires engine-finish when an `execute` call ends, however it ends
struct EngineBoundary {
    listeners: ListenerRegistry,
    engine: EngineId,
}

impl EngineBoundary {
    fn enter(listeners: &ListenerRegistry, engine: EngineId) -> Self {
        listeners.fire_engine_start(engine);
        Self {
            listeners: listeners.clone(),
            engine,
        }
    }
}

impl Drop for EngineBoundary {
    fn drop(&mut self) {
        self.listeners.fire_engine_finish(self.engine);
    }
}

/// Drives task trees and owns the property and execution stacks of a build
#[derive(Debug)]
pub struct TaskEngine {
    id: EngineId,
    task_stack: Vec<TaskId>,
    property_stack: Vec<PropertyScope>,
    base_properties: Option<PropertyScope>,
    /// Summary of the run in progress, `None` between runs
    summary: Option<ExecutionSummary>,
    listeners: ListenerRegistry,
    options: EngineOptions,
}

impl TaskEngine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// A zero `max_substitutions` is raised to 1
    pub fn with_options(mut options: EngineOptions) -> Self {
        if options.max_substitutions == 0 {
            warn!("max_substitutions must be positive, using 1");
            options.max_substitutions = 1;
        }
        let listeners = ListenerRegistry::new();
        listeners.set_isolation(options.isolate_listeners);
        Self {
            id: EngineId::next(),
            task_stack: Vec::new(),
            property_stack: Vec::new(),
            base_properties: None,
            summary: None,
            listeners,
            options,
        }
    }

    /// Build an engine from loaded settings, seeding the base scope from `[properties]`
    pub fn from_settings(settings: &Settings) -> Self {
        let engine = Self::with_options(EngineOptions::from_settings(settings));
        if settings.properties.is_empty() {
            return engine;
        }
        let base: PropertyScope = settings
            .properties
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        engine.with_base_properties(base)
    }

    /// Use `scope` below every container scope
    pub fn with_base_properties(mut self, scope: PropertyScope) -> Self {
        self.base_properties = Some(scope);
        self
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn base_properties(&self) -> Option<&PropertyScope> {
        self.base_properties.as_ref()
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Execute `task` with itself as root
    pub fn execute(&mut self, tree: &TaskTree, task: TaskId) -> EngineResult<ExecutionSummary> {
        self.execute_from(tree, task, task)
    }

    /// Execute every node from `root` down to `task`
    ///
    /// Nested calls made from task callbacks run on their own execution
    /// stack; the caller's stack is restored afterwards. Tasks run by a
    /// nested call are also recorded in the caller's summary.
    pub fn execute_from(
        &mut self,
        tree: &TaskTree,
        root: TaskId,
        task: TaskId,
    ) -> EngineResult<ExecutionSummary> {
        let _boundary = EngineBoundary::enter(&self.listeners, self.id);
        let started = Instant::now();

        let path = resolve_path(tree, root, task)?;
        debug!(
            engine = %self.id,
            root = %tree.task_ref(root),
            task = %tree.task_ref(task),
            depth = path.len(),
            "executing task path"
        );

        let outer_stack = std::mem::replace(&mut self.task_stack, path);
        let outer_summary = self.summary.replace(ExecutionSummary::default());
        let run = panic::catch_unwind(AssertUnwindSafe(|| {
            while self.execute_next(tree).is_some() {}
        }));
        self.task_stack = outer_stack;

        let mut summary = std::mem::replace(&mut self.summary, outer_summary).unwrap_or_default();
        if let Err(payload) = run {
            // caller state is back in place before the panic continues
            panic::resume_unwind(payload);
        }
        summary.duration = started.elapsed();
        if let Some(outer) = self.summary.as_mut() {
            outer.absorb(summary.clone());
        }
        debug!(
            engine = %self.id,
            tasks = summary.task_count(),
            failures = summary.failure_count(),
            "execution finished"
        );
        Ok(summary)
    }

    /// Top of the execution stack: the next task to run, or the one running
    pub fn next_execute_task(&self) -> Option<TaskId> {
        self.task_stack.last().copied()
    }

    fn execute_next(&mut self, tree: &TaskTree) -> Option<NodeOutcome> {
        let id = self.task_stack.pop()?;
        Some(self.execute_task(tree, id))
    }

    fn execute_task(&mut self, tree: &TaskTree, id: TaskId) -> NodeOutcome {
        let task = tree.task_ref(id);
        self.listeners
            .dispatch(self.id, EventKind::TaskStart { task: task.clone() });
        self.record().executed.push(task.clone());

        let scope_depth = self.property_stack.len();
        let result = panic::catch_unwind(AssertUnwindSafe(|| match tree.get(id) {
            Ok(node) => {
                if node.is_property_container() {
                    self.push_scope();
                }
                self.run_lifecycle(tree, id, node, &task)
            }
            Err(err) => Err(err.into()),
        }));
        // closed on failure and on panic too
        self.property_stack.truncate(scope_depth);
        let result = match result {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        };

        let outcome = match result {
            Ok(()) => {
                debug!(task = %task, "task completed");
                NodeOutcome::Completed
            }
            Err(failure) => {
                debug!(task = %task, error = %failure, "task failed");
                self.record().failures.push(TaskFailure {
                    task: task.clone(),
                    message: failure.to_string(),
                });
                self.listeners.dispatch(
                    self.id,
                    EventKind::TaskException {
                        task: task.clone(),
                        failure: failure.clone(),
                    },
                );
                NodeOutcome::Failed(failure)
            }
        };

        self.listeners
            .dispatch(self.id, EventKind::TaskFinish { task });
        outcome
    }

    fn record(&mut self) -> &mut ExecutionSummary {
        self.summary.get_or_insert_with(ExecutionSummary::default)
    }

    fn run_lifecycle(
        &mut self,
        tree: &TaskTree,
        id: TaskId,
        node: &TaskNode,
        task: &TaskRef,
    ) -> TaskResult {
        node.task().init(&mut TaskContext::new(self, tree, id))?;

        for &child in node.children() {
            if tree.node(child).is_some_and(TaskNode::is_priority) {
                self.task_stack.push(child);
                self.execute_next(tree);
            }
        }

        node.task().validate()?;

        self.listeners
            .dispatch(self.id, EventKind::TaskExecute { task: task.clone() });
        node.task().execute(&mut TaskContext::new(self, tree, id))
    }

    // ------------------------------------------------------------------
    // Messages and listeners
    // ------------------------------------------------------------------

    /// Fire an info-level task message
    pub fn message(&self, task: &TaskRef, text: impl Into<String>) {
        self.log(task, MessageLevel::Info, text);
    }

    pub fn log(&self, task: &TaskRef, level: MessageLevel, text: impl Into<String>) {
        self.listeners.dispatch(
            self.id,
            EventKind::TaskMessage {
                task: task.clone(),
                level,
                message: text.into(),
            },
        );
    }

    /// Register a listener; adding it twice is a no-op
    pub fn add_listener(&self, listener: Arc<dyn EngineListener>) -> bool {
        self.listeners.add(listener)
    }

    /// Unregister a listener; removing an absent one is a no-op
    pub fn remove_listener<L: EngineListener + ?Sized>(&self, listener: &Arc<L>) -> bool {
        self.listeners.remove(listener)
    }

    /// Shared handle to the registry, usable from other threads
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    fn push_scope(&mut self) {
        let scope = match self.current_scope() {
            Some(parent) => parent.child(),
            None => PropertyScope::new(),
        };
        self.property_stack.push(scope);
    }

    /// The innermost open scope, else the base scope
    pub fn current_scope(&self) -> Option<&PropertyScope> {
        self.property_stack
            .last()
            .or(self.base_properties.as_ref())
    }

    /// Number of container scopes currently open
    pub fn scope_depth(&self) -> usize {
        self.property_stack.len()
    }

    pub fn property_names(&self) -> Vec<String> {
        self.current_scope()
            .map(PropertyScope::names)
            .unwrap_or_default()
    }

    /// Stored value of a property, without substitution
    pub fn raw_property_value(&self, name: &str) -> Option<PropertyValue> {
        self.current_scope().and_then(|scope| scope.get(name))
    }

    /// Value of a property; textual values have their markers expanded
    pub fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match self.raw_property_value(name)? {
            PropertyValue::Text(text) if substitute::has_marker(&text) => {
                Some(PropertyValue::Text(self.substitute(&text)))
            }
            other => Some(other),
        }
    }

    /// Store a value in the current scope; a no-op when no scope is open
    pub fn set_property_value(&self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        match self.current_scope() {
            Some(scope) => scope.set(name, value),
            None => {
                let name = name.into();
                warn!(property = name.as_str(), "no property scope open, value dropped");
            }
        }
    }

    /// Remove a property from whichever scope in the chain holds it
    pub fn remove_property_value(&self, name: &str) -> Option<PropertyValue> {
        self.current_scope().and_then(|scope| scope.remove(name))
    }

    /// Expand `${...}` markers; undefined names become empty strings
    ///
    /// When the replacement cap is hit the partially expanded text is returned.
    pub fn substitute(&self, text: &str) -> String {
        let limit = self.options.max_substitutions;
        match substitute::expand_lenient(text, |name| self.lookup(name), limit) {
            Ok(expanded) => expanded,
            Err(partial) => {
                warn!(limit, text, "property substitution limit reached");
                partial
            }
        }
    }

    /// Expand `${...}` markers, failing on undefined names or on the cap
    pub fn try_substitute(&self, text: &str) -> EngineResult<String> {
        substitute::expand(
            text,
            |name| self.lookup(name),
            MissingProperty::Fail,
            self.options.max_substitutions,
        )
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.raw_property_value(name).map(|value| value.to_string())
    }
}

impl Default for TaskEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution stack for `root`..=`task`, root on top
fn resolve_path(tree: &TaskTree, root: TaskId, task: TaskId) -> EngineResult<Vec<TaskId>> {
    tree.get(root)?;
    tree.get(task)?;
    tree.ancestor_path(root, task)
        .ok_or_else(|| EngineError::RootNotAncestor {
            root: tree.task_ref(root).name,
            task: tree.task_ref(task).name,
        })
}
