//! Task contract and the arena that holds a task tree
//!
//! Nodes live in a [`TaskTree`] and refer to each other through [`TaskId`]
//! handles. The tree builder wires parents and children before a run; the
//! engine only reads the tree and invokes callbacks on its tasks.

use crate::context::TaskContext;
use crate::error::{EngineError, EngineResult, TaskResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between ancestor names in a qualified task name
pub const NAME_SEPARATOR: char = '.';

/// Handle of a node inside a [`TaskTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(usize);

impl TaskId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// When the engine runs a child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Run by the parent's own `execute`, if at all
    #[default]
    Normal,
    /// Run by the engine before the parent validates and executes
    Priority,
}

/// Lifecycle callbacks of a build task
///
/// `init` runs before any priority children, `validate` after them and
/// `execute` last. Returning a [`BuildFailure`](crate::BuildFailure) from any
/// of them is reported and contained by the engine.
pub trait Task {
    fn init(&self, _ctx: &mut TaskContext<'_>) -> TaskResult {
        Ok(())
    }

    fn validate(&self) -> TaskResult {
        Ok(())
    }

    fn execute(&self, ctx: &mut TaskContext<'_>) -> TaskResult;
}

/// A task whose `execute` is a closure
pub struct TaskFn<F> {
    func: F,
}

impl<F> TaskFn<F>
where
    F: Fn(&mut TaskContext<'_>) -> TaskResult,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Task for TaskFn<F>
where
    F: Fn(&mut TaskContext<'_>) -> TaskResult,
{
    fn execute(&self, ctx: &mut TaskContext<'_>) -> TaskResult {
        (self.func)(ctx)
    }
}

/// Container task that runs its normal children in declaration order
///
/// This is the shape of an Ant target: priority children (property
/// definitions and the like) are run by the engine first, the body runs here.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sequence;

impl Task for Sequence {
    fn execute(&self, ctx: &mut TaskContext<'_>) -> TaskResult {
        ctx.execute_children()?;
        Ok(())
    }
}

/// A node description handed to the tree builder
pub struct TaskNode {
    name: String,
    qualified_name: String,
    parent: Option<TaskId>,
    children: Vec<TaskId>,
    mode: ExecutionMode,
    property_container: bool,
    task: Box<dyn Task>,
}

impl TaskNode {
    pub fn new(name: impl Into<String>, task: impl Task + 'static) -> Self {
        let name = name.into();
        Self {
            qualified_name: name.clone(),
            name,
            parent: None,
            children: Vec::new(),
            mode: ExecutionMode::Normal,
            property_container: false,
            task: Box::new(task),
        }
    }

    /// Shorthand for a node wrapping a closure
    pub fn from_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut TaskContext<'_>) -> TaskResult + 'static,
    {
        Self::new(name, TaskFn::new(func))
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Mark this node as run-before-parent
    pub fn priority(self) -> Self {
        self.with_mode(ExecutionMode::Priority)
    }

    /// Mark this node as opening its own property scope
    pub fn property_container(mut self) -> Self {
        self.property_container = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ancestor names joined with [`NAME_SEPARATOR`]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn is_priority(&self) -> bool {
        self.mode == ExecutionMode::Priority
    }

    pub fn is_property_container(&self) -> bool {
        self.property_container
    }

    pub fn task(&self) -> &dyn Task {
        self.task.as_ref()
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.qualified_name)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("mode", &self.mode)
            .field("property_container", &self.property_container)
            .finish()
    }
}

/// Identity of a task as carried by events and summaries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: TaskId,
    pub name: String,
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Arena owning every node of a build tree
#[derive(Debug, Default)]
pub struct TaskTree {
    nodes: Vec<TaskNode>,
}

impl TaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node without a parent
    pub fn add_root(&mut self, node: TaskNode) -> TaskId {
        let id = TaskId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Insert a node as the last child of `parent`
    pub fn add_child(&mut self, parent: TaskId, mut node: TaskNode) -> EngineResult<TaskId> {
        let parent_name = self.get(parent)?.qualified_name.clone();
        let id = TaskId(self.nodes.len());

        node.parent = Some(parent);
        node.qualified_name = format!("{}{}{}", parent_name, NAME_SEPARATOR, node.name);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn node(&self, id: TaskId) -> Option<&TaskNode> {
        self.nodes.get(id.0)
    }

    /// Like [`node`](Self::node) but failing with [`EngineError::UnknownTask`]
    pub fn get(&self, id: TaskId) -> EngineResult<&TaskNode> {
        self.nodes.get(id.0).ok_or(EngineError::UnknownTask { id })
    }

    pub fn contains(&self, id: TaskId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn parent(&self, id: TaskId) -> Option<TaskId> {
        self.node(id).and_then(TaskNode::parent)
    }

    pub fn children(&self, id: TaskId) -> &[TaskId] {
        self.node(id).map(TaskNode::children).unwrap_or(&[])
    }

    /// Find a node by qualified name
    pub fn find(&self, qualified_name: &str) -> Option<TaskId> {
        self.nodes
            .iter()
            .position(|node| node.qualified_name == qualified_name)
            .map(TaskId)
    }

    pub fn task_ref(&self, id: TaskId) -> TaskRef {
        let name = self
            .node(id)
            .map(|node| node.qualified_name.clone())
            .unwrap_or_else(|| id.to_string());
        TaskRef { id, name }
    }

    /// Whether `ancestor` is `id` itself or one of its ancestors
    pub fn is_ancestor(&self, ancestor: TaskId, id: TaskId) -> bool {
        self.ancestor_path(ancestor, id).is_some()
    }

    /// Path from `task` up to `root`, target first and root last
    ///
    /// Returns `None` when `root` is not reached by following parents.
    pub fn ancestor_path(&self, root: TaskId, task: TaskId) -> Option<Vec<TaskId>> {
        let mut path = Vec::new();
        let mut current = Some(task);
        while let Some(id) = current {
            if !self.contains(id) {
                return None;
            }
            path.push(id);
            if id == root {
                return Some(path);
            }
            current = self.parent(id);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All handles in insertion order
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..self.nodes.len()).map(TaskId)
    }
}
