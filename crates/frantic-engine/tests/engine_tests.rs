//! Engine traversal and lifecycle tests
//!
//! Callback order, event order, failure containment and nested execution

use frantic_engine::{
    BuildFailure, EngineError, EngineListener, EngineOptions, EventLog, MessageLevel,
    PropertyValue, Task, TaskContext, TaskEngine, TaskId, TaskNode, TaskResult, TaskTree,
};
use pretty_assertions::assert_eq;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

type Calls = Rc<RefCell<Vec<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Validate,
    Execute,
}

/// Task that records each callback as "name.phase"
struct Recorded {
    name: &'static str,
    calls: Calls,
    fail_at: Option<Phase>,
    run_children: bool,
}

impl Recorded {
    fn new(name: &'static str, calls: &Calls) -> Self {
        Self {
            name,
            calls: calls.clone(),
            fail_at: None,
            run_children: false,
        }
    }

    fn failing_at(mut self, phase: Phase) -> Self {
        self.fail_at = Some(phase);
        self
    }

    fn running_children(mut self) -> Self {
        self.run_children = true;
        self
    }

    fn step(&self, phase: Phase) -> TaskResult {
        let label = match phase {
            Phase::Init => "init",
            Phase::Validate => "validate",
            Phase::Execute => "execute",
        };
        self.calls
            .borrow_mut()
            .push(format!("{}.{}", self.name, label));
        if self.fail_at == Some(phase) {
            return Err(BuildFailure::failed(format!("{} failed", self.name)));
        }
        Ok(())
    }
}

impl Task for Recorded {
    fn init(&self, _ctx: &mut TaskContext<'_>) -> TaskResult {
        self.step(Phase::Init)
    }

    fn validate(&self) -> TaskResult {
        self.step(Phase::Validate)
    }

    fn execute(&self, ctx: &mut TaskContext<'_>) -> TaskResult {
        self.step(Phase::Execute)?;
        if self.run_children {
            ctx.execute_children()?;
        }
        Ok(())
    }
}

fn calls() -> Calls {
    Rc::new(RefCell::new(Vec::new()))
}

fn engine_with_log() -> (TaskEngine, Arc<EventLog>) {
    let engine = TaskEngine::new();
    let log = Arc::new(EventLog::new());
    engine.add_listener(log.clone());
    (engine, log)
}

/// Root -> [A (priority), B]
fn root_a_b(calls: &Calls, root_runs_children: bool) -> (TaskTree, TaskId) {
    let mut tree = TaskTree::new();
    let root_task = Recorded::new("Root", calls);
    let root_task = if root_runs_children {
        root_task.running_children()
    } else {
        root_task
    };
    let root = tree.add_root(TaskNode::new("Root", root_task));
    tree.add_child(root, TaskNode::new("A", Recorded::new("A", calls)).priority())
        .unwrap();
    tree.add_child(root, TaskNode::new("B", Recorded::new("B", calls)))
        .unwrap();
    (tree, root)
}

#[test]
fn test_priority_child_completes_before_parent() {
    let calls = calls();
    let (tree, root) = root_a_b(&calls, false);
    let (mut engine, log) = engine_with_log();

    let summary = engine.execute(&tree, root).unwrap();

    assert_eq!(
        *calls.borrow(),
        [
            "Root.init",
            "A.init",
            "A.validate",
            "A.execute",
            "Root.validate",
            "Root.execute",
        ]
    );
    assert_eq!(summary.executed_names(), ["Root", "Root.A"]);
    assert_eq!(
        log.trace(),
        [
            "engine-start",
            "task-start:Root",
            "task-start:Root.A",
            "task-execute:Root.A",
            "task-finish:Root.A",
            "task-execute:Root",
            "task-finish:Root",
            "engine-finish",
        ]
    );
}

#[test]
fn test_normal_child_runs_inside_parent_execute() {
    let calls = calls();
    let (tree, root) = root_a_b(&calls, true);
    let (mut engine, log) = engine_with_log();

    let summary = engine.execute(&tree, root).unwrap();

    assert_eq!(
        *calls.borrow(),
        [
            "Root.init",
            "A.init",
            "A.validate",
            "A.execute",
            "Root.validate",
            "Root.execute",
            "B.init",
            "B.validate",
            "B.execute",
        ]
    );
    assert!(summary.is_success());
    assert_eq!(summary.executed_names(), ["Root", "Root.A", "Root.B"]);
    assert_eq!(log.count("engine-start"), 1);
    assert_eq!(log.count("engine-finish"), 1);
    assert_eq!(
        log.trace()[5..9],
        [
            "task-execute:Root",
            "task-start:Root.B",
            "task-execute:Root.B",
            "task-finish:Root.B",
        ]
    );
}

#[test]
fn test_execute_from_runs_path_root_first() {
    let calls = calls();
    let mut tree = TaskTree::new();
    let root = tree.add_root(TaskNode::new("root", Recorded::new("root", &calls)));
    let mid = tree
        .add_child(root, TaskNode::new("mid", Recorded::new("mid", &calls)))
        .unwrap();
    let leaf = tree
        .add_child(mid, TaskNode::new("leaf", Recorded::new("leaf", &calls)))
        .unwrap();
    tree.add_child(mid, TaskNode::new("skipped", Recorded::new("skipped", &calls)))
        .unwrap();
    let mut engine = TaskEngine::new();

    let summary = engine.execute_from(&tree, root, leaf).unwrap();

    assert_eq!(
        summary.executed_names(),
        ["root", "root.mid", "root.mid.leaf"]
    );
    assert!(!calls.borrow().iter().any(|c| c.starts_with("skipped")));
    assert_eq!(engine.next_execute_task(), None);
}

#[test]
fn test_root_not_ancestor_runs_nothing() {
    let calls = calls();
    let mut tree = TaskTree::new();
    let left = tree.add_root(TaskNode::new("left", Recorded::new("left", &calls)));
    let right = tree.add_root(TaskNode::new("right", Recorded::new("right", &calls)));
    let (mut engine, log) = engine_with_log();

    let err = engine.execute_from(&tree, left, right).unwrap_err();

    assert!(matches!(err, EngineError::RootNotAncestor { .. }));
    assert!(calls.borrow().is_empty());
    assert_eq!(log.trace(), ["engine-start", "engine-finish"]);
}

#[test]
fn test_failure_is_contained_at_node() {
    let calls = calls();
    let mut tree = TaskTree::new();
    let root = tree.add_root(TaskNode::new("root", Recorded::new("root", &calls)));
    let broken = tree
        .add_child(
            root,
            TaskNode::new(
                "broken",
                Recorded::new("broken", &calls).failing_at(Phase::Validate),
            )
            .priority(),
        )
        .unwrap();
    tree.add_child(
        root,
        TaskNode::new("after", Recorded::new("after", &calls)).priority(),
    )
    .unwrap();
    let (mut engine, log) = engine_with_log();

    let summary = engine.execute(&tree, root).unwrap();

    assert_eq!(
        *calls.borrow(),
        [
            "root.init",
            "broken.init",
            "broken.validate",
            "after.init",
            "after.validate",
            "after.execute",
            "root.validate",
            "root.execute",
        ]
    );
    let failures = log.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0.id, broken);
    assert_eq!(failures[0].1, BuildFailure::failed("broken failed"));
    assert_eq!(
        log.trace()
            .iter()
            .filter(|line| line.ends_with(":root.broken"))
            .cloned()
            .collect::<Vec<_>>(),
        [
            "task-start:root.broken",
            "task-exception:root.broken",
            "task-finish:root.broken",
        ]
    );
    assert_eq!(summary.failure_count(), 1);
    assert_eq!(summary.failures[0].message, "broken failed");
}

#[test]
fn test_failing_init_skips_priority_children() {
    let calls = calls();
    let mut tree = TaskTree::new();
    let root = tree.add_root(TaskNode::new(
        "root",
        Recorded::new("root", &calls).failing_at(Phase::Init),
    ));
    tree.add_child(
        root,
        TaskNode::new("child", Recorded::new("child", &calls)).priority(),
    )
    .unwrap();
    let (mut engine, log) = engine_with_log();

    let summary = engine.execute(&tree, root).unwrap();

    assert_eq!(*calls.borrow(), ["root.init"]);
    assert_eq!(log.count("task-execute"), 0);
    assert_eq!(log.count("task-finish"), 1);
    assert!(!summary.is_success());
}

#[test]
fn test_failed_container_scope_is_popped() {
    let seen = Rc::new(RefCell::new(None::<PropertyValue>));
    let depth = Rc::new(Cell::new(usize::MAX));
    let mut tree = TaskTree::new();
    let root = {
        let seen = seen.clone();
        let depth = depth.clone();
        tree.add_root(
            TaskNode::from_fn("root", move |ctx| {
                *seen.borrow_mut() = ctx.property("leak");
                depth.set(ctx.engine().scope_depth());
                Ok(())
            })
            .property_container(),
        )
    };
    tree.add_child(
        root,
        TaskNode::from_fn("inner", |ctx| {
            ctx.set_property("leak", "yes");
            Err(BuildFailure::failed("inner failed"))
        })
        .property_container()
        .priority(),
    )
    .unwrap();
    let mut engine = TaskEngine::new();

    let summary = engine.execute(&tree, root).unwrap();

    assert_eq!(summary.failure_count(), 1);
    assert_eq!(*seen.borrow(), None);
    assert_eq!(depth.get(), 1);
    assert_eq!(engine.scope_depth(), 0);
}

#[test]
fn test_nested_execute_preserves_outer_stack() {
    let observed = Rc::new(RefCell::new(Vec::new()));
    let mut tree = TaskTree::new();
    let other = tree.add_root(TaskNode::from_fn("other", |ctx| {
        ctx.message("nested");
        Ok(())
    }));
    let root = tree.add_root(TaskNode::from_fn("root", |_ctx| Ok(())));
    let target = tree
        .add_child(root, TaskNode::from_fn("target", |_ctx| Ok(())))
        .unwrap();
    {
        let observed = observed.clone();
        tree.add_child(
            root,
            TaskNode::from_fn("nester", move |ctx| {
                observed.borrow_mut().push(ctx.next_execute_task());
                ctx.execute(other)?;
                observed.borrow_mut().push(ctx.next_execute_task());
                Ok(())
            })
            .priority(),
        )
        .unwrap();
    }
    let (mut engine, log) = engine_with_log();

    let summary = engine.execute_from(&tree, root, target).unwrap();

    assert_eq!(*observed.borrow(), [Some(target), Some(target)]);
    assert_eq!(
        summary.executed_names(),
        ["root", "root.nester", "other", "root.target"]
    );
    assert_eq!(log.count("engine-start"), 1);
    assert_eq!(log.count("engine-finish"), 1);
    assert_eq!(log.trace().first().map(String::as_str), Some("engine-start"));
    assert_eq!(log.trace().last().map(String::as_str), Some("engine-finish"));
    assert_eq!(engine.listeners().engine_level(), 0);
}

#[test]
fn test_nested_failure_does_not_abort_caller() {
    let mut tree = TaskTree::new();
    let failing = tree.add_root(TaskNode::from_fn("failing", |_ctx| {
        Err(BuildFailure::failed("nested boom"))
    }));
    let root = tree.add_root(TaskNode::from_fn("root", move |ctx| {
        let nested = ctx.execute(failing)?;
        ctx.message(format!("nested failures: {}", nested.failure_count()));
        Ok(())
    }));
    let (mut engine, log) = engine_with_log();

    let summary = engine.execute(&tree, root).unwrap();

    assert_eq!(
        log.messages(),
        [("root".to_string(), "nested failures: 1".to_string())]
    );
    assert_eq!(summary.failure_count(), 1);
    assert_eq!(summary.failures[0].task.name, "failing");
}

#[test]
fn test_messages_carry_level_and_task() {
    let mut tree = TaskTree::new();
    let root = tree.add_root(TaskNode::from_fn("root", |ctx| {
        ctx.log(MessageLevel::Verbose, "details");
        ctx.message(format!("running {}", ctx.task_name()));
        Ok(())
    }));
    let (mut engine, log) = engine_with_log();

    engine.execute(&tree, root).unwrap();

    assert_eq!(
        log.messages(),
        [
            ("root".to_string(), "details".to_string()),
            ("root".to_string(), "running root".to_string()),
        ]
    );
}

#[test]
fn test_listener_added_during_build_sees_later_events() {
    let late = Arc::new(EventLog::new());
    let mut tree = TaskTree::new();
    let root = {
        let late = late.clone();
        tree.add_root(TaskNode::from_fn("root", move |ctx| {
            ctx.engine().add_listener(late.clone());
            Ok(())
        }))
    };
    let mut engine = TaskEngine::new();

    engine.execute(&tree, root).unwrap();

    assert_eq!(late.trace(), ["task-finish:root", "engine-finish"]);
}

#[test]
fn test_listener_add_and_remove_are_idempotent() {
    let engine = TaskEngine::new();
    let log = Arc::new(EventLog::new());

    assert!(engine.add_listener(log.clone()));
    assert!(!engine.add_listener(log.clone()));
    assert_eq!(engine.listeners().len(), 1);
    assert!(engine.remove_listener(&log));
    assert!(!engine.remove_listener(&log));
    assert!(engine.listeners().is_empty());
}

struct Panicky;

impl EngineListener for Panicky {
    fn task_start(&self, _event: &frantic_engine::EngineEvent, _task: &frantic_engine::TaskRef) {
        panic!("listener bug");
    }
}

#[test]
fn test_isolated_listener_panic_does_not_stop_build() {
    let mut tree = TaskTree::new();
    let root = tree.add_root(TaskNode::from_fn("root", |_ctx| Ok(())));
    let mut engine = TaskEngine::with_options(EngineOptions {
        isolate_listeners: true,
        ..EngineOptions::default()
    });
    let log = Arc::new(EventLog::new());
    engine.add_listener(Arc::new(Panicky));
    engine.add_listener(log.clone());

    let summary = engine.execute(&tree, root).unwrap();

    assert!(summary.is_success());
    assert_eq!(log.count("task-start"), 1);
    assert_eq!(log.count("engine-finish"), 1);
}

#[test]
fn test_engine_can_be_reused() {
    let calls = calls();
    let (tree, root) = root_a_b(&calls, false);
    let (mut engine, log) = engine_with_log();

    let first = engine.execute(&tree, root).unwrap();
    let second = engine.execute(&tree, root).unwrap();

    assert_eq!(first.executed_names(), second.executed_names());
    assert_eq!(log.count("engine-start"), 2);
    assert_eq!(calls.borrow().len(), 12);
}

#[test]
fn test_failed_path_node_does_not_stop_path() {
    let calls = calls();
    let mut tree = TaskTree::new();
    let root = tree.add_root(TaskNode::new(
        "root",
        Recorded::new("root", &calls).failing_at(Phase::Execute),
    ));
    let mid = tree
        .add_child(root, TaskNode::new("mid", Recorded::new("mid", &calls)))
        .unwrap();
    let leaf = tree
        .add_child(mid, TaskNode::new("leaf", Recorded::new("leaf", &calls)))
        .unwrap();
    let (mut engine, log) = engine_with_log();

    let summary = engine.execute_from(&tree, root, leaf).unwrap();

    assert_eq!(
        summary.executed_names(),
        ["root", "root.mid", "root.mid.leaf"]
    );
    assert_eq!(summary.failure_count(), 1);
    assert_eq!(summary.failures[0].task.name, "root");
    assert_eq!(calls.borrow().last().map(String::as_str), Some("leaf.execute"));
    assert_eq!(log.count("task-finish"), 3);
}

#[test]
fn test_panicking_task_leaves_engine_clean() {
    let mut tree = TaskTree::new();
    let broken = tree.add_root(
        TaskNode::from_fn("broken", |ctx| {
            ctx.set_property("stale", "yes");
            panic!("task bug");
        })
        .property_container(),
    );
    let seen = Rc::new(RefCell::new(Some(PropertyValue::from("unset"))));
    let reader = {
        let seen = seen.clone();
        tree.add_root(
            TaskNode::from_fn("reader", move |ctx| {
                *seen.borrow_mut() = ctx.property("stale");
                Ok(())
            })
            .property_container(),
        )
    };
    let (mut engine, log) = engine_with_log();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.execute(&tree, broken)));
    assert!(outcome.is_err());
    assert_eq!(engine.scope_depth(), 0);
    assert_eq!(engine.next_execute_task(), None);
    assert_eq!(engine.listeners().engine_level(), 0);
    assert_eq!(log.count("engine-finish"), 1);

    let summary = engine.execute(&tree, reader).unwrap();

    assert_eq!(*seen.borrow(), None);
    assert_eq!(summary.executed_names(), ["reader"]);
}

#[test]
fn test_panic_in_nested_execute_restores_caller_stack() {
    let mut tree = TaskTree::new();
    let exploding = tree.add_root(TaskNode::from_fn("exploding", |_ctx| -> TaskResult {
        panic!("nested bug");
    }));
    let root = tree.add_root(TaskNode::from_fn("root", move |ctx| {
        ctx.execute(exploding)?;
        Ok(())
    }));
    let target = tree
        .add_child(root, TaskNode::from_fn("target", |_ctx| Ok(())))
        .unwrap();
    let mut engine = TaskEngine::new();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        engine.execute_from(&tree, root, target)
    }));

    assert!(outcome.is_err());
    assert_eq!(engine.next_execute_task(), None);
    let summary = engine.execute(&tree, target).unwrap();
    assert_eq!(summary.executed_names(), ["root.target"]);
}
