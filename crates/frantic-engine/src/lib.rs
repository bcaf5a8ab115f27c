//! Frantic task execution engine
//!
//! Drives a tree of build tasks (Ant-style targets and tasks) through their
//! lifecycle:
//! - Depth-first traversal from a root task down to a target task
//! - Priority children run before their parent validates and executes
//! - Lexically scoped properties with `${name}` substitution
//! - Synchronous lifecycle events delivered to registered listeners
//! - Per-task failure containment; the rest of the tree keeps running
//!
//! # Example
//!
//! ```
//! use frantic_engine::{Sequence, TaskEngine, TaskNode, TaskTree};
//!
//! let mut tree = TaskTree::new();
//! let dist = tree.add_root(TaskNode::new("dist", Sequence).property_container());
//! tree.add_child(
//!     dist,
//!     TaskNode::from_fn("init", |ctx| {
//!         ctx.set_property("out", "target");
//!         Ok(())
//!     })
//!     .priority(),
//! )
//! .unwrap();
//! tree.add_child(
//!     dist,
//!     TaskNode::from_fn("jar", |ctx| {
//!         ctx.message(ctx.substitute("writing ${out}/app.jar"));
//!         Ok(())
//!     }),
//! )
//! .unwrap();
//!
//! let mut engine = TaskEngine::new();
//! let summary = engine.execute(&tree, dist).unwrap();
//! assert!(summary.is_success());
//! assert_eq!(summary.executed_names(), ["dist", "dist.init", "dist.jar"]);
//! ```

pub mod console;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod listener;
pub mod property;
pub mod substitute;
pub mod task;

// Re-export main types
pub use console::ConsoleListener;
pub use context::TaskContext;
pub use engine::{EngineOptions, ExecutionSummary, NodeOutcome, TaskEngine, TaskFailure};
pub use error::{BuildFailure, EngineError, EngineResult, TaskResult};
pub use event::{EngineEvent, EngineId, EventKind, MessageLevel};
pub use listener::{EngineListener, EventLog, ListenerRegistry};
pub use property::{PropertyScope, PropertyValue};
pub use substitute::MissingProperty;
pub use task::{ExecutionMode, Sequence, Task, TaskFn, TaskId, TaskNode, TaskRef, TaskTree};

// Re-export configuration types for convenience
pub use frantic_config::{Config, ConfigLoader, Settings};
