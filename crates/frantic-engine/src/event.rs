//! # Lifecycle events fired by the engine
//!
//! Every notification is an [`EngineEvent`]: the id of the engine that fired
//! it, a sequence number, a wall-clock timestamp and the [`EventKind`]
//! payload. Kinds form a closed set:
//!
//! - **Engine boundary**: `EngineStart`, `EngineFinish` (outermost call only)
//! - **Task lifecycle**: `TaskStart`, `TaskExecute`, `TaskFinish`
//! - **Task output**: `TaskMessage`, `TaskException`
//!
//! ## Ordering guarantees
//! `seq` increases monotonically across all engines in the process.

use crate::error::BuildFailure;
use crate::task::TaskRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);
static ENGINE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identity of an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId(u64);

impl EngineId {
    pub(crate) fn next() -> Self {
        Self(ENGINE_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-{}", self.0)
    }
}

/// Importance of a task message, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
}

impl MessageLevel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
        }
    }

    /// Whether a message at this level passes a `threshold`
    pub fn is_visible_at(&self, threshold: MessageLevel) -> bool {
        *self <= threshold
    }
}

impl FromStr for MessageLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "verbose" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            other => Err(format!("unknown message level '{}'", other)),
        }
    }
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    EngineStart,
    EngineFinish,
    TaskStart {
        task: TaskRef,
    },
    TaskExecute {
        task: TaskRef,
    },
    TaskFinish {
        task: TaskRef,
    },
    TaskMessage {
        task: TaskRef,
        level: MessageLevel,
        message: String,
    },
    TaskException {
        task: TaskRef,
        failure: BuildFailure,
    },
}

impl EventKind {
    /// Task the event concerns, if any
    pub fn task(&self) -> Option<&TaskRef> {
        match self {
            Self::EngineStart | Self::EngineFinish => None,
            Self::TaskStart { task }
            | Self::TaskExecute { task }
            | Self::TaskFinish { task }
            | Self::TaskMessage { task, .. }
            | Self::TaskException { task, .. } => Some(task),
        }
    }

    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::EngineStart => "engine-start",
            Self::EngineFinish => "engine-finish",
            Self::TaskStart { .. } => "task-start",
            Self::TaskExecute { .. } => "task-execute",
            Self::TaskFinish { .. } => "task-finish",
            Self::TaskMessage { .. } => "task-message",
            Self::TaskException { .. } => "task-exception",
        }
    }
}

/// A lifecycle notification
#[derive(Debug, Clone)]
pub struct EngineEvent {
    /// Engine that fired the event
    pub engine: EngineId,
    /// Process-wide sequence number
    pub seq: u64,
    /// Wall-clock time of creation
    pub at: SystemTime,
    pub kind: EventKind,
}

impl EngineEvent {
    pub fn new(engine: EngineId, kind: EventKind) -> Self {
        Self {
            engine,
            seq: EVENT_SEQ.fetch_add(1, Ordering::Relaxed),
            at: SystemTime::now(),
            kind,
        }
    }

    pub fn task(&self) -> Option<&TaskRef> {
        self.kind.task()
    }
}
