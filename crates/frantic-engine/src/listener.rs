//! # Listener registry
//!
//! [`EngineListener`] is the observer contract. [`ListenerRegistry`] keeps an
//! ordered, identity-deduplicated set of listeners and delivers each
//! [`EngineEvent`] to them synchronously, in registration order.
//!
//! ## Rules
//! - Delivery iterates a snapshot, so listeners may register or unregister
//!   (themselves or others) while an event is being delivered.
//! - Engine start/finish are depth counted: nested `execute` calls do not
//!   produce extra boundary events.
//! - A panicking listener propagates the panic unless isolation is enabled,
//!   in which case the panic is logged and delivery continues.
//!
//! The registry is `Send + Sync`; a clone shares the same listener set, so
//! another thread may register listeners while a build is running.

use crate::error::BuildFailure;
use crate::event::{EngineEvent, EngineId, EventKind, MessageLevel};
use crate::task::TaskRef;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::error;

/// Observer of engine lifecycle events
///
/// Override the hooks of interest, or [`on_event`](Self::on_event) to see
/// every event as a tagged value.
pub trait EngineListener: Send + Sync {
    fn engine_start(&self, _event: &EngineEvent) {}

    fn engine_finish(&self, _event: &EngineEvent) {}

    fn task_start(&self, _event: &EngineEvent, _task: &TaskRef) {}

    fn task_execute(&self, _event: &EngineEvent, _task: &TaskRef) {}

    fn task_finish(&self, _event: &EngineEvent, _task: &TaskRef) {}

    fn task_message(
        &self,
        _event: &EngineEvent,
        _task: &TaskRef,
        _level: MessageLevel,
        _message: &str,
    ) {
    }

    fn task_exception(&self, _event: &EngineEvent, _task: &TaskRef, _failure: &BuildFailure) {}

    /// Entry point used by the registry; routes to the per-kind hooks
    fn on_event(&self, event: &EngineEvent) {
        match &event.kind {
            EventKind::EngineStart => self.engine_start(event),
            EventKind::EngineFinish => self.engine_finish(event),
            EventKind::TaskStart { task } => self.task_start(event, task),
            EventKind::TaskExecute { task } => self.task_execute(event, task),
            EventKind::TaskFinish { task } => self.task_finish(event, task),
            EventKind::TaskMessage {
                task,
                level,
                message,
            } => self.task_message(event, task, *level, message),
            EventKind::TaskException { task, failure } => {
                self.task_exception(event, task, failure)
            }
        }
    }

    /// Name used in logs when the listener misbehaves
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[derive(Default)]
struct RegistryState {
    listeners: Vec<Arc<dyn EngineListener>>,
    engine_level: usize,
    isolate: bool,
}

/// Shared, thread-safe set of listeners
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener; returns false if it was already registered
    pub fn add(&self, listener: Arc<dyn EngineListener>) -> bool {
        let mut state = self.lock();
        let key = data_ptr(&listener);
        if state.listeners.iter().any(|l| data_ptr(l) == key) {
            return false;
        }
        state.listeners.push(listener);
        true
    }

    /// Unregister a listener; returns false if it was not registered
    pub fn remove<L: EngineListener + ?Sized>(&self, listener: &Arc<L>) -> bool {
        let mut state = self.lock();
        let key = data_ptr(listener);
        let before = state.listeners.len();
        state.listeners.retain(|l| data_ptr(l) != key);
        state.listeners.len() != before
    }

    pub fn contains<L: EngineListener + ?Sized>(&self, listener: &Arc<L>) -> bool {
        let key = data_ptr(listener);
        self.lock().listeners.iter().any(|l| data_ptr(l) == key)
    }

    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().listeners.is_empty()
    }

    pub fn clear(&self) {
        self.lock().listeners.clear();
    }

    /// Catch listener panics instead of propagating them
    pub fn set_isolation(&self, isolate: bool) {
        self.lock().isolate = isolate;
    }

    pub fn is_isolated(&self) -> bool {
        self.lock().isolate
    }

    /// Depth of `execute` calls currently in progress
    pub fn engine_level(&self) -> usize {
        self.lock().engine_level
    }

    /// Enter an `execute` call; only the outermost one notifies
    pub(crate) fn fire_engine_start(&self, engine: EngineId) {
        let outermost = {
            let mut state = self.lock();
            state.engine_level += 1;
            state.engine_level == 1
        };
        if outermost {
            self.dispatch(engine, EventKind::EngineStart);
        }
    }

    /// Leave an `execute` call; only the outermost one notifies
    pub(crate) fn fire_engine_finish(&self, engine: EngineId) {
        let outermost = {
            let mut state = self.lock();
            state.engine_level = state.engine_level.saturating_sub(1);
            state.engine_level == 0
        };
        if outermost {
            self.dispatch(engine, EventKind::EngineFinish);
        }
    }

    /// Deliver one event to every registered listener
    pub fn dispatch(&self, engine: EngineId, kind: EventKind) {
        let (listeners, isolate) = {
            let state = self.lock();
            (state.listeners.clone(), state.isolate)
        };
        if listeners.is_empty() {
            return;
        }

        let event = EngineEvent::new(engine, kind);
        for listener in &listeners {
            if !isolate {
                listener.on_event(&event);
                continue;
            }
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(&event)));
            if let Err(payload) = delivered {
                error!(
                    listener = listener.name(),
                    event = event.kind.label(),
                    reason = panic_message(payload.as_ref()),
                    "listener panicked"
                );
            }
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &state.listeners.len())
            .field("engine_level", &state.engine_level)
            .field("isolate", &state.isolate)
            .finish()
    }
}

/// Address of the listener object, ignoring trait-object metadata
fn data_ptr<L: ?Sized>(listener: &Arc<L>) -> *const () {
    Arc::as_ptr(listener).cast::<()>()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Listener that records every event it receives
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<EngineEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EngineEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.lock().iter().map(|e| e.kind.clone()).collect()
    }

    /// Compact "label:task" lines, e.g. `task-start:project.compile`
    pub fn trace(&self) -> Vec<String> {
        self.lock()
            .iter()
            .map(|e| match e.task() {
                Some(task) => format!("{}:{}", e.kind.label(), task.name),
                None => e.kind.label().to_string(),
            })
            .collect()
    }

    /// Number of recorded events with the given label
    pub fn count(&self, label: &str) -> usize {
        self.lock().iter().filter(|e| e.kind.label() == label).count()
    }

    /// Reported task failures, in order
    pub fn failures(&self) -> Vec<(TaskRef, BuildFailure)> {
        self.lock()
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::TaskException { task, failure } => {
                    Some((task.clone(), failure.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Messages as (task name, text) pairs
    pub fn messages(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::TaskMessage { task, message, .. } => {
                    Some((task.name.clone(), message.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl EngineListener for EventLog {
    fn on_event(&self, event: &EngineEvent) {
        self.lock().push(event.clone());
    }

    fn name(&self) -> &str {
        "event-log"
    }
}
