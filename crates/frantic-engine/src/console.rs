//! Default listener printing a build as indented text

use crate::error::BuildFailure;
use crate::event::{EngineEvent, MessageLevel};
use crate::listener::EngineListener;
use crate::task::TaskRef;
use frantic_config::Settings;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

struct ConsoleState {
    out: Box<dyn Write + Send>,
    depth: usize,
    failures: usize,
    started: Option<Instant>,
}

/// Renders lifecycle events to a writer
///
/// ```text
/// Build started
/// dist:
///   dist.compile:
///   [dist.compile] compiling 12 files
/// BUILD SUCCESSFUL
/// ```
pub struct ConsoleListener {
    state: Mutex<ConsoleState>,
    indent: usize,
    level: MessageLevel,
    show_elapsed: bool,
}

impl ConsoleListener {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            state: Mutex::new(ConsoleState {
                out: Box::new(out),
                depth: 0,
                failures: 0,
                started: None,
            }),
            indent: frantic_config::settings::DEFAULT_CONSOLE_INDENT,
            level: MessageLevel::Info,
            show_elapsed: true,
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Listener configured from the `[console]` section
    pub fn from_settings(settings: &Settings, out: impl Write + Send + 'static) -> Self {
        let level = settings.console_level().parse().unwrap_or_default();
        Self::new(out)
            .with_indent(settings.console_indent())
            .with_level(level)
            .with_elapsed(settings.show_elapsed())
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Least severe level that is still printed
    pub fn with_level(mut self, level: MessageLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_elapsed(mut self, show: bool) -> Self {
        self.show_elapsed = show;
        self
    }

    pub fn level(&self) -> MessageLevel {
        self.level
    }

    fn state(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn line(&self, state: &mut ConsoleState, text: &str) {
        let pad = state.depth * self.indent;
        let _ = writeln!(state.out, "{:pad$}{}", "", text, pad = pad);
    }
}

impl EngineListener for ConsoleListener {
    fn engine_start(&self, _event: &EngineEvent) {
        let mut state = self.state();
        state.depth = 0;
        state.failures = 0;
        state.started = Some(Instant::now());
        self.line(&mut state, "Build started");
    }

    fn engine_finish(&self, _event: &EngineEvent) {
        let mut state = self.state();
        state.depth = 0;
        let verdict = match state.failures {
            0 => "BUILD SUCCESSFUL".to_string(),
            1 => "BUILD FAILED (1 task failure)".to_string(),
            n => format!("BUILD FAILED ({} task failures)", n),
        };
        self.line(&mut state, &verdict);
        if self.show_elapsed {
            let secs = state
                .started
                .map(|started| started.elapsed().as_secs_f64())
                .unwrap_or_default();
            self.line(&mut state, &format!("Total time: {:.3} seconds", secs));
        }
        let _ = state.out.flush();
    }

    fn task_start(&self, _event: &EngineEvent, task: &TaskRef) {
        let mut state = self.state();
        self.line(&mut state, &format!("{}:", task.name));
        state.depth += 1;
    }

    fn task_finish(&self, _event: &EngineEvent, _task: &TaskRef) {
        let mut state = self.state();
        state.depth = state.depth.saturating_sub(1);
    }

    fn task_message(
        &self,
        _event: &EngineEvent,
        task: &TaskRef,
        level: MessageLevel,
        message: &str,
    ) {
        if !level.is_visible_at(self.level) {
            return;
        }
        let mut state = self.state();
        self.line(&mut state, &format!("[{}] {}", task.name, message));
    }

    fn task_exception(&self, _event: &EngineEvent, task: &TaskRef, failure: &BuildFailure) {
        let mut state = self.state();
        state.failures += 1;
        self.line(&mut state, &format!("[{}] FAILED: {}", task.name, failure));
    }

    fn name(&self) -> &str {
        "console"
    }
}
