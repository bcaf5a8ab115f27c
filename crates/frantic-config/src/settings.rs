//! Engine settings (frantic.toml / ~/.frantic/config.toml)
//!
//! Both the global and the project file share this schema. Every field is
//! optional; accessors fall back to the engine defaults.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default cap on `${...}` replacements performed by one expansion
pub const DEFAULT_MAX_SUBSTITUTIONS: usize = 1000;

/// Default indentation (spaces per nesting level) of the console listener
pub const DEFAULT_CONSOLE_INDENT: usize = 2;

/// Default message threshold of the console listener
pub const DEFAULT_CONSOLE_LEVEL: &str = "info";

/// Message level names accepted by `console.level`, most to least severe
pub const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "verbose", "debug"];

const MAX_CONSOLE_INDENT: usize = 16;

/// Settings read from a single configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Engine behaviour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineSettings>,

    /// Console listener presentation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console: Option<ConsoleSettings>,

    /// Seed properties for the engine's base scope
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// `[engine]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    /// Maximum replacements per substitution (cycle guard)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_substitutions: Option<usize>,

    /// Catch listener panics instead of propagating them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolate_listeners: Option<bool>,
}

/// `[console]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConsoleSettings {
    /// Spaces per nesting level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent: Option<usize>,

    /// Lowest message level that is printed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Print "Total time" when the build finishes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_elapsed: Option<bool>,
}

impl Settings {
    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let settings: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(engine) = &self.engine {
            if engine.max_substitutions == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "engine.max_substitutions".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(console) = &self.console {
            if let Some(indent) = console.indent {
                if indent > MAX_CONSOLE_INDENT {
                    return Err(ConfigError::InvalidValue {
                        field: "console.indent".to_string(),
                        reason: format!("must be at most {}, got {}", MAX_CONSOLE_INDENT, indent),
                    });
                }
            }
            if let Some(level) = &console.level {
                validate_level("console.level", level)?;
            }
        }

        Ok(())
    }

    /// Merge another settings value into this one
    ///
    /// Sections from `other` replace ours wholesale; properties merge per key.
    pub fn merge(&mut self, other: &Settings) {
        if other.engine.is_some() {
            self.engine = other.engine.clone();
        }
        if other.console.is_some() {
            self.console = other.console.clone();
        }
        for (name, value) in &other.properties {
            self.properties.insert(name.clone(), value.clone());
        }
    }

    /// Effective substitution cap
    pub fn max_substitutions(&self) -> usize {
        self.engine
            .as_ref()
            .and_then(|e| e.max_substitutions)
            .unwrap_or(DEFAULT_MAX_SUBSTITUTIONS)
    }

    /// Whether listener panics are contained
    pub fn isolate_listeners(&self) -> bool {
        self.engine
            .as_ref()
            .and_then(|e| e.isolate_listeners)
            .unwrap_or(false)
    }

    /// Effective console indent width
    pub fn console_indent(&self) -> usize {
        self.console
            .as_ref()
            .and_then(|c| c.indent)
            .unwrap_or(DEFAULT_CONSOLE_INDENT)
    }

    /// Effective console message threshold name
    pub fn console_level(&self) -> &str {
        self.console
            .as_ref()
            .and_then(|c| c.level.as_deref())
            .unwrap_or(DEFAULT_CONSOLE_LEVEL)
    }

    /// Whether the console prints the elapsed build time
    pub fn show_elapsed(&self) -> bool {
        self.console
            .as_ref()
            .and_then(|c| c.show_elapsed)
            .unwrap_or(true)
    }

    pub(crate) fn engine_mut(&mut self) -> &mut EngineSettings {
        self.engine.get_or_insert_with(EngineSettings::default)
    }

    pub(crate) fn console_mut(&mut self) -> &mut ConsoleSettings {
        self.console.get_or_insert_with(ConsoleSettings::default)
    }
}

/// Validate a message level name
pub(crate) fn validate_level(field: &str, value: &str) -> ConfigResult<()> {
    if !LEVEL_NAMES.contains(&value.to_lowercase().as_str()) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be one of {}, got '{}'", LEVEL_NAMES.join(", "), value),
        });
    }
    Ok(())
}
