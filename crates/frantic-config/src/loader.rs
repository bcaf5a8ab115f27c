//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::settings::{validate_level, Settings};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "frantic.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.frantic/config.toml) - lowest priority
/// 2. Project config (./frantic.toml) - overrides global
/// 3. Environment variables (FRANTIC_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Effective settings after merging every source
    pub settings: Settings,

    /// Project root directory (where frantic.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use a specific global config file instead of ~/.frantic/config.toml
    pub fn with_global_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find frantic.toml, then merges it over
    /// the global config and applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_settings) = self.find_project_settings(start_dir)?;
        self.assemble(project_settings, project_root)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_settings = Settings::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());
        self.assemble(project_settings, project_root)
    }

    fn assemble(
        &mut self,
        project_settings: Settings,
        project_root: Option<PathBuf>,
    ) -> ConfigResult<Config> {
        // Global config is optional, a broken or missing one never blocks a build
        let mut settings = self.load_global_settings().unwrap_or_default();
        settings.merge(&project_settings);
        apply_env_overrides(&mut settings)?;

        Ok(Config {
            settings,
            project_root,
        })
    }

    /// Find project settings by walking up directory tree
    fn find_project_settings(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, Settings)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let settings = Settings::load_from_file(&config_path)?;
                return Ok((Some(current), settings));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, Settings::default())),
            }
        }
    }

    /// Load global settings from ~/.frantic/config.toml
    fn load_global_settings(&mut self) -> ConfigResult<Settings> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = Self::global_config_dir()?.join("config.toml");
                self.global_config_path = Some(path.clone());
                path
            }
        };

        if !path.exists() {
            return Ok(Settings::default());
        }

        Settings::load_from_file(&path)
    }

    /// Get the global configuration directory (~/.frantic)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".frantic"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a project file was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}

/// Apply environment variable overrides
///
/// Recognized: FRANTIC_MAX_SUBSTITUTIONS, FRANTIC_ISOLATE_LISTENERS, FRANTIC_LOG_LEVEL
fn apply_env_overrides(settings: &mut Settings) -> ConfigResult<()> {
    if let Ok(raw) = env::var("FRANTIC_MAX_SUBSTITUTIONS") {
        let limit: usize = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: "FRANTIC_MAX_SUBSTITUTIONS".to_string(),
            reason: format!("expected a positive integer, got '{}'", raw),
        })?;
        settings.engine_mut().max_substitutions = Some(limit);
    }

    if let Ok(raw) = env::var("FRANTIC_ISOLATE_LISTENERS") {
        let isolate = matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes");
        settings.engine_mut().isolate_listeners = Some(isolate);
    }

    if let Ok(level) = env::var("FRANTIC_LOG_LEVEL") {
        validate_level("FRANTIC_LOG_LEVEL", &level)?;
        settings.console_mut().level = Some(level.to_lowercase());
    }

    settings.validate()
}
