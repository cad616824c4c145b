//! Configuration loader with tier-based merging.
//!
//! Loads configuration from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Built-in defaults (lowest priority)
    Defaults = 0,
    /// Project-level config ($CWD/task-tracker/)
    Project = 1,
    /// User-level config (~/.task-tracker/)
    User = 2,
    /// Environment variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Paths for each configuration tier.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Explicit config file; replaces the file tiers when set.
    pub explicit: Option<PathBuf>,
    /// Project-level config directory
    pub project_dir: Option<PathBuf>,
    /// User-level config directory
    pub user_dir: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        Self {
            explicit: std::env::var("TASK_TRACKER_CONFIG_PATH")
                .ok()
                .map(PathBuf::from),
            project_dir: Some(PathBuf::from("task-tracker")),
            user_dir: dirs::home_dir().map(|h| h.join(".task-tracker")),
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            explicit: None,
            project_dir,
            user_dir,
        }
    }

    /// Use `path` instead of the project and user tiers.
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }
}

/// Reads one YAML tier. A missing file is skipped; a broken one is
/// reported and skipped.
fn read_tier(dir: Option<&Path>, tier: ConfigTier) -> Option<(Value, PathBuf)> {
    let config_file = dir?.join("config.yaml");
    if !config_file.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(&config_file) {
        Ok(content) => content,
        Err(e) => {
            warn!(%tier, path = %config_file.display(), "Cannot read config file: {}", e);
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => Some((value, config_file)),
        Err(e) => {
            warn!(%tier, path = %config_file.display(), "Ignoring invalid config file: {}", e);
            None
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Paths for each tier
    pub paths: ConfigPaths,
    /// Loaded configuration
    config: Config,
    /// Config files that contributed, lowest tier first
    sources: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration with explicit paths, reading overrides from the
    /// process environment.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        Self::load_with_env(paths, |key| std::env::var(key).ok())
    }

    /// Load configuration with explicit paths and an environment lookup.
    pub fn load_with_env(paths: ConfigPaths, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // An explicit file replaces the file tiers
        if let Some(ref explicit) = paths.explicit {
            let mut config = Config::load(explicit)?;
            Self::apply_env_overrides(&mut config, &env);
            return Ok(Self {
                sources: vec![explicit.clone()],
                paths,
                config,
            });
        }

        let mut configs: Vec<Value> = Vec::new();
        let mut sources = Vec::new();

        // Tier 1: Defaults
        configs.push(serde_json::to_value(Config::default())?);

        // Tier 2: Project, Tier 3: User
        let tiers = [
            (paths.project_dir.as_deref(), ConfigTier::Project),
            (paths.user_dir.as_deref(), ConfigTier::User),
        ];
        for (dir, tier) in tiers {
            if let Some((value, path)) = read_tier(dir, tier) {
                configs.push(value);
                sources.push(path);
            }
        }

        let merged = deep_merge_all(configs);
        let mut config: Config = serde_json::from_value(merged)?;

        // Tier 4: Environment variable overrides
        Self::apply_env_overrides(&mut config, &env);

        Ok(Self {
            paths,
            config,
            sources,
        })
    }

    /// Apply environment variable overrides to config.
    fn apply_env_overrides(config: &mut Config, env: &impl Fn(&str) -> Option<String>) {
        if let Some(db_path) = env("TASK_TRACKER_DB_PATH") {
            config.paths.db_path = PathBuf::from(db_path);
        }

        if let Some(media_dir) = env("TASK_TRACKER_MEDIA_DIR") {
            config.paths.media_dir = PathBuf::from(media_dir);
        }

        if let Some(host) = env("TASK_TRACKER_HOST") {
            config.server.host = host;
        }

        if let Some(port) = env("TASK_TRACKER_PORT") {
            match port.parse() {
                Ok(port) => config.server.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid TASK_TRACKER_PORT"),
            }
        }

        if let Some(size) = env("TASK_TRACKER_PAGE_SIZE") {
            match size.parse::<u64>() {
                Ok(size) if size > 0 => config.pagination.page_size = size,
                _ => warn!(value = %size, "Ignoring invalid TASK_TRACKER_PAGE_SIZE"),
            }
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Config files that were merged, lowest tier first.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}
