use std::path::Path;

use lilium_core::transaction::ManagerConfig;
use serde::Deserialize;

/// Top-level project configuration loaded from `lilium.toml`.
///
/// ```toml
/// [project]
/// name = "Floor plan"
///
/// [manager]
/// max_undo_step = 50
///
/// [log]
/// filter = "info,transaction=debug"
///
/// [[point]]
/// name = "origin"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectInfo,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default, rename = "point")]
    pub points: Vec<PointConfig>,
}

/// General project information.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
}

/// Logger settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `env_logger` filter directive, used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

/// Initial position of a document point.
#[derive(Debug, Clone, Deserialize)]
pub struct PointConfig {
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// Load a project config from a TOML file.
///
/// Returns `Err` with a human-readable message if the file cannot be read
/// or parsed.
pub fn load_project(path: &Path) -> Result<ProjectConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    toml::from_str(&content).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

/// Unwraps a loaded project, falling back to defaults if loading failed.
pub fn or_default(loaded: Result<ProjectConfig, String>) -> ProjectConfig {
    match loaded {
        Ok(config) => {
            log::info!(
                "Loaded project: {} ({} points, max_undo_step = {})",
                config.project.name,
                config.points.len(),
                config.manager.max_undo_step
            );
            config
        }
        Err(e) => {
            log::warn!("No project file ({e}), using defaults");
            ProjectConfig {
                project: ProjectInfo {
                    name: "Untitled".into(),
                },
                manager: ManagerConfig::default(),
                log: LogConfig::default(),
                points: Vec::new(),
            }
        }
    }
}
