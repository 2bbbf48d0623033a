use serde::Deserialize;

use super::history::DEFAULT_MAX_UNDO_STEP;

/// Manager settings, usually read from the `[manager]` table of a project file.
///
/// ```toml
/// [manager]
/// max_undo_step = 50
/// enabled = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Bound of the top-level undo history; nested sessions inherit it.
    pub max_undo_step: usize,
    /// Whether the manager starts enabled (a read-only document starts disabled).
    pub enabled: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_undo_step: DEFAULT_MAX_UNDO_STEP,
            enabled: true,
        }
    }
}
