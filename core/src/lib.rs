//! # Lilium Core
//!
//! Transactional request manager for editors: requests, sessions, bounded
//! undo/redo history and lifecycle signals.

pub mod transaction;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs the library version once at startup.
pub fn init() {
    log::info!("Lilium Core v{} initialized", VERSION);
}
