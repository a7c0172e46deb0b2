//! Settings storage module.
//!
//! Handles saving and loading the controller configuration, named output
//! patterns and the board state left by the last CLI run.

pub mod session;
pub mod settings;

// Re-export commonly used items
pub use session::*;
pub use settings::*;
