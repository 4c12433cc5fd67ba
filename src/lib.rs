// Core modules
pub mod api;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod settings;
pub mod strategy;

// Re-export commonly used types
pub use engine::{Engine, TickOutcome};
pub use error::Error;
pub use models::*;
pub use settings::Settings;

// Error handling
pub type Result<T> = std::result::Result<T, Error>;
