//! Dispatcher error types
//!
//! Load failures travel to callers as [`LoadError`](contracts::LoadError);
//! these errors only cover wiring the loader up and talking to a stopped
//! dispatcher.

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Builder is missing a required collaborator
    #[error("loader is missing required component '{component}'")]
    MissingComponent { component: String },

    /// Dispatcher task has shut down
    #[error("dispatcher is shut down")]
    Closed,
}

impl DispatcherError {
    /// Create a missing component error
    pub fn missing_component(component: impl Into<String>) -> Self {
        Self::MissingComponent {
            component: component.into(),
        }
    }
}
