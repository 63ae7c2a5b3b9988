//! Engine-wide error type
//!
//! Every subsystem reports failures through `EngineError`. Only
//! `Initialization` is fatal; the other variants are recovered where they
//! occur (default texture, skipped critical section, skipped frame).

use std::path::PathBuf;

/// Result alias used across the engine
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Neither the literal path nor the fallback resource path exists
    #[error("Asset not found: {path} (fallback: {fallback})")]
    AssetNotFound { path: PathBuf, fallback: PathBuf },

    #[error("Failed to decode asset {path}: {error}")]
    AssetDecode { path: PathBuf, error: String },

    #[error("Lock '{resource}' not acquired within {waited_ms}ms")]
    LockTimeout { resource: String, waited_ms: u64 },

    #[error("Update of '{component}' failed: {error}")]
    SubsystemUpdate { component: String, error: String },

    #[error("Initialization failed at {stage}: {error}")]
    Initialization { stage: String, error: String },

    #[error("GPU operation '{operation}' failed: {error}")]
    GpuOperationFailed { operation: String, error: String },

    #[error("Invalid configuration {path}: {error}")]
    Config { path: PathBuf, error: String },

    #[error("Animation '{name}' has no frames")]
    InvalidAnimation { name: String },

    #[error("Unknown model handle {id}")]
    UnknownModel { id: u32 },
}

impl EngineError {
    /// Whether the error must terminate the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Initialization { .. })
    }
}

/// Create an initialization error for a named startup stage
pub fn initialization_error(stage: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::Initialization {
        stage: stage.to_string(),
        error: error.to_string(),
    }
}

/// Create a subsystem update error
pub fn subsystem_error(component: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::SubsystemUpdate {
        component: component.to_string(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_initialization_is_fatal() {
        assert!(initialization_error("window", "no display").is_fatal());
        assert!(!subsystem_error("player", "boom").is_fatal());
        assert!(!EngineError::LockTimeout {
            resource: "player".to_string(),
            waited_ms: 16,
        }
        .is_fatal());
    }

    #[test]
    fn test_error_messages_name_the_resource() {
        let err = EngineError::LockTimeout {
            resource: "platforms".to_string(),
            waited_ms: 16,
        };
        assert_eq!(err.to_string(), "Lock 'platforms' not acquired within 16ms");
    }
}
