//! World subsystem error handling

use crate::error::{subsystem_error, EngineError, EngineResult};

/// Type alias for world operation results
pub type WorldResult<T> = EngineResult<T>;

/// Helper trait for world error contexts
pub trait WorldErrorContext<T> {
    fn world_context(self, context: &str) -> WorldResult<T>;
}

impl<T, E> WorldErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn world_context(self, context: &str) -> WorldResult<T> {
        self.map_err(|e| subsystem_error("world", format!("{}: {}", context, e)))
    }
}

/// Create an error for a failed platform upload
pub fn materialize_error(x: f32, error: impl std::fmt::Display) -> EngineError {
    subsystem_error("world", format!("platform at x={:.2} not materialized: {}", x, error))
}
