//! Renderer subsystem error handling
//!
//! Helpers that turn wgpu/image failures into `EngineError`s.

use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Type alias for renderer operation results
pub type RendererResult<T> = EngineResult<T>;

/// Helper trait for renderer error contexts
pub trait RendererErrorContext<T> {
    fn renderer_context(self, operation: &str) -> RendererResult<T>;
}

impl<T, E> RendererErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn renderer_context(self, operation: &str) -> RendererResult<T> {
        self.map_err(|e| gpu_operation_error(operation, e))
    }
}

/// Create a GPU operation error
pub fn gpu_operation_error(operation: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::GpuOperationFailed {
        operation: operation.to_string(),
        error: error.to_string(),
    }
}

/// Create an image decode error
pub fn asset_decode_error(path: &Path, error: impl std::fmt::Display) -> EngineError {
    EngineError::AssetDecode {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}

/// Check that vertex, uv and index arrays describe a valid mesh
pub fn validate_mesh(vertices: &[f32], uvs: &[f32], indices: &[u32]) -> RendererResult<()> {
    if vertices.len() % 3 != 0 || uvs.len() % 2 != 0 {
        return Err(gpu_operation_error(
            "load_model",
            format!("malformed arrays: {} positions, {} uvs", vertices.len(), uvs.len()),
        ));
    }

    let vertex_count = vertices.len() / 3;
    if uvs.len() / 2 != vertex_count {
        return Err(gpu_operation_error(
            "load_model",
            format!("{} vertices but {} uvs", vertex_count, uvs.len() / 2),
        ));
    }

    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(gpu_operation_error(
            "load_model",
            format!("index {} out of range for {} vertices", bad, vertex_count),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_validation() {
        assert!(validate_mesh(&[0.0; 9], &[0.0; 6], &[0, 1, 2]).is_ok());
        assert!(validate_mesh(&[0.0; 9], &[0.0; 4], &[0, 1, 2]).is_err());
        assert!(validate_mesh(&[0.0; 9], &[0.0; 6], &[0, 1, 3]).is_err());
    }

    #[test]
    fn test_context_maps_to_gpu_error() {
        let result: Result<(), &str> = Err("lost device");
        match result.renderer_context("present") {
            Err(EngineError::GpuOperationFailed { operation, error }) => {
                assert_eq!(operation, "present");
                assert_eq!(error, "lost device");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
