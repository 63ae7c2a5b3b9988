//! Rendering, windowing and asset capabilities
//!
//! Game code only talks to the three traits below. Shared game state holds
//! plain `ModelHandle`/`TextureHandle` ids; the GPU objects behind them live
//! in the backend, which is owned by the render thread.

pub mod error;
pub mod headless;
mod gpu_state;
mod vertex;
mod window;

use std::path::{Path, PathBuf};

use glam::Vec3;

use crate::camera::Camera;
use crate::error::{EngineError, EngineResult};
use crate::input::KeyCode;

pub use gpu_state::GpuState;
pub use window::WinitWindow;

/// Opaque id of a loaded model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelHandle(pub u32);

/// Opaque id of a loaded texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Draws models. Only ever called from the render thread.
pub trait Renderer {
    fn init(&mut self) -> EngineResult<()>;

    /// Start recording a frame; draws are issued in call order
    fn begin_frame(&mut self);

    /// Queue a model at `position`. No camera means screen space.
    fn render(&mut self, model: ModelHandle, position: Vec3, camera: Option<&Camera>);

    /// Submit the recorded frame
    fn end_frame(&mut self) -> EngineResult<()>;

    fn resize(&mut self, width: u32, height: u32);

    fn cleanup(&mut self);
}

/// Input/output surface of the game
pub trait Window {
    fn is_key_pressed(&self, key: KeyCode) -> bool;
    fn is_resize(&self) -> bool;
    fn set_resize(&mut self, resize: bool);
    fn window_should_close(&self) -> bool;
    fn set_title(&mut self, title: &str);
    /// Present and poll pending events
    fn update(&mut self);
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// Creates and releases GPU resources. Render thread only.
pub trait AssetLoader {
    /// Load `path`, falling back to `<textures dir>/<file name>`
    fn load_texture(&mut self, path: &Path) -> EngineResult<TextureHandle>;

    /// 1x1 white texture, never fails
    fn create_default_texture(&mut self) -> TextureHandle;

    /// `vertices` are xyz triples, `uvs` are uv pairs
    fn load_model(&mut self, vertices: &[f32], uvs: &[f32], indices: &[u32]) -> EngineResult<ModelHandle>;

    fn set_model_texture(&mut self, model: ModelHandle, texture: TextureHandle) -> EngineResult<()>;

    /// Free a model's GPU buffers. Unknown handles are ignored.
    fn release_model(&mut self, model: ModelHandle);

    fn cleanup(&mut self);
}

/// Renderer and loader behind one backend object
pub trait Graphics: Renderer + AssetLoader {}

impl<T: Renderer + AssetLoader> Graphics for T {}

/// Vertex data of an axis-aligned quad facing +z
#[derive(Debug, Clone, PartialEq)]
pub struct QuadGeometry {
    pub vertices: [f32; 12],
    pub uvs: [f32; 8],
    pub indices: [u32; 6],
}

/// Quad centered on the origin, `size.x` wide and `size.y` tall, at depth `z`
pub fn quad_geometry(size: Vec3, z: f32) -> QuadGeometry {
    let hw = size.x.max(0.0) * 0.5;
    let hh = size.y.max(0.0) * 0.5;
    QuadGeometry {
        vertices: [
            -hw, hh, z, // top left
            -hw, -hh, z, // bottom left
            hw, -hh, z, // bottom right
            hw, hh, z, // top right
        ],
        uvs: [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0],
        indices: [0, 1, 3, 3, 1, 2],
    }
}

/// Upload a quad model
pub fn load_quad_model<L: AssetLoader + ?Sized>(loader: &mut L, size: Vec3, z: f32) -> EngineResult<ModelHandle> {
    let quad = quad_geometry(size, z);
    loader.load_model(&quad.vertices, &quad.uvs, &quad.indices)
}

/// Try each candidate in order; the default texture when none loads
pub fn load_texture_or_default<L: AssetLoader + ?Sized>(loader: &mut L, candidates: &[PathBuf]) -> TextureHandle {
    for candidate in candidates {
        match loader.load_texture(candidate) {
            Ok(texture) => return texture,
            Err(e) => log::debug!("[renderer::load_texture_or_default] {}", e),
        }
    }

    log::warn!(
        "[renderer::load_texture_or_default] No texture among {:?}, using default",
        candidates
    );
    loader.create_default_texture()
}

/// Resolve a texture request to an existing file.
///
/// The literal path wins; otherwise the file name is looked up in
/// `textures_dir`.
pub fn resolve_texture_path(path: &Path, textures_dir: &Path) -> EngineResult<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let fallback = match path.file_name() {
        Some(name) => textures_dir.join(name),
        None => textures_dir.join(path),
    };
    if fallback.is_file() {
        return Ok(fallback);
    }

    Err(EngineError::AssetNotFound {
        path: path.to_path_buf(),
        fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_is_centered() {
        let quad = quad_geometry(Vec3::new(2.0, 1.0, 0.0), -0.5);
        assert_eq!(&quad.vertices[0..3], &[-1.0, 0.5, -0.5]);
        assert_eq!(&quad.vertices[6..9], &[1.0, -0.5, -0.5]);
        assert!(quad.indices.iter().all(|&i| i < 4));
    }

    #[test]
    fn test_resolve_prefers_literal_then_textures_dir() {
        let dir = tempfile::tempdir().unwrap();
        let textures = dir.path().join("textures");
        std::fs::create_dir_all(&textures).unwrap();
        std::fs::write(textures.join("platform.png"), b"png").unwrap();
        let literal = dir.path().join("literal.png");
        std::fs::write(&literal, b"png").unwrap();

        assert_eq!(resolve_texture_path(&literal, &textures).unwrap(), literal);
        assert_eq!(
            resolve_texture_path(Path::new("platform.png"), &textures).unwrap(),
            textures.join("platform.png")
        );

        match resolve_texture_path(Path::new("missing.png"), &textures) {
            Err(EngineError::AssetNotFound { fallback, .. }) => {
                assert_eq!(fallback, textures.join("missing.png"));
            }
            other => panic!("expected AssetNotFound, got {:?}", other),
        }
    }
}
