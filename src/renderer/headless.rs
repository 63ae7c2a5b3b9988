//! Headless backend
//!
//! `HeadlessGraphics` keeps a registry of models and textures and records
//! draw calls instead of submitting them. `HeadlessWindow` replays a
//! script of key presses, resizes and close requests. Together they run
//! the full game loop without a GPU or a display.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use glam::Vec3;

use super::error::{asset_decode_error, validate_mesh};
use super::{resolve_texture_path, AssetLoader, ModelHandle, Renderer, TextureHandle, Window};
use crate::camera::Camera;
use crate::error::{EngineError, EngineResult};
use crate::input::KeyCode;

/// One recorded `Renderer::render` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub model: ModelHandle,
    pub texture: Option<TextureHandle>,
    pub position: Vec3,
    pub with_camera: bool,
}

/// Backend lifecycle events, in the order they happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    Init,
    ModelReleased(ModelHandle),
    RendererCleanup,
    LoaderCleanup,
}

#[derive(Debug, Clone)]
struct HeadlessModel {
    texture: Option<TextureHandle>,
}

#[derive(Debug)]
pub struct HeadlessGraphics {
    textures_dir: PathBuf,
    next_id: u32,
    textures: HashMap<TextureHandle, Option<PathBuf>>,
    default_texture: Option<TextureHandle>,
    models: HashMap<ModelHandle, HeadlessModel>,
    released: Vec<ModelHandle>,
    pending: Vec<DrawCall>,
    last_frame: Vec<DrawCall>,
    frames_presented: u64,
    resizes: Vec<(u32, u32)>,
    events: Vec<BackendEvent>,
}

impl HeadlessGraphics {
    pub fn new(textures_dir: impl Into<PathBuf>) -> Self {
        Self {
            textures_dir: textures_dir.into(),
            next_id: 1,
            textures: HashMap::new(),
            default_texture: None,
            models: HashMap::new(),
            released: Vec::new(),
            pending: Vec::new(),
            last_frame: Vec::new(),
            frames_presented: 0,
            resizes: Vec::new(),
            events: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn live_models(&self) -> usize {
        self.models.len()
    }

    pub fn released_models(&self) -> &[ModelHandle] {
        &self.released
    }

    pub fn model_texture(&self, model: ModelHandle) -> Option<TextureHandle> {
        self.models.get(&model).and_then(|m| m.texture)
    }

    /// Source file of a texture; `None` for the default texture
    pub fn texture_path(&self, texture: TextureHandle) -> Option<&Path> {
        self.textures.get(&texture).and_then(|p| p.as_deref())
    }

    pub fn default_texture(&self) -> Option<TextureHandle> {
        self.default_texture
    }

    /// Draws recorded since the last `begin_frame`
    pub fn pending_draws(&self) -> &[DrawCall] {
        &self.pending
    }

    /// Draws of the last presented frame
    pub fn last_frame(&self) -> &[DrawCall] {
        &self.last_frame
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn resizes(&self) -> &[(u32, u32)] {
        &self.resizes
    }

    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }
}

impl Renderer for HeadlessGraphics {
    fn init(&mut self) -> EngineResult<()> {
        self.events.push(BackendEvent::Init);
        Ok(())
    }

    fn begin_frame(&mut self) {
        self.pending.clear();
    }

    fn render(&mut self, model: ModelHandle, position: Vec3, camera: Option<&Camera>) {
        let Some(registered) = self.models.get(&model) else {
            log::warn!("[HeadlessGraphics::render] Unknown model {}", model.0);
            return;
        };
        self.pending.push(DrawCall {
            model,
            texture: registered.texture,
            position,
            with_camera: camera.is_some(),
        });
    }

    fn end_frame(&mut self) -> EngineResult<()> {
        self.last_frame = std::mem::take(&mut self.pending);
        self.frames_presented += 1;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.resizes.push((width, height));
    }

    fn cleanup(&mut self) {
        self.pending.clear();
        self.events.push(BackendEvent::RendererCleanup);
    }
}

impl AssetLoader for HeadlessGraphics {
    fn load_texture(&mut self, path: &Path) -> EngineResult<TextureHandle> {
        let resolved = resolve_texture_path(path, &self.textures_dir)?;
        image::image_dimensions(&resolved).map_err(|e| asset_decode_error(&resolved, e))?;

        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle, Some(resolved));
        Ok(handle)
    }

    fn create_default_texture(&mut self) -> TextureHandle {
        if let Some(texture) = self.default_texture {
            return texture;
        }
        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle, None);
        self.default_texture = Some(handle);
        handle
    }

    fn load_model(&mut self, vertices: &[f32], uvs: &[f32], indices: &[u32]) -> EngineResult<ModelHandle> {
        validate_mesh(vertices, uvs, indices)?;
        let handle = ModelHandle(self.next_id());
        self.models.insert(
            handle,
            HeadlessModel { texture: None },
        );
        Ok(handle)
    }

    fn set_model_texture(&mut self, model: ModelHandle, texture: TextureHandle) -> EngineResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(EngineError::GpuOperationFailed {
                operation: "set_model_texture".to_string(),
                error: format!("unknown texture {}", texture.0),
            });
        }
        let registered = self
            .models
            .get_mut(&model)
            .ok_or(EngineError::UnknownModel { id: model.0 })?;
        registered.texture = Some(texture);
        Ok(())
    }

    fn release_model(&mut self, model: ModelHandle) {
        if self.models.remove(&model).is_some() {
            self.released.push(model);
            self.events.push(BackendEvent::ModelReleased(model));
        }
    }

    fn cleanup(&mut self) {
        self.models.clear();
        self.textures.clear();
        self.default_texture = None;
        self.events.push(BackendEvent::LoaderCleanup);
    }
}

/// Something a `HeadlessWindow` does on a given `update` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedEvent {
    Key { key: KeyCode, pressed: bool },
    Resize { width: u32, height: u32 },
    Close,
}

#[derive(Debug)]
pub struct HeadlessWindow {
    title: String,
    width: u32,
    height: u32,
    pressed: HashSet<KeyCode>,
    resized: bool,
    close_requested: bool,
    updates: u64,
    script: Vec<(u64, ScriptedEvent)>,
    titles: Vec<String>,
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            title: String::new(),
            width,
            height,
            pressed: HashSet::new(),
            resized: false,
            close_requested: false,
            updates: 0,
            script: Vec::new(),
            titles: Vec::new(),
        }
    }

    /// Apply `event` during the `at_update`-th call to `update` (1-based)
    pub fn schedule(&mut self, at_update: u64, event: ScriptedEvent) -> &mut Self {
        self.script.push((at_update, event));
        self
    }

    pub fn press(&mut self, key: KeyCode) {
        self.pressed.insert(key);
    }

    pub fn release(&mut self, key: KeyCode) {
        self.pressed.remove(&key);
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Every title set so far
    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    fn apply(&mut self, event: ScriptedEvent) {
        match event {
            ScriptedEvent::Key { key, pressed: true } => self.press(key),
            ScriptedEvent::Key { key, pressed: false } => self.release(key),
            ScriptedEvent::Resize { width, height } => {
                self.width = width;
                self.height = height;
                self.resized = true;
            }
            ScriptedEvent::Close => self.request_close(),
        }
    }
}

impl Window for HeadlessWindow {
    fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    fn is_resize(&self) -> bool {
        self.resized
    }

    fn set_resize(&mut self, resize: bool) {
        self.resized = resize;
    }

    fn window_should_close(&self) -> bool {
        self.close_requested
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        self.titles.push(self.title.clone());
    }

    fn update(&mut self) {
        self.updates += 1;
        let due: Vec<ScriptedEvent> = self
            .script
            .iter()
            .filter(|(at, _)| *at == self.updates)
            .map(|(_, event)| *event)
            .collect();
        for event in due {
            self.apply(event);
        }
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}
