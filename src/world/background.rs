use std::path::PathBuf;

use glam::Vec3;

use crate::error::EngineResult;
use crate::renderer::{load_quad_model, load_texture_or_default, AssetLoader, ModelHandle, Renderer};

/// Screen-space quad, slightly wider than the viewport so the drift never
/// shows an edge
const QUAD_SIZE: Vec3 = Vec3::new(2.4, 2.0, 0.0);
const DRIFT_AMPLITUDE: f32 = 0.1;
const DRIFT_SPEED: f32 = 0.05;

/// Full-screen backdrop drawn before the world
#[derive(Debug, Default)]
pub struct Background {
    time: f32,
    model: Option<ModelHandle>,
}

impl Background {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload the quad and its texture. Render thread only.
    pub fn init<L: AssetLoader + ?Sized>(&mut self, loader: &mut L) -> EngineResult<()> {
        let model = load_quad_model(loader, QUAD_SIZE, 0.0)?;
        let texture = load_texture_or_default(loader, &[PathBuf::from("background.png")]);
        loader.set_model_texture(model, texture)?;
        self.model = Some(model);
        log::info!("[Background::init] Background ready");
        Ok(())
    }

    pub fn update(&mut self, dt: f32) {
        self.time += dt.max(0.0);
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn model(&self) -> Option<ModelHandle> {
        self.model
    }

    /// Horizontal parallax drift at the current time
    pub fn offset(&self) -> Vec3 {
        Vec3::new((self.time * DRIFT_SPEED).sin() * DRIFT_AMPLITUDE, 0.0, 0.0)
    }

    /// Draw without a camera
    pub fn render<R: Renderer + ?Sized>(&self, renderer: &mut R) {
        if let Some(model) = self.model {
            renderer.render(model, self.offset(), None);
        }
    }

    pub fn release<L: AssetLoader + ?Sized>(&mut self, loader: &mut L) {
        if let Some(model) = self.model.take() {
            loader.release_model(model);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_accumulates_and_ignores_negative_steps() {
        let mut background = Background::new();
        background.update(0.5);
        background.update(-1.0);
        background.update(0.25);
        assert!((background.time() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_drift_stays_inside_overscan() {
        let mut background = Background::new();
        for _ in 0..10_000 {
            background.update(0.37);
            assert!(background.offset().x.abs() <= (QUAD_SIZE.x - 2.0) * 0.5 + 1e-6);
        }
    }
}
