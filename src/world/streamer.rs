//! Endless platform streaming
//!
//! The live platform list is copy-on-write: every mutation builds a new
//! `Vec` and swaps the `Arc`, so a snapshot taken by the renderer or by
//! player collision never changes underneath it.
//!
//! Work is split by thread. `update_logic` (generation trigger and
//! eviction) runs on the logic worker and touches no GPU state.
//! `materialize_pending` and `release_retired` create and free models and
//! must run on the render thread.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;

use super::error::{materialize_error, WorldErrorContext};
use super::generator::ChunkSource;
use super::platform::{find_platform_below, Platform, PlatformDescriptor, PlatformKind, PlatformQuery, PlatformSnapshot};
use crate::camera::Camera;
use crate::config::StreamingConfig;
use crate::error::EngineResult;
use crate::renderer::{load_quad_model, load_texture_or_default, AssetLoader, ModelHandle, Renderer, TextureHandle};

/// Spawn area platforms, as (position, size)
const INITIAL_PLATFORMS: [(Vec3, Vec3); 3] = [
    (Vec3::new(1.5, -0.6, 0.0), Vec3::new(1.5, 0.3, 0.1)),
    (Vec3::new(3.5, -0.5, 0.0), Vec3::new(1.2, 0.3, 0.1)),
    (Vec3::new(6.0, -0.7, 0.0), Vec3::new(1.0, 0.3, 0.1)),
];

/// High-water mark after the spawn area is seeded
const INITIAL_HIGH_WATER_MARK: f32 = 7.0;

pub struct WorldStreamer {
    platforms: Arc<Vec<Platform>>,
    high_water_mark: f32,
    in_flight: bool,
    source: Arc<dyn ChunkSource>,
    retired: Vec<ModelHandle>,
    kind_textures: HashMap<PlatformKind, TextureHandle>,
    settings: StreamingConfig,
    requests: u64,
}

impl WorldStreamer {
    pub fn new(settings: StreamingConfig, source: Arc<dyn ChunkSource>) -> Self {
        Self {
            platforms: Arc::new(Vec::new()),
            high_water_mark: 0.0,
            in_flight: false,
            source,
            retired: Vec::new(),
            kind_textures: HashMap::new(),
            settings,
            requests: 0,
        }
    }

    /// Build the three fixed platforms around the spawn point
    pub fn seed_initial_platforms<L: AssetLoader + ?Sized>(&mut self, loader: &mut L) -> EngineResult<()> {
        let mut next = self.platforms.as_ref().clone();
        for (position, size) in INITIAL_PLATFORMS {
            let descriptor = PlatformDescriptor::new(position, size, PlatformKind::Grass);
            next.push(self.materialize(loader, &descriptor)?);
        }

        self.platforms = Arc::new(next);
        self.high_water_mark = self.high_water_mark.max(INITIAL_HIGH_WATER_MARK);
        log::info!(
            "[WorldStreamer::seed_initial_platforms] {} platforms, high-water mark {:.1}",
            self.platforms.len(),
            self.high_water_mark
        );
        Ok(())
    }

    /// Logic-thread half of a frame: request generation when the player
    /// nears the high-water mark, then evict platforms left far behind
    pub fn update_logic(&mut self, player_position: Vec3) {
        self.trigger_generation(player_position);
        self.evict(player_position);
    }

    /// Single-threaded frame: trigger, drain, evict, release
    pub fn update<L: AssetLoader + ?Sized>(&mut self, player_position: Vec3, loader: &mut L) {
        self.trigger_generation(player_position);
        self.materialize_pending(loader);
        self.evict(player_position);
        self.release_retired(loader);
    }

    fn trigger_generation(&mut self, player_position: Vec3) {
        if self.in_flight {
            return;
        }
        if player_position.x <= self.high_water_mark - self.settings.generation_distance {
            return;
        }

        let anchor = Vec3::new(
            self.high_water_mark + self.settings.anchor_offset_x,
            self.settings.anchor_y,
            0.0,
        );
        self.in_flight = true;
        self.requests += 1;
        log::debug!(
            "[WorldStreamer::trigger_generation] Player at x={:.2}, requesting {} platforms from x={:.2}",
            player_position.x,
            self.settings.chunk_size,
            anchor.x
        );
        self.source.request_chunk(self.settings.chunk_size, anchor);
    }

    fn evict(&mut self, player_position: Vec3) {
        let limit = self.settings.cleanup_distance;
        let out_of_range = |p: &Platform| (p.position.x - player_position.x).abs() > limit;
        if !self.platforms.iter().any(out_of_range) {
            return;
        }

        let (evicted, kept): (Vec<Platform>, Vec<Platform>) =
            self.platforms.iter().copied().partition(|p| out_of_range(p));
        log::debug!(
            "[WorldStreamer::evict] Removed {} platforms, {} remain",
            evicted.len(),
            kept.len()
        );
        self.retired.extend(evicted.iter().map(|p| p.model));
        self.platforms = Arc::new(kept);
    }

    /// Drain finished batches and upload them. Render thread only.
    /// Returns the number of platforms added.
    pub fn materialize_pending<L: AssetLoader + ?Sized>(&mut self, loader: &mut L) -> usize {
        let mut added = Vec::new();
        let mut drained = false;

        while let Some(batch) = self.source.poll_chunk() {
            drained = true;
            for descriptor in &batch {
                self.high_water_mark = self.high_water_mark.max(descriptor.position.x);
                match self.materialize(loader, descriptor) {
                    Ok(platform) => added.push(platform),
                    Err(e) => log::warn!("[WorldStreamer::materialize_pending] {}", e),
                }
            }
        }

        if drained {
            self.in_flight = false;
        }
        if added.is_empty() {
            return 0;
        }

        let count = added.len();
        let mut next = Vec::with_capacity(self.platforms.len() + count);
        next.extend_from_slice(&self.platforms);
        next.extend(added);
        self.platforms = Arc::new(next);
        count
    }

    fn materialize<L: AssetLoader + ?Sized>(
        &mut self,
        loader: &mut L,
        descriptor: &PlatformDescriptor,
    ) -> EngineResult<Platform> {
        let model = load_quad_model(loader, descriptor.size, 0.0)
            .map_err(|e| materialize_error(descriptor.position.x, e))?;
        let texture = self.kind_texture(loader, descriptor.kind);

        let context = format!("texturing platform at x={:.2}", descriptor.position.x);
        if let Err(e) = loader.set_model_texture(model, texture).world_context(&context) {
            loader.release_model(model);
            return Err(e);
        }

        Ok(Platform::from_descriptor(descriptor, model))
    }

    fn kind_texture<L: AssetLoader + ?Sized>(&mut self, loader: &mut L, kind: PlatformKind) -> TextureHandle {
        if let Some(&texture) = self.kind_textures.get(&kind) {
            return texture;
        }
        let texture = load_texture_or_default(loader, &kind.texture_candidates());
        self.kind_textures.insert(kind, texture);
        texture
    }

    /// Free models of evicted platforms. Render thread only.
    pub fn release_retired<L: AssetLoader + ?Sized>(&mut self, loader: &mut L) -> usize {
        let count = self.retired.len();
        for model in self.retired.drain(..) {
            loader.release_model(model);
        }
        count
    }

    /// Release every platform model
    pub fn cleanup<L: AssetLoader + ?Sized>(&mut self, loader: &mut L) {
        self.retired.extend(self.platforms.iter().map(|p| p.model));
        self.platforms = Arc::new(Vec::new());
        let released = self.release_retired(loader);
        log::info!("[WorldStreamer::cleanup] Released {} platform models", released);
    }

    pub fn snapshot(&self) -> PlatformSnapshot {
        PlatformSnapshot::new(Arc::clone(&self.platforms), self.settings.search_radius)
    }

    pub fn render<R: Renderer + ?Sized>(&self, renderer: &mut R, camera: &Camera) {
        render_platforms(&self.platforms, renderer, camera, self.settings.view_distance);
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    pub fn high_water_mark(&self) -> f32 {
        self.high_water_mark
    }

    pub fn is_generation_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    pub fn requests_made(&self) -> u64 {
        self.requests
    }

    pub fn settings(&self) -> &StreamingConfig {
        &self.settings
    }
}

impl PlatformQuery for WorldStreamer {
    fn find_platform_below(&self, position: Vec3, size: Vec3) -> Option<Platform> {
        find_platform_below(&self.platforms, position, size, self.settings.search_radius).copied()
    }
}

/// Draw platforms within `view_distance` of the camera, in list order
pub fn render_platforms<R: Renderer + ?Sized>(
    platforms: &[Platform],
    renderer: &mut R,
    camera: &Camera,
    view_distance: f32,
) -> usize {
    let center = camera.target().x;
    let mut drawn = 0;
    for platform in platforms {
        if (platform.position.x - center).abs() > view_distance {
            continue;
        }
        renderer.render(platform.model, platform.position, Some(camera));
        drawn += 1;
    }
    drawn
}
