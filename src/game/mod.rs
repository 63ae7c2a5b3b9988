//! Game composition root
//!
//! `SharedWorld` is the state both threads touch: the player, the platform
//! streamer and the background, each behind its own named lock. The logic
//! worker is the writer for all three; the render thread mostly reads and
//! only writes for input latching and GPU uploads.

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;

use crate::camera::Camera;
use crate::config::GameConfig;
use crate::error::EngineResult;
use crate::input::PlayerInput;
use crate::player::Player;
use crate::renderer::{AssetLoader, Graphics, Renderer, Window};
use crate::thread_pool::{Guarded, LockId, LockPolicy, TaskContext};
use crate::world::{render_platforms, Background, ChunkSource, WorldStreamer};

pub struct SharedWorld {
    pub player: Guarded<Player>,
    pub platforms: Guarded<WorldStreamer>,
    pub background: Guarded<Background>,
}

impl SharedWorld {
    pub fn new(player: Player, platforms: WorldStreamer, background: Background) -> Self {
        Self {
            player: Guarded::new(LockId::Player, player),
            platforms: Guarded::new(LockId::Platforms, platforms),
            background: Guarded::new(LockId::Background, background),
        }
    }

    pub fn is_locked(&self, id: LockId) -> bool {
        match id {
            LockId::Player => self.player.is_locked(),
            LockId::Platforms => self.platforms.is_locked(),
            LockId::Background => self.background.is_locked(),
        }
    }

    /// One logic tick: player, then platforms, then background.
    ///
    /// Each step takes its lock with a bounded wait and is skipped on
    /// timeout. `cancelled` is checked between steps.
    pub fn logic_pass(&self, locks: &LockPolicy, dt: f32, cancelled: impl Fn() -> bool) -> LogicReport {
        let mut report = LogicReport::default();

        // Collision runs against a snapshot so the platforms lock is not
        // held while the player lock is
        if let Some(snapshot) = locks.read_under_lock(&self.platforms, WorldStreamer::snapshot) {
            report.player = locks.run_under_lock(&self.player, |player| {
                player.update(dt, &snapshot);
                Ok(())
            });
        }
        let position = locks.read_under_lock(&self.player, Player::position);

        if cancelled() {
            return report;
        }
        if let Some(position) = position {
            report.platforms = locks.run_under_lock(&self.platforms, |streamer| {
                streamer.update_logic(position);
                Ok(())
            });
        }

        if cancelled() {
            return report;
        }
        report.background = locks.run_under_lock(&self.background, |background| {
            background.update(dt);
            Ok(())
        });

        report
    }
}

/// Which subsystems a logic pass actually updated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicReport {
    pub player: bool,
    pub platforms: bool,
    pub background: bool,
}

impl LogicReport {
    pub fn all(&self) -> bool {
        self.player && self.platforms && self.background
    }
}

/// Result of one render pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub platforms_drawn: usize,
    pub player_drawn: bool,
    pub presented: bool,
}

/// The platformer: shared world, chunk source and camera
pub struct PlatformerGame {
    config: GameConfig,
    world: Arc<SharedWorld>,
    source: Arc<dyn ChunkSource>,
    locks: LockPolicy,
    camera: Camera,
}

impl PlatformerGame {
    /// Load every subsystem's GPU resources. Render thread only.
    pub fn init<G: Graphics + ?Sized>(
        config: GameConfig,
        source: Arc<dyn ChunkSource>,
        locks: LockPolicy,
        graphics: &mut G,
        viewport: (u32, u32),
    ) -> EngineResult<Self> {
        let mut streamer = WorldStreamer::new(config.streaming.clone(), Arc::clone(&source));
        if config.streaming.seed_initial_platforms {
            streamer.seed_initial_platforms(graphics)?;
        }

        let mut background = Background::new();
        background.init(graphics)?;

        let player = Player::load(config.player.clone(), graphics)?;

        let mut camera = Camera::new(viewport.0, viewport.1);
        camera.snap_to(player.position());

        log::info!(
            "[PlatformerGame::init] Player at {:?}, {} platforms",
            player.position(),
            streamer.len()
        );

        Ok(Self {
            config,
            world: Arc::new(SharedWorld::new(player, streamer, background)),
            source,
            locks,
            camera,
        })
    }

    /// Latch sampled keys into the player
    pub fn apply_input(&self, input: PlayerInput) -> bool {
        self.locks.run_under_lock(&self.world.player, |player| {
            player.apply_input(input);
            Ok(())
        })
    }

    /// Logic pass packaged for the logic worker
    pub fn logic_task(&self, dt: f32) -> impl FnOnce(&TaskContext) + Send + 'static {
        let world = Arc::clone(&self.world);
        let locks = self.locks.clone();
        move |context: &TaskContext| {
            let report = world.logic_pass(&locks, dt, || context.is_cancelled());
            if !report.all() {
                log::debug!("[PlatformerGame::logic_task] Partial pass: {:?}", report);
            }
        }
    }

    /// Logic pass on the calling thread
    pub fn logic_pass(&self, dt: f32) -> LogicReport {
        self.world.logic_pass(&self.locks, dt, || false)
    }

    /// Upload pending platforms and draw one frame: background, platforms,
    /// then the player. Render thread only.
    pub fn render<G, W>(&mut self, graphics: &mut G, window: &mut W) -> FrameReport
    where
        G: Graphics + ?Sized,
        W: Window + ?Sized,
    {
        let mut report = FrameReport::default();

        if window.is_resize() {
            let (width, height) = (window.width(), window.height());
            graphics.resize(width, height);
            self.camera.resize(width, height);
            window.set_resize(false);
        }

        self.locks.run_under_lock(&self.world.platforms, |streamer| {
            streamer.materialize_pending(&mut *graphics);
            streamer.release_retired(&mut *graphics);
            Ok(())
        });

        if let Some(position) = self.locks.read_under_lock(&self.world.player, Player::position) {
            self.camera.follow(position);
        }

        graphics.begin_frame();

        self.locks
            .read_under_lock(&self.world.background, |background| background.render(&mut *graphics));

        // Snapshot under the lock, draw outside it
        if let Some(snapshot) = self.locks.read_under_lock(&self.world.platforms, WorldStreamer::snapshot) {
            report.platforms_drawn = render_platforms(
                snapshot.platforms(),
                graphics,
                &self.camera,
                self.config.streaming.view_distance,
            );
        }

        if let Some(Some((model, frame, position))) =
            self.locks.read_under_lock(&self.world.player, Player::render_data)
        {
            if let Err(e) = graphics.set_model_texture(model, frame) {
                log::warn!("[PlatformerGame::render] Player frame not applied: {}", e);
            }
            graphics.render(model, position, Some(&self.camera));
            report.player_drawn = true;
        }

        match graphics.end_frame() {
            Ok(()) => report.presented = true,
            Err(e) => log::warn!("[PlatformerGame::render] Frame skipped: {}", e),
        }
        report
    }

    /// Stop generation and release all GPU resources this game created.
    /// Call after the logic worker has shut down.
    pub fn shutdown<G: Graphics + ?Sized>(&mut self, graphics: &mut G, grace: Duration) {
        self.source.shutdown();

        match self.world.platforms.try_write_for(grace) {
            Some(mut streamer) => streamer.cleanup(graphics),
            None => log::warn!("[PlatformerGame::shutdown] Platforms still locked, models leaked"),
        }
        match self.world.background.try_write_for(grace) {
            Some(mut background) => background.release(graphics),
            None => log::warn!("[PlatformerGame::shutdown] Background still locked, model leaked"),
        }
        match self.world.player.try_write_for(grace) {
            Some(mut player) => player.release(graphics),
            None => log::warn!("[PlatformerGame::shutdown] Player still locked, model leaked"),
        }
    }

    pub fn world(&self) -> &Arc<SharedWorld> {
        &self.world
    }

    pub fn locks(&self) -> &LockPolicy {
        &self.locks
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn player_position(&self) -> Option<Vec3> {
        self.locks.read_under_lock(&self.world.player, Player::position)
    }
}

/// Renderer calls made after the world releases everything
pub fn cleanup_graphics<G: Graphics + ?Sized>(graphics: &mut G) {
    Renderer::cleanup(graphics);
    AssetLoader::cleanup(graphics);
}
