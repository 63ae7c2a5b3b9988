//! Fixed-timestep game loop
//!
//! The render thread owns the window and the graphics backend. Each frame
//! it samples input, hands one logic pass to the logic worker, waits for it
//! with a hard deadline and then renders whatever state the world is in.

mod timing;

pub use timing::{FixedTimestep, FpsCounter, FrameBudget, FrameSampler};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::GameConfig;
use crate::error::EngineResult;
use crate::game::{cleanup_graphics, PlatformerGame};
use crate::input::PlayerInput;
use crate::renderer::{Graphics, Window};
use crate::thread_pool::{ConcurrencyCoordinator, TaskState};
use crate::world::{ChunkGenerator, ChunkSource};

/// Idle sleep when no time slice was due
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Cloneable handle that ends the loop from anywhere
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// What a run did, returned by `GameLoop::run`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_rendered: u64,
    pub updates_run: u64,
    /// Logic passes that missed their deadline
    pub late_updates: u64,
    pub slow_frames: u64,
    pub skipped_sections: u64,
    pub last_fps: u32,
}

pub struct GameLoop<W: Window, G: Graphics> {
    window: W,
    graphics: G,
    config: GameConfig,
    coordinator: ConcurrencyCoordinator,
    game: PlatformerGame,
    stop: StopHandle,
    stats: LoopStats,
    shut_down: bool,
}

impl<W: Window, G: Graphics> GameLoop<W, G> {
    /// Build the loop with a background `ChunkGenerator`
    pub fn new(config: GameConfig, window: W, graphics: G) -> EngineResult<Self> {
        let generator = ChunkGenerator::new(config.generation.clone())?;
        Self::with_source(config, window, graphics, Arc::new(generator))
    }

    /// Build the loop around any chunk source
    pub fn with_source(
        config: GameConfig,
        window: W,
        mut graphics: G,
        source: Arc<dyn ChunkSource>,
    ) -> EngineResult<Self> {
        log::info!("[GameLoop::new] Initializing at {} updates/s", config.timing.target_ups);

        graphics.init()?;
        let coordinator = ConcurrencyCoordinator::new(&config.timing)?;

        let viewport = (window.width(), window.height());
        let game = match PlatformerGame::init(
            config.clone(),
            Arc::clone(&source),
            coordinator.locks().clone(),
            &mut graphics,
            viewport,
        ) {
            Ok(game) => game,
            Err(e) => {
                log::error!("[GameLoop::new] Game initialization failed: {}", e);
                coordinator.shutdown();
                source.shutdown();
                cleanup_graphics(&mut graphics);
                return Err(e);
            }
        };

        Ok(Self {
            window,
            graphics,
            config,
            coordinator,
            game,
            stop: StopHandle::new(),
            stats: LoopStats::default(),
            shut_down: false,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Run until stopped, the window closes or `max_frames` is reached,
    /// then shut everything down
    pub fn run(&mut self) -> LoopStats {
        let timing = self.config.timing.clone();
        let frame_budget_time = Duration::from_secs_f64(timing.frame_time());
        let mut timestep = FixedTimestep::new(timing.frame_time());
        let mut fps = FpsCounter::new();
        let mut diagnostics = FrameSampler::new(timing.diagnostics_interval_frames);
        let mut slow_reports = FrameSampler::new(timing.diagnostics_interval_frames);
        let mut budget = FrameBudget::new(frame_budget_time);

        let mut last_time = Instant::now();
        let mut last_logic = Instant::now();

        log::info!("[GameLoop::run] Starting");

        while self.stop.is_running() {
            let now = Instant::now();
            let passed = now.duration_since(last_time).as_secs_f64();
            last_time = now;
            timestep.accumulate(passed);
            fps.add_time(passed);

            let mut render_due = false;
            while timestep.consume() {
                render_due = true;

                if self.window.window_should_close() {
                    self.stop.stop();
                }

                if let Some(value) = fps.poll() {
                    self.stats.last_fps = value;
                    let title = format!("{} : {} FPS", self.config.window.title, value);
                    self.window.set_title(&title);
                }
            }

            if !render_due {
                std::thread::sleep(IDLE_SLEEP);
                continue;
            }

            budget.start_frame();
            let dt = last_logic.elapsed().as_secs_f32();
            last_logic = Instant::now();
            self.frame(dt, timing.logic_deadline());
            fps.frame();

            if budget.is_over_budget() {
                self.stats.slow_frames += 1;
                if slow_reports.tick() {
                    log::warn!(
                        "[GameLoop::run] Slow frame: {:.1}% of budget ({} slow so far)",
                        budget.usage_percentage(),
                        self.stats.slow_frames
                    );
                }
            }

            if diagnostics.tick() {
                log::info!(
                    "[GameLoop::run] frame {} fps {} updates {} late {} skipped sections {}",
                    self.stats.frames_rendered,
                    self.stats.last_fps,
                    self.stats.updates_run,
                    self.stats.late_updates,
                    self.coordinator.skipped_sections()
                );
            }

            if let Some(max) = timing.max_frames {
                if self.stats.frames_rendered >= max {
                    self.stop.stop();
                }
            }
        }

        self.shutdown();
        self.stats.skipped_sections = self.coordinator.skipped_sections();
        log::info!("[GameLoop::run] Stopped: {:?}", self.stats);
        self.stats
    }

    /// Input, one logic pass, one render pass, present
    fn frame(&mut self, dt: f32, logic_deadline: Duration) {
        let input = PlayerInput::sample(|key| self.window.is_key_pressed(key));
        self.game.apply_input(input);

        match self.coordinator.submit(self.game.logic_task(dt)) {
            Ok(handle) => match handle.wait(logic_deadline) {
                TaskState::Completed => self.stats.updates_run += 1,
                state => {
                    self.stats.late_updates += 1;
                    log::debug!("[GameLoop::frame] Logic pass not completed in time: {:?}", state);
                }
            },
            Err(e) => log::error!("[GameLoop::frame] Logic pass not submitted: {}", e),
        }

        self.game.render(&mut self.graphics, &mut self.window);
        self.window.update();
        self.stats.frames_rendered += 1;
    }

    /// Stop workers, then release GPU resources. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.stop.stop();

        self.coordinator.shutdown();
        self.game.shutdown(&mut self.graphics, self.config.timing.shutdown_grace());
        cleanup_graphics(&mut self.graphics);
        log::info!("[GameLoop::shutdown] Done");
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn game(&self) -> &PlatformerGame {
        &self.game
    }

    pub fn graphics(&self) -> &G {
        &self.graphics
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }

    pub fn coordinator(&self) -> &ConcurrencyCoordinator {
        &self.coordinator
    }
}

impl<W: Window, G: Graphics> Drop for GameLoop<W, G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::{BackendEvent, HeadlessGraphics, HeadlessWindow, ScriptedEvent};
    use crate::world::PlatformDescriptor;
    use glam::Vec3;

    /// Chunk source whose requests stall the logic pass that makes them
    struct StallingSource {
        stall: Duration,
    }

    impl ChunkSource for StallingSource {
        fn request_chunk(&self, _count: usize, _anchor: Vec3) {
            std::thread::sleep(self.stall);
        }

        fn poll_chunk(&self) -> Option<Vec<PlatformDescriptor>> {
            None
        }
    }

    fn fast_config(max_frames: u64) -> GameConfig {
        let mut config = GameConfig::default();
        config.timing.target_ups = 1000.0;
        config.timing.logic_deadline_ms = 200;
        config.timing.lock_deadline_ms = 50;
        config.timing.max_frames = Some(max_frames);
        config.generation.seed = Some(3);
        config
    }

    #[test]
    fn test_stops_after_max_frames_and_cleans_up_in_order() {
        let graphics = HeadlessGraphics::new("no-such-dir");
        let window = HeadlessWindow::new(1200, 800);
        let mut game_loop = GameLoop::new(fast_config(12), window, graphics).unwrap();

        let stats = game_loop.run();
        assert_eq!(stats.frames_rendered, 12);
        assert_eq!(game_loop.graphics().frames_presented(), 12);
        assert!(!game_loop.coordinator().is_running());

        let events = game_loop.graphics().events();
        assert_eq!(events.first(), Some(&BackendEvent::Init));
        let n = events.len();
        assert_eq!(events[n - 2], BackendEvent::RendererCleanup);
        assert_eq!(events[n - 1], BackendEvent::LoaderCleanup);
        assert!(events[..n - 2]
            .iter()
            .skip(1)
            .all(|e| matches!(e, BackendEvent::ModelReleased(_))));
        assert_eq!(game_loop.graphics().live_models(), 0);
    }

    #[test]
    fn test_late_logic_pass_is_abandoned_and_frames_keep_rendering() {
        let graphics = HeadlessGraphics::new("no-such-dir");
        let window = HeadlessWindow::new(1200, 800);
        let mut config = fast_config(10);
        config.timing.logic_deadline_ms = 5;
        let source = Arc::new(StallingSource {
            stall: Duration::from_millis(60),
        });

        let mut game_loop = GameLoop::with_source(config, window, graphics, source).unwrap();
        let stats = game_loop.run();

        assert_eq!(stats.frames_rendered, 10);
        assert!(stats.late_updates >= 1);
        assert_eq!(game_loop.graphics().frames_presented(), 10);
    }

    #[test]
    fn test_window_close_ends_loop() {
        let graphics = HeadlessGraphics::new("no-such-dir");
        let mut window = HeadlessWindow::new(1200, 800);
        window.schedule(3, ScriptedEvent::Close);
        let mut game_loop = GameLoop::new(fast_config(1000), window, graphics).unwrap();

        let stats = game_loop.run();
        assert!(stats.frames_rendered >= 3);
        assert!(stats.frames_rendered < 1000);
    }

    #[test]
    fn test_stop_handle_from_other_thread() {
        let graphics = HeadlessGraphics::new("no-such-dir");
        let window = HeadlessWindow::new(1200, 800);
        let mut config = fast_config(0);
        config.timing.max_frames = None;
        let mut game_loop = GameLoop::new(config, window, graphics).unwrap();

        let stop = game_loop.stop_handle();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stop.stop();
        });
        game_loop.run();
        stopper.join().unwrap();

        game_loop.shutdown();
        assert_eq!(
            game_loop
                .graphics()
                .events()
                .iter()
                .filter(|e| **e == BackendEvent::LoaderCleanup)
                .count(),
            1
        );
    }
}
