//! Skyrunner: an endless-runner platformer
//!
//! Game logic runs on a dedicated worker while a single render thread owns
//! the window and all GPU resources. Platforms are generated on a third
//! thread and streamed in as the player advances.

pub mod animation;
pub mod camera;
pub mod config;
pub mod engine;
pub mod error;
pub mod game;
pub mod input;
pub mod physics;
pub mod player;
pub mod renderer;
pub mod thread_pool;
pub mod world;

pub use camera::Camera;
pub use config::{GameConfig, CONFIG_FILE_NAME};
pub use engine::{GameLoop, LoopStats, StopHandle};
pub use error::{EngineError, EngineResult};
pub use game::{PlatformerGame, SharedWorld};
pub use input::KeyCode;
pub use physics::{Direction, AABB};
pub use player::{Player, PlayerState};
pub use renderer::{AssetLoader, Graphics, ModelHandle, Renderer, TextureHandle, Window};
pub use thread_pool::{ConcurrencyCoordinator, LockId, TaskState};
pub use world::{ChunkGenerator, ChunkSource, Platform, PlatformDescriptor, PlatformKind, WorldStreamer};

use renderer::headless::{HeadlessGraphics, HeadlessWindow};

/// Run the simulation without a GPU until `max_frames` (or forever)
pub fn run_headless(config: GameConfig) -> EngineResult<LoopStats> {
    let graphics = HeadlessGraphics::new(config.assets.textures_dir());
    let window = HeadlessWindow::new(config.window.width, config.window.height);
    let mut game_loop = GameLoop::new(config, window, graphics)?;
    Ok(game_loop.run())
}
