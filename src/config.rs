//! Game configuration
//!
//! All tunables live here so that the collision tolerance, search radius
//! and generation ranges can be adjusted without touching code. The file
//! format is TOML; every field has a default, so a partial file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Default config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "skyrunner.toml";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GameConfig {
    pub window: WindowConfig,
    pub timing: TimingConfig,
    pub player: PlayerConfig,
    pub generation: GenerationConfig,
    pub streaming: StreamingConfig,
    pub assets: AssetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Proto(2)".to_string(),
            width: 1200,
            height: 800,
            vsync: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Logic updates per second
    pub target_ups: f64,
    /// Hard deadline for one logic pass
    pub logic_deadline_ms: u64,
    /// Bounded wait for any subsystem lock
    pub lock_deadline_ms: u64,
    /// How long shutdown waits for in-flight work
    pub shutdown_grace_ms: u64,
    /// Sampled diagnostics are logged every N frames
    pub diagnostics_interval_frames: u64,
    /// Stop after this many rendered frames
    pub max_frames: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            target_ups: 60.0,
            logic_deadline_ms: 16,
            lock_deadline_ms: 16,
            shutdown_grace_ms: 2000,
            diagnostics_interval_frames: 300,
            max_frames: None,
        }
    }
}

impl TimingConfig {
    pub fn frame_time(&self) -> f64 {
        1.0 / self.target_ups
    }

    pub fn logic_deadline(&self) -> Duration {
        Duration::from_millis(self.logic_deadline_ms)
    }

    pub fn lock_deadline(&self) -> Duration {
        Duration::from_millis(self.lock_deadline_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Player physics, in world units per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub move_speed: f32,
    pub jump_strength: f32,
    /// Negative acceleration added to `velocity.y` each airborne tick
    pub gravity: f32,
    pub ground_level: f32,
    /// Full extents of the player's collision box
    pub size: Vec3,
    pub world_min_x: f32,
    pub world_max_x: f32,
    /// Max distance between the feet and a platform top that still lands
    pub landing_tolerance: f32,
    pub spawn_x: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            move_speed: 0.01,
            jump_strength: 0.05,
            gravity: -0.0025,
            ground_level: -0.4,
            size: Vec3::new(0.2, 0.3, 0.1),
            world_min_x: -1.0,
            world_max_x: 10_000.0,
            landing_tolerance: 0.15,
            spawn_x: 0.0,
        }
    }
}

impl PlayerConfig {
    pub fn half_height(&self) -> f32 {
        self.size.y * 0.5
    }
}

/// Procedural platform ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub min_width: f32,
    pub max_width: f32,
    pub platform_height: f32,
    pub platform_depth: f32,
    pub min_jump_distance: f32,
    pub max_jump_distance: f32,
    /// Signed vertical step range between consecutive platforms
    pub min_jump_height: f32,
    pub max_jump_height: f32,
    /// Probability that a platform steps backwards
    pub backtrack_chance: f32,
    pub world_min_y: f32,
    pub world_max_y: f32,
    /// Fixed seed for reproducible worlds
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_width: 0.3,
            max_width: 0.8,
            platform_height: 0.05,
            platform_depth: 0.1,
            min_jump_distance: 0.4,
            max_jump_distance: 0.7,
            min_jump_height: -0.1,
            max_jump_height: 0.2,
            backtrack_chance: 0.2,
            world_min_y: -1.0,
            world_max_y: 1.0,
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Replace non-finite values with defaults, reorder inverted ranges
    /// and clamp probabilities
    pub fn normalized(mut self) -> Self {
        fn finite_or(value: &mut f32, fallback: f32) {
            if !value.is_finite() {
                *value = fallback;
            }
        }
        fn order(a: &mut f32, b: &mut f32) {
            if *a > *b {
                std::mem::swap(a, b);
            }
        }

        let defaults = Self::default();
        finite_or(&mut self.min_width, defaults.min_width);
        finite_or(&mut self.max_width, defaults.max_width);
        finite_or(&mut self.platform_height, defaults.platform_height);
        finite_or(&mut self.platform_depth, defaults.platform_depth);
        finite_or(&mut self.min_jump_distance, defaults.min_jump_distance);
        finite_or(&mut self.max_jump_distance, defaults.max_jump_distance);
        finite_or(&mut self.min_jump_height, defaults.min_jump_height);
        finite_or(&mut self.max_jump_height, defaults.max_jump_height);
        finite_or(&mut self.backtrack_chance, defaults.backtrack_chance);
        finite_or(&mut self.world_min_y, defaults.world_min_y);
        finite_or(&mut self.world_max_y, defaults.world_max_y);

        order(&mut self.min_width, &mut self.max_width);
        order(&mut self.min_jump_distance, &mut self.max_jump_distance);
        order(&mut self.min_jump_height, &mut self.max_jump_height);
        order(&mut self.world_min_y, &mut self.world_max_y);
        self.min_jump_distance = self.min_jump_distance.max(0.0);
        self.backtrack_chance = self.backtrack_chance.clamp(0.0, 1.0);
        self
    }
}

/// World streaming thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Generate when the player is this close to the high-water mark
    pub generation_distance: f32,
    /// Platforms per generated chunk
    pub chunk_size: usize,
    pub anchor_offset_x: f32,
    pub anchor_y: f32,
    /// Platforms farther than this (horizontally) are evicted
    pub cleanup_distance: f32,
    /// Max vertical distance for the platform-below query
    pub search_radius: f32,
    /// Horizontal half-width around the camera that gets drawn
    pub view_distance: f32,
    pub seed_initial_platforms: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            generation_distance: 10.0,
            chunk_size: 5,
            anchor_offset_x: 1.0,
            anchor_y: -0.2,
            cleanup_distance: 20.0,
            search_radius: 1.0,
            view_distance: 12.0,
            seed_initial_platforms: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub assets_dir: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
        }
    }
}

impl AssetConfig {
    pub fn textures_dir(&self) -> PathBuf {
        self.assets_dir.join("textures")
    }
}

impl GameConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str, origin: &Path) -> EngineResult<Self> {
        let config: GameConfig = toml::from_str(source).map_err(|e| EngineError::Config {
            path: origin.to_path_buf(),
            error: e.to_string(),
        })?;
        Ok(config.normalized())
    }

    /// Load a config file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&source, path)
    }

    /// Load the file if it exists; fall back to defaults otherwise
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::info!("[GameConfig::load_or_default] {} not found, using defaults", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                log::info!("[GameConfig::load_or_default] Loaded {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("[GameConfig::load_or_default] {}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config {
            path: PathBuf::from(CONFIG_FILE_NAME),
            error: e.to_string(),
        })
    }

    fn normalized(mut self) -> Self {
        self.generation = self.generation.normalized();
        self.streaming.chunk_size = self.streaming.chunk_size.max(1);
        if !self.timing.target_ups.is_finite() || self.timing.target_ups <= 0.0 {
            self.timing.target_ups = TimingConfig::default().target_ups;
        }
        self
    }
}
