//! Player entity
//!
//! Physics runs as compute-then-commit: `integrate` derives the next
//! `PlayerState` from a copy of the current one, and `Player::update`
//! commits it with a single assignment. A failure halfway through a tick
//! can never leave a half-updated player behind.

use glam::Vec3;

use crate::animation::{AnimationSet, AnimationState};
use crate::config::PlayerConfig;
use crate::error::EngineResult;
use crate::input::PlayerInput;
use crate::physics::Direction;
use crate::renderer::{load_quad_model, AssetLoader, ModelHandle, TextureHandle};
use crate::world::PlatformQuery;

/// Player sprites sit slightly in front of platforms
const PLAYER_DEPTH: f32 = 0.1;

/// Complete mutable state of the player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub on_ground: bool,
    pub moving_left: bool,
    pub moving_right: bool,
    pub effective_direction: Direction,
    pub animation: AnimationState,
    /// Latched by input, consumed by the next `integrate`
    pub jump_requested: bool,
}

impl PlayerState {
    /// Standing on the ground plane at `x`
    pub fn spawn(settings: &PlayerConfig) -> Self {
        Self {
            position: Vec3::new(settings.spawn_x, settings.ground_level, 0.0),
            velocity: Vec3::ZERO,
            on_ground: true,
            moving_left: false,
            moving_right: false,
            effective_direction: Direction::None,
            animation: AnimationState::Idle,
            jump_requested: false,
        }
    }
}

/// Advance `state` by one tick of physics
pub fn integrate<Q: PlatformQuery + ?Sized>(state: &PlayerState, settings: &PlayerConfig, platforms: &Q) -> PlayerState {
    let mut next = *state;

    next.jump_requested = false;
    if state.jump_requested && state.on_ground {
        next.velocity.y = settings.jump_strength;
        next.on_ground = false;
    }

    next.effective_direction = Direction::from_flags(state.moving_left, state.moving_right);
    if !next.on_ground {
        next.velocity.y += settings.gravity;
    }
    next.velocity.x = next.effective_direction.sign() * settings.move_speed;

    let candidate = next.position + next.velocity;
    let half_height = settings.half_height();

    let landing = if next.velocity.y <= 0.0 {
        platforms
            .find_platform_below(candidate, settings.size)
            .map(|platform| platform.top())
            .filter(|top| (candidate.y - half_height - top).abs() <= settings.landing_tolerance)
    } else {
        None
    };

    match landing {
        Some(top) => {
            next.position = Vec3::new(candidate.x, top + half_height, candidate.z);
            next.velocity.y = 0.0;
            next.on_ground = true;
        }
        None => {
            next.position = candidate;
            if next.position.y <= settings.ground_level {
                next.position.y = settings.ground_level;
                next.velocity.y = 0.0;
                next.on_ground = true;
            } else {
                next.on_ground = false;
            }
        }
    }

    next.position.x = next.position.x.clamp(settings.world_min_x, settings.world_max_x);
    next
}

pub struct Player {
    state: PlayerState,
    settings: PlayerConfig,
    animations: AnimationSet,
    model: Option<ModelHandle>,
}

impl Player {
    pub fn new(settings: PlayerConfig, animations: AnimationSet) -> Self {
        Self {
            state: PlayerState::spawn(&settings),
            settings,
            animations,
            model: None,
        }
    }

    /// Upload the sprite quad and every animation frame. Render thread only.
    pub fn load<L: AssetLoader + ?Sized>(settings: PlayerConfig, loader: &mut L) -> EngineResult<Self> {
        let model = load_quad_model(loader, settings.size, PLAYER_DEPTH)?;
        let animations = AnimationSet::load(loader);
        loader.set_model_texture(model, animations.current_frame())?;

        let mut player = Self::new(settings, animations);
        player.model = Some(model);
        log::info!("[Player::load] Player ready at {:?}", player.state.position);
        Ok(player)
    }

    /// Request a jump for the next physics tick. Only works while grounded.
    pub fn jump(&mut self) -> bool {
        if self.state.on_ground {
            self.state.jump_requested = true;
        }
        self.state.on_ground
    }

    pub fn move_left(&mut self, pressed: bool) {
        self.state.moving_left = pressed;
    }

    pub fn move_right(&mut self, pressed: bool) {
        self.state.moving_right = pressed;
    }

    /// Latch one frame of input
    pub fn apply_input(&mut self, input: PlayerInput) {
        self.move_left(input.left);
        self.move_right(input.right);
        if input.jump {
            self.jump();
        }
    }

    /// One physics tick, then animation by `dt` seconds of frame time
    pub fn update<Q: PlatformQuery + ?Sized>(&mut self, dt: f32, platforms: &Q) {
        let mut next = integrate(&self.state, &self.settings, platforms);

        let changed = next.position != self.state.position
            || next.on_ground != self.state.on_ground
            || next.effective_direction != self.state.effective_direction;
        if changed {
            next.animation = AnimationState::select(next.on_ground, next.effective_direction);
        }

        self.state = next;
        if self.animations.transition(self.state.animation) {
            log::debug!(
                "[Player::update] Animation {:?} (direction {:?})",
                self.state.animation,
                self.state.effective_direction
            );
        }
        self.animations.update(dt);
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn position(&self) -> Vec3 {
        self.state.position
    }

    pub fn size(&self) -> Vec3 {
        self.settings.size
    }

    pub fn settings(&self) -> &PlayerConfig {
        &self.settings
    }

    pub fn animations(&self) -> &AnimationSet {
        &self.animations
    }

    pub fn current_frame(&self) -> TextureHandle {
        self.animations.current_frame()
    }

    pub fn model(&self) -> Option<ModelHandle> {
        self.model
    }

    /// Everything the render thread needs for one draw
    pub fn render_data(&self) -> Option<(ModelHandle, TextureHandle, Vec3)> {
        self.model
            .map(|model| (model, self.current_frame(), self.state.position))
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
    use crate::renderer::ModelHandle;
    use crate::world::{find_platform_below, Platform, PlatformDescriptor, PlatformKind};

    struct NoPlatforms;

    impl PlatformQuery for NoPlatforms {
        fn find_platform_below(&self, _position: Vec3, _size: Vec3) -> Option<Platform> {
            None
        }
    }

    struct Platforms(Vec<Platform>, f32);

    impl PlatformQuery for Platforms {
        fn find_platform_below(&self, position: Vec3, size: Vec3) -> Option<Platform> {
            find_platform_below(&self.0, position, size, self.1).copied()
        }
    }

    fn player() -> Player {
        Player::new(PlayerConfig::default(), AnimationSet::uniform(TextureHandle(0)))
    }

    fn landing_platform() -> Platforms {
        let platform = Platform::from_descriptor(
            &PlatformDescriptor::new(Vec3::new(5.0, 0.0, 0.0), Vec3::new(2.0, 0.3, 0.1), PlatformKind::Wood),
            ModelHandle(1),
        );
        Platforms(vec![platform], 1.0)
    }

    #[test]
    fn test_jump_returns_to_ground() {
        let mut player = player();
        let settings = PlayerConfig::default();

        assert!(player.jump());
        assert_eq!(player.state().velocity, Vec3::ZERO);
        assert!(player.state().jump_requested);

        player.update(1.0 / 60.0, &NoPlatforms);
        let airborne = player.state();
        assert!((airborne.velocity.y - (settings.jump_strength + settings.gravity)).abs() < 1e-6);
        assert!(!airborne.on_ground);
        assert!(!airborne.jump_requested);
        assert!(!player.jump());

        let mut left_ground = false;
        for _ in 0..200 {
            player.update(1.0 / 60.0, &NoPlatforms);
            left_ground |= player.position().y > settings.ground_level;
        }

        let state = player.state();
        assert!(left_ground);
        assert_eq!(state.position.y, settings.ground_level);
        assert_eq!(state.velocity.y, 0.0);
        assert!(state.on_ground);
    }

    #[test]
    fn test_lands_on_platform_while_descending() {
        let platforms = landing_platform();
        let settings = PlayerConfig::default();
        let half = settings.half_height();

        let mut player = player();
        player.state.position = Vec3::new(5.0, 0.7, 0.0);
        player.state.velocity = Vec3::new(0.0, -0.01, 0.0);
        player.state.on_ground = false;

        let found = platforms.find_platform_below(player.position(), settings.size).unwrap();
        assert_eq!(found.position, Vec3::new(5.0, 0.0, 0.0));

        for _ in 0..200 {
            player.update(1.0 / 60.0, &platforms);
            if player.state().on_ground {
                break;
            }
        }

        let state = player.state();
        assert!(state.on_ground);
        assert_eq!(state.velocity.y, 0.0);
        assert!((state.position.y - (0.0 + 0.15 + half)).abs() < 1e-5);
    }

    #[test]
    fn test_ascending_player_passes_through_platforms() {
        let platforms = landing_platform();
        let mut player = player();
        player.state.position = Vec3::new(5.0, 0.25, 0.0);
        player.state.velocity = Vec3::new(0.0, 0.04, 0.0);
        player.state.on_ground = false;

        player.update(1.0 / 60.0, &platforms);
        assert!(!player.state().on_ground);
        assert!(player.position().y > 0.25);
    }

    #[test]
    fn test_grounded_implies_zero_vertical_velocity() {
        let platforms = landing_platform();
        let mut player = player();
        player.state.position.x = 3.0;

        for tick in 0..2_000 {
            let input = PlayerInput {
                jump: tick % 45 == 0,
                left: tick % 300 > 220,
                right: tick % 300 < 180,
            };
            player.apply_input(input);
            player.update(1.0 / 60.0, &platforms);

            let state = player.state();
            if state.on_ground {
                assert_eq!(state.velocity.y, 0.0);
            }
        }
    }

    #[test]
    fn test_opposite_inputs_keep_player_still() {
        let mut player = player();
        player.move_left(true);
        player.move_right(true);
        let start = player.position();

        for _ in 0..60 {
            player.update(1.0 / 60.0, &NoPlatforms);
            assert_eq!(player.state().effective_direction, Direction::None);
        }
        assert_eq!(player.position(), start);
        assert_eq!(player.animations().current_state(), AnimationState::Idle);
    }

    #[test]
    fn test_walking_selects_walk_clip_and_back_to_idle() {
        let mut player = player();
        player.move_right(true);
        player.update(1.0 / 60.0, &NoPlatforms);
        assert_eq!(player.animations().current_state(), AnimationState::WalkRight);
        assert!(player.position().x > 0.0);

        // Pressing both stops the walk even though nothing moves
        player.move_left(true);
        player.update(1.0 / 60.0, &NoPlatforms);
        assert_eq!(player.animations().current_state(), AnimationState::Idle);
    }

    #[test]
    fn test_horizontal_position_is_clamped() {
        let mut player = player();
        player.move_left(true);
        for _ in 0..500 {
            player.update(1.0 / 60.0, &NoPlatforms);
        }
        assert_eq!(player.position().x, PlayerConfig::default().world_min_x);
    }

    #[test]
    fn test_input_only_latches_jump_until_next_tick() {
        let mut player = player();
        let before = player.state();
        player.apply_input(PlayerInput {
            jump: true,
            left: false,
            right: false,
        });

        let latched = player.state();
        assert!(latched.jump_requested);
        assert_eq!(latched.velocity, before.velocity);
        assert_eq!(latched.on_ground, before.on_ground);

        let next = integrate(&latched, player.settings(), &NoPlatforms);
        assert!(!next.jump_requested);
        assert!(!next.on_ground);
        assert!(next.position.y > before.position.y);
    }

    #[test]
    fn test_jump_animation_follows_direction() {
        let mut player = player();
        player.move_left(true);
        player.jump();
        player.update(1.0 / 60.0, &NoPlatforms);
        assert_eq!(player.animations().current_state(), AnimationState::JumpLeft);
    }
}
