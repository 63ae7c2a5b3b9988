use std::collections::HashSet;

use winit::event::ElementState;
pub use winit::keyboard::KeyCode;

use crate::physics::Direction;

/// Held-key set fed by window events
#[derive(Debug, Default, Clone)]
pub struct InputState {
    keys_pressed: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_key(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.keys_pressed.insert(key);
            }
            ElementState::Released => {
                self.keys_pressed.remove(&key);
            }
        }
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Forget held keys, e.g. when focus is lost
    pub fn clear(&mut self) {
        self.keys_pressed.clear();
    }
}

/// Player controls sampled once per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerInput {
    pub jump: bool,
    pub left: bool,
    pub right: bool,
}

impl PlayerInput {
    /// W or Space jumps, A and D move
    pub fn sample(is_pressed: impl Fn(KeyCode) -> bool) -> Self {
        Self {
            jump: is_pressed(KeyCode::KeyW) || is_pressed(KeyCode::Space),
            left: is_pressed(KeyCode::KeyA),
            right: is_pressed(KeyCode::KeyD),
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::from_flags(self.left, self.right)
    }
}
