pub mod aabb;

pub use aabb::{aabb_from_center_size, aabb_overlaps_x, aabb_size, AABB};

pub use glam::Vec3;

/// Resolved horizontal movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    Left = -1,
    #[default]
    None = 0,
    Right = 1,
}

impl Direction {
    /// Opposite inputs cancel out
    pub fn from_flags(left: bool, right: bool) -> Self {
        match (left, right) {
            (true, false) => Direction::Left,
            (false, true) => Direction::Right,
            _ => Direction::None,
        }
    }

    pub fn sign(self) -> f32 {
        self as i32 as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_flags_cancel() {
        assert_eq!(Direction::from_flags(true, true), Direction::None);
        assert_eq!(Direction::from_flags(false, false), Direction::None);
        assert_eq!(Direction::from_flags(true, false).sign(), -1.0);
        assert_eq!(Direction::from_flags(false, true).sign(), 1.0);
    }
}
