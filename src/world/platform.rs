use std::path::PathBuf;
use std::sync::Arc;

use glam::Vec3;

use crate::physics::{aabb_from_center_size, aabb_overlaps_x, AABB};
use crate::renderer::ModelHandle;

/// Smallest width/height a platform can have
pub const MIN_PLATFORM_EXTENT: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    Grass,
    Stone,
    Wood,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 3] = [PlatformKind::Grass, PlatformKind::Stone, PlatformKind::Wood];

    pub fn name(self) -> &'static str {
        match self {
            PlatformKind::Grass => "grass",
            PlatformKind::Stone => "stone",
            PlatformKind::Wood => "wood",
        }
    }

    /// Kind-specific texture, then the generic one
    pub fn texture_candidates(self) -> [PathBuf; 2] {
        [
            PathBuf::from(format!("platform_{}.png", self.name())),
            PathBuf::from("platform.png"),
        ]
    }
}

/// Platform produced by generation, before it has GPU resources
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformDescriptor {
    pub position: Vec3,
    pub size: Vec3,
    pub kind: PlatformKind,
}

impl PlatformDescriptor {
    /// Width and height are raised to `MIN_PLATFORM_EXTENT`
    pub fn new(position: Vec3, size: Vec3, kind: PlatformKind) -> Self {
        Self {
            position,
            size: Vec3::new(
                size.x.max(MIN_PLATFORM_EXTENT),
                size.y.max(MIN_PLATFORM_EXTENT),
                size.z.max(0.0),
            ),
            kind,
        }
    }
}

/// A live platform with its uploaded model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Platform {
    pub position: Vec3,
    pub size: Vec3,
    pub kind: PlatformKind,
    pub model: ModelHandle,
}

impl Platform {
    pub fn from_descriptor(descriptor: &PlatformDescriptor, model: ModelHandle) -> Self {
        Self {
            position: descriptor.position,
            size: descriptor.size,
            kind: descriptor.kind,
            model,
        }
    }

    pub fn aabb(&self) -> AABB {
        aabb_from_center_size(self.position, self.size)
    }

    pub fn top(&self) -> f32 {
        self.position.y + self.size.y * 0.5
    }
}

/// Spatial lookup used by player collision
pub trait PlatformQuery {
    /// Nearest platform under a body centered at `position` with `size`
    fn find_platform_below(&self, position: Vec3, size: Vec3) -> Option<Platform>;
}

/// Closest platform strictly below `position` that overlaps the body
/// horizontally and lies within `search_radius`. Ties go to the first one.
pub fn find_platform_below<'a>(
    platforms: &'a [Platform],
    position: Vec3,
    size: Vec3,
    search_radius: f32,
) -> Option<&'a Platform> {
    let body = aabb_from_center_size(position, size);
    let mut closest: Option<(&Platform, f32)> = None;

    for platform in platforms {
        if !aabb_overlaps_x(&body, &platform.aabb()) || platform.position.y >= position.y {
            continue;
        }

        let distance = position.y - platform.position.y;
        if distance >= search_radius {
            continue;
        }

        match closest {
            Some((_, best)) if best <= distance => {}
            _ => closest = Some((platform, distance)),
        }
    }

    closest.map(|(platform, _)| platform)
}

/// Immutable view of the live platforms taken at one instant
#[derive(Debug, Clone)]
pub struct PlatformSnapshot {
    platforms: Arc<Vec<Platform>>,
    search_radius: f32,
}

impl PlatformSnapshot {
    pub fn new(platforms: Arc<Vec<Platform>>, search_radius: f32) -> Self {
        Self {
            platforms,
            search_radius,
        }
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
}

impl PlatformQuery for PlatformSnapshot {
    fn find_platform_below(&self, position: Vec3, size: Vec3) -> Option<Platform> {
        find_platform_below(&self.platforms, position, size, self.search_radius).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(x: f32, y: f32, width: f32) -> Platform {
        Platform::from_descriptor(
            &PlatformDescriptor::new(Vec3::new(x, y, 0.0), Vec3::new(width, 0.3, 0.1), PlatformKind::Stone),
            ModelHandle(0),
        )
    }

    const PLAYER: Vec3 = Vec3::new(0.2, 0.3, 0.1);

    #[test]
    fn test_descriptor_clamps_degenerate_size() {
        let d = PlatformDescriptor::new(Vec3::ZERO, Vec3::new(-1.0, 0.0, 0.1), PlatformKind::Grass);
        assert!(d.size.x > 0.0 && d.size.y > 0.0);
    }

    #[test]
    fn test_picks_nearest_platform_below() {
        let platforms = vec![platform(0.0, -0.8, 2.0), platform(0.0, -0.2, 2.0), platform(0.0, 0.5, 2.0)];
        let found = find_platform_below(&platforms, Vec3::new(0.0, 0.2, 0.0), PLAYER, 1.0).unwrap();
        assert_eq!(found.position.y, -0.2);
    }

    #[test]
    fn test_ignores_platforms_without_horizontal_overlap() {
        let platforms = vec![platform(3.0, 0.0, 1.0)];
        assert!(find_platform_below(&platforms, Vec3::new(0.0, 0.5, 0.0), PLAYER, 1.0).is_none());
    }

    #[test]
    fn test_respects_search_radius() {
        let platforms = vec![platform(0.0, -1.5, 2.0)];
        assert!(find_platform_below(&platforms, Vec3::new(0.0, 0.0, 0.0), PLAYER, 1.0).is_none());
        assert!(find_platform_below(&platforms, Vec3::new(0.0, 0.0, 0.0), PLAYER, 2.0).is_some());
    }

    #[test]
    fn test_first_found_wins_ties() {
        let mut first = platform(-0.3, 0.0, 1.0);
        first.kind = PlatformKind::Wood;
        let platforms = vec![first, platform(0.3, 0.0, 1.0)];
        let snapshot = PlatformSnapshot::new(Arc::new(platforms), 1.0);
        let found = snapshot.find_platform_below(Vec3::new(0.0, 0.5, 0.0), PLAYER).unwrap();
        assert_eq!(found.kind, PlatformKind::Wood);
    }

    #[test]
    fn test_kind_texture_falls_back_to_generic() {
        let candidates = PlatformKind::Grass.texture_candidates();
        assert_eq!(candidates[0], PathBuf::from("platform_grass.png"));
        assert_eq!(candidates[1], PathBuf::from("platform.png"));
    }
}
