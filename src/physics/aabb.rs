/// Axis-Aligned Bounding Box helpers
///
/// Boxes are stored as min/max corners; entities describe themselves as a
/// center position plus full size, so callers go through
/// `aabb_from_center_size`.

use glam::Vec3;

/// Axis-Aligned Bounding Box - pure data structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3,
}

/// Create AABB from a center point and full size
/// Negative size components are treated as zero
pub fn aabb_from_center_size(center: Vec3, size: Vec3) -> AABB {
    let half = size.max(Vec3::ZERO) * 0.5;
    AABB {
        min: center - half,
        max: center + half,
    }
}

/// Full size of the box
pub fn aabb_size(aabb: &AABB) -> Vec3 {
    aabb.max - aabb.min
}

/// Strict overlap on the x axis (touching edges do not overlap)
pub fn aabb_overlaps_x(a: &AABB, b: &AABB) -> bool {
    a.max.x > b.min.x && a.min.x < b.max.x
}
