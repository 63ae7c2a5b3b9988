/// Follow camera
///
/// Trails a target at a fixed offset, easing toward it each frame. Owned by
/// the render thread; the logic pass never touches it.

use glam::{Mat4, Vec3};

pub const DEFAULT_OFFSET: Vec3 = Vec3::new(0.0, 1.0, 5.0);
pub const DEFAULT_SMOOTHING: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Vec3,
    target: Vec3,
    offset: Vec3,
    smoothing: f32,
    fovy_degrees: f32,
    aspect: f32,
    znear: f32,
    zfar: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            offset: DEFAULT_OFFSET,
            smoothing: DEFAULT_SMOOTHING,
            fovy_degrees: 45.0,
            aspect: aspect_ratio(width, height),
            znear: 0.1,
            zfar: 100.0,
        }
    }

    /// Ease toward `target + offset`, looking at an eased `target`
    pub fn follow(&mut self, target: Vec3) {
        let desired = target + self.offset;
        self.position = self.position.lerp(desired, self.smoothing);
        self.target = self.target.lerp(target, self.smoothing);
    }

    /// Jump straight to the follow position
    pub fn snap_to(&mut self, target: Vec3) {
        self.position = target + self.offset;
        self.target = target;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect = aspect_ratio(width, height);
    }

    pub fn set_offset(&mut self, offset: Vec3) {
        self.offset = offset;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn build_view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn build_projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy_degrees.to_radians(), self.aspect, self.znear, self.zfar)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.build_projection_matrix() * self.build_view_matrix()
    }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
    width.max(1) as f32 / height.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_converges_on_offset_position() {
        let mut camera = Camera::new(1200, 800);
        let target = Vec3::new(3.0, 0.5, 0.0);
        for _ in 0..200 {
            camera.follow(target);
        }
        assert!((camera.position() - (target + DEFAULT_OFFSET)).length() < 1e-3);
        assert!((camera.target() - target).length() < 1e-3);
    }

    #[test]
    fn test_follow_moves_a_fraction_per_frame() {
        let mut camera = Camera::new(100, 100);
        camera.snap_to(Vec3::ZERO);
        camera.follow(Vec3::new(1.0, 0.0, 0.0));
        assert!((camera.position().x - DEFAULT_SMOOTHING).abs() < 1e-6);
    }

    #[test]
    fn test_zero_sized_resize_keeps_aspect() {
        let mut camera = Camera::new(1200, 800);
        camera.resize(0, 600);
        assert!((camera.aspect() - 1.5).abs() < 1e-6);
        camera.resize(800, 800);
        assert_eq!(camera.aspect(), 1.0);
    }

    #[test]
    fn test_target_projects_to_screen_center() {
        let mut camera = Camera::new(800, 600);
        let target = Vec3::new(2.0, 0.0, 0.0);
        camera.snap_to(target);
        let clip = camera.view_projection() * target.extend(1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
    }
}
