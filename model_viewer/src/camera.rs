//! Free-flying camera driven by WASD/QE

use nalgebra::{Matrix4, Point3, Vector3};
use render_core::render::UniformBufferObject;

/// Movement keys held during a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveKeys {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

/// Camera translating along a fixed viewing direction
#[derive(Debug, Clone, PartialEq)]
pub struct FlyCamera {
    pub position: Point3<f32>,
    front: Vector3<f32>,
    up: Vector3<f32>,
    /// Units per second
    pub speed: f32,
}

impl FlyCamera {
    pub fn new(position: Point3<f32>, speed: f32) -> Self {
        Self {
            position,
            front: -Vector3::z(),
            up: Vector3::y(),
            speed,
        }
    }

    /// Move for `dt` seconds with the given keys held
    pub fn update(&mut self, keys: MoveKeys, dt: f32) {
        let step = self.speed * dt;
        let right = self.front.cross(&self.up).normalize();

        if keys.forward {
            self.position += self.front * step;
        }
        if keys.back {
            self.position -= self.front * step;
        }
        if keys.left {
            self.position -= right * step;
        }
        if keys.right {
            self.position += right * step;
        }
        if keys.up {
            self.position += self.up * step;
        }
        if keys.down {
            self.position -= self.up * step;
        }
    }

    pub fn view(&self) -> Matrix4<f32> {
        UniformBufferObject::look_towards(&self.position, &self.front, &self.up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_moves_along_negative_z() {
        let mut camera = FlyCamera::new(Point3::new(0.0, 0.0, 3.0), 2.0);
        camera.update(
            MoveKeys {
                forward: true,
                ..MoveKeys::default()
            },
            0.5,
        );
        assert_relative_eq!(camera.position, Point3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn test_strafe_and_lift() {
        let mut camera = FlyCamera::new(Point3::origin(), 1.0);
        camera.update(
            MoveKeys {
                right: true,
                up: true,
                ..MoveKeys::default()
            },
            1.0,
        );
        assert_relative_eq!(camera.position, Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let mut camera = FlyCamera::new(Point3::new(1.0, 2.0, 3.0), 4.0);
        camera.update(
            MoveKeys {
                forward: true,
                back: true,
                left: true,
                right: true,
                ..MoveKeys::default()
            },
            0.25,
        );
        assert_relative_eq!(camera.position, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_view_centers_camera() {
        let camera = FlyCamera::new(Point3::new(0.0, 0.0, 3.0), 1.0);
        let eye = camera.view().transform_point(&camera.position);
        assert_relative_eq!(eye, Point3::origin(), epsilon = 1e-6);
    }
}
