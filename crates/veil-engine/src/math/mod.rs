//! Small 4×4 matrix and camera library.
//!
//! Everything here is `f64` and column-major. None of it is wired into the
//! render passes yet; the camera only produces a view-projection matrix.

mod camera;
mod matrix;

pub use camera::Camera;
pub use matrix::Mat4;

/// Three-component vector used for control input and camera angles.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MathError {
    #[error("matrix has a zero determinant and no inverse")]
    SingularMatrix,

    #[error("rotation axis has zero length")]
    ZeroAxis,
}
