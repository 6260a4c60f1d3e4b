use std::f64::consts::PI;

use super::{Mat4, MathError, Vec3};

/// Perspective camera producing a view-projection matrix.
#[derive(Debug, Clone)]
pub struct Camera {
    fov: f64,
    aspect_ratio: f64,
    near: f64,
    far: f64,

    perspective: Mat4,
    camera_matrix: Mat4,
    view_matrix: Mat4,
    view_projection: Mat4,
}

impl Camera {
    /// `fov` is the vertical field of view in radians.
    pub fn new(fov: f64, aspect_ratio: f64, near: f64, far: f64) -> Self {
        let mut camera = Self {
            fov,
            aspect_ratio,
            near,
            far,
            perspective: Mat4::identity(),
            camera_matrix: Mat4::identity(),
            view_matrix: Mat4::identity(),
            view_projection: Mat4::identity(),
        };
        camera.set_perspective();
        camera
    }

    pub fn fov(&self) -> f64 {
        self.fov
    }

    pub fn set_fov(&mut self, fov: f64) {
        self.fov = fov;
        self.set_perspective();
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f64) {
        self.aspect_ratio = aspect_ratio;
        self.set_perspective();
    }

    /// Rebuilds the symmetric perspective projection.
    pub fn set_perspective(&mut self) {
        let f = (PI * 0.5 - self.fov * 0.5).tan();
        let range_inv = 1.0 / (self.near - self.far);

        self.perspective.set_from_elements(&[
            f / self.aspect_ratio,
            0.0,
            0.0,
            0.0,
            0.0,
            f,
            0.0,
            0.0,
            0.0,
            0.0,
            (self.near + self.far) * range_inv,
            -1.0,
            0.0,
            0.0,
            self.near * self.far * range_inv * 2.0,
            0.0,
        ]);
    }

    /// Places the camera at `(0, height, forward)`, pitches it by
    /// `rotation.x` degrees, then yaws it by `rotation.y` degrees about the
    /// pitched up axis `(0, cos(pitch), sin(pitch))`.
    ///
    /// `rotation.z` (roll) is accepted but not applied.
    pub fn update_camera(
        &mut self,
        height: f64,
        forward: f64,
        rotation: Vec3,
    ) -> Result<(), MathError> {
        let pitch = f64::from(rotation.x).to_radians();
        let yaw = f64::from(rotation.y).to_radians();

        self.set_perspective();

        self.camera_matrix.set_identity();
        self.camera_matrix.translate(0.0, height, forward);
        self.camera_matrix.rotation_x(pitch);
        self.camera_matrix
            .rotation(yaw, [0.0, pitch.cos(), pitch.sin()])?;

        self.view_matrix = self.camera_matrix.inverse()?;

        self.view_projection = self.perspective;
        self.view_projection.multiply(&self.view_matrix);

        Ok(())
    }

    pub fn perspective(&self) -> &Mat4 {
        &self.perspective
    }

    pub fn camera_matrix(&self) -> &Mat4 {
        &self.camera_matrix
    }

    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    pub fn view_projection(&self) -> &Mat4 {
        &self.view_projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: &Mat4, b: &Mat4) -> bool {
        a.elements()
            .iter()
            .zip(b.elements().iter())
            .all(|(x, y)| (x - y).abs() < EPS)
    }

    #[test]
    fn perspective_uses_cotangent_of_half_fov() {
        let cam = Camera::new(PI / 2.0, 2.0, 1.0, 3.0);
        let p = cam.perspective();

        // cot(45°) = 1
        assert!((p.get(0, 0) - 0.5).abs() < EPS);
        assert!((p.get(1, 1) - 1.0).abs() < EPS);
        assert!((p.get(2, 2) - (-2.0)).abs() < EPS);
        assert_eq!(p.get(2, 3), -1.0);
        assert!((p.get(3, 2) - (-3.0)).abs() < EPS);
        assert_eq!(p.get(3, 3), 0.0);
    }

    #[test]
    fn set_fov_recomputes_perspective() {
        let mut cam = Camera::new(PI / 2.0, 1.0, 0.1, 100.0);
        let before = *cam.perspective();
        cam.set_fov(PI / 3.0);
        assert_ne!(before, *cam.perspective());
        assert!((cam.perspective().get(1, 1) - (PI / 3.0).tan()).abs() < EPS);
    }

    #[test]
    fn unrotated_view_is_inverse_translation() {
        let mut cam = Camera::new(1.0, 1.5, 0.1, 50.0);
        cam.update_camera(2.0, 5.0, Vec3::default()).unwrap();

        let mut expected = Mat4::identity();
        expected.translate(0.0, -2.0, -5.0);
        assert!(close(cam.view_matrix(), &expected));
    }

    #[test]
    fn view_is_inverse_of_camera_matrix() {
        let mut cam = Camera::new(1.0, 1.5, 0.1, 50.0);
        cam.update_camera(1.2, -3.0, Vec3::new(30.0, 45.0, 0.0)).unwrap();

        let mut product = *cam.camera_matrix();
        product.multiply(cam.view_matrix());
        assert!(close(&product, &Mat4::identity()));
    }

    #[test]
    fn view_projection_is_perspective_times_view() {
        let mut cam = Camera::new(0.8, 1.0, 0.5, 20.0);
        cam.update_camera(0.5, 1.0, Vec3::new(-15.0, 10.0, 0.0)).unwrap();

        let mut expected = *cam.perspective();
        expected.multiply(cam.view_matrix());
        assert!(close(cam.view_projection(), &expected));
    }

    #[test]
    fn roll_is_ignored() {
        let mut a = Camera::new(1.0, 1.0, 0.1, 10.0);
        let mut b = a.clone();
        a.update_camera(1.0, 2.0, Vec3::new(10.0, 20.0, 0.0)).unwrap();
        b.update_camera(1.0, 2.0, Vec3::new(10.0, 20.0, 75.0)).unwrap();
        assert_eq!(a.view_projection(), b.view_projection());
    }
}
