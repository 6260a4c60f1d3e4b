use super::MathError;

/// 4×4 transform stored as 16 `f64` values in column-major order.
///
/// Element `(col, row)` lives at index `col * 4 + row`. Mutators work in place
/// and compose on the right (`self = self * other`), so a chain of calls reads
/// in the order the transforms are applied to a column vector from the left.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat4 {
    m: [f64; 16],
}

const IDENTITY: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

impl Mat4 {
    #[inline]
    pub const fn identity() -> Self {
        Self { m: IDENTITY }
    }

    #[inline]
    pub const fn from_elements(elements: [f64; 16]) -> Self {
        Self { m: elements }
    }

    #[inline]
    pub fn elements(&self) -> &[f64; 16] {
        &self.m
    }

    /// Returns the element at `(col, row)`.
    #[inline]
    pub fn get(&self, col: usize, row: usize) -> f64 {
        self.m[col * 4 + row]
    }

    pub fn set_identity(&mut self) {
        self.m = IDENTITY;
    }

    /// Overwrites every element, keeping this value's identity.
    pub fn set_from_elements(&mut self, elements: &[f64; 16]) {
        self.m.copy_from_slice(elements);
    }

    /// `self = self * other`.
    ///
    /// `result[col][row] = Σk self[k][row] * other[col][k]`.
    pub fn multiply(&mut self, other: &Mat4) {
        let a = &self.m;
        let b = &other.m;
        let mut out = [0.0; 16];

        for col in 0..4 {
            for row in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += a[k * 4 + row] * b[col * 4 + k];
                }
                out[col * 4 + row] = sum;
            }
        }

        self.m = out;
    }

    /// Element-wise addition.
    pub fn add(&mut self, other: &Mat4) {
        for (dst, src) in self.m.iter_mut().zip(other.m.iter()) {
            *dst += *src;
        }
    }

    /// Adds `(x, y, z)` to the translation column.
    ///
    /// This is an additive update, not a product. For an affine matrix (bottom
    /// row `0 0 0 1`) it equals pre-multiplying by a translation, i.e. the
    /// offset is applied in the parent (world) frame regardless of any
    /// rotation already composed into `self`.
    pub fn translate(&mut self, x: f64, y: f64, z: f64) {
        let mut delta = Mat4::from_elements([0.0; 16]);
        delta.m[12] = x;
        delta.m[13] = y;
        delta.m[14] = z;
        self.add(&delta);
    }

    /// Right-multiplies by a rotation of `angle` radians about `axis`
    /// (Rodrigues' formula). The axis is normalized first.
    pub fn rotation(&mut self, angle: f64, axis: [f64; 3]) -> Result<(), MathError> {
        let [ax, ay, az] = axis;
        let length = (ax * ax + ay * ay + az * az).sqrt();
        if length == 0.0 {
            return Err(MathError::ZeroAxis);
        }
        self.rotate_unit(angle, ax / length, ay / length, az / length);
        Ok(())
    }

    pub fn rotation_x(&mut self, angle: f64) {
        self.rotate_unit(angle, 1.0, 0.0, 0.0);
    }

    pub fn rotation_y(&mut self, angle: f64) {
        self.rotate_unit(angle, 0.0, 1.0, 0.0);
    }

    pub fn rotation_z(&mut self, angle: f64) {
        self.rotate_unit(angle, 0.0, 0.0, 1.0);
    }

    fn rotate_unit(&mut self, angle: f64, x: f64, y: f64, z: f64) {
        let c = angle.cos();
        let s = angle.sin();
        let d = 1.0 - c;

        let rot = Mat4::from_elements([
            d * x * x + c,
            d * x * y - z * s,
            d * x * z + y * s,
            0.0,
            d * x * y + z * s,
            d * y * y + c,
            d * y * z - x * s,
            0.0,
            d * x * z - y * s,
            d * y * z + x * s,
            d * z * z + c,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
        ]);

        self.multiply(&rot);
    }

    pub fn determinant(&self) -> f64 {
        let minors = Minors::of(&self.m);
        minors.determinant()
    }

    /// `1 / determinant`, failing when the determinant is exactly zero.
    pub fn inverse_determinant(&self) -> Result<f64, MathError> {
        let det = self.determinant();
        if det == 0.0 {
            return Err(MathError::SingularMatrix);
        }
        Ok(1.0 / det)
    }

    /// Returns the inverse via the adjugate (transposed cofactor) matrix.
    pub fn inverse(&self) -> Result<Mat4, MathError> {
        let a = &self.m;
        let n = Minors::of(a);
        let det = n.determinant();
        if det == 0.0 {
            return Err(MathError::SingularMatrix);
        }
        let inv = 1.0 / det;
        let (s, c) = (&n.s, &n.c);

        Ok(Mat4::from_elements([
            (a[5] * c[5] - a[6] * c[4] + a[7] * c[3]) * inv,
            (-a[1] * c[5] + a[2] * c[4] - a[3] * c[3]) * inv,
            (a[13] * s[5] - a[14] * s[4] + a[15] * s[3]) * inv,
            (-a[9] * s[5] + a[10] * s[4] - a[11] * s[3]) * inv,
            (-a[4] * c[5] + a[6] * c[2] - a[7] * c[1]) * inv,
            (a[0] * c[5] - a[2] * c[2] + a[3] * c[1]) * inv,
            (-a[12] * s[5] + a[14] * s[2] - a[15] * s[1]) * inv,
            (a[8] * s[5] - a[10] * s[2] + a[11] * s[1]) * inv,
            (a[4] * c[4] - a[5] * c[2] + a[7] * c[0]) * inv,
            (-a[0] * c[4] + a[1] * c[2] - a[3] * c[0]) * inv,
            (a[12] * s[4] - a[13] * s[2] + a[15] * s[0]) * inv,
            (-a[8] * s[4] + a[9] * s[2] - a[11] * s[0]) * inv,
            (-a[4] * c[3] + a[5] * c[1] - a[6] * c[0]) * inv,
            (a[0] * c[3] - a[1] * c[1] + a[2] * c[0]) * inv,
            (-a[12] * s[3] + a[13] * s[1] - a[14] * s[0]) * inv,
            (a[8] * s[3] - a[9] * s[1] + a[10] * s[0]) * inv,
        ]))
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::identity()
    }
}

/// 2×2 minors of the first two and last two groups of four elements.
///
/// The cofactor expansion of the determinant and of the adjugate are both
/// expressed in terms of these twelve values. The formulas treat the array as
/// row-major; since `inverse(Aᵀ) = inverse(A)ᵀ` they hold for column-major
/// storage unchanged.
struct Minors {
    s: [f64; 6],
    c: [f64; 6],
}

impl Minors {
    fn of(a: &[f64; 16]) -> Self {
        Self {
            s: [
                a[0] * a[5] - a[4] * a[1],
                a[0] * a[6] - a[4] * a[2],
                a[0] * a[7] - a[4] * a[3],
                a[1] * a[6] - a[5] * a[2],
                a[1] * a[7] - a[5] * a[3],
                a[2] * a[7] - a[6] * a[3],
            ],
            c: [
                a[8] * a[13] - a[12] * a[9],
                a[8] * a[14] - a[12] * a[10],
                a[8] * a[15] - a[12] * a[11],
                a[9] * a[14] - a[13] * a[10],
                a[9] * a[15] - a[13] * a[11],
                a[10] * a[15] - a[14] * a[11],
            ],
        }
    }

    fn determinant(&self) -> f64 {
        let (s, c) = (&self.s, &self.c);
        s[0] * c[5] - s[1] * c[4] + s[2] * c[3] + s[3] * c[2] - s[4] * c[1] + s[5] * c[0]
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_close(actual: &Mat4, expected: &[f64; 16]) {
        for (i, (a, e)) in actual.elements().iter().zip(expected.iter()).enumerate() {
            assert!((a - e).abs() < EPS, "element {i}: got {a}, expected {e}");
        }
    }

    // ── multiply ──────────────────────────────────────────────────────────

    #[test]
    fn multiply_matches_column_major_sum() {
        let mut a = Mat4::from_elements([
            0.634, -0.278, 0.720, 0.123, //
            -0.421, 0.876, -0.238, 0.562, //
            0.524, 0.415, 0.744, 0.368, //
            0.112, 0.490, -0.356, 0.824,
        ]);
        let b = Mat4::from_elements([
            0.258, 0.714, -0.652, 0.135, //
            -0.531, 0.473, 0.701, 0.324, //
            0.856, -0.192, 0.479, 0.452, //
            0.064, 0.383, 0.257, 0.921,
        ]);

        a.multiply(&b);

        assert_close(
            &a,
            &[
                -0.46354999999999996,
                0.34931,
                -0.51732,
                0.30430599999999997,
                -0.13217500000000004,
                1.011641,
                -0.088694,
                0.725457,
                0.925156,
                0.014104999999999979,
                0.85748,
                0.5461039999999999,
                0.11715300000000002,
                0.875661,
                -0.181742,
                1.0765980000000002,
            ],
        );
    }

    #[test]
    fn multiply_by_identity_is_noop() {
        let mut m = Mat4::identity();
        m.rotation_x(0.3);
        m.translate(1.0, 2.0, 3.0);
        let before = m;
        m.multiply(&Mat4::identity());
        assert_eq!(m, before);
    }

    // ── rotation ──────────────────────────────────────────────────────────

    #[test]
    fn rotation_matches_rodrigues_closed_form() {
        let mut m = Mat4::identity();
        m.rotation(PI / 4.0, [0.398, -0.775, 0.489]).unwrap();

        assert_close(
            &m,
            &[
                0.7535882292984808,
                -0.4366058600455648,
                -0.4914062511167854,
                0.0,
                0.25558514503677965,
                0.8833518240657039,
                -0.3928941187601591,
                0.0,
                0.6056244829094253,
                0.17048424529459158,
                0.7772735090089105,
                0.0,
                0.0,
                0.0,
                0.0,
                1.0,
            ],
        );
    }

    #[test]
    fn rotation_rejects_zero_axis() {
        let mut m = Mat4::identity();
        assert_eq!(m.rotation(1.0, [0.0, 0.0, 0.0]), Err(MathError::ZeroAxis));
        assert_eq!(m, Mat4::identity());
    }

    #[test]
    fn axis_wrappers_match_general_rotation() {
        let mut a = Mat4::identity();
        a.rotation_y(0.7);
        let mut b = Mat4::identity();
        b.rotation(0.7, [0.0, 3.0, 0.0]).unwrap();
        assert_close(&a, b.elements());
    }

    #[test]
    fn rotation_preserves_unit_determinant() {
        let mut m = Mat4::identity();
        m.rotation(1.234, [1.0, 2.0, -0.5]).unwrap();
        assert!((m.determinant() - 1.0).abs() < EPS);
    }

    // ── translate ─────────────────────────────────────────────────────────

    #[test]
    fn translate_fills_translation_column() {
        let mut m = Mat4::identity();
        m.translate(1.5, -2.0, 0.25);
        assert_eq!(m.get(3, 0), 1.5);
        assert_eq!(m.get(3, 1), -2.0);
        assert_eq!(m.get(3, 2), 0.25);
        assert_eq!(m.get(3, 3), 1.0);
    }

    #[test]
    fn translate_equals_premultiplied_translation_for_affine() {
        let mut rotated = Mat4::identity();
        rotated.rotation_z(0.9);
        rotated.rotation_x(-0.4);

        let mut added = rotated;
        added.translate(3.0, -1.0, 2.0);

        let mut product = Mat4::identity();
        product.translate(3.0, -1.0, 2.0);
        product.multiply(&rotated);

        assert_close(&added, product.elements());
    }

    // ── determinant / inverse ─────────────────────────────────────────────

    #[test]
    fn inverse_of_composed_transform_yields_identity() {
        let mut m = Mat4::identity();
        m.rotation_x(PI / 4.0);
        m.rotation_y(-PI);
        m.rotation_z(1.12321);
        m.translate(1.43, -1.32, 0.02);

        let inv = m.inverse().unwrap();
        m.multiply(&inv);

        assert_close(&m, &IDENTITY);
    }

    #[test]
    fn inverse_of_general_matrix_both_sides() {
        let m = Mat4::from_elements([
            2.0, 0.5, -1.0, 0.0, //
            0.3, 1.7, 0.2, 0.1, //
            -0.4, 0.9, 3.1, 0.0, //
            1.0, -2.0, 0.5, 1.0,
        ]);
        let inv = m.inverse().unwrap();

        let mut left = m;
        left.multiply(&inv);
        assert_close(&left, &IDENTITY);

        let mut right = inv;
        right.multiply(&m);
        assert_close(&right, &IDENTITY);
    }

    #[test]
    fn inverse_fails_on_zero_determinant() {
        let mut elements = IDENTITY;
        elements[1] = 0.0;
        elements[5] = 0.0;
        elements[9] = 0.0;
        elements[13] = 0.0;
        let m = Mat4::from_elements(elements);

        assert_eq!(m.determinant(), 0.0);
        assert_eq!(m.inverse_determinant(), Err(MathError::SingularMatrix));
        assert_eq!(m.inverse(), Err(MathError::SingularMatrix));
    }

    #[test]
    fn determinant_of_scale() {
        let m = Mat4::from_elements([
            2.0, 0.0, 0.0, 0.0, //
            0.0, 3.0, 0.0, 0.0, //
            0.0, 0.0, 4.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        assert_eq!(m.determinant(), 24.0);
        assert_eq!(m.inverse_determinant(), Ok(1.0 / 24.0));
    }
}
