use glam::{Mat4, Vec3};

use crate::backend::{BackendError, GraphicsBackend, UniformHandle};

/// A chainable 4x4 transform.
///
/// Backs the three logical matrices of the pipeline: the projection (rebuilt
/// on resize), the camera (rebuilt on resize), and the model-view-projection
/// product (rebuilt every frame). Mutators compose in place and return the
/// transform so a full MVP can be built in one chain:
///
/// ```
/// use trigon::Transform;
///
/// let mut projection = Transform::new();
/// projection.set_frustum(-1.0, 1.0, -1.0, 1.0, 3.0, 7.0);
///
/// let mut camera = Transform::new();
/// camera.set_look_at(0.0, 0.0, -3.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0);
///
/// let mut mvp = Transform::new();
/// mvp.set_identity()
///     .multiply(&projection)
///     .multiply(&camera)
///     .rotate(45.0, 0.0, 0.0, 1.0);
/// ```
///
/// The layout is column-major with column-vector convention, so composition
/// applies right-to-left: `projection * camera * rotation` rotates first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    m: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    /// Creates an identity transform.
    pub fn new() -> Self {
        Self { m: Mat4::IDENTITY }
    }

    /// Resets to the identity matrix, discarding all prior composition.
    pub fn set_identity(&mut self) -> &mut Self {
        self.m = Mat4::IDENTITY;
        self
    }

    /// Replaces this transform with an off-axis perspective frustum.
    ///
    /// `near` and `far` must be positive with `near < far`; the bounds are
    /// not validated and degenerate input produces a garbage matrix.
    pub fn set_frustum(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> &mut Self {
        let r_width = 1.0 / (right - left);
        let r_height = 1.0 / (top - bottom);
        let r_depth = 1.0 / (near - far);

        let x = 2.0 * near * r_width;
        let y = 2.0 * near * r_height;
        let a = (right + left) * r_width;
        let b = (top + bottom) * r_height;
        let c = (far + near) * r_depth;
        let d = 2.0 * far * near * r_depth;

        self.m = Mat4::from_cols_array(&[
            x, 0.0, 0.0, 0.0, //
            0.0, y, 0.0, 0.0, //
            a, b, c, -1.0, //
            0.0, 0.0, d, 0.0,
        ]);
        self
    }

    /// Replaces this transform with a view matrix placing the camera at
    /// `eye`, looking toward `center`, with `up` as the vertical reference.
    ///
    /// Degenerate input (eye == center, or up parallel to the view
    /// direction) is undefined.
    #[allow(clippy::too_many_arguments)]
    pub fn set_look_at(
        &mut self,
        eye_x: f32,
        eye_y: f32,
        eye_z: f32,
        center_x: f32,
        center_y: f32,
        center_z: f32,
        up_x: f32,
        up_y: f32,
        up_z: f32,
    ) -> &mut Self {
        self.m = Mat4::look_at_rh(
            Vec3::new(eye_x, eye_y, eye_z),
            Vec3::new(center_x, center_y, center_z),
            Vec3::new(up_x, up_y, up_z),
        );
        self
    }

    /// Right-multiplies by `other`: `self = self * other`.
    ///
    /// Composition is not commutative; the MVP chain is
    /// `projection * camera * rotation`.
    pub fn multiply(&mut self, other: &Transform) -> &mut Self {
        self.m *= other.m;
        self
    }

    /// Right-multiplies by a rotation of `angle_degrees` about the given
    /// axis. The axis does not need to be pre-normalized.
    pub fn rotate(&mut self, angle_degrees: f32, x: f32, y: f32, z: f32) -> &mut Self {
        let axis = Vec3::new(x, y, z).normalize_or_zero();
        self.m *= Mat4::from_axis_angle(axis, angle_degrees.to_radians());
        self
    }

    /// Uploads the 16 components to the given uniform slot.
    ///
    /// Fails if the uniform's owning program is not currently active.
    pub fn set_to(
        &self,
        gl: &mut dyn GraphicsBackend,
        uniform: UniformHandle,
    ) -> Result<(), BackendError> {
        gl.set_uniform_matrix4(uniform, &self.m.to_cols_array())
    }

    /// The column-major components.
    pub fn to_cols_array(&self) -> [f32; 16] {
        self.m.to_cols_array()
    }

    /// The underlying matrix.
    pub fn matrix(&self) -> Mat4 {
        self.m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn assert_matrix_eq(a: &Transform, b: &Transform) {
        let (a, b) = (a.to_cols_array(), b.to_cols_array());
        for i in 0..16 {
            assert!(
                (a[i] - b[i]).abs() < EPSILON,
                "component {} deviated: {} vs {}",
                i,
                a[i],
                b[i]
            );
        }
    }

    #[test]
    fn same_axis_rotations_compose_additively() {
        let mut chained = Transform::new();
        chained.rotate(30.0, 0.0, 0.0, 1.0).rotate(45.0, 0.0, 0.0, 1.0);

        let mut single = Transform::new();
        single.rotate(75.0, 0.0, 0.0, 1.0);

        assert_matrix_eq(&chained, &single);
    }

    #[test]
    fn identity_is_a_multiplicative_identity() {
        let mut x = Transform::new();
        x.set_frustum(-0.5, 0.5, -1.0, 1.0, 3.0, 7.0);

        let mut left = Transform::new();
        left.set_identity().multiply(&x);
        assert_matrix_eq(&left, &x);

        let mut right = x;
        right.multiply(&Transform::new());
        assert_matrix_eq(&right, &x);
    }

    #[test]
    fn zero_degree_rotation_is_identity() {
        let mut t = Transform::new();
        t.rotate(0.0, 0.0, 0.0, 1.0);
        assert_matrix_eq(&t, &Transform::new());
    }

    #[test]
    fn rotation_axis_is_normalized_internally() {
        let mut scaled = Transform::new();
        scaled.rotate(40.0, 0.0, 0.0, 10.0);

        let mut unit = Transform::new();
        unit.rotate(40.0, 0.0, 0.0, 1.0);

        assert_matrix_eq(&scaled, &unit);
    }

    #[test]
    fn frustum_matches_hand_computed_320x480_bounds() {
        // A 320x480 viewport gives ratio 2/3 and bounds
        // (-2/3, 2/3, -1, 1, 3, 7).
        let ratio = 320.0 / 480.0;
        let mut t = Transform::new();
        t.set_frustum(-ratio, ratio, -1.0, 1.0, 3.0, 7.0);

        let m = t.to_cols_array();
        assert!((m[0] - 4.5).abs() < EPSILON); // 2n / (r - l) = 6 / (4/3)
        assert!((m[5] - 3.0).abs() < EPSILON); // 2n / (t - b) = 6 / 2
        assert!((m[10] + 2.5).abs() < EPSILON); // -(f + n) / (f - n)
        assert!((m[11] + 1.0).abs() < EPSILON);
        assert!((m[14] - -10.5).abs() < EPSILON); // -2fn / (f - n)
        assert!(m[15].abs() < EPSILON);
    }

    #[test]
    fn look_at_maps_the_eye_to_the_origin() {
        let mut t = Transform::new();
        t.set_look_at(0.0, 0.0, -3.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0);

        let eye = t.matrix() * glam::Vec4::new(0.0, 0.0, -3.0, 1.0);
        assert!(eye.truncate().length() < EPSILON);

        // The look target ends up on the negative view-space z axis.
        let center = t.matrix() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(center.x.abs() < EPSILON);
        assert!(center.y.abs() < EPSILON);
        assert!(center.z < 0.0);
    }

    #[test]
    fn multiplication_order_is_right_to_left() {
        let mut projection = Transform::new();
        projection.set_frustum(-1.0, 1.0, -1.0, 1.0, 3.0, 7.0);
        let mut camera = Transform::new();
        camera.set_look_at(0.0, 0.0, -3.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0);

        let mut chained = Transform::new();
        chained
            .set_identity()
            .multiply(&projection)
            .multiply(&camera)
            .rotate(30.0, 0.0, 0.0, 1.0);

        let expected = projection.matrix()
            * camera.matrix()
            * Mat4::from_axis_angle(Vec3::Z, 30f32.to_radians());
        for (actual, expected) in chained.to_cols_array().iter().zip(expected.to_cols_array()) {
            assert!((actual - expected).abs() < EPSILON);
        }
    }
}
