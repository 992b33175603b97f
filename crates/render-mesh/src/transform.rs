//! Placement plus uniform scale.
//!
//! Geometry stays in local coordinates; the transformation is materialised
//! only when a renderer asks for a matrix or a decomposed form.

use std::fmt;

use nalgebra::{Isometry3, Matrix4, Point3, Translation3, UnitQuaternion, Vector3};

use crate::error::{MeshError, MeshResult};

/// A rigid placement followed by a nonzero uniform scale.
///
/// The scale applies to the placed result, so translation is scaled too.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation {
    placement: Isometry3<f64>,
    scale: f64,
}

impl Default for Transformation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transformation {
    /// Identity placement, unit scale.
    pub fn identity() -> Self {
        Self {
            placement: Isometry3::identity(),
            scale: 1.0,
        }
    }

    /// Build from a placement and scale.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InvalidParameter`] for a zero or non-finite scale.
    pub fn new(placement: Isometry3<f64>, scale: f64) -> MeshResult<Self> {
        check_scale(scale)?;
        Ok(Self { placement, scale })
    }

    /// Pure placement with unit scale.
    pub fn from_placement(placement: Isometry3<f64>) -> Self {
        Self {
            placement,
            scale: 1.0,
        }
    }

    /// Compose a placement onto this one.
    ///
    /// By default the placement is applied on the right (`self * placement`);
    /// with `left` it is applied on the left (`placement * self`).
    pub fn apply_placement(&mut self, placement: &Isometry3<f64>, left: bool) {
        self.placement = if left {
            placement * self.placement
        } else {
            self.placement * placement
        };
    }

    /// Replace the scale.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InvalidParameter`] for a zero or non-finite scale;
    /// the previous scale is kept.
    pub fn set_scale(&mut self, scale: f64) -> MeshResult<()> {
        check_scale(scale)?;
        self.scale = scale;
        Ok(())
    }

    pub fn placement(&self) -> &Isometry3<f64> {
        &self.placement
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn scale_vector(&self) -> Vector3<f64> {
        Vector3::repeat(self.scale)
    }

    /// Homogeneous 4x4 matrix: rows 0 to 2 of the placement scaled, bottom row untouched.
    pub fn matrix(&self) -> Matrix4<f64> {
        Matrix4::new_nonuniform_scaling(&self.scale_vector()) * self.placement.to_homogeneous()
    }

    /// [`Self::matrix`] as four rows.
    pub fn matrix_rows(&self) -> [[f64; 4]; 4] {
        let m = self.matrix();
        std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]))
    }

    /// [`Self::matrix`] as four columns.
    pub fn matrix_columns(&self) -> [[f64; 4]; 4] {
        let m = self.matrix();
        std::array::from_fn(|c| std::array::from_fn(|r| m[(r, c)]))
    }

    /// Translation component, scaled.
    pub fn translation(&self) -> Vector3<f64> {
        self.placement.translation.vector * self.scale
    }

    /// Rotation as `[x, y, z, w]`.
    pub fn rotation_quaternion(&self) -> [f64; 4] {
        let q = &self.placement.rotation;
        [q.i, q.j, q.k, q.w]
    }

    /// Rotation as yaw (about z), pitch (about y), roll (about x), in degrees.
    pub fn rotation_ypr(&self) -> [f64; 3] {
        let (roll, pitch, yaw) = self.placement.rotation.euler_angles();
        [yaw.to_degrees(), pitch.to_degrees(), roll.to_degrees()]
    }

    /// Map a local point to world space.
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        (self.placement * point) * self.scale
    }

    /// Placement from a translation and yaw/pitch/roll in degrees.
    pub fn placement_from_ypr(translation: Vector3<f64>, ypr_deg: [f64; 3]) -> Isometry3<f64> {
        let [yaw, pitch, roll] = ypr_deg.map(f64::to_radians);
        Isometry3::from_parts(
            Translation3::from(translation),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        )
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.placement.translation.vector;
        let [yaw, pitch, roll] = self.rotation_ypr();
        write!(
            f,
            "Placement=[Pos=({}, {}, {}), Yaw-Pitch-Roll=({}, {}, {})], Scale={}",
            t.x, t.y, t.z, yaw, pitch, roll, self.scale
        )
    }
}

fn check_scale(scale: f64) -> MeshResult<()> {
    if scale == 0.0 || !scale.is_finite() {
        return Err(MeshError::invalid_parameter(
            "scale",
            format!("transformation scale must be finite and nonzero, got {scale}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quarter_turn_about_z() -> Isometry3<f64> {
        Transformation::placement_from_ypr(Vector3::new(1.0, 2.0, 3.0), [90.0, 0.0, 0.0])
    }

    #[test]
    fn test_identity_matrix() {
        assert_eq!(Transformation::identity().matrix(), Matrix4::identity());
    }

    #[test]
    fn test_zero_scale_rejected() {
        let mut t = Transformation::identity();
        assert!(matches!(t.set_scale(0.0), Err(MeshError::InvalidParameter { .. })));
        assert_eq!(t.scale(), 1.0);
        assert!(Transformation::new(Isometry3::identity(), f64::NAN).is_err());
    }

    #[test]
    fn test_rows_scaled_except_bottom() {
        let t = Transformation::new(quarter_turn_about_z(), 2.0).unwrap();
        let rows = t.matrix_rows();
        assert_relative_eq!(rows[0][3], 2.0, epsilon = 1e-12);
        assert_relative_eq!(rows[1][3], 4.0, epsilon = 1e-12);
        assert_relative_eq!(rows[2][3], 6.0, epsilon = 1e-12);
        assert_eq!(rows[3], [0.0, 0.0, 0.0, 1.0]);
        assert_relative_eq!(rows[0][1], -2.0, epsilon = 1e-12);

        let columns = t.matrix_columns();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                assert_eq!(columns[c][r], *value);
            }
        }
    }

    #[test]
    fn test_translation_is_scaled() {
        let t = Transformation::new(quarter_turn_about_z(), 0.5).unwrap();
        assert_relative_eq!(t.translation(), Vector3::new(0.5, 1.0, 1.5), epsilon = 1e-12);
        assert_eq!(t.scale_vector(), Vector3::repeat(0.5));
    }

    #[test]
    fn test_rotation_accessors() {
        let t = Transformation::from_placement(quarter_turn_about_z());
        let [yaw, pitch, roll] = t.rotation_ypr();
        assert_relative_eq!(yaw, 90.0, epsilon = 1e-9);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-9);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-9);

        let half = std::f64::consts::FRAC_1_SQRT_2;
        let [x, y, z, w] = t.rotation_quaternion();
        assert_relative_eq!(x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(z.abs(), half, epsilon = 1e-12);
        assert_relative_eq!(w.abs(), half, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_placement_order() {
        let shift = Isometry3::translation(1.0, 0.0, 0.0);
        let mut right = Transformation::from_placement(quarter_turn_about_z());
        right.apply_placement(&shift, false);
        let mut left = Transformation::from_placement(quarter_turn_about_z());
        left.apply_placement(&shift, true);

        // Right: shift in local frame, rotated onto +y.
        assert_relative_eq!(right.translation(), Vector3::new(1.0, 3.0, 3.0), epsilon = 1e-12);
        // Left: shift in world frame.
        assert_relative_eq!(left.translation(), Vector3::new(2.0, 2.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_transform_point_matches_matrix() {
        let t = Transformation::new(quarter_turn_about_z(), 3.0).unwrap();
        let p = Point3::new(0.3, -1.2, 2.5);
        let via_matrix = t.matrix().transform_point(&p);
        assert_relative_eq!(t.transform_point(&p), via_matrix, epsilon = 1e-12);
    }

    #[test]
    fn test_display() {
        let text = Transformation::identity().to_string();
        assert!(text.starts_with("Placement="));
        assert!(text.ends_with("Scale=1"));
    }
}
