//! Vector math kernel.
//!
//! Small helpers on top of nalgebra that never fail on degenerate input:
//! zero-length vectors normalize to zero and angles against a zero vector
//! are zero.

use nalgebra::{Point3, Vector3};
use std::f64::consts::{PI, TAU};

/// Normalize `v`, mapping zero-length (or non-finite length) vectors to zero.
#[inline]
pub fn safe_normalize(v: &Vector3<f64>) -> Vector3<f64> {
    let len = v.norm();
    if len > 0.0 && len.is_finite() {
        v / len
    } else {
        Vector3::zeros()
    }
}

/// Angle in radians between two vectors.
///
/// The dot product of the normalized vectors is clipped to [-1, 1] before
/// `acos`, so rounding never produces NaN. A zero vector yields 0.
#[inline]
pub fn clamped_angle(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let (a, b) = (safe_normalize(a), safe_normalize(b));
    if a == Vector3::zeros() || b == Vector3::zeros() {
        return 0.0;
    }
    a.dot(&b).clamp(-1.0, 1.0).acos()
}

/// Interior angles of triangle (p0, p1, p2), at p0, p1 and p2 respectively.
#[inline]
pub fn interior_angles(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> [f64; 3] {
    [
        clamped_angle(&(p1 - p0), &(p2 - p0)),
        clamped_angle(&(p2 - p1), &(p0 - p1)),
        clamped_angle(&(p0 - p2), &(p1 - p2)),
    ]
}

/// Unit normal of triangle (p0, p1, p2), zero for degenerate triangles.
#[inline]
pub fn facet_normal(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Vector3<f64> {
    safe_normalize(&(p1 - p0).cross(&(p2 - p0)))
}

/// Area of triangle (p0, p1, p2).
#[inline]
pub fn facet_area(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
    (p1 - p0).cross(&(p2 - p0)).norm() * 0.5
}

/// Centroid of triangle (p0, p1, p2).
#[inline]
pub fn facet_centroid(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Point3<f64> {
    Point3::from((p0.coords + p1.coords + p2.coords) / 3.0)
}

/// Azimuth `atan2(x, y)` wrapped into [0, 2π).
#[inline]
pub fn pos_atan2(x: f64, y: f64) -> f64 {
    let phi = x.atan2(y);
    if phi >= 0.0 { phi } else { phi + TAU }
}

/// Whether three azimuths (from `atan2`) straddle the ±π branch cut.
///
/// Straddling φ = 0 also mixes signs but is not a discontinuity, so the
/// spread must exceed π as well.
#[inline]
pub fn crosses_branch_cut(phis: [f64; 3]) -> bool {
    let max = phis[0].max(phis[1]).max(phis[2]);
    let min = phis[0].min(phis[1]).min(phis[2]);
    max * min < 0.0 && max - min > PI
}

/// Pack an unordered point pair into one sortable key.
#[inline]
pub fn edge_key(a: u32, b: u32) -> u64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    ((lo as u64) << 32) | hi as u64
}

/// Number of distinct point indices shared by two facets.
#[inline]
pub fn shared_vertex_count(a: &[u32; 3], b: &[u32; 3]) -> usize {
    let mut distinct = [u32::MAX; 3];
    let mut len = 0;
    for &v in a {
        if !distinct[..len].contains(&v) {
            distinct[len] = v;
            len += 1;
        }
    }
    distinct[..len].iter().filter(|v| b.contains(v)).count()
}
