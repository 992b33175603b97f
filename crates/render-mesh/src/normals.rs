//! Angle- and area-weighted vertex normals.
//!
//! Each facet corner contributes `n_facet * interior_angle * facet_area` to
//! its point. Accumulated sums are normalized; a zero sum stays zero.
//!
//! Corner contributions are computed per chunk (in parallel when the executor
//! has a pool) into a flat buffer of three entries per facet, then summed in
//! facet order. The sum order is therefore the same in every execution mode.

use nalgebra::Vector3;
use tracing::debug;

use crate::error::MeshResult;
use crate::parallel::{Executor, WorkerContext};
use crate::vector::{interior_angles, safe_normalize};

/// Strategy for computing per-corner normal contributions.
pub trait NormalWeighter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Weighted normal of every facet corner: `3 * facet_count` entries.
    fn corner_weights(
        &self,
        ctx: &WorkerContext<'_>,
        executor: &Executor,
    ) -> MeshResult<Vec<Vector3<f64>>>;
}

/// One facet at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarNormalWeighter;

impl NormalWeighter for ScalarNormalWeighter {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn corner_weights(
        &self,
        ctx: &WorkerContext<'_>,
        executor: &Executor,
    ) -> MeshResult<Vec<Vector3<f64>>> {
        let facet_count = ctx.facet_count();
        let chunk_len = executor.chunk_len(facet_count);
        let mut corners = vec![Vector3::zeros(); facet_count * 3];

        executor.for_each_chunk_mut("normal weights", &mut corners, chunk_len * 3, |chunk, out| {
            let start = chunk * chunk_len;
            for (offset, triple) in out.chunks_mut(3).enumerate() {
                let facet = start + offset;
                let [a, b, c] = ctx.facets[facet];
                let angles = interior_angles(
                    &ctx.points[a as usize],
                    &ctx.points[b as usize],
                    &ctx.points[c as usize],
                );
                let weighted = ctx.normals[facet] * ctx.areas[facet];
                for (slot, angle) in triple.iter_mut().zip(angles) {
                    *slot = weighted * angle;
                }
            }
            Ok(())
        })?;
        Ok(corners)
    }
}

/// Whole chunks at once, on column matrices of edge vectors.
///
/// The third angle is derived as `π - a0 - a1`, so results agree with
/// [`ScalarNormalWeighter`] to rounding.
#[cfg(feature = "vectorized")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchNormalWeighter;

#[cfg(feature = "vectorized")]
impl NormalWeighter for BatchNormalWeighter {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn corner_weights(
        &self,
        ctx: &WorkerContext<'_>,
        executor: &Executor,
    ) -> MeshResult<Vec<Vector3<f64>>> {
        use nalgebra::Matrix3xX;
        use std::f64::consts::PI;

        fn normalize_columns(m: &mut Matrix3xX<f64>) {
            for mut column in m.column_iter_mut() {
                let norm = column.norm();
                if norm > 0.0 && norm.is_finite() {
                    column /= norm;
                } else {
                    column.fill(0.0);
                }
            }
        }

        let facet_count = ctx.facet_count();
        let chunk_len = executor.chunk_len(facet_count);
        let mut corners = vec![Vector3::zeros(); facet_count * 3];

        executor.for_each_chunk_mut("normal weights", &mut corners, chunk_len * 3, |chunk, out| {
            let start = chunk * chunk_len;
            let n = out.len() / 3;

            let mut e01 = Matrix3xX::<f64>::zeros(n);
            let mut e02 = Matrix3xX::<f64>::zeros(n);
            let mut e12 = Matrix3xX::<f64>::zeros(n);
            for i in 0..n {
                let [a, b, c] = ctx.facets[start + i];
                let (p0, p1, p2) = (
                    &ctx.points[a as usize],
                    &ctx.points[b as usize],
                    &ctx.points[c as usize],
                );
                e01.set_column(i, &(p1 - p0));
                e02.set_column(i, &(p2 - p0));
                e12.set_column(i, &(p2 - p1));
            }
            normalize_columns(&mut e01);
            normalize_columns(&mut e02);
            normalize_columns(&mut e12);

            let a0 = e01
                .component_mul(&e02)
                .row_sum()
                .map(|d| d.clamp(-1.0, 1.0).acos());
            let a1 = e01
                .component_mul(&e12)
                .row_sum()
                .map(|d| (-d).clamp(-1.0, 1.0).acos());

            for i in 0..n {
                let facet = start + i;
                let weighted = ctx.normals[facet] * ctx.areas[facet];
                out[3 * i] = weighted * a0[i];
                out[3 * i + 1] = weighted * a1[i];
                out[3 * i + 2] = weighted * (PI - a0[i] - a1[i]);
            }
            Ok(())
        })?;
        Ok(corners)
    }
}

/// Per-point normals: corner contributions summed, then normalized.
pub fn compute_vertex_normals(
    weighter: &dyn NormalWeighter,
    ctx: &WorkerContext<'_>,
    executor: &Executor,
) -> MeshResult<Vec<Vector3<f64>>> {
    let corners = weighter.corner_weights(ctx, executor)?;

    let mut normals = vec![Vector3::zeros(); ctx.point_count()];
    for (facet, weights) in ctx.facets.iter().zip(corners.chunks_exact(3)) {
        for (&point, weight) in facet.iter().zip(weights) {
            normals[point as usize] += weight;
        }
    }

    let chunk_len = executor.chunk_len(normals.len());
    executor.for_each_chunk_mut("normalize", &mut normals, chunk_len, |_, chunk| {
        for normal in chunk.iter_mut() {
            *normal = safe_normalize(normal);
        }
        Ok(())
    })?;

    debug!(
        weighter = weighter.name(),
        points = normals.len(),
        zero_normals = normals.iter().filter(|n| n.norm_squared() == 0.0).count(),
        "Vertex normals computed"
    );
    Ok(normals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes::{grid_snapshot, snapshot, two_coplanar_triangles, unit_cube};
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn normals_with(weighter: &dyn NormalWeighter, mesh: &crate::MeshSnapshot) -> Vec<Vector3<f64>> {
        let ctx = WorkerContext::new(mesh, 0.0);
        compute_vertex_normals(weighter, &ctx, &Executor::sequential(64)).unwrap()
    }

    #[test]
    fn test_coplanar_triangles_share_facet_normal() {
        let mesh = two_coplanar_triangles();
        for normal in normals_with(&ScalarNormalWeighter, &mesh) {
            assert_relative_eq!(normal, Vector3::z(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_area_facet_contributes_nothing() {
        // Facet 1 collapses onto a single point shared with facet 0.
        let mesh = snapshot(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(5.0, 5.0, 5.0),
            ],
            vec![[0, 1, 2], [3, 3, 3]],
        );
        assert_eq!(mesh.areas[1], 0.0);
        let normals = normals_with(&ScalarNormalWeighter, &mesh);
        assert_relative_eq!(normals[0], Vector3::z(), epsilon = 1e-12);
        assert_eq!(normals[3], Vector3::zeros());
    }

    #[test]
    fn test_unit_cube_corner_normals_point_outward() {
        let mesh = unit_cube();
        let normals = normals_with(&ScalarNormalWeighter, &mesh);
        for (point, normal) in mesh.points.iter().zip(&normals) {
            assert_relative_eq!(normal.norm(), 1.0, epsilon = 1e-12);
            assert!(normal.dot(&point.coords) > 0.0);
        }
    }

    #[test]
    fn test_parallel_matches_sequential_exactly() {
        let mesh = grid_snapshot(20, 13, |x, y| ((x * 7 + y * 3) % 5) as f64 * 0.25);
        let ctx = WorkerContext::new(&mesh, 0.0);
        let sequential =
            compute_vertex_normals(&ScalarNormalWeighter, &ctx, &Executor::sequential(64)).unwrap();
        let parallel =
            compute_vertex_normals(&ScalarNormalWeighter, &ctx, &Executor::with_workers(4, 9))
                .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[cfg(feature = "vectorized")]
    #[test]
    fn test_batch_matches_scalar() {
        let meshes = [
            two_coplanar_triangles(),
            unit_cube(),
            grid_snapshot(9, 8, |x, y| ((x * y) % 3) as f64 * 0.7),
        ];
        for mesh in &meshes {
            let scalar = normals_with(&ScalarNormalWeighter, mesh);
            let batch = normals_with(&BatchNormalWeighter, mesh);
            for (s, b) in scalar.iter().zip(&batch) {
                assert_relative_eq!(s, b, epsilon = 1e-9);
            }
        }
    }
}
