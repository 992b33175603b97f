//! Vertex splitting along component boundaries.
//!
//! Every `(point, component tag)` pair referenced by a facet becomes its own
//! point, so each smooth component owns a disjoint vertex set and normals can
//! differ across hard edges.

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::types::{Facet, Uv};

/// Output of [`split_vertices`].
#[derive(Debug, Clone, PartialEq)]
pub struct SplitVertices {
    /// New points, in first-appearance order over facets and corners.
    pub points: Vec<Point3<f64>>,
    /// Facets rewritten to the new point indices.
    pub facets: Vec<Facet>,
    /// Original point index of each new point.
    pub source_points: Vec<u32>,
}

impl SplitVertices {
    /// Number of points added by splitting (negative when unused points were dropped).
    pub fn added_points(&self, original_count: usize) -> isize {
        self.points.len() as isize - original_count as isize
    }

    /// Gather a per-point attribute through the split.
    pub fn expand<T: Copy>(&self, values: &[T]) -> Vec<T> {
        self.source_points
            .iter()
            .map(|&source| values[source as usize])
            .collect()
    }

    /// Expand a UV map, if any.
    pub fn expand_uvmap(&self, uvmap: Option<&[Uv]>) -> Option<Vec<Uv>> {
        uvmap.map(|uv| self.expand(uv))
    }

    /// Expand a vertex normal table, if any.
    pub fn expand_normals(&self, normals: Option<&[Vector3<f64>]>) -> Option<Vec<Vector3<f64>>> {
        normals.map(|n| self.expand(n))
    }
}

/// Duplicate points shared between differently tagged facets.
///
/// `tags` has one entry per facet. Points used by no facet are dropped.
pub fn split_vertices(points: &[Point3<f64>], facets: &[Facet], tags: &[u32]) -> SplitVertices {
    debug_assert_eq!(facets.len(), tags.len());

    let mut index: HashMap<(u32, u32), u32> = HashMap::with_capacity(points.len());
    let mut new_points = Vec::with_capacity(points.len());
    let mut source_points = Vec::with_capacity(points.len());

    let new_facets = facets
        .iter()
        .zip(tags)
        .map(|(facet, &tag)| {
            facet.map(|point| match index.entry((point, tag)) {
                Entry::Occupied(slot) => *slot.get(),
                Entry::Vacant(slot) => {
                    let id = new_points.len() as u32;
                    new_points.push(points[point as usize]);
                    source_points.push(point);
                    *slot.insert(id)
                }
            })
        })
        .collect();

    debug!(
        before = points.len(),
        after = new_points.len(),
        "Vertices split along component boundaries"
    );

    SplitVertices {
        points: new_points,
        facets: new_facets,
        source_points,
    }
}
