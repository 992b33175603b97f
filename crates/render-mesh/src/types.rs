//! Core mesh data types.

use nalgebra::{Point2, Point3, Vector3};

use crate::error::{MeshError, MeshResult};
use crate::vector;

/// A UV coordinate.
pub type Uv = Point2<f64>;

/// Triangle facet as indices into the point array.
pub type Facet = [u32; 3];

/// Input geometry: an ordered point list and an ordered facet list.
///
/// Points are in local (object) space; any placement belongs in a
/// [`crate::Transformation`].
#[derive(Debug, Clone, Default)]
pub struct SourceMesh {
    /// Point positions.
    pub points: Vec<Point3<f64>>,

    /// Triangle facets with counter-clockwise winding.
    pub facets: Vec<Facet>,
}

impl SourceMesh {
    /// Create a source mesh from points and facets.
    pub fn new(points: Vec<Point3<f64>>, facets: Vec<Facet>) -> Self {
        Self { points, facets }
    }

    /// Number of points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of facets.
    #[inline]
    pub fn facet_count(&self) -> usize {
        self.facets.len()
    }

    /// Check if mesh is empty (no points or facets).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() || self.facets.is_empty()
    }

    /// Compute the axis-aligned bounding box.
    /// Returns (min_corner, max_corner) or None if there are no points.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        bounds_of(&self.points)
    }
}

/// A triangle with concrete vertex positions.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Unit normal, zero for degenerate triangles.
    #[inline]
    pub fn normal(&self) -> Vector3<f64> {
        vector::facet_normal(&self.v0, &self.v1, &self.v2)
    }

    /// Area of the triangle.
    #[inline]
    pub fn area(&self) -> f64 {
        vector::facet_area(&self.v0, &self.v1, &self.v2)
    }

    /// Centroid (center of mass).
    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        vector::facet_centroid(&self.v0, &self.v1, &self.v2)
    }

    /// Interior angles at v0, v1 and v2.
    #[inline]
    pub fn interior_angles(&self) -> [f64; 3] {
        vector::interior_angles(&self.v0, &self.v1, &self.v2)
    }
}

/// Geometry of a render mesh: points, facets and per-facet normals and areas.
///
/// `normals`, `areas` and `facets` always have the same length, and every
/// facet index is below `points.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshSnapshot {
    /// Point positions.
    pub points: Vec<Point3<f64>>,

    /// Triangle facets.
    pub facets: Vec<Facet>,

    /// Per-facet unit normals (zero for degenerate facets).
    pub normals: Vec<Vector3<f64>>,

    /// Per-facet areas.
    pub areas: Vec<f64>,
}

impl MeshSnapshot {
    /// Build a snapshot from points and facets, deriving normals and areas.
    pub fn from_geometry(points: Vec<Point3<f64>>, facets: Vec<Facet>) -> MeshResult<Self> {
        for (facet_index, facet) in facets.iter().enumerate() {
            for &vertex_index in facet {
                if vertex_index as usize >= points.len() {
                    return Err(MeshError::invalid_vertex_index(
                        facet_index,
                        vertex_index,
                        points.len(),
                    ));
                }
            }
        }

        let (normals, areas) = facets
            .iter()
            .map(|&[a, b, c]| {
                let tri = Triangle::new(
                    points[a as usize],
                    points[b as usize],
                    points[c as usize],
                );
                (tri.normal(), tri.area())
            })
            .unzip();

        Ok(Self {
            points,
            facets,
            normals,
            areas,
        })
    }

    /// Number of points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of facets.
    #[inline]
    pub fn facet_count(&self) -> usize {
        self.facets.len()
    }

    /// Triangle of facet `facet_index`.
    #[inline]
    pub fn triangle(&self, facet_index: usize) -> Triangle {
        let [a, b, c] = self.facets[facet_index];
        Triangle::new(
            self.points[a as usize],
            self.points[b as usize],
            self.points[c as usize],
        )
    }

    /// Compute the axis-aligned bounding box.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        bounds_of(&self.points)
    }

    /// Area-weighted barycenter of the facet centroids.
    ///
    /// Falls back to the mean of the points when the total area is zero, and
    /// to the origin for a mesh without points.
    pub fn center_of_gravity(&self) -> Point3<f64> {
        let mut weighted = Vector3::zeros();
        let mut total_area = 0.0;
        for (index, &area) in self.areas.iter().enumerate() {
            weighted += self.triangle(index).centroid().coords * area;
            total_area += area;
        }

        if total_area > 0.0 {
            Point3::from(weighted / total_area)
        } else if !self.points.is_empty() {
            let sum: Vector3<f64> = self.points.iter().map(|p| p.coords).sum();
            Point3::from(sum / self.points.len() as f64)
        } else {
            Point3::origin()
        }
    }

    /// Check the length and index invariants.
    pub fn validate(&self) -> MeshResult<()> {
        if self.normals.len() != self.facets.len() || self.areas.len() != self.facets.len() {
            return Err(MeshError::inconsistent_snapshot(format!(
                "{} facets, {} normals, {} areas",
                self.facets.len(),
                self.normals.len(),
                self.areas.len()
            )));
        }
        let point_count = self.points.len();
        for (facet_index, facet) in self.facets.iter().enumerate() {
            if let Some(&bad) = facet.iter().find(|&&v| v as usize >= point_count) {
                return Err(MeshError::invalid_vertex_index(facet_index, bad, point_count));
            }
        }
        Ok(())
    }
}

fn bounds_of(points: &[Point3<f64>]) -> Option<(Point3<f64>, Point3<f64>)> {
    let first = points.first()?;
    let mut min = *first;
    let mut max = *first;
    for p in &points[1..] {
        min = min.inf(p);
        max = max.sup(p);
    }
    Some((min, max))
}
