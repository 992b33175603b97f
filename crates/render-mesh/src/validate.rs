//! Input validation and mesh reports.

use hashbrown::HashMap;
use nalgebra::Point3;
use tracing::{debug, warn};

use crate::error::{MeshError, MeshResult};
use crate::types::SourceMesh;
use crate::vector::{edge_key, facet_area};

/// Summary of a source mesh, for reporting.
#[derive(Debug, Clone)]
pub struct MeshReport {
    pub point_count: usize,
    pub facet_count: usize,

    /// Bounding box as (min_corner, max_corner).
    pub bounds: Option<(Point3<f64>, Point3<f64>)>,

    /// Total facet area.
    pub surface_area: f64,

    /// Facets with zero area. They get no normal weight but are kept.
    pub degenerate_facet_count: usize,

    /// Points no facet refers to. Splitting drops them.
    pub unreferenced_point_count: usize,

    /// Edges used by a single facet.
    pub boundary_edge_count: usize,

    /// Edges used by more than two facets. Adjacency keeps at most three
    /// neighbours per facet on such edges.
    pub non_manifold_edge_count: usize,
}

impl MeshReport {
    pub fn is_valid(&self) -> bool {
        self.point_count > 0 && self.facet_count > 0
    }

    pub fn is_manifold(&self) -> bool {
        self.non_manifold_edge_count == 0
    }

    pub fn is_closed(&self) -> bool {
        self.boundary_edge_count == 0
    }

    pub fn dimensions(&self) -> Option<(f64, f64, f64)> {
        self.bounds.map(|(min, max)| {
            let d = max - min;
            (d.x, d.y, d.z)
        })
    }
}

impl std::fmt::Display for MeshReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Mesh Report:")?;
        writeln!(f, "  Points: {}", self.point_count)?;
        writeln!(f, "  Facets: {}", self.facet_count)?;
        if let Some((x, y, z)) = self.dimensions() {
            writeln!(f, "  Dimensions: {:.3} x {:.3} x {:.3}", x, y, z)?;
        }
        writeln!(f, "  Surface area: {:.3}", self.surface_area)?;
        writeln!(f, "  Degenerate facets: {}", self.degenerate_facet_count)?;
        writeln!(f, "  Unreferenced points: {}", self.unreferenced_point_count)?;
        writeln!(f, "  Boundary edges: {}", self.boundary_edge_count)?;
        write!(f, "  Non-manifold edges: {}", self.non_manifold_edge_count)
    }
}

/// Build a report for `mesh`. Facets with out-of-range indices are skipped.
pub fn mesh_report(mesh: &SourceMesh) -> MeshReport {
    let point_count = mesh.point_count();
    let mut referenced = vec![false; point_count];
    let mut edge_uses: HashMap<u64, u32> = HashMap::with_capacity(mesh.facet_count() * 3 / 2);
    let mut surface_area = 0.0;
    let mut degenerate_facet_count = 0;

    for facet in &mesh.facets {
        if facet.iter().any(|&i| i as usize >= point_count) {
            continue;
        }
        for &i in facet {
            referenced[i as usize] = true;
        }
        let [a, b, c] = *facet;
        for key in [edge_key(a, b), edge_key(b, c), edge_key(c, a)] {
            *edge_uses.entry(key).or_insert(0) += 1;
        }

        let area = facet_area(
            &mesh.points[a as usize],
            &mesh.points[b as usize],
            &mesh.points[c as usize],
        );
        if area > 0.0 {
            surface_area += area;
        } else {
            degenerate_facet_count += 1;
        }
    }

    MeshReport {
        point_count,
        facet_count: mesh.facet_count(),
        bounds: mesh.bounds(),
        surface_area,
        degenerate_facet_count,
        unreferenced_point_count: referenced.iter().filter(|&&r| !r).count(),
        boundary_edge_count: edge_uses.values().filter(|&&n| n == 1).count(),
        non_manifold_edge_count: edge_uses.values().filter(|&&n| n > 2).count(),
    }
}

/// A single problem found in raw mesh data.
#[derive(Debug, Clone, PartialEq)]
pub enum DataIssue {
    NonFiniteCoordinate {
        vertex_index: usize,
        coordinate: &'static str,
        value: f64,
    },
    InvalidVertexIndex {
        facet_index: usize,
        vertex_index: u32,
    },
}

impl DataIssue {
    fn into_error(self, point_count: usize) -> MeshError {
        match self {
            Self::NonFiniteCoordinate {
                vertex_index,
                coordinate,
                value,
            } => MeshError::invalid_coordinate(vertex_index, coordinate, value),
            Self::InvalidVertexIndex {
                facet_index,
                vertex_index,
            } => MeshError::invalid_vertex_index(facet_index, vertex_index, point_count),
        }
    }
}

/// Options for [`validate_source_data`].
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Fail on the first issue instead of collecting (default: true).
    pub reject_on_invalid: bool,
    /// Stop collecting after this many issues (default: 100).
    pub max_issues: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            reject_on_invalid: true,
            max_issues: 100,
        }
    }
}

impl ValidationOptions {
    pub fn collect_all() -> Self {
        Self {
            reject_on_invalid: false,
            max_issues: 1000,
        }
    }
}

/// Issues collected by [`validate_source_data`].
#[derive(Debug, Clone, Default)]
pub struct DataValidationResult {
    pub issues: Vec<DataIssue>,
}

impl DataValidationResult {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }
}

/// Check coordinates for NaN and infinity and facet indices for range.
///
/// # Errors
///
/// With `reject_on_invalid`, the first issue is returned as
/// [`MeshError::InvalidCoordinate`] or [`MeshError::InvalidVertexIndex`].
pub fn validate_source_data(
    mesh: &SourceMesh,
    options: &ValidationOptions,
) -> MeshResult<DataValidationResult> {
    let point_count = mesh.point_count();
    let mut result = DataValidationResult::default();

    let coordinate_issues = mesh.points.iter().enumerate().flat_map(|(vertex_index, p)| {
        [("x", p.x), ("y", p.y), ("z", p.z)]
            .into_iter()
            .filter(|(_, value)| !value.is_finite())
            .map(move |(coordinate, value)| DataIssue::NonFiniteCoordinate {
                vertex_index,
                coordinate,
                value,
            })
    });
    let index_issues = mesh.facets.iter().enumerate().flat_map(|(facet_index, facet)| {
        facet
            .iter()
            .filter(move |&&v| v as usize >= point_count)
            .map(move |&vertex_index| DataIssue::InvalidVertexIndex {
                facet_index,
                vertex_index,
            })
    });

    for issue in coordinate_issues.chain(index_issues) {
        if options.reject_on_invalid {
            return Err(issue.into_error(point_count));
        }
        if result.issues.len() >= options.max_issues {
            break;
        }
        result.issues.push(issue);
    }

    if result.is_valid() {
        debug!("Mesh data validation passed");
    } else {
        warn!(issues = result.issue_count(), "Mesh data validation found issues");
    }
    Ok(result)
}

/// Reject empty meshes, non-finite coordinates and out-of-range indices.
pub fn validate_source(mesh: &SourceMesh) -> MeshResult<()> {
    if mesh.points.is_empty() || mesh.facets.is_empty() {
        return Err(MeshError::empty_mesh(format!(
            "{} points, {} facets",
            mesh.point_count(),
            mesh.facet_count()
        )));
    }
    validate_source_data(mesh, &ValidationOptions::default())?;
    Ok(())
}
