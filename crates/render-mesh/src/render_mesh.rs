//! The render-ready mesh.

use std::path::Path;
use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use tracing::info;

use crate::autosmooth::{AUTOSMOOTH_STAGES, Kernels, autosmooth};
use crate::components::ComponentAnalysis;
use crate::error::MeshResult;
use crate::io::{ObjExport, ObjExportOptions};
use crate::parallel::Executor;
use crate::params::{RenderMeshParams, UvProjection};
use crate::progress::{ProgressCallback, StageTracker};
use crate::tracing_ext::{OperationTimer, log_mesh_stats};
use crate::transform::Transformation;
use crate::types::{Facet, MeshSnapshot, SourceMesh, Uv};
use crate::uvmap::{self, UvTransform};
use crate::validate::validate_source;

/// Processed buffers, shared between instances.
#[derive(Debug, Clone)]
struct Geometry {
    snapshot: MeshSnapshot,
    uvmap: Option<Vec<Uv>>,
    vnormals: Option<Vec<Vector3<f64>>>,
    components: Option<ComponentAnalysis>,
}

/// A triangle mesh prepared for rendering: optional UV map, optional
/// hard-edge aware vertex normals, and a placement kept apart from the points.
///
/// Cloning, or [`RenderMesh::instance`], shares the processed geometry.
#[derive(Debug, Clone)]
pub struct RenderMesh {
    geometry: Arc<Geometry>,
    transformation: Transformation,
    params: RenderMeshParams,
}

impl RenderMesh {
    /// Build a render mesh: validate, project UVs, then autosmooth, as
    /// `params` requests.
    ///
    /// # Errors
    ///
    /// - [`crate::MeshError::EmptyMesh`] when `source` has no point or no facet
    /// - [`crate::MeshError::InvalidCoordinate`] / [`crate::MeshError::InvalidVertexIndex`]
    ///   for corrupt input
    /// - [`crate::MeshError::InvalidParameter`] for bad `params`
    /// - [`crate::MeshError::WorkerFailed`] if a parallel stage fails
    pub fn new(
        source: SourceMesh,
        transformation: Transformation,
        params: &RenderMeshParams,
    ) -> MeshResult<Self> {
        Self::build(source, transformation, params, None)
    }

    /// Like [`RenderMesh::new`], reporting each completed stage to `callback`.
    pub fn with_progress(
        source: SourceMesh,
        transformation: Transformation,
        params: &RenderMeshParams,
        callback: ProgressCallback,
    ) -> MeshResult<Self> {
        Self::build(source, transformation, params, Some(callback))
    }

    fn build(
        source: SourceMesh,
        transformation: Transformation,
        params: &RenderMeshParams,
        callback: Option<ProgressCallback>,
    ) -> MeshResult<Self> {
        let _timer =
            OperationTimer::with_context("render_mesh", source.facet_count(), source.point_count());
        params.validate()?;
        validate_source(&source)?;

        let snapshot = MeshSnapshot::from_geometry(source.points, source.facets)?;
        log_mesh_stats(&snapshot, "input");

        let executor = Executor::for_mesh(params, snapshot.point_count());
        let uv_stages = u64::from(params.uv_projection != UvProjection::None);
        let smooth_stages = if params.autosmooth { AUTOSMOOTH_STAGES } else { 0 };
        let tracker = StageTracker::new("render_mesh", uv_stages + smooth_stages, callback);

        let mut geometry = Geometry {
            snapshot,
            uvmap: None,
            vnormals: None,
            components: None,
        };
        geometry = project_geometry(geometry, params, &executor)?;
        if uv_stages > 0 {
            tracker.advance("uv projection");
        }

        if params.autosmooth {
            let smoothed = autosmooth(
                &geometry.snapshot,
                geometry.uvmap.as_deref(),
                params,
                &Kernels::select(params),
                &executor,
                Some(&tracker),
            )?;
            geometry = Geometry {
                snapshot: smoothed.snapshot,
                uvmap: smoothed.uvmap,
                vnormals: Some(smoothed.vnormals),
                components: Some(smoothed.analysis),
            };
        }

        info!(
            points = geometry.snapshot.point_count(),
            facets = geometry.snapshot.facet_count(),
            uvmap = geometry.uvmap.is_some(),
            autosmooth = params.autosmooth,
            mode = %executor.mode(),
            "Render mesh ready"
        );

        Ok(Self {
            geometry: Arc::new(geometry),
            transformation,
            params: params.clone(),
        })
    }

    /// Another placement of the same geometry.
    pub fn instance(&self, transformation: Transformation) -> Self {
        Self {
            geometry: Arc::clone(&self.geometry),
            transformation,
            params: self.params.clone(),
        }
    }

    /// Whether two meshes share their geometry buffers.
    pub fn shares_geometry(&self, other: &RenderMesh) -> bool {
        Arc::ptr_eq(&self.geometry, &other.geometry)
    }

    /// Recompute the UV map with another projection.
    ///
    /// Existing vertex normals are kept, gathered through the new point
    /// order. Other instances keep their geometry.
    pub fn compute_uvmap(&mut self, projection: UvProjection) -> MeshResult<()> {
        let params = self.params.clone().with_uv_projection(projection);
        params.validate()?;
        let executor = Executor::for_mesh(&params, self.count_points());
        let current = Geometry::clone(&self.geometry);
        let projected = project_geometry(current, &params, &executor)?;
        self.geometry = Arc::new(projected);
        self.params = params;
        Ok(())
    }

    pub fn count_points(&self) -> usize {
        self.geometry.snapshot.point_count()
    }

    pub fn count_facets(&self) -> usize {
        self.geometry.snapshot.facet_count()
    }

    /// Whether autosmooth was applied.
    pub fn autosmooth(&self) -> bool {
        self.geometry.vnormals.is_some()
    }

    pub fn has_uvmap(&self) -> bool {
        self.geometry.uvmap.is_some()
    }

    pub fn has_vnormals(&self) -> bool {
        self.geometry.vnormals.is_some()
    }

    pub fn snapshot(&self) -> &MeshSnapshot {
        &self.geometry.snapshot
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.geometry.snapshot.points
    }

    pub fn facets(&self) -> &[Facet] {
        &self.geometry.snapshot.facets
    }

    /// Per-facet unit normals.
    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.geometry.snapshot.normals
    }

    pub fn areas(&self) -> &[f64] {
        &self.geometry.snapshot.areas
    }

    pub fn uvmap(&self) -> Option<&[Uv]> {
        self.geometry.uvmap.as_deref()
    }

    /// UV coordinates per facet corner, three per facet.
    pub fn uvmap_per_vertex(&self) -> Option<Vec<Uv>> {
        let uvmap = self.geometry.uvmap.as_ref()?;
        Some(
            self.facets()
                .iter()
                .flatten()
                .map(|&point| uvmap[point as usize])
                .collect(),
        )
    }

    /// UV map after `transform`, as written to OBJ files.
    pub fn uvtransform(&self, transform: &UvTransform) -> Option<Vec<Uv>> {
        self.uvmap().map(|uvmap| transform.apply(uvmap))
    }

    pub fn vnormals(&self) -> Option<&[Vector3<f64>]> {
        self.geometry.vnormals.as_deref()
    }

    /// Smooth components found by autosmooth.
    pub fn components(&self) -> Option<&ComponentAnalysis> {
        self.geometry.components.as_ref()
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub fn transformation_mut(&mut self) -> &mut Transformation {
        &mut self.transformation
    }

    pub fn params(&self) -> &RenderMeshParams {
        &self.params
    }

    /// Area-weighted center of the facets, in local coordinates.
    pub fn center_of_gravity(&self) -> Point3<f64> {
        self.geometry.snapshot.center_of_gravity()
    }

    /// Write this mesh as an OBJ file (plus MTL when a material is given).
    ///
    /// With no `path`, a temporary `_*.obj` file is created and kept.
    pub fn write_objfile(
        &self,
        name: &str,
        path: Option<&Path>,
        options: &ObjExportOptions,
    ) -> MeshResult<ObjExport> {
        crate::io::write_objfile(self, name, path, options)
    }
}

/// Apply the UV projection of `params` to `geometry`, carrying vertex normals
/// through the new point order.
fn project_geometry(
    geometry: Geometry,
    params: &RenderMeshParams,
    executor: &Executor,
) -> MeshResult<Geometry> {
    let _timer = OperationTimer::new("uv_projection");
    let Some(projected) = uvmap::project(
        &geometry.snapshot,
        params.uv_projection,
        params.uv_unit_scale,
        executor,
    )?
    else {
        return Ok(geometry);
    };

    let vnormals = geometry
        .vnormals
        .as_ref()
        .map(|normals| gather_through(&geometry.snapshot, &projected, normals));

    Ok(Geometry {
        snapshot: projected.snapshot,
        uvmap: Some(projected.uvmap),
        vnormals,
        components: geometry.components,
    })
}

/// Per-point values of `original` reordered to the points of `projected`.
fn gather_through(
    original: &MeshSnapshot,
    projected: &uvmap::ProjectedMesh,
    values: &[Vector3<f64>],
) -> Vec<Vector3<f64>> {
    let mut gathered = vec![Vector3::zeros(); projected.snapshot.point_count()];
    let source_facets = projected.partition.groups().iter().flatten();
    for (&source_facet, new_facet) in source_facets.zip(&projected.snapshot.facets) {
        let old_facet = original.facets[source_facet as usize];
        for (&new, &old) in new_facet.iter().zip(&old_facet) {
            gathered[new as usize] = values[old as usize];
        }
    }
    gathered
}
