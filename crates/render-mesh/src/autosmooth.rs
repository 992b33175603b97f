//! Hard-edge autosmooth: adjacency, components, splitting and vertex normals.
//!
//! Facets whose normals differ by more than the split angle end up in
//! different smooth components. Points on the border between components are
//! duplicated so each component gets its own vertex normals.

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::adjacency::{AdjacencyBuilder, IncidenceAdjacency};
use crate::components::{ComponentAnalysis, connected_components};
use crate::error::MeshResult;
use crate::normals::{NormalWeighter, ScalarNormalWeighter, compute_vertex_normals};
use crate::parallel::{Executor, WorkerContext};
use crate::params::RenderMeshParams;
use crate::progress::StageTracker;
use crate::split::split_vertices;
use crate::tracing_ext::{OperationTimer, log_component_result, log_mesh_stats};
use crate::types::{MeshSnapshot, Uv};

#[cfg(feature = "vectorized")]
use crate::adjacency::SortedEdgeAdjacency;
#[cfg(feature = "vectorized")]
use crate::normals::BatchNormalWeighter;

/// Number of stages reported to a [`StageTracker`].
pub const AUTOSMOOTH_STAGES: u64 = 4;

/// Adjacency and normal kernels, chosen once per run.
pub struct Kernels {
    pub adjacency: Box<dyn AdjacencyBuilder>,
    pub normals: Box<dyn NormalWeighter>,
}

impl std::fmt::Debug for Kernels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernels")
            .field("adjacency", &self.adjacency.name())
            .field("normals", &self.normals.name())
            .finish()
    }
}

impl Kernels {
    /// Kernels matching `params.enable_vectorized_fastpath` and the features
    /// this crate was built with.
    pub fn select(params: &RenderMeshParams) -> Self {
        if params.enable_vectorized_fastpath {
            #[cfg(feature = "vectorized")]
            {
                let kernels = Self::vectorized();
                debug!(kernels = ?kernels, "Selected vectorized kernels");
                return kernels;
            }
            #[cfg(not(feature = "vectorized"))]
            debug!("Vectorized kernels requested but not compiled in, using scalar kernels");
        }
        Self::scalar()
    }

    pub fn scalar() -> Self {
        Self {
            adjacency: Box::new(IncidenceAdjacency),
            normals: Box::new(ScalarNormalWeighter),
        }
    }

    #[cfg(feature = "vectorized")]
    pub fn vectorized() -> Self {
        Self {
            adjacency: Box::new(SortedEdgeAdjacency),
            normals: Box::new(BatchNormalWeighter),
        }
    }
}

/// Replacement buffers produced by [`autosmooth`].
#[derive(Debug, Clone)]
pub struct Smoothed {
    pub snapshot: MeshSnapshot,
    pub uvmap: Option<Vec<Uv>>,
    pub vnormals: Vec<Vector3<f64>>,
    pub analysis: ComponentAnalysis,
}

/// Split `snapshot` along hard edges and compute vertex normals.
///
/// The input is left untouched; the caller swaps the returned buffers in.
pub fn autosmooth(
    snapshot: &MeshSnapshot,
    uvmap: Option<&[Uv]>,
    params: &RenderMeshParams,
    kernels: &Kernels,
    executor: &Executor,
    tracker: Option<&StageTracker>,
) -> MeshResult<Smoothed> {
    let _timer =
        OperationTimer::with_context("autosmooth", snapshot.facet_count(), snapshot.point_count());
    let advance = |stage: &str| {
        if let Some(tracker) = tracker {
            tracker.advance(stage);
        }
    };
    let split_angle_cos = params.split_angle_cos();

    let adjacency = {
        let _timer = OperationTimer::new("adjacency");
        let ctx = WorkerContext::new(snapshot, split_angle_cos);
        let adjacency = kernels.adjacency.build(&ctx, executor)?;
        if cfg!(debug_assertions) {
            adjacency.check_symmetry();
        }
        adjacency
    };
    advance("adjacency");

    let tags = {
        let _timer = OperationTimer::new("components");
        connected_components(&adjacency, executor)?
    };
    let analysis = tags.analyze();
    log_component_result(&analysis, params.split_angle.to_degrees());
    advance("components");

    let (split_snapshot, uvmap) = {
        let _timer = OperationTimer::new("split");
        let split = split_vertices(&snapshot.points, &snapshot.facets, tags.tags());
        let uvmap = split.expand_uvmap(uvmap);
        let split_snapshot = MeshSnapshot {
            points: split.points,
            facets: split.facets,
            normals: snapshot.normals.clone(),
            areas: snapshot.areas.clone(),
        };
        (split_snapshot, uvmap)
    };
    log_mesh_stats(&split_snapshot, "after split");
    advance("split");

    let vnormals = {
        let _timer = OperationTimer::new("normals");
        let ctx = WorkerContext::new(&split_snapshot, split_angle_cos);
        compute_vertex_normals(kernels.normals.as_ref(), &ctx, executor)?
    };
    advance("normals");

    info!(
        points_before = snapshot.point_count(),
        points_after = split_snapshot.point_count(),
        components = analysis.component_count,
        mode = %executor.mode(),
        "Autosmooth completed"
    );

    Ok(Smoothed {
        snapshot: split_snapshot,
        uvmap,
        vnormals,
        analysis,
    })
}
