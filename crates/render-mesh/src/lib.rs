//! Render-ready triangle meshes.
//!
//! This crate turns raw triangle soup (points plus index triples) into meshes
//! a renderer can consume directly: UV coordinates from a cube, sphere or
//! cylinder projection, hard edges split by angle, smooth per-vertex normals,
//! and OBJ/MTL export.
//!
//! # Pipeline
//!
//! Building a [`RenderMesh`] runs these stages in order:
//!
//! 1. **Validation**: empty meshes, non-finite coordinates and out-of-range
//!    indices are rejected.
//! 2. **UV projection** (optional): facets are grouped by cube face, or into
//!    regular, seam and cap groups for spheres and cylinders. Each group gets
//!    its own points so UVs never wrap across a seam.
//! 3. **Adjacency**: each facet records up to three neighbours that share an
//!    edge and whose normal is within the split angle.
//! 4. **Components**: facets connected through adjacency share a smooth
//!    component tag.
//! 5. **Split**: points shared between components are duplicated.
//! 6. **Normals**: per-vertex normals weighted by corner angle and facet area.
//!
//! Stages 3 to 6 run only with `autosmooth` enabled. Large meshes are
//! processed on a rayon thread pool; the results match sequential execution.
//!
//! # Coordinate System
//!
//! Right-handed. Facet winding is counter-clockwise seen from outside, so
//! facet normals point outward by the right-hand rule. UV projections use
//! the z axis as the pole (sphere) or the axis of revolution (cylinder).
//!
//! # Quick Start
//!
//! ```no_run
//! use render_mesh::{ObjExportOptions, RenderMesh, RenderMeshParams, Transformation, UvProjection};
//!
//! let source = render_mesh::load_mesh("part.stl".as_ref()).unwrap();
//! let params = RenderMeshParams::with_uv(UvProjection::Cube).with_split_angle_deg(40.0);
//! let mesh = RenderMesh::new(source, Transformation::identity(), &params).unwrap();
//!
//! println!("{} points after splitting", mesh.count_points());
//!
//! let options = ObjExportOptions::default().with_material("paint", "Kd 0.8 0.1 0.1\n");
//! mesh.write_objfile("part", Some("part.obj".as_ref()), &options).unwrap();
//! ```
//!
//! # Instancing
//!
//! [`RenderMesh::instance`] shares the processed geometry and only carries a
//! new [`Transformation`]. Geometry is reference counted and never mutated in
//! place.
//!
//! # Logging
//!
//! All stages emit [`tracing`] events. Install a subscriber to see them:
//!
//! ```ignore
//! tracing_subscriber::fmt().with_env_filter("render_mesh=debug").init();
//! ```
//!
//! Stage timings are reported under the `render_mesh::timing` target.

mod error;
pub mod tracing_ext;
mod types;

#[cfg(test)]
mod test_meshes;

pub mod adjacency;
pub mod autosmooth;
pub mod components;
pub mod io;
pub mod normals;
pub mod parallel;
pub mod params;
pub mod progress;
pub mod render_mesh;
pub mod split;
pub mod transform;
pub mod uvmap;
pub mod validate;
pub mod vector;

// Re-export core types at crate root
pub use error::{ErrorCode, MeshError, MeshLocation, MeshResult, RecoverySuggestion};
pub use types::{Facet, MeshSnapshot, SourceMesh, Triangle, Uv};

pub use adjacency::{AdjacencyBuilder, AdjacencyTable, IncidenceAdjacency};
#[cfg(feature = "vectorized")]
pub use adjacency::SortedEdgeAdjacency;
pub use autosmooth::{Kernels, Smoothed, autosmooth};
pub use components::{ComponentAnalysis, TagTable, connected_components};
pub use io::{
    FaceMask, Material, MeshFormat, ObjExport, ObjExportOptions, load_mesh, write_mtl,
    write_objfile,
};
pub use normals::{NormalWeighter, ScalarNormalWeighter, compute_vertex_normals};
#[cfg(feature = "vectorized")]
pub use normals::BatchNormalWeighter;
pub use parallel::{ExecutionMode, Executor};
pub use params::{RenderMeshParams, UvProjection};
#[cfg(feature = "params-config")]
pub use params::ParamsConfigError;
pub use progress::{Progress, ProgressCallback};
pub use render_mesh::RenderMesh;
pub use split::{SplitVertices, split_vertices};
pub use transform::Transformation;
pub use uvmap::{CubeFace, Partition, UvTransform};
pub use validate::{MeshReport, ValidationOptions, mesh_report, validate_source};
