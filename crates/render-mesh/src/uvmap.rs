//! UV projection: cube, sphere and cylinder.
//!
//! Every projection follows the same pipeline:
//!
//! 1. **Partition** the facets into disjoint groups (cube faces, seam and
//!    regular facets, caps).
//! 2. **Extract** each group as a [`SubMesh`] with its own compacted points.
//! 3. **Map** each sub-mesh's points to UV coordinates.
//! 4. **Concatenate** the sub-meshes in group order.
//!
//! Points shared by two groups end up duplicated, so no facet ever straddles
//! a discontinuity in the UV map.

use std::f64::consts::{PI, TAU};

use nalgebra::{Point2, Point3, Vector2, Vector3};
use tracing::debug;

use crate::error::MeshResult;
use crate::params::UvProjection;
use crate::parallel::{Executor, chunk_ranges};
use crate::types::{Facet, MeshSnapshot, Uv};
use crate::vector::{crosses_branch_cut, pos_atan2, safe_normalize};

/// Tolerance on `|dot(edge, z)|` for a cylinder cap facet.
const CAP_TOLERANCE: f64 = 1e-5;

const NO_INDEX: u32 = u32::MAX;

/// Disjoint facet groups that together cover every facet once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    groups: Vec<Vec<u32>>,
}

impl Partition {
    /// Group facets by label. Facets keep ascending order within a group.
    pub fn from_labels(labels: &[u8], group_count: usize) -> Self {
        let mut groups = vec![Vec::new(); group_count];
        for (facet, &label) in labels.iter().enumerate() {
            groups[label as usize].push(facet as u32);
        }
        Self { groups }
    }

    pub fn groups(&self) -> &[Vec<u32>] {
        &self.groups
    }

    pub fn group_sizes(&self) -> Vec<usize> {
        self.groups.iter().map(Vec::len).collect()
    }

    /// Check that the groups cover `0..facet_count` exactly once.
    pub fn check_tiling(&self, facet_count: usize) -> bool {
        let mut seen = vec![false; facet_count];
        for &facet in self.groups.iter().flatten() {
            match seen.get_mut(facet as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        seen.into_iter().all(|s| s)
    }
}

/// A group of facets with its own compacted point set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubMesh {
    pub points: Vec<Point3<f64>>,
    pub facets: Vec<Facet>,
    pub normals: Vec<Vector3<f64>>,
    pub areas: Vec<f64>,
}

impl SubMesh {
    /// Copy the given facets out of `snapshot`, renumbering points in
    /// first-appearance order.
    pub fn extract(snapshot: &MeshSnapshot, group: &[u32]) -> Self {
        let mut local = vec![NO_INDEX; snapshot.point_count()];
        let mut sub = Self {
            points: Vec::new(),
            facets: Vec::with_capacity(group.len()),
            normals: Vec::with_capacity(group.len()),
            areas: Vec::with_capacity(group.len()),
        };

        for &facet in group {
            let facet = facet as usize;
            let renumbered = snapshot.facets[facet].map(|point| {
                let slot = &mut local[point as usize];
                if *slot == NO_INDEX {
                    *slot = sub.points.len() as u32;
                    sub.points.push(snapshot.points[point as usize]);
                }
                *slot
            });
            sub.facets.push(renumbered);
            sub.normals.push(snapshot.normals[facet]);
            sub.areas.push(snapshot.areas[facet]);
        }
        sub
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }
}

/// Face of the cube a facet normal points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CubeFace {
    XPlus = 0,
    XMinus = 1,
    YPlus = 2,
    YMinus = 3,
    ZPlus = 4,
    ZMinus = 5,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::XPlus,
        CubeFace::XMinus,
        CubeFace::YPlus,
        CubeFace::YMinus,
        CubeFace::ZPlus,
        CubeFace::ZMinus,
    ];

    /// Dominant axis of `direction`; ties go to x, then y.
    pub fn classify(direction: &Vector3<f64>) -> Self {
        let (ax, ay, az) = (direction.x.abs(), direction.y.abs(), direction.z.abs());
        if ax >= ay && ax >= az {
            if direction.x >= 0.0 { Self::XPlus } else { Self::XMinus }
        } else if ay >= ax && ay >= az {
            if direction.y >= 0.0 { Self::YPlus } else { Self::YMinus }
        } else if direction.z >= 0.0 {
            Self::ZPlus
        } else {
            Self::ZMinus
        }
    }

    /// Unfold onto the plane of this face.
    ///
    /// ```text
    ///       +Z
    /// +X +Y -X -Y
    ///       -Z
    /// ```
    pub fn project(self, p: &Vector3<f64>) -> Uv {
        match self {
            Self::XPlus => Point2::new(p.y, p.z),
            Self::XMinus => Point2::new(-p.y, p.z),
            Self::YPlus => Point2::new(-p.x, p.z),
            Self::YMinus => Point2::new(p.x, p.z),
            Self::ZPlus => Point2::new(p.x, p.y),
            Self::ZMinus => Point2::new(p.x, -p.y),
        }
    }
}

const REGULAR: u8 = 0;
const SEAM: u8 = 1;
const CAP: u8 = 2;

/// Geometry rebuilt by a projection, with one UV per point.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedMesh {
    pub snapshot: MeshSnapshot,
    pub uvmap: Vec<Uv>,
    pub partition: Partition,
}

/// Project `snapshot` and rebuild its geometry around the seams.
///
/// Returns `None` for [`UvProjection::None`].
pub fn project(
    snapshot: &MeshSnapshot,
    projection: UvProjection,
    unit_scale: f64,
    executor: &Executor,
) -> MeshResult<Option<ProjectedMesh>> {
    type GroupMapper = Box<dyn Fn(u8, &[Point3<f64>]) -> Vec<Uv>>;

    let origin = snapshot.center_of_gravity();
    let (partition, map_group): (Partition, GroupMapper) = match projection {
        UvProjection::None => return Ok(None),
        UvProjection::Cube => (
            cube_partition(snapshot, executor)?,
            Box::new(move |label: u8, points: &[Point3<f64>]| {
                let face = CubeFace::ALL[label as usize];
                points
                    .iter()
                    .map(|p| face.project(&((p - origin) * unit_scale)))
                    .collect()
            }),
        ),
        UvProjection::Sphere => (
            sphere_partition(snapshot, &origin),
            Box::new(move |label: u8, points: &[Point3<f64>]| {
                sphere_uv(points, &origin, unit_scale, label == SEAM)
            }),
        ),
        UvProjection::Cylinder => (
            cylinder_partition(snapshot),
            Box::new(move |label: u8, points: &[Point3<f64>]| {
                cylinder_uv(points, unit_scale, label)
            }),
        ),
    };
    debug_assert!(partition.check_tiling(snapshot.facet_count()));

    let mut out = MeshSnapshot::default();
    let mut uvmap = Vec::with_capacity(snapshot.point_count());
    for (label, group) in partition.groups().iter().enumerate() {
        let sub = SubMesh::extract(snapshot, group);
        if sub.is_empty() {
            continue;
        }
        let uv = map_group(label as u8, &sub.points);
        append(&mut out, &mut uvmap, sub, uv);
    }

    debug!(
        projection = %projection,
        groups = ?partition.group_sizes(),
        points_before = snapshot.point_count(),
        points_after = out.point_count(),
        "UV map computed"
    );

    Ok(Some(ProjectedMesh {
        snapshot: out,
        uvmap,
        partition,
    }))
}

fn append(out: &mut MeshSnapshot, uvmap: &mut Vec<Uv>, sub: SubMesh, uv: Vec<Uv>) {
    debug_assert_eq!(sub.points.len(), uv.len());
    let offset = out.points.len() as u32;
    out.points.extend(sub.points);
    out.facets
        .extend(sub.facets.into_iter().map(|f| f.map(|i| i + offset)));
    out.normals.extend(sub.normals);
    out.areas.extend(sub.areas);
    uvmap.extend(uv);
}

fn cube_partition(snapshot: &MeshSnapshot, executor: &Executor) -> MeshResult<Partition> {
    let facet_count = snapshot.facet_count();
    let ranges = chunk_ranges(facet_count, executor.chunk_len(facet_count));
    let normals = &snapshot.normals;
    let labels = executor.map_ranges("cube classify", &ranges, |_, range| {
        Ok(normals[range]
            .iter()
            .map(|n| CubeFace::classify(n) as u8)
            .collect::<Vec<u8>>())
    })?;
    Ok(Partition::from_labels(&labels.concat(), CubeFace::ALL.len()))
}

/// Azimuths `atan2(x, y)` of a facet's points relative to `origin`.
fn facet_azimuths(snapshot: &MeshSnapshot, facet: &Facet, origin: &Point3<f64>) -> [f64; 3] {
    facet.map(|i| {
        let v = snapshot.points[i as usize] - origin;
        v.x.atan2(v.y)
    })
}

fn sphere_partition(snapshot: &MeshSnapshot, origin: &Point3<f64>) -> Partition {
    let labels: Vec<u8> = snapshot
        .facets
        .iter()
        .map(|facet| {
            if crosses_branch_cut(facet_azimuths(snapshot, facet, origin)) {
                SEAM
            } else {
                REGULAR
            }
        })
        .collect();
    Partition::from_labels(&labels, 2)
}

fn cylinder_partition(snapshot: &MeshSnapshot) -> Partition {
    let labels: Vec<u8> = snapshot
        .facets
        .iter()
        .map(|facet| {
            let [p0, p1, p2] = facet.map(|i| snapshot.points[i as usize]);
            let e1 = safe_normalize(&(p1 - p0));
            let e2 = safe_normalize(&(p2 - p0));
            if e1.z.abs() <= CAP_TOLERANCE && e2.z.abs() <= CAP_TOLERANCE {
                CAP
            } else if crosses_branch_cut(facet_azimuths(snapshot, facet, &Point3::origin())) {
                SEAM
            } else {
                REGULAR
            }
        })
        .collect();
    Partition::from_labels(&labels, 3)
}

fn sphere_uv(points: &[Point3<f64>], origin: &Point3<f64>, unit_scale: f64, seam: bool) -> Vec<Uv> {
    points
        .iter()
        .map(|p| {
            let v = p - origin;
            let length = v.norm();
            if length == 0.0 {
                return Point2::origin();
            }
            let k = length * PI * unit_scale;
            let phi = if seam { pos_atan2(v.x, v.y) } else { v.x.atan2(v.y) };
            let theta = (v.z / length).clamp(-1.0, 1.0).asin();
            Point2::new((0.5 + phi / TAU) * k, (0.5 + theta / PI) * k)
        })
        .collect()
}

fn cylinder_uv(points: &[Point3<f64>], unit_scale: f64, label: u8) -> Vec<Uv> {
    if label == CAP {
        return points
            .iter()
            .map(|p| Point2::new(p.x * unit_scale, p.y * unit_scale))
            .collect();
    }
    let average_radius = if points.is_empty() {
        0.0
    } else {
        points.iter().map(|p| p.x.hypot(p.y)).sum::<f64>() / points.len() as f64
    };
    points
        .iter()
        .map(|p| {
            let phi = if label == SEAM { pos_atan2(p.x, p.y) } else { p.x.atan2(p.y) };
            Point2::new(phi * average_radius * unit_scale, p.z * unit_scale)
        })
        .collect()
}

/// Affine transform applied to UV coordinates at export time.
///
/// `u' = u·cos·s − v·sin·s + tx`, `v' = u·sin·s + v·cos·s + ty`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub translate: Vector2<f64>,
    /// Rotation in degrees.
    pub rotate_deg: f64,
    pub scale: f64,
}

impl Default for UvTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl UvTransform {
    pub fn identity() -> Self {
        Self {
            translate: Vector2::zeros(),
            rotate_deg: 0.0,
            scale: 1.0,
        }
    }

    pub fn new(translate: Vector2<f64>, rotate_deg: f64, scale: f64) -> Self {
        Self {
            translate,
            rotate_deg,
            scale,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rotate_deg == 0.0 && self.scale == 1.0 && self.translate == Vector2::zeros()
    }

    pub fn apply_point(&self, uv: &Uv) -> Uv {
        let (sin, cos) = self.rotate_deg.to_radians().sin_cos();
        let (cs, ss) = (cos * self.scale, sin * self.scale);
        Point2::new(
            uv.x * cs - uv.y * ss + self.translate.x,
            uv.x * ss + uv.y * cs + self.translate.y,
        )
    }

    /// Transform a whole map. The identity returns the input unchanged.
    pub fn apply(&self, uvmap: &[Uv]) -> Vec<Uv> {
        if self.is_identity() {
            return uvmap.to_vec();
        }
        uvmap.iter().map(|uv| self.apply_point(uv)).collect()
    }
}
