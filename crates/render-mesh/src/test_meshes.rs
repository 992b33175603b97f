//! Small meshes shared by unit tests.

use nalgebra::Point3;

use crate::types::{Facet, MeshSnapshot};

pub fn snapshot(points: Vec<Point3<f64>>, facets: Vec<Facet>) -> MeshSnapshot {
    MeshSnapshot::from_geometry(points, facets).expect("test mesh is valid")
}

/// Two coplanar triangles in z=0 sharing edge (1, 2).
pub fn two_coplanar_triangles() -> MeshSnapshot {
    snapshot(
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(1.5, 1.0, 0.0),
        ],
        vec![[0, 1, 2], [1, 3, 2]],
    )
}

/// Axis-aligned cube of side 1 centered on the origin, outward winding.
pub fn unit_cube() -> MeshSnapshot {
    let points = (0..8)
        .map(|i| {
            Point3::new(
                if i & 1 == 0 { -0.5 } else { 0.5 },
                if i & 2 == 0 { -0.5 } else { 0.5 },
                if i & 4 == 0 { -0.5 } else { 0.5 },
            )
        })
        .collect();
    let facets = vec![
        [0, 2, 3],
        [0, 3, 1],
        [4, 5, 7],
        [4, 7, 6],
        [0, 1, 5],
        [0, 5, 4],
        [2, 6, 7],
        [2, 7, 3],
        [0, 4, 6],
        [0, 6, 2],
        [1, 3, 7],
        [1, 7, 5],
    ];
    snapshot(points, facets)
}

/// Heightfield grid of `nx` by `ny` cells, two facets per cell.
pub fn grid_snapshot(nx: usize, ny: usize, height: impl Fn(usize, usize) -> f64) -> MeshSnapshot {
    let index = |x: usize, y: usize| (y * (nx + 1) + x) as u32;
    let mut points = Vec::with_capacity((nx + 1) * (ny + 1));
    for y in 0..=ny {
        for x in 0..=nx {
            points.push(Point3::new(x as f64, y as f64, height(x, y)));
        }
    }
    let mut facets = Vec::with_capacity(nx * ny * 2);
    for y in 0..ny {
        for x in 0..nx {
            let (a, b, c, d) = (index(x, y), index(x + 1, y), index(x + 1, y + 1), index(x, y + 1));
            facets.push([a, b, c]);
            facets.push([a, c, d]);
        }
    }
    snapshot(points, facets)
}

/// Latitude/longitude sphere centered on the origin, with single-point poles.
pub fn uv_sphere(segments: usize, rings: usize, radius: f64) -> MeshSnapshot {
    use std::f64::consts::{PI, TAU};

    let mut points = vec![Point3::new(0.0, 0.0, radius)];
    for ring in 1..rings {
        let theta = PI * ring as f64 / rings as f64;
        for segment in 0..segments {
            let phi = TAU * segment as f64 / segments as f64;
            points.push(Point3::new(
                radius * theta.sin() * phi.cos(),
                radius * theta.sin() * phi.sin(),
                radius * theta.cos(),
            ));
        }
    }
    let south = points.len() as u32;
    points.push(Point3::new(0.0, 0.0, -radius));

    let at = |ring: usize, segment: usize| (1 + (ring - 1) * segments + segment % segments) as u32;
    let mut facets = Vec::new();
    for s in 0..segments {
        facets.push([0, at(1, s), at(1, s + 1)]);
    }
    for ring in 1..rings - 1 {
        for s in 0..segments {
            let (a, b) = (at(ring, s), at(ring, s + 1));
            let (c, d) = (at(ring + 1, s + 1), at(ring + 1, s));
            facets.push([a, d, c]);
            facets.push([a, c, b]);
        }
    }
    for s in 0..segments {
        facets.push([south, at(rings - 1, s + 1), at(rings - 1, s)]);
    }
    snapshot(points, facets)
}

/// Closed cylinder around the z axis, from z=0 to z=`height`.
pub fn cylinder(segments: usize, radius: f64, height: f64) -> MeshSnapshot {
    use std::f64::consts::TAU;

    let mut points = Vec::with_capacity(2 * segments + 2);
    for z in [0.0, height] {
        for segment in 0..segments {
            let phi = TAU * segment as f64 / segments as f64;
            points.push(Point3::new(radius * phi.cos(), radius * phi.sin(), z));
        }
    }
    let bottom_center = points.len() as u32;
    points.push(Point3::new(0.0, 0.0, 0.0));
    let top_center = points.len() as u32;
    points.push(Point3::new(0.0, 0.0, height));

    let bottom = |s: usize| (s % segments) as u32;
    let top = |s: usize| (segments + s % segments) as u32;
    let mut facets = Vec::with_capacity(4 * segments);
    for s in 0..segments {
        facets.push([bottom(s), bottom(s + 1), top(s + 1)]);
        facets.push([bottom(s), top(s + 1), top(s)]);
        facets.push([bottom_center, bottom(s + 1), bottom(s)]);
        facets.push([top_center, top(s), top(s + 1)]);
    }
    snapshot(points, facets)
}
