//! Facet adjacency under a split-angle predicate.
//!
//! Facets A and B are adjacent when they share exactly two distinct point
//! indices (one edge) and `dot(n_A, n_B) >= cos(split_angle)`. A triangle has
//! three edges, so each facet keeps at most three neighbours; on non-manifold
//! input the three lowest facet indices are kept.
//!
//! Two interchangeable builders produce the same table:
//!
//! - [`IncidenceAdjacency`] walks point-to-facet incidence lists.
//! - [`SortedEdgeAdjacency`] (feature `vectorized`) sorts packed edge keys and
//!   pairs up facets within each run of equal keys.

use tracing::{debug, warn};

use crate::error::MeshResult;
use crate::parallel::{Executor, WorkerContext};
use crate::vector::shared_vertex_count;

/// Padding value for unused neighbour slots.
pub const NO_NEIGHBOR: u32 = u32::MAX;

/// Maximum neighbours per facet.
pub const MAX_NEIGHBORS: usize = 3;

/// Per-facet neighbour lists, at most three entries each, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyTable {
    rows: Vec<[u32; MAX_NEIGHBORS]>,
}

impl AdjacencyTable {
    /// Table with no neighbours for `facet_count` facets.
    pub fn empty(facet_count: usize) -> Self {
        Self {
            rows: vec![[NO_NEIGHBOR; MAX_NEIGHBORS]; facet_count],
        }
    }

    /// Build a table from explicit neighbour lists (sorted and truncated).
    pub fn from_lists(lists: &[Vec<u32>]) -> Self {
        let rows = lists
            .iter()
            .map(|list| {
                let mut sorted = list.clone();
                sorted.sort_unstable();
                sorted.dedup();
                let mut row = [NO_NEIGHBOR; MAX_NEIGHBORS];
                for (slot, &n) in row.iter_mut().zip(&sorted) {
                    *slot = n;
                }
                row
            })
            .collect();
        Self { rows }
    }

    /// Number of facets.
    #[inline]
    pub fn facet_count(&self) -> usize {
        self.rows.len()
    }

    /// Neighbours of `facet`.
    #[inline]
    pub fn neighbors(&self, facet: usize) -> impl Iterator<Item = u32> + '_ {
        self.rows[facet]
            .iter()
            .copied()
            .take_while(|&n| n != NO_NEIGHBOR)
    }

    /// Number of neighbours of `facet`.
    #[inline]
    pub fn degree(&self, facet: usize) -> usize {
        self.neighbors(facet).count()
    }

    /// Every (facet, neighbour) pair.
    pub fn pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.rows.len()).flat_map(move |f| self.neighbors(f).map(move |n| (f as u32, n)))
    }

    /// Pairs (A, B) where B lists A but A does not list B.
    pub fn asymmetric_pairs(&self) -> Vec<(u32, u32)> {
        self.pairs()
            .filter(|&(f, n)| !self.neighbors(n as usize).any(|back| back == f))
            .map(|(f, n)| (n, f))
            .collect()
    }

    /// Whether every adjacency is mutual.
    pub fn is_symmetric(&self) -> bool {
        self.pairs()
            .all(|(f, n)| self.neighbors(n as usize).any(|back| back == f))
    }

    /// Log violations of symmetry.
    ///
    /// Non-manifold edges shared by more than two facets can lose entries to
    /// truncation; traversal treats the relation as undirected, so this only
    /// warns.
    pub fn check_symmetry(&self) -> bool {
        let asymmetric = self.asymmetric_pairs();
        if asymmetric.is_empty() {
            return true;
        }
        warn!(
            count = asymmetric.len(),
            first = ?asymmetric.first(),
            "Adjacency table is not symmetric"
        );
        false
    }

    fn rows_mut(&mut self) -> &mut [[u32; MAX_NEIGHBORS]] {
        &mut self.rows
    }
}

/// Strategy for computing an [`AdjacencyTable`].
pub trait AdjacencyBuilder: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Compute the adjacency of every facet in `ctx`.
    fn build(&self, ctx: &WorkerContext<'_>, executor: &Executor) -> MeshResult<AdjacencyTable>;
}

/// Adjacency from point-to-facet incidence lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncidenceAdjacency;

/// Facets using each point, in compressed rows.
struct PointIncidence {
    offsets: Vec<usize>,
    facets: Vec<u32>,
}

impl PointIncidence {
    fn build(ctx: &WorkerContext<'_>) -> Self {
        let mut offsets = vec![0usize; ctx.point_count() + 1];
        for facet in ctx.facets {
            for &p in facet {
                offsets[p as usize + 1] += 1;
            }
        }
        for i in 1..offsets.len() {
            offsets[i] += offsets[i - 1];
        }

        let mut cursor = offsets.clone();
        let mut facets = vec![0u32; offsets[offsets.len() - 1]];
        for (index, facet) in ctx.facets.iter().enumerate() {
            for &p in facet {
                let slot = &mut cursor[p as usize];
                facets[*slot] = index as u32;
                *slot += 1;
            }
        }
        Self { offsets, facets }
    }

    #[inline]
    fn facets_of(&self, point: u32) -> &[u32] {
        let p = point as usize;
        &self.facets[self.offsets[p]..self.offsets[p + 1]]
    }
}

impl AdjacencyBuilder for IncidenceAdjacency {
    fn name(&self) -> &'static str {
        "incidence"
    }

    fn build(&self, ctx: &WorkerContext<'_>, executor: &Executor) -> MeshResult<AdjacencyTable> {
        let facet_count = ctx.facet_count();
        let incidence = PointIncidence::build(ctx);
        let mut table = AdjacencyTable::empty(facet_count);
        let chunk_len = executor.chunk_len(facet_count);

        executor.for_each_chunk_mut("adjacency", table.rows_mut(), chunk_len, |chunk, rows| {
            let start = chunk * chunk_len;
            let mut candidates = Vec::with_capacity(32);
            for (offset, row) in rows.iter_mut().enumerate() {
                let facet = start + offset;
                let corners = &ctx.facets[facet];

                candidates.clear();
                for &p in corners {
                    candidates.extend_from_slice(incidence.facets_of(p));
                }
                candidates.sort_unstable();
                candidates.dedup();

                let accepted = candidates.iter().copied().filter(|&other| {
                    let other = other as usize;
                    other != facet
                        && shared_vertex_count(corners, &ctx.facets[other]) == 2
                        && ctx.within_split_angle(facet, other)
                });
                for (slot, neighbor) in row.iter_mut().zip(accepted) {
                    *slot = neighbor;
                }
            }
            Ok(())
        })?;

        debug!(
            builder = self.name(),
            facets = facet_count,
            "Adjacency computed"
        );
        Ok(table)
    }
}

/// Adjacency from sorted edge keys.
///
/// Every facet contributes three `(edge_key, facet)` records built from its
/// sorted corner indices. After a parallel sort, facets sharing an edge sit
/// next to each other; every ordered pair inside a run is a candidate.
#[cfg(feature = "vectorized")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedEdgeAdjacency;

#[cfg(feature = "vectorized")]
impl AdjacencyBuilder for SortedEdgeAdjacency {
    fn name(&self) -> &'static str {
        "sorted-edge"
    }

    fn build(&self, ctx: &WorkerContext<'_>, executor: &Executor) -> MeshResult<AdjacencyTable> {
        use crate::parallel::{aligned_chunk_ranges, pack_pair, unpack_pair};
        use crate::vector::edge_key;

        let facet_count = ctx.facet_count();
        let chunk_len = executor.chunk_len(facet_count);

        // Edge records, three per facet.
        let mut edges = vec![(0u64, 0u32); facet_count * 3];
        executor.for_each_chunk_mut("edge keys", &mut edges, chunk_len * 3, |chunk, records| {
            let start = chunk * chunk_len;
            for (offset, triple) in records.chunks_mut(3).enumerate() {
                let facet = start + offset;
                let mut s = ctx.facets[facet];
                s.sort_unstable();
                triple[0] = (edge_key(s[0], s[1]), facet as u32);
                triple[1] = (edge_key(s[0], s[2]), facet as u32);
                triple[2] = (edge_key(s[1], s[2]), facet as u32);
            }
            Ok(())
        })?;
        executor.sort_unstable("edge sort", &mut edges)?;

        // Candidate pairs within each run of equal keys.
        let runs = aligned_chunk_ranges(&edges, chunk_len * 3, |record| record.0);
        let chunks = executor.map_ranges("edge pairs", &runs, |_, range| {
            let slice = &edges[range];
            let mut pairs = Vec::new();
            for run in slice.chunk_by(|a, b| a.0 == b.0) {
                for &(_, a) in run {
                    for &(_, b) in run {
                        let (ai, bi) = (a as usize, b as usize);
                        if ai != bi
                            && shared_vertex_count(&ctx.facets[ai], &ctx.facets[bi]) == 2
                            && ctx.within_split_angle(ai, bi)
                        {
                            pairs.push(pack_pair(a, b));
                        }
                    }
                }
            }
            Ok(pairs)
        })?;
        drop(edges);

        let mut pairs = chunks.concat();
        executor.sort_unstable("pair sort", &mut pairs)?;
        pairs.dedup();

        // Group by first facet; keep the first three.
        let mut table = AdjacencyTable::empty(facet_count);
        executor.for_each_chunk_mut("adjacency rows", table.rows_mut(), chunk_len, |chunk, rows| {
            let start = (chunk * chunk_len) as u32;
            let end = start + rows.len() as u32;
            let first = pairs.partition_point(|&p| unpack_pair(p).0 < start);
            let mut fill = vec![0usize; rows.len()];
            for &pair in pairs[first..].iter() {
                let (facet, neighbor) = unpack_pair(pair);
                if facet >= end {
                    break;
                }
                let local = (facet - start) as usize;
                if fill[local] < MAX_NEIGHBORS {
                    rows[local][fill[local]] = neighbor;
                    fill[local] += 1;
                }
            }
            Ok(())
        })?;

        debug!(
            builder = self.name(),
            facets = facet_count,
            pairs = pairs.len(),
            "Adjacency computed"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes::{grid_snapshot, snapshot, two_coplanar_triangles, unit_cube};
    use crate::types::MeshSnapshot;
    use nalgebra::Point3;

    fn build_with(builder: &dyn AdjacencyBuilder, mesh: &MeshSnapshot, angle_deg: f64) -> AdjacencyTable {
        let ctx = WorkerContext::new(mesh, angle_deg.to_radians().cos());
        builder.build(&ctx, &Executor::sequential(1024)).unwrap()
    }

    #[test]
    fn test_two_coplanar_triangles_are_adjacent() {
        let mesh = two_coplanar_triangles();
        let table = build_with(&IncidenceAdjacency, &mesh, 30.0);
        assert_eq!(table.neighbors(0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(table.neighbors(1).collect::<Vec<_>>(), vec![0]);
        assert!(table.is_symmetric());
    }

    #[test]
    fn test_sharp_edge_breaks_adjacency() {
        // Two triangles folded 90 degrees along edge (1, 2).
        let mesh = snapshot(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(1.0, 0.0, 1.0),
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        );
        assert_eq!(build_with(&IncidenceAdjacency, &mesh, 30.0).degree(0), 0);
        assert_eq!(build_with(&IncidenceAdjacency, &mesh, 95.0).degree(0), 1);
    }

    #[test]
    fn test_unit_cube_adjacency_stays_on_faces() {
        let mesh = unit_cube();
        let table = build_with(&IncidenceAdjacency, &mesh, 30.0);
        for facet in 0..mesh.facet_count() {
            assert_eq!(table.degree(facet), 1, "facet {} should pair with its twin", facet);
            let twin = table.neighbors(facet).next().unwrap() as usize;
            assert!(mesh.normals[facet].dot(&mesh.normals[twin]) > 0.99);
        }
    }

    #[test]
    fn test_vertex_only_contact_is_not_adjacent() {
        let mesh = snapshot(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(-1.0, 0.0, 0.0),
                Point3::new(0.0, -1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 3, 4]],
        );
        let table = build_with(&IncidenceAdjacency, &mesh, 30.0);
        assert_eq!(table.pairs().count(), 0);
    }

    #[test]
    fn test_non_manifold_fan_truncates_to_three() {
        // Five coplanar-ish facets all sharing edge (0, 1).
        let mut points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let mut facets = Vec::new();
        for k in 0..5 {
            points.push(Point3::new(0.5, 1.0 + k as f64, 0.0));
            facets.push([0, 1, 2 + k as u32]);
        }
        let mesh = snapshot(points, facets);
        let table = build_with(&IncidenceAdjacency, &mesh, 30.0);
        assert_eq!(table.neighbors(0).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(table.neighbors(4).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_parallel_incidence_matches_sequential() {
        let mesh = grid_snapshot(12, 9, |x, y| ((x * 3 + y * 5) % 7) as f64 * 0.3);
        let ctx = WorkerContext::new(&mesh, 30f64.to_radians().cos());
        let sequential = IncidenceAdjacency
            .build(&ctx, &Executor::sequential(1024))
            .unwrap();
        let parallel = IncidenceAdjacency
            .build(&ctx, &Executor::with_workers(4, 7))
            .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_from_lists_sorts_and_truncates() {
        let table = AdjacencyTable::from_lists(&[vec![5, 2, 9, 1], vec![]]);
        assert_eq!(table.neighbors(0).collect::<Vec<_>>(), vec![1, 2, 5]);
        assert_eq!(table.degree(1), 0);
    }

    #[test]
    fn test_asymmetry_is_reported() {
        let table = AdjacencyTable::from_lists(&[vec![1], vec![]]);
        assert!(!table.is_symmetric());
        assert_eq!(table.asymmetric_pairs(), vec![(1, 0)]);
        assert!(!table.check_symmetry());
    }

    #[cfg(feature = "vectorized")]
    #[test]
    fn test_sorted_edge_matches_incidence() {
        let meshes = [
            two_coplanar_triangles(),
            unit_cube(),
            grid_snapshot(10, 7, |x, y| ((x * y) % 4) as f64 * 0.4),
        ];
        for mesh in &meshes {
            for angle in [1.0, 30.0, 60.0, 180.0] {
                let incidence = build_with(&IncidenceAdjacency, mesh, angle);
                let sorted = build_with(&SortedEdgeAdjacency, mesh, angle);
                assert_eq!(incidence, sorted, "angle {}", angle);
            }
        }
    }

    #[cfg(feature = "vectorized")]
    #[test]
    fn test_sorted_edge_parallel_matches_sequential() {
        let mesh = grid_snapshot(15, 11, |x, y| ((x + 2 * y) % 5) as f64 * 0.2);
        let ctx = WorkerContext::new(&mesh, 30f64.to_radians().cos());
        let sequential = SortedEdgeAdjacency
            .build(&ctx, &Executor::sequential(1024))
            .unwrap();
        let parallel = SortedEdgeAdjacency
            .build(&ctx, &Executor::with_workers(3, 10))
            .unwrap();
        assert_eq!(sequential, parallel);
    }
}
