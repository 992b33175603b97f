//! Property-based tests for adjacency, components and the full pipeline.
//!
//! Run with: cargo test -p render-mesh -- proptest

use nalgebra::Point3;
use proptest::prelude::*;
use render_mesh::components::{label_components, label_components_chunked};
use render_mesh::parallel::WorkerContext;
use render_mesh::{
    AdjacencyBuilder, AdjacencyTable, Executor, IncidenceAdjacency, MeshSnapshot, RenderMesh,
    RenderMeshParams, SourceMesh, TagTable, Transformation, UvProjection, connected_components,
};

// =============================================================================
// Strategies for generating random meshes
// =============================================================================

fn arb_position() -> impl Strategy<Value = Point3<f64>> {
    prop::array::uniform3(-10.0..10.0f64).prop_map(|[x, y, z]| Point3::new(x, y, z))
}

/// Triangle soup with distinct corner indices per facet.
fn arb_mesh(max_points: usize, max_facets: usize) -> impl Strategy<Value = SourceMesh> {
    (3..=max_points).prop_flat_map(move |num_points| {
        let n = num_points as u32;
        let facet = prop::array::uniform3(0..n)
            .prop_filter("distinct corners", |[a, b, c]| a != b && b != c && a != c);
        (
            prop::collection::vec(arb_position(), num_points),
            prop::collection::vec(facet, 1..=max_facets),
        )
            .prop_map(|(points, facets)| SourceMesh::new(points, facets))
    })
}

/// Triangulated grid with random heights: manifold, every facet has at
/// most three edge neighbours.
fn arb_heightfield() -> impl Strategy<Value = SourceMesh> {
    (2usize..10, 2usize..10).prop_flat_map(|(width, height)| {
        prop::collection::vec(-3.0..3.0f64, (width + 1) * (height + 1)).prop_map(move |heights| {
            let row = width + 1;
            let points = heights
                .iter()
                .enumerate()
                .map(|(i, &z)| Point3::new((i % row) as f64, (i / row) as f64, z))
                .collect();
            let row = row as u32;
            let mut facets = Vec::new();
            for y in 0..height as u32 {
                for x in 0..width as u32 {
                    let a = y * row + x;
                    facets.push([a, a + 1, a + row + 1]);
                    facets.push([a, a + row + 1, a + row]);
                }
            }
            SourceMesh::new(points, facets)
        })
    })
}

fn snapshot_of(mesh: &SourceMesh) -> MeshSnapshot {
    MeshSnapshot::from_geometry(mesh.points.clone(), mesh.facets.clone()).unwrap()
}

fn build(builder: &dyn AdjacencyBuilder, snapshot: &MeshSnapshot, executor: &Executor) -> AdjacencyTable {
    let ctx = WorkerContext::new(snapshot, 30f64.to_radians().cos());
    builder.build(&ctx, executor).unwrap()
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Reachability classes of the undirected adjacency graph.
fn brute_force_classes(adjacency: &AdjacencyTable) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..adjacency.facet_count()).collect();
    for (a, b) in adjacency.pairs() {
        let (ra, rb) = (find(&mut parent, a as usize), find(&mut parent, b as usize));
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }
    (0..parent.len()).map(|i| find(&mut parent, i)).collect()
}

fn assert_tags_match(tags: &TagTable, classes: &[usize]) {
    let tags = tags.tags();
    for a in 0..tags.len() {
        for b in (a + 1)..tags.len() {
            assert_eq!(
                tags[a] == tags[b],
                classes[a] == classes[b],
                "facets {a} and {b} disagree"
            );
        }
    }
}

// =============================================================================
// Adjacency
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn proptest_neighbours_share_an_edge(mesh in arb_mesh(20, 40)) {
        let snapshot = snapshot_of(&mesh);
        let table = build(&IncidenceAdjacency, &snapshot, &Executor::sequential(16));
        for (a, b) in table.pairs() {
            let shared = snapshot.facets[a as usize]
                .iter()
                .filter(|p| snapshot.facets[b as usize].contains(p))
                .count();
            prop_assert_eq!(shared, 2);
            prop_assert!(a != b);
        }
        for facet in 0..table.facet_count() {
            let row: Vec<u32> = table.neighbors(facet).collect();
            prop_assert!(row.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn proptest_heightfield_adjacency_is_symmetric(mesh in arb_heightfield()) {
        let snapshot = snapshot_of(&mesh);
        let table = build(&IncidenceAdjacency, &snapshot, &Executor::sequential(16));
        prop_assert!(table.is_symmetric());
    }

    #[test]
    fn proptest_parallel_adjacency_matches_sequential(mesh in arb_mesh(30, 60)) {
        let snapshot = snapshot_of(&mesh);
        let sequential = build(&IncidenceAdjacency, &snapshot, &Executor::sequential(16));
        let parallel = build(&IncidenceAdjacency, &snapshot, &Executor::with_workers(3, 7));
        prop_assert_eq!(sequential, parallel);
    }
}

#[cfg(feature = "vectorized")]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn proptest_sorted_edge_matches_incidence(mesh in arb_mesh(20, 60)) {
        use render_mesh::SortedEdgeAdjacency;

        let snapshot = snapshot_of(&mesh);
        let incidence = build(&IncidenceAdjacency, &snapshot, &Executor::sequential(16));
        let sorted = build(&SortedEdgeAdjacency, &snapshot, &Executor::sequential(16));
        let sorted_parallel = build(&SortedEdgeAdjacency, &snapshot, &Executor::with_workers(4, 5));
        prop_assert_eq!(&incidence, &sorted);
        prop_assert_eq!(&incidence, &sorted_parallel);
    }

    #[test]
    fn proptest_sorted_edge_matches_incidence_on_heightfields(mesh in arb_heightfield()) {
        use render_mesh::SortedEdgeAdjacency;

        let snapshot = snapshot_of(&mesh);
        let incidence = build(&IncidenceAdjacency, &snapshot, &Executor::sequential(16));
        let sorted = build(&SortedEdgeAdjacency, &snapshot, &Executor::with_workers(2, 9));
        prop_assert_eq!(incidence, sorted);
    }
}

// =============================================================================
// Components
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn proptest_components_match_reachability(mesh in arb_heightfield()) {
        let snapshot = snapshot_of(&mesh);
        let adjacency = build(&IncidenceAdjacency, &snapshot, &Executor::sequential(16));
        let classes = brute_force_classes(&adjacency);

        let sequential = connected_components(&adjacency, &Executor::sequential(16)).unwrap();
        let parallel = connected_components(&adjacency, &Executor::with_workers(4, 8)).unwrap();
        assert_tags_match(&sequential, &classes);
        prop_assert_eq!(sequential.tags(), parallel.tags());
    }

    #[test]
    fn proptest_chunked_tags_match_on_non_manifold_soups(
        mesh in arb_mesh(12, 40),
        chunk_len in 1usize..8,
    ) {
        let snapshot = snapshot_of(&mesh);
        let adjacency = build(&IncidenceAdjacency, &snapshot, &Executor::sequential(16));
        let classes = brute_force_classes(&adjacency);

        let sequential = label_components(&adjacency);
        let chunked =
            label_components_chunked(&adjacency, &Executor::with_workers(4, chunk_len), chunk_len)
                .unwrap();
        assert_tags_match(&sequential, &classes);
        prop_assert_eq!(sequential.tags(), chunked.tags());
    }

    #[test]
    fn proptest_tags_are_canonical(mesh in arb_mesh(20, 40)) {
        let snapshot = snapshot_of(&mesh);
        let adjacency = build(&IncidenceAdjacency, &snapshot, &Executor::sequential(16));
        let tags = connected_components(&adjacency, &Executor::with_workers(3, 4)).unwrap();
        let sequential = connected_components(&adjacency, &Executor::sequential(16)).unwrap();
        prop_assert_eq!(sequential.tags(), tags.tags());

        // Tags appear in increasing order of first use.
        let mut next = 0;
        for &tag in tags.tags() {
            prop_assert!(tag <= next);
            if tag == next {
                next += 1;
            }
        }
        prop_assert_eq!(next as usize, tags.component_count());
    }
}

// =============================================================================
// Full pipeline
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn proptest_output_has_no_dangling_indices(
        mesh in arb_mesh(20, 40),
        projection in prop_oneof![
            Just(UvProjection::None),
            Just(UvProjection::Cube),
            Just(UvProjection::Sphere),
            Just(UvProjection::Cylinder),
        ],
    ) {
        let params = RenderMeshParams::with_uv(projection);
        let out = RenderMesh::new(mesh.clone(), Transformation::identity(), &params).unwrap();

        prop_assert_eq!(out.count_facets(), mesh.facet_count());
        let point_count = out.count_points() as u32;
        prop_assert!(out.facets().iter().flatten().all(|&i| i < point_count));
        prop_assert_eq!(out.vnormals().map(<[_]>::len), Some(out.count_points()));
        if projection != UvProjection::None {
            prop_assert_eq!(out.uvmap().map(<[_]>::len), Some(out.count_points()));
        }
    }

    #[test]
    fn proptest_parallel_pipeline_matches_sequential(mesh in arb_heightfield()) {
        let sequential = RenderMesh::new(
            mesh.clone(),
            Transformation::identity(),
            &RenderMeshParams::default().with_parallel(false),
        )
        .unwrap();
        let parallel = RenderMesh::new(
            mesh,
            Transformation::identity(),
            &RenderMeshParams::default()
                .with_parallel_threshold(0)
                .with_worker_count(3)
                .with_chunk_size(11),
        )
        .unwrap();

        prop_assert_eq!(sequential.points(), parallel.points());
        prop_assert_eq!(sequential.facets(), parallel.facets());
        prop_assert_eq!(sequential.vnormals(), parallel.vnormals());
    }

    #[test]
    fn proptest_vnormals_are_unit_or_zero(mesh in arb_heightfield()) {
        let out = RenderMesh::new(mesh, Transformation::identity(), &RenderMeshParams::default())
            .unwrap();
        for normal in out.vnormals().unwrap() {
            let norm = normal.norm();
            prop_assert!(norm == 0.0 || (norm - 1.0).abs() < 1e-9, "norm {}", norm);
        }
    }
}
