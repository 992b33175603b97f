//! Connected components of the facet adjacency graph.
//!
//! Two facets belong to the same component when a path of adjacency edges
//! links them. Tagging uses an iterative depth-first traversal with an
//! explicit stack, so deep components never exhaust the call stack.
//!
//! The parallel variant runs in two passes:
//!
//! 1. Each contiguous chunk of facets is tagged using intra-chunk edges only.
//!    Tags come from a shared [`TagAllocator`] and are unique across chunks.
//!    Edges that leave the chunk are appended to an [`AppendBuffer`].
//! 2. A merge graph links two chunk-local tags whenever a recorded edge joins
//!    their facets. Tagging that small graph gives the global components.
//!
//! Both variants finish with the same canonical numbering (components ordered
//! by their first facet), so they return identical tag tables.

use std::cmp::Reverse;

use tracing::{debug, info};

use crate::adjacency::AdjacencyTable;
use crate::error::MeshResult;
use crate::parallel::{AppendBuffer, Executor, TagAllocator, pack_pair, unpack_pair};

/// Marker for facets not yet visited.
const UNTAGGED: u32 = u32::MAX;

/// Component tag of every facet; tags are dense from 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTable {
    tags: Vec<u32>,
    component_count: usize,
}

impl TagTable {
    /// Tag of each facet.
    #[inline]
    pub fn tags(&self) -> &[u32] {
        &self.tags
    }

    /// Tag of one facet.
    #[inline]
    pub fn tag(&self, facet: usize) -> u32 {
        self.tags[facet]
    }

    /// Number of distinct tags.
    #[inline]
    pub fn component_count(&self) -> usize {
        self.component_count
    }

    /// Facet indices of each component, indexed by tag.
    pub fn components(&self) -> Vec<Vec<u32>> {
        let mut components = vec![Vec::new(); self.component_count];
        for (facet, &tag) in self.tags.iter().enumerate() {
            components[tag as usize].push(facet as u32);
        }
        components
    }

    /// Summarize component sizes.
    pub fn analyze(&self) -> ComponentAnalysis {
        let mut sizes = vec![0usize; self.component_count];
        for &tag in &self.tags {
            sizes[tag as usize] += 1;
        }
        let mut sizes_desc = sizes.clone();
        sizes_desc.sort_unstable_by_key(|&s| Reverse(s));
        ComponentAnalysis {
            component_count: self.component_count,
            largest_component_size: sizes_desc.first().copied().unwrap_or(0),
            smallest_component_size: sizes_desc.last().copied().unwrap_or(0),
            sizes,
        }
    }

    /// Renumber tags in order of first appearance.
    fn canonical(tags: Vec<u32>) -> Self {
        let mut remap = vec![UNTAGGED; tags.iter().map(|&t| t as usize + 1).max().unwrap_or(0)];
        let mut next = 0u32;
        let tags = tags
            .into_iter()
            .map(|tag| {
                let slot = &mut remap[tag as usize];
                if *slot == UNTAGGED {
                    *slot = next;
                    next += 1;
                }
                *slot
            })
            .collect();
        Self {
            tags,
            component_count: next as usize,
        }
    }
}

/// Result of connected component analysis.
#[derive(Debug, Clone)]
pub struct ComponentAnalysis {
    /// Number of connected components found.
    pub component_count: usize,
    /// Facet count of each component, indexed by tag.
    pub sizes: Vec<usize>,
    /// Size of the largest component (number of facets).
    pub largest_component_size: usize,
    /// Size of the smallest component (number of facets).
    pub smallest_component_size: usize,
}

impl ComponentAnalysis {
    /// Check if the mesh is a single smooth component.
    pub fn is_connected(&self) -> bool {
        self.component_count == 1
    }
}

impl std::fmt::Display for ComponentAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Component Analysis:")?;
        writeln!(f, "  Smooth components: {}", self.component_count)?;
        if self.component_count > 0 {
            writeln!(
                f,
                "  Largest component: {} facets",
                self.largest_component_size
            )?;
            writeln!(
                f,
                "  Smallest component: {} facets",
                self.smallest_component_size
            )?;
        }
        Ok(())
    }
}

/// Undirected graph in compressed rows.
#[derive(Debug, Clone)]
pub struct FacetGraph {
    offsets: Vec<usize>,
    targets: Vec<u32>,
}

impl FacetGraph {
    /// Build from edges; each edge is stored in both directions.
    pub fn from_edges(node_count: usize, edges: &[(u32, u32)]) -> Self {
        let mut degree = vec![0usize; node_count + 1];
        for &(a, b) in edges {
            degree[a as usize + 1] += 1;
            degree[b as usize + 1] += 1;
        }
        for i in 1..degree.len() {
            degree[i] += degree[i - 1];
        }
        let offsets = degree;

        let mut cursor = offsets.clone();
        let mut targets = vec![0u32; offsets[node_count]];
        for &(a, b) in edges {
            targets[cursor[a as usize]] = b;
            cursor[a as usize] += 1;
            targets[cursor[b as usize]] = a;
            cursor[b as usize] += 1;
        }
        Self { offsets, targets }
    }

    /// Undirected view of an adjacency table.
    pub fn from_adjacency(adjacency: &AdjacencyTable) -> Self {
        let edges: Vec<(u32, u32)> = adjacency.pairs().collect();
        Self::from_edges(adjacency.facet_count(), &edges)
    }

    /// Number of nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Neighbours of `node`.
    #[inline]
    pub fn neighbors(&self, node: usize) -> &[u32] {
        &self.targets[self.offsets[node]..self.offsets[node + 1]]
    }
}

/// Tag every untagged node of `graph` by iterative depth-first traversal.
///
/// Nodes are scanned in order; each untagged node seeds a component with the
/// tag returned by `next_tag`. `tags` must have one slot per node.
fn depth_first_tags(graph: &FacetGraph, tags: &mut [u32], mut next_tag: impl FnMut() -> u32) {
    let mut cursor = vec![0usize; graph.node_count()];
    let mut stack: Vec<usize> = Vec::new();

    for seed in 0..graph.node_count() {
        if tags[seed] != UNTAGGED {
            continue;
        }
        let tag = next_tag();
        tags[seed] = tag;
        stack.push(seed);

        while let Some(&top) = stack.last() {
            let neighbors = graph.neighbors(top);
            match neighbors.get(cursor[top]) {
                Some(&next) => {
                    cursor[top] += 1;
                    let next = next as usize;
                    if tags[next] == UNTAGGED {
                        tags[next] = tag;
                        stack.push(next);
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }
    }
}

/// Tag components on the calling thread.
pub fn label_components(adjacency: &AdjacencyTable) -> TagTable {
    let graph = FacetGraph::from_adjacency(adjacency);
    let mut tags = vec![UNTAGGED; adjacency.facet_count()];
    let mut next = 0u32;
    depth_first_tags(&graph, &mut tags, || {
        let tag = next;
        next += 1;
        tag
    });
    TagTable {
        tags,
        component_count: next as usize,
    }
}

/// Tag components with the two-pass chunked algorithm.
pub fn label_components_chunked(
    adjacency: &AdjacencyTable,
    executor: &Executor,
    chunk_len: usize,
) -> MeshResult<TagTable> {
    let facet_count = adjacency.facet_count();
    let chunk_len = chunk_len.max(1);
    let allocator = TagAllocator::new();
    let crossings = AppendBuffer::with_capacity(facet_count * 3);
    let mut tags = vec![UNTAGGED; facet_count];

    // Pass 1: local tags per chunk, cross-chunk edges recorded.
    executor.for_each_chunk_mut("components", &mut tags, chunk_len, |chunk, local| {
        let start = chunk * chunk_len;
        let end = start + local.len();
        let inside = |f: u32| (start..end).contains(&(f as usize));

        let mut edges = Vec::new();
        for facet in start..end {
            for neighbor in adjacency.neighbors(facet).filter(|&n| inside(n)) {
                edges.push(((facet - start) as u32, neighbor - start as u32));
            }
        }
        let graph = FacetGraph::from_edges(local.len(), &edges);
        depth_first_tags(&graph, local, || allocator.allocate());

        let mut records = Vec::new();
        for facet in start..end {
            for neighbor in adjacency.neighbors(facet).filter(|&n| !inside(n)) {
                records.push(pack_pair(local[facet - start], neighbor));
            }
        }
        crossings.append(&records)
    })?;

    // Pass 2: merge local tags linked by a crossing edge.
    let local_count = allocator.count();
    let merge_edges: Vec<(u32, u32)> = crossings
        .into_vec()
        .into_iter()
        .map(unpack_pair)
        .map(|(tag, other)| (tag, tags[other as usize]))
        .filter(|(a, b)| a != b)
        .collect();
    let merge_graph = FacetGraph::from_edges(local_count, &merge_edges);
    let mut global = vec![UNTAGGED; local_count];
    let mut next = 0u32;
    depth_first_tags(&merge_graph, &mut global, || {
        let tag = next;
        next += 1;
        tag
    });

    debug!(
        local_components = local_count,
        merge_edges = merge_edges.len(),
        components = next,
        "Merged chunk components"
    );

    executor.for_each_chunk_mut("tag remap", &mut tags, chunk_len, |_, chunk| {
        for tag in chunk.iter_mut() {
            *tag = global[*tag as usize];
        }
        Ok(())
    })?;

    Ok(TagTable::canonical(tags))
}

/// Tag components, choosing the chunked algorithm on a parallel executor.
pub fn connected_components(
    adjacency: &AdjacencyTable,
    executor: &Executor,
) -> MeshResult<TagTable> {
    let facet_count = adjacency.facet_count();
    let table = if executor.is_parallel() && facet_count > 1 {
        let chunk_len = facet_count.div_ceil(executor.workers());
        label_components_chunked(adjacency, executor, chunk_len)?
    } else {
        label_components(adjacency)
    };

    info!(
        facets = facet_count,
        components = table.component_count(),
        "Connected components tagged"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: usize) -> AdjacencyTable {
        let lists: Vec<Vec<u32>> = (0..len)
            .map(|i| {
                let mut l = Vec::new();
                if i > 0 {
                    l.push(i as u32 - 1);
                }
                if i + 1 < len {
                    l.push(i as u32 + 1);
                }
                l
            })
            .collect();
        AdjacencyTable::from_lists(&lists)
    }

    fn create_three_components() -> AdjacencyTable {
        // {0, 2, 4}, {1, 3}, {5}
        AdjacencyTable::from_lists(&[vec![2], vec![3], vec![0, 4], vec![1], vec![2], vec![]])
    }

    #[test]
    fn test_empty_table() {
        let tags = label_components(&AdjacencyTable::empty(0));
        assert_eq!(tags.component_count(), 0);
        assert!(tags.tags().is_empty());
    }

    #[test]
    fn test_isolated_facets() {
        let tags = label_components(&AdjacencyTable::empty(4));
        assert_eq!(tags.tags(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_three_components() {
        let tags = label_components(&create_three_components());
        assert_eq!(tags.component_count(), 3);
        assert_eq!(tags.tags(), &[0, 1, 0, 1, 0, 2]);

        let analysis = tags.analyze();
        assert_eq!(analysis.sizes, vec![3, 2, 1]);
        assert_eq!(analysis.largest_component_size, 3);
        assert_eq!(analysis.smallest_component_size, 1);
        assert!(!analysis.is_connected());
        assert!(format!("{}", analysis).contains("Smooth components: 3"));
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let tags = label_components(&chain(200_000));
        assert_eq!(tags.component_count(), 1);
    }

    #[test]
    fn test_one_way_edge_still_connects() {
        // 1 lists 0 but 0 does not list 1.
        let table = AdjacencyTable::from_lists(&[vec![], vec![0]]);
        assert_eq!(label_components(&table).component_count(), 1);
    }

    #[test]
    fn test_chunked_matches_sequential() {
        let table = create_three_components();
        let executor = Executor::with_workers(3, 2);
        for chunk_len in 1..=6 {
            let chunked = label_components_chunked(&table, &executor, chunk_len).unwrap();
            assert_eq!(chunked, label_components(&table), "chunk_len {}", chunk_len);
        }
    }

    #[test]
    fn test_chunked_chain_merges_across_every_chunk() {
        let table = chain(1000);
        let executor = Executor::with_workers(4, 16);
        let tags = label_components_chunked(&table, &executor, 7).unwrap();
        assert_eq!(tags.component_count(), 1);
        assert!(tags.tags().iter().all(|&t| t == 0));
    }

    #[test]
    fn test_components_lists() {
        let tags = label_components(&create_three_components());
        assert_eq!(tags.components(), vec![vec![0, 2, 4], vec![1, 3], vec![5]]);
    }

    #[test]
    fn test_dispatch_uses_chunked_when_parallel() {
        let table = chain(50);
        let parallel = connected_components(&table, &Executor::with_workers(4, 8)).unwrap();
        let sequential = connected_components(&table, &Executor::sequential(8)).unwrap();
        assert_eq!(parallel, sequential);
    }
}
