//! Parallel execution engine.
//!
//! Work is split into contiguous chunks of facets. Each chunk job reads the
//! shared, immutable [`WorkerContext`] and writes only into its own output
//! range, so no locking is needed. The two places where workers must share a
//! growable output use atomic offset reservation:
//!
//! - [`TagAllocator`] hands out globally unique component tags.
//! - [`AppendBuffer`] collects cross-chunk records into one preallocated
//!   buffer, each worker reserving a private region with `fetch_add`.
//!
//! An [`Executor`] owns a rayon thread pool built for one processing run and
//! dropped with it. Below the configured point-count threshold it holds no
//! pool and runs the same chunk functions on the calling thread.

use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::error::{MeshError, MeshResult};
use crate::params::RenderMeshParams;
use crate::tracing_ext::log_perf_section;
use crate::types::{Facet, MeshSnapshot};

/// How an [`Executor`] runs its chunk jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Everything runs on the calling thread.
    Sequential,
    /// Chunks are distributed over a dedicated thread pool.
    Parallel { workers: usize },
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Parallel { workers } => write!(f, "parallel ({} workers)", workers),
        }
    }
}

/// Runs chunked jobs either sequentially or on a per-run thread pool.
pub struct Executor {
    pool: Option<rayon::ThreadPool>,
    chunk_size: usize,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("mode", &self.mode())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl Executor {
    /// An executor that runs every job on the calling thread.
    pub fn sequential(chunk_size: usize) -> Self {
        Self {
            pool: None,
            chunk_size: chunk_size.max(1),
        }
    }

    /// An executor backed by a fresh pool of `workers` threads.
    ///
    /// If the pool cannot be created the executor degrades to sequential
    /// mode with a warning.
    pub fn with_workers(workers: usize, chunk_size: usize) -> Self {
        let workers = workers.max(1);
        let built = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("render-mesh-worker-{}", index))
            .build();

        match built {
            Ok(pool) => Self {
                pool: Some(pool),
                chunk_size: chunk_size.max(1),
            },
            Err(e) => {
                warn!(
                    workers,
                    error = %e,
                    "Could not start worker pool, falling back to sequential processing"
                );
                Self::sequential(chunk_size)
            }
        }
    }

    /// Pick the execution mode for a mesh of `point_count` points.
    pub fn for_mesh(params: &RenderMeshParams, point_count: usize) -> Self {
        if !params.enable_parallel || point_count < params.parallel_threshold {
            debug!(
                point_count,
                threshold = params.parallel_threshold,
                enabled = params.enable_parallel,
                "Using sequential execution"
            );
            return Self::sequential(params.chunk_size);
        }

        let workers = params.worker_count.unwrap_or_else(available_workers);
        let executor = Self::with_workers(workers, params.chunk_size);
        debug!(point_count, mode = %executor.mode(), "Using parallel execution");
        executor
    }

    /// Current execution mode.
    pub fn mode(&self) -> ExecutionMode {
        match &self.pool {
            Some(pool) => ExecutionMode::Parallel {
                workers: pool.current_num_threads(),
            },
            None => ExecutionMode::Sequential,
        }
    }

    /// Whether jobs run on a worker pool.
    #[inline]
    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Number of threads jobs run on.
    pub fn workers(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(1, rayon::ThreadPool::current_num_threads)
    }

    /// Configured chunk size.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunk length to use for `len` items: the whole range when sequential,
    /// never more than `len` when parallel.
    #[inline]
    pub fn chunk_len(&self, len: usize) -> usize {
        if self.is_parallel() {
            self.chunk_size.min(len.max(1))
        } else {
            len.max(1)
        }
    }

    /// Run `job` on disjoint mutable chunks of `data`.
    ///
    /// The job receives the chunk index and its slice. The first error, or a
    /// panic in any worker, aborts the stage.
    pub fn for_each_chunk_mut<T, F>(
        &self,
        stage: &'static str,
        data: &mut [T],
        chunk_len: usize,
        job: F,
    ) -> MeshResult<()>
    where
        T: Send,
        F: Fn(usize, &mut [T]) -> MeshResult<()> + Send + Sync,
    {
        let chunk_len = chunk_len.max(1);
        trace!(
            stage,
            items = data.len(),
            chunks = data.len().div_ceil(chunk_len),
            "Dispatching chunk jobs"
        );
        self.guard(stage, || match &self.pool {
            Some(pool) => pool.install(|| {
                data.par_chunks_mut(chunk_len)
                    .enumerate()
                    .try_for_each(|(index, chunk)| job(index, chunk))
            }),
            None => data
                .chunks_mut(chunk_len)
                .enumerate()
                .try_for_each(|(index, chunk)| job(index, chunk)),
        })
    }

    /// Run `job` once per range and collect the results in range order.
    pub fn map_ranges<R, F>(
        &self,
        stage: &'static str,
        ranges: &[Range<usize>],
        job: F,
    ) -> MeshResult<Vec<R>>
    where
        R: Send,
        F: Fn(usize, Range<usize>) -> MeshResult<R> + Send + Sync,
    {
        trace!(stage, ranges = ranges.len(), "Dispatching range jobs");
        self.guard(stage, || match &self.pool {
            Some(pool) => pool.install(|| {
                ranges
                    .par_iter()
                    .enumerate()
                    .map(|(index, range)| job(index, range.clone()))
                    .collect()
            }),
            None => ranges
                .iter()
                .enumerate()
                .map(|(index, range)| job(index, range.clone()))
                .collect(),
        })
    }

    /// Sort `data`, on the pool when there is one.
    pub fn sort_unstable<T: Ord + Send>(&self, stage: &'static str, data: &mut [T]) -> MeshResult<()> {
        let _perf = log_perf_section(stage);
        self.guard(stage, || {
            match &self.pool {
                Some(pool) => pool.install(|| data.par_sort_unstable()),
                None => data.sort_unstable(),
            }
            Ok(())
        })
    }

    /// Turn a worker panic into [`MeshError::WorkerFailed`].
    fn guard<R>(&self, stage: &'static str, body: impl FnOnce() -> MeshResult<R>) -> MeshResult<R> {
        match catch_unwind(AssertUnwindSafe(body)) {
            Ok(result) => result,
            Err(payload) => {
                let details = panic_message(payload.as_ref());
                warn!(stage, details = %details, "Worker panicked, aborting stage");
                Err(MeshError::worker_failed(stage, details))
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Number of worker threads to use when none is configured.
pub fn available_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Split `0..len` into contiguous ranges of at most `chunk_len` items.
pub fn chunk_ranges(len: usize, chunk_len: usize) -> Vec<Range<usize>> {
    let chunk_len = chunk_len.max(1);
    (0..len)
        .step_by(chunk_len)
        .map(|start| start..start.saturating_add(chunk_len).min(len))
        .collect()
}

/// Split a sorted slice into ranges of roughly `chunk_len` items without
/// separating runs of equal keys.
pub fn aligned_chunk_ranges<T, K, F>(sorted: &[T], chunk_len: usize, key_of: F) -> Vec<Range<usize>>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let chunk_len = chunk_len.max(1);
    let mut ranges = Vec::with_capacity(sorted.len() / chunk_len + 1);
    let mut start = 0;
    while start < sorted.len() {
        let mut end = start.saturating_add(chunk_len).min(sorted.len());
        while end < sorted.len() && key_of(&sorted[end]) == key_of(&sorted[end - 1]) {
            end += 1;
        }
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Read-only view of the mesh buffers shared by every chunk job.
#[derive(Debug, Clone, Copy)]
pub struct WorkerContext<'a> {
    pub points: &'a [Point3<f64>],
    pub facets: &'a [Facet],
    pub normals: &'a [Vector3<f64>],
    pub areas: &'a [f64],
    /// Cosine of the split angle.
    pub split_angle_cos: f64,
}

impl<'a> WorkerContext<'a> {
    /// Borrow a snapshot's buffers.
    pub fn new(snapshot: &'a MeshSnapshot, split_angle_cos: f64) -> Self {
        Self {
            points: &snapshot.points,
            facets: &snapshot.facets,
            normals: &snapshot.normals,
            areas: &snapshot.areas,
            split_angle_cos,
        }
    }

    /// Number of facets.
    #[inline]
    pub fn facet_count(&self) -> usize {
        self.facets.len()
    }

    /// Number of points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Whether the angle between two facets' normals is within the split angle.
    #[inline]
    pub fn within_split_angle(&self, a: usize, b: usize) -> bool {
        self.normals[a].dot(&self.normals[b]) >= self.split_angle_cos
    }
}

/// Hands out consecutive tags to concurrent workers.
#[derive(Debug, Default)]
pub struct TagAllocator {
    next: AtomicU32,
}

impl TagAllocator {
    /// Allocator starting at tag 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next tag.
    #[inline]
    pub fn allocate(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of tags handed out so far.
    pub fn count(&self) -> usize {
        self.next.load(Ordering::Acquire) as usize
    }
}

/// Fixed-capacity buffer that concurrent workers append to.
///
/// Each `append` reserves a private offset range with one `fetch_add`, then
/// fills it. Records are `u64`; see [`pack_pair`].
#[derive(Debug)]
pub struct AppendBuffer {
    slots: Box<[AtomicU64]>,
    cursor: AtomicUsize,
}

impl AppendBuffer {
    /// Allocate room for `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Append `records` as one contiguous block.
    pub fn append(&self, records: &[u64]) -> MeshResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let offset = self.cursor.fetch_add(records.len(), Ordering::AcqRel);
        let end = offset + records.len();
        if end > self.slots.len() {
            return Err(MeshError::worker_failed(
                "append",
                format!(
                    "append buffer overflow: {} records past capacity {}",
                    end - self.slots.len(),
                    self.slots.len()
                ),
            ));
        }
        for (slot, &record) in self.slots[offset..end].iter().zip(records) {
            slot.store(record, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Number of records appended.
    pub fn len(&self) -> usize {
        self.cursor.load(Ordering::Acquire).min(self.slots.len())
    }

    /// Whether nothing was appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the appended records.
    pub fn into_vec(self) -> Vec<u64> {
        let len = self.len();
        self.slots
            .into_vec()
            .into_iter()
            .take(len)
            .map(AtomicU64::into_inner)
            .collect()
    }
}

/// Pack two `u32` values into one record.
#[inline]
pub fn pack_pair(high: u32, low: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

/// Inverse of [`pack_pair`].
#[inline]
pub fn unpack_pair(record: u64) -> (u32, u32) {
    ((record >> 32) as u32, record as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ranges_cover_everything() {
        let ranges = chunk_ranges(10, 4);
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
        assert!(chunk_ranges(0, 4).is_empty());
    }

    #[test]
    fn test_aligned_chunks_keep_runs_together() {
        let keys = [1, 1, 2, 2, 2, 2, 3, 4, 4];
        let ranges = aligned_chunk_ranges(&keys, 3, |k| *k);
        assert_eq!(ranges, vec![0..6, 6..9]);
        for window in ranges.windows(2) {
            assert_ne!(keys[window[0].end - 1], keys[window[1].start]);
        }
    }

    #[test]
    fn test_sequential_mode_below_threshold() {
        let params = RenderMeshParams::default();
        let executor = Executor::for_mesh(&params, 10);
        assert_eq!(executor.mode(), ExecutionMode::Sequential);
        assert_eq!(executor.chunk_len(123), 123);
    }

    #[test]
    fn test_parallel_mode_above_threshold() {
        let params = RenderMeshParams::default()
            .with_parallel_threshold(0)
            .with_worker_count(2);
        let executor = Executor::for_mesh(&params, 10);
        assert_eq!(executor.mode(), ExecutionMode::Parallel { workers: 2 });
        assert_eq!(executor.chunk_len(123), 123);
        assert_eq!(executor.chunk_len(50_000), params.chunk_size);
    }

    #[test]
    fn test_oversized_chunk_size_is_clamped_to_input() {
        let executor = Executor::with_workers(2, usize::MAX);
        assert_eq!(executor.chunk_len(7), 7);
        assert_eq!(executor.chunk_len(0), 1);
        assert_eq!(chunk_ranges(5, usize::MAX), vec![0..5]);
        assert_eq!(aligned_chunk_ranges(&[1, 2, 3], usize::MAX, |k| *k), vec![0..3]);
    }

    #[test]
    fn test_for_each_chunk_writes_disjointly() {
        let executor = Executor::with_workers(3, 4);
        let mut data = vec![0usize; 17];
        executor
            .for_each_chunk_mut("test", &mut data, 4, |index, chunk| {
                for (offset, value) in chunk.iter_mut().enumerate() {
                    *value = index * 4 + offset;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(data, (0..17).collect::<Vec<_>>());
    }

    #[test]
    fn test_worker_panic_becomes_error() {
        let executor = Executor::with_workers(2, 2);
        let mut data = vec![0u8; 8];
        let result = executor.for_each_chunk_mut("explode", &mut data, 2, |index, _| {
            if index == 2 {
                panic!("chunk {} exploded", index);
            }
            Ok(())
        });
        match result {
            Err(MeshError::WorkerFailed { stage, details }) => {
                assert_eq!(stage, "explode");
                assert!(details.contains("exploded"));
            }
            other => panic!("expected WorkerFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_map_ranges_keeps_order() {
        let executor = Executor::with_workers(4, 1);
        let ranges = chunk_ranges(100, 7);
        let sums = executor
            .map_ranges("sum", &ranges, |_, range| Ok(range.sum::<usize>()))
            .unwrap();
        assert_eq!(sums.len(), ranges.len());
        assert_eq!(sums[0], (0..7).sum::<usize>());
        assert_eq!(sums.iter().sum::<usize>(), (0..100).sum::<usize>());
    }

    #[test]
    fn test_tag_allocator_is_unique_across_threads() {
        let allocator = TagAllocator::new();
        let executor = Executor::with_workers(4, 1);
        let ranges = chunk_ranges(64, 1);
        let mut tags = executor
            .map_ranges("tags", &ranges, |_, _| Ok(allocator.allocate()))
            .unwrap();
        tags.sort_unstable();
        assert_eq!(tags, (0..64).collect::<Vec<u32>>());
        assert_eq!(allocator.count(), 64);
    }

    #[test]
    fn test_append_buffer_reserves_private_regions() {
        let buffer = AppendBuffer::with_capacity(40);
        let executor = Executor::with_workers(4, 1);
        let ranges = chunk_ranges(10, 1);
        executor
            .map_ranges("append", &ranges, |index, _| {
                let records: Vec<u64> = (0..4).map(|k| pack_pair(index as u32, k)).collect();
                buffer.append(&records)
            })
            .unwrap();

        let mut records = buffer.into_vec();
        assert_eq!(records.len(), 40);
        records.sort_unstable();
        records.dedup();
        assert_eq!(records.len(), 40);
        assert_eq!(unpack_pair(records[5]), (1, 1));
    }

    #[test]
    fn test_append_buffer_overflow_is_an_error() {
        let buffer = AppendBuffer::with_capacity(2);
        assert!(buffer.append(&[1, 2, 3]).is_err());
    }
}
