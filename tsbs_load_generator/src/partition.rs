//! Splitting a dataset into fixed-size chunks and dealing them out to workers.

use std::sync::Arc;

use tracing::debug;

use crate::{
    InvalidConfiguration,
    dataset::{Chunk, Dataset},
    verify::{SplitIntegrityError, verify_assignment, verify_chunks},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    InvalidConfiguration(#[from] InvalidConfiguration),

    #[error(transparent)]
    SplitIntegrity(#[from] SplitIntegrityError),
}

/// The chunks each worker sends, indexed by worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerAssignment {
    workers: Vec<Vec<Chunk>>,
}

impl WorkerAssignment {
    /// Wrap pre-built groups, one per worker.
    pub fn from_groups(workers: Vec<Vec<Chunk>>) -> Self {
        Self { workers }
    }

    pub fn workers(&self) -> &[Vec<Chunk>] {
        &self.workers
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Total rows across every worker.
    pub fn row_count(&self) -> usize {
        self.workers.iter().flatten().map(Chunk::len).sum()
    }

    pub fn into_workers(self) -> Vec<Vec<Chunk>> {
        self.workers
    }
}

/// Split `dataset` into consecutive chunks of `chunk_row_count` rows; the last one may be
/// shorter. An empty dataset gives no chunks.
pub fn chunk_up(
    dataset: &Arc<Dataset>,
    chunk_row_count: usize,
) -> Result<Vec<Chunk>, InvalidConfiguration> {
    if chunk_row_count == 0 {
        return Err(InvalidConfiguration(
            "chunk row count must be at least 1".to_owned(),
        ));
    }
    let n = dataset.len();
    Ok((0..n)
        .step_by(chunk_row_count)
        .map(|start| Chunk::new(Arc::clone(dataset), start..(start + chunk_row_count).min(n)))
        .collect())
}

/// Deal chunk `i` to worker `i % workers`, keeping chunk order within each worker.
pub fn assign_to_workers(
    chunks: Vec<Chunk>,
    workers: usize,
) -> Result<WorkerAssignment, InvalidConfiguration> {
    if workers == 0 {
        return Err(InvalidConfiguration(
            "worker count must be at least 1".to_owned(),
        ));
    }
    let per_worker = chunks.len().div_ceil(workers);
    let mut groups: Vec<Vec<Chunk>> = (0..workers)
        .map(|_| Vec::with_capacity(per_worker))
        .collect();
    for (i, chunk) in chunks.into_iter().enumerate() {
        groups[i % workers].push(chunk);
    }
    Ok(WorkerAssignment::from_groups(groups))
}

/// Chunk, assign and verify in one go.
///
/// Configuration is checked before any chunk is built. The split is verified both ways
/// before it is returned.
pub fn chunk_up_by_worker(
    dataset: &Arc<Dataset>,
    workers: usize,
    chunk_row_count: usize,
) -> Result<WorkerAssignment, Error> {
    if workers == 0 {
        return Err(InvalidConfiguration("worker count must be at least 1".to_owned()).into());
    }
    let chunks = chunk_up(dataset, chunk_row_count)?;
    verify_chunks(dataset, &chunks)?;
    let chunk_count = chunks.len();
    let assignment = assign_to_workers(chunks, workers)?;
    verify_assignment(dataset, &assignment)?;
    debug!(
        rows = dataset.len(),
        chunks = chunk_count,
        workers,
        "split dataset"
    );
    Ok(assignment)
}
