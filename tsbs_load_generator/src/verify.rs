//! Checks that splitting the dataset into chunks and worker groups neither lost, duplicated
//! nor reordered rows.

use std::fmt;

use crate::{
    dataset::{Chunk, Dataset, Row},
    partition::WorkerAssignment,
};

/// Which reassembly failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Chunks concatenated in chunk order.
    ChunkOrder,
    /// Worker groups concatenated in worker order, then sorted by timestamp.
    WorkerAssignment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChunkOrder => write!(f, "chunk order"),
            Self::WorkerAssignment => write!(f, "worker assignment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SplitIntegrityError {
    #[error("split integrity ({stage}): reassembled {actual} rows, dataset has {expected}")]
    RowCount {
        stage: Stage,
        expected: usize,
        actual: usize,
    },

    #[error("split integrity ({stage}): row {index} differs from the dataset")]
    RowMismatch { stage: Stage, index: usize },
}

/// Concatenating `chunks` in order must give back exactly the rows of `dataset`.
pub fn verify_chunks(dataset: &Dataset, chunks: &[Chunk]) -> Result<(), SplitIntegrityError> {
    let rows = chunks.iter().flat_map(Chunk::rows);
    compare(Stage::ChunkOrder, dataset, rows)
}

/// Concatenating every worker's chunks in worker order and stably sorting by timestamp must
/// give back exactly the rows of `dataset`.
pub fn verify_assignment(
    dataset: &Dataset,
    assignment: &WorkerAssignment,
) -> Result<(), SplitIntegrityError> {
    let mut rows: Vec<Row<'_>> = assignment
        .workers()
        .iter()
        .flatten()
        .flat_map(Chunk::rows)
        .collect();
    rows.sort_by_key(Row::timestamp);
    compare(Stage::WorkerAssignment, dataset, rows)
}

fn compare<'a>(
    stage: Stage,
    dataset: &Dataset,
    rows: impl IntoIterator<Item = Row<'a>>,
) -> Result<(), SplitIntegrityError> {
    let mut actual = 0;
    for row in rows {
        // rows past the end are only counted, so a surplus shows up as a count mismatch
        if actual < dataset.len() && row != dataset.row(actual) {
            return Err(SplitIntegrityError::RowMismatch {
                stage,
                index: actual,
            });
        }
        actual += 1;
    }
    if actual == dataset.len() {
        Ok(())
    } else {
        Err(SplitIntegrityError::RowCount {
            stage,
            expected: dataset.len(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dataset::DatasetSpec,
        partition::{assign_to_workers, chunk_up},
        specification::ChoiceTables,
    };
    use pretty_assertions::assert_eq;

    fn dataset(row_count: usize) -> Arc<Dataset> {
        Arc::new(
            Dataset::generate(
                &DatasetSpec {
                    seed: 11,
                    row_count,
                    scale: 5,
                },
                &ChoiceTables::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn exact_split_passes() {
        let dataset = dataset(100);
        let chunks = chunk_up(&dataset, 10).unwrap();
        verify_chunks(&dataset, &chunks).unwrap();
        let assignment = assign_to_workers(chunks, 3).unwrap();
        verify_assignment(&dataset, &assignment).unwrap();
    }

    #[test]
    fn missing_chunk_is_detected() {
        let dataset = dataset(100);
        let mut chunks = chunk_up(&dataset, 10).unwrap();
        chunks.pop();
        assert_eq!(
            verify_chunks(&dataset, &chunks).unwrap_err(),
            SplitIntegrityError::RowCount {
                stage: Stage::ChunkOrder,
                expected: 100,
                actual: 90,
            }
        );
    }

    #[test]
    fn duplicated_chunk_is_detected() {
        let dataset = dataset(20);
        let chunks = vec![
            Chunk::new(Arc::clone(&dataset), 0..10),
            Chunk::new(Arc::clone(&dataset), 10..20),
            Chunk::new(Arc::clone(&dataset), 10..20),
        ];
        assert_eq!(
            verify_chunks(&dataset, &chunks).unwrap_err(),
            SplitIntegrityError::RowCount {
                stage: Stage::ChunkOrder,
                expected: 20,
                actual: 30,
            }
        );
    }

    #[test]
    fn swapped_chunks_are_detected() {
        let dataset = dataset(20);
        let chunks = vec![
            Chunk::new(Arc::clone(&dataset), 10..20),
            Chunk::new(Arc::clone(&dataset), 0..10),
        ];
        assert_eq!(
            verify_chunks(&dataset, &chunks).unwrap_err(),
            SplitIntegrityError::RowMismatch {
                stage: Stage::ChunkOrder,
                index: 0,
            }
        );
    }

    #[test]
    fn overlapping_assignment_is_detected() {
        let dataset = dataset(20);
        let assignment = WorkerAssignment::from_groups(vec![
            vec![Chunk::new(Arc::clone(&dataset), 0..12)],
            vec![Chunk::new(Arc::clone(&dataset), 8..20)],
        ]);
        let err = verify_assignment(&dataset, &assignment).unwrap_err();
        assert!(
            matches!(
                err,
                SplitIntegrityError::RowMismatch {
                    stage: Stage::WorkerAssignment,
                    ..
                }
            ),
            "got {err}"
        );
    }

    #[test]
    fn rows_from_another_dataset_are_detected() {
        let original = dataset(10);
        let other = Arc::new(
            Dataset::generate(
                &DatasetSpec {
                    seed: 12,
                    row_count: 10,
                    scale: 5,
                },
                &ChoiceTables::default(),
            )
            .unwrap(),
        );
        let chunks = vec![Chunk::new(other, 0..10)];
        assert_eq!(
            verify_chunks(&original, &chunks).unwrap_err(),
            SplitIntegrityError::RowMismatch {
                stage: Stage::ChunkOrder,
                index: 0,
            }
        );
    }

    #[test]
    fn error_is_a_plain_value() {
        let err = SplitIntegrityError::RowMismatch {
            stage: Stage::ChunkOrder,
            index: 3,
        };
        let reported = err;
        assert_eq!(err, reported);
        assert_eq!(
            err.to_string(),
            "split integrity (chunk order): row 3 differs from the dataset"
        );
    }
}
