//! The in-memory `cpu` dataset: seeded generation, column storage and zero-copy chunk views.

use std::{fmt, ops::Range, sync::Arc};

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

use crate::{
    InvalidConfiguration,
    specification::{
        ChoiceTables, DOUBLE_COLUMNS, DOUBLE_COUNT, SAMPLE_INTERVAL_NANOS, START_TIMESTAMP_NANOS,
        SYMBOL_COLUMNS, SYMBOL_COUNT,
    },
};

/// Lower and upper bound of every `usage_*` column.
const USAGE_MIN: f64 = 0.0;
const USAGE_MAX: f64 = 100.0;

/// What to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSpec {
    /// Seed for the single random number generator used for the whole dataset.
    pub seed: u64,
    pub row_count: usize,
    /// Number of distinct hosts; row `i` belongs to `host_{i % scale}`.
    pub scale: usize,
}

/// An ordered, column-oriented set of `cpu` rows.
///
/// Row `i` is the `i`-th element of every column. Symbol values are handles into the
/// [`ChoiceTables`] (or the host name list), never per-row copies.
pub struct Dataset {
    symbols: [Vec<Arc<str>>; SYMBOL_COUNT],
    doubles: [Vec<f64>; DOUBLE_COUNT],
    timestamps: Vec<i64>,
}

impl Dataset {
    /// Generate `spec.row_count` rows. The same spec and tables always produce the same rows.
    pub fn generate(spec: &DatasetSpec, tables: &ChoiceTables) -> Result<Self, InvalidConfiguration> {
        if spec.scale == 0 {
            return Err(InvalidConfiguration("scale must be at least 1".to_owned()));
        }
        if let Some(table) = tables.first_empty() {
            return Err(InvalidConfiguration(format!(
                "choice table {table} must not be empty"
            )));
        }
        let last_offset = i64::try_from(spec.row_count.saturating_sub(1))
            .ok()
            .and_then(|i| i.checked_mul(SAMPLE_INTERVAL_NANOS))
            .and_then(|offset| offset.checked_add(START_TIMESTAMP_NANOS));
        if last_offset.is_none() {
            return Err(InvalidConfiguration(format!(
                "{} rows do not fit in a nanosecond timestamp range",
                spec.row_count
            )));
        }

        let n = spec.row_count;
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let hosts: Vec<Arc<str>> = (0..spec.scale.min(n))
            .map(|i| Arc::from(format!("host_{i}")))
            .collect();

        let mut symbols: [Vec<Arc<str>>; SYMBOL_COUNT] =
            std::array::from_fn(|_| Vec::with_capacity(n));
        let mut doubles: [Vec<f64>; DOUBLE_COUNT] = std::array::from_fn(|_| Vec::with_capacity(n));
        let mut timestamps = Vec::with_capacity(n);

        let mut usage: [f64; DOUBLE_COUNT] =
            std::array::from_fn(|_| rng.sample::<f64, _>(StandardNormal));

        for i in 0..n {
            let region = pick(&mut rng, &tables.regions);
            let row: [&Arc<str>; SYMBOL_COUNT] = [
                &hosts[i % spec.scale],
                &region.name,
                pick(&mut rng, &region.datacenters),
                pick(&mut rng, &tables.racks),
                pick(&mut rng, &tables.os),
                pick(&mut rng, &tables.arch),
                pick(&mut rng, &tables.team),
                pick(&mut rng, &tables.service),
                pick(&mut rng, &tables.service_version),
                pick(&mut rng, &tables.service_environment),
            ];
            for (column, value) in symbols.iter_mut().zip(row) {
                column.push(Arc::clone(value));
            }

            for (column, current) in doubles.iter_mut().zip(usage.iter_mut()) {
                let step: f64 = rng.sample(StandardNormal);
                *current = (*current + step).clamp(USAGE_MIN, USAGE_MAX);
                column.push(*current);
            }

            // bounded by the overflow check above
            timestamps.push(START_TIMESTAMP_NANOS + i as i64 * SAMPLE_INTERVAL_NANOS);
        }

        Ok(Self {
            symbols,
            doubles,
            timestamps,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Values of the symbol column at `index` in [`SYMBOL_COLUMNS`].
    pub fn symbol_column(&self, index: usize) -> &[Arc<str>] {
        &self.symbols[index]
    }

    /// Values of the double column at `index` in [`DOUBLE_COLUMNS`].
    pub fn double_column(&self, index: usize) -> &[f64] {
        &self.doubles[index]
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    /// The row at `index`.
    ///
    /// # Panics
    ///
    /// If `index` is out of bounds.
    pub fn row(&self, index: usize) -> Row<'_> {
        assert!(index < self.len(), "row {index} out of bounds");
        Row {
            dataset: self,
            index,
        }
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = Row<'_>> + '_ {
        (0..self.len()).map(|index| Row {
            dataset: self,
            index,
        })
    }

    /// First and last timestamp, or `None` for an empty dataset.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = *self.timestamps.first()?;
        let last = *self.timestamps.last()?;
        Some((
            DateTime::from_timestamp_nanos(first),
            DateTime::from_timestamp_nanos(last),
        ))
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("rows", &self.len())
            .field("time_range", &self.time_range())
            .finish_non_exhaustive()
    }
}

fn pick<'a, T>(rng: &mut StdRng, values: &'a [T]) -> &'a T {
    &values[rng.gen_range(0..values.len())]
}

/// A borrowed view of one row.
///
/// Equality compares values, not positions: two rows are equal when their timestamps, every
/// symbol string and the bit pattern of every double match.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    dataset: &'a Dataset,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn symbol(&self, column: usize) -> &'a str {
        &self.dataset.symbols[column][self.index]
    }

    pub fn double(&self, column: usize) -> f64 {
        self.dataset.doubles[column][self.index]
    }

    pub fn timestamp(&self) -> i64 {
        self.dataset.timestamps[self.index]
    }

    pub fn symbols(&self) -> [(&'static str, &'a str); SYMBOL_COUNT] {
        std::array::from_fn(|column| (SYMBOL_COLUMNS[column], self.symbol(column)))
    }

    pub fn doubles(&self) -> [(&'static str, f64); DOUBLE_COUNT] {
        std::array::from_fn(|column| (DOUBLE_COLUMNS[column], self.double(column)))
    }
}

impl PartialEq for Row<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp() == other.timestamp()
            && (0..SYMBOL_COUNT).all(|c| self.symbol(c) == other.symbol(c))
            && (0..DOUBLE_COUNT).all(|c| self.double(c).to_bits() == other.double(c).to_bits())
    }
}

impl fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("index", &self.index)
            .field("timestamp", &self.timestamp())
            .field("symbols", &self.symbols())
            .field("doubles", &self.doubles())
            .finish()
    }
}

/// A contiguous range of rows of a shared [`Dataset`].
///
/// Cloning a chunk clones the `Arc`, never the rows.
#[derive(Clone)]
pub struct Chunk {
    dataset: Arc<Dataset>,
    rows: Range<usize>,
}

impl Chunk {
    /// # Panics
    ///
    /// If `rows` does not lie within the dataset.
    pub fn new(dataset: Arc<Dataset>, rows: Range<usize>) -> Self {
        assert!(
            rows.start <= rows.end && rows.end <= dataset.len(),
            "chunk {rows:?} out of bounds for {} rows",
            dataset.len()
        );
        Self { dataset, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row indices of the dataset covered by this chunk.
    pub fn range(&self) -> Range<usize> {
        self.rows.clone()
    }

    pub fn symbol_column(&self, index: usize) -> &[Arc<str>] {
        &self.dataset.symbols[index][self.rows.clone()]
    }

    pub fn double_column(&self, index: usize) -> &[f64] {
        &self.dataset.doubles[index][self.rows.clone()]
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.dataset.timestamps[self.rows.clone()]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = Row<'_>> + '_ {
        self.rows.clone().map(|index| Row {
            dataset: &self.dataset,
            index,
        })
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk").field("rows", &self.rows).finish()
    }
}
