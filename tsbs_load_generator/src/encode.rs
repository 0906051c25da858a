//! The two interchangeable ways of turning a chunk into line protocol.

use std::{fmt, io, sync::Arc};

use tsbs_line_protocol::{Buffer, Columns, TimestampNanos};

use crate::{
    dataset::{Chunk, Dataset},
    specification::{DOUBLE_COLUMNS, DOUBLE_COUNT, SYMBOL_COLUMNS, SYMBOL_COUNT, TABLE_NAME},
};

/// Signature shared by both encoders; a worker is handed one of these.
pub type EncodeFn = fn(&mut Buffer, &Chunk) -> Result<(), tsbs_line_protocol::Error>;

/// How chunks are fed to the line protocol [`Buffer`]. Both produce identical bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum EncodeStrategy {
    /// Hand each chunk's column slices to the buffer in one call.
    #[default]
    Columnar,
    /// Encode one row at a time.
    Rows,
}

impl EncodeStrategy {
    pub fn encode_fn(self) -> EncodeFn {
        match self {
            Self::Columnar => encode_columnar,
            Self::Rows => encode_rows,
        }
    }
}

impl fmt::Display for EncodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Columnar => write!(f, "columnar"),
            Self::Rows => write!(f, "rows"),
        }
    }
}

/// Append every row of `chunk` to `buf`, one [`Buffer::row`] call per row.
pub fn encode_rows(buf: &mut Buffer, chunk: &Chunk) -> Result<(), tsbs_line_protocol::Error> {
    for row in chunk.rows() {
        buf.row(
            TABLE_NAME,
            &row.symbols(),
            &row.doubles(),
            TimestampNanos::new(row.timestamp()),
        )?;
    }
    Ok(())
}

/// Append every row of `chunk` to `buf` with a single [`Buffer::columns`] call.
pub fn encode_columnar(buf: &mut Buffer, chunk: &Chunk) -> Result<(), tsbs_line_protocol::Error> {
    let symbols: [(&str, &[Arc<str>]); SYMBOL_COUNT] =
        std::array::from_fn(|i| (SYMBOL_COLUMNS[i], chunk.symbol_column(i)));
    let doubles: [(&str, &[f64]); DOUBLE_COUNT] =
        std::array::from_fn(|i| (DOUBLE_COLUMNS[i], chunk.double_column(i)));
    buf.columns(
        TABLE_NAME,
        &Columns {
            symbols: &symbols,
            doubles: &doubles,
            timestamps: chunk.timestamps(),
        },
    )
}

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("failed to encode rows {rows:?}: {source}")]
    Encode {
        rows: std::ops::Range<usize>,
        #[source]
        source: tsbs_line_protocol::Error,
    },

    #[error("failed to write line protocol: {0}")]
    Io(#[from] io::Error),
}

/// Write the whole dataset, in original row order, to `writer`.
///
/// Rows are encoded `chunk_row_count` at a time through a single reused buffer. Returns the
/// number of bytes written.
pub fn write_dataset<W: io::Write>(
    dataset: &Arc<Dataset>,
    strategy: EncodeStrategy,
    chunk_row_count: usize,
    mut writer: W,
) -> Result<usize, DumpError> {
    let encode = strategy.encode_fn();
    let chunk_row_count = chunk_row_count.max(1);
    let mut buf = Buffer::new();
    let mut written = 0;
    for start in (0..dataset.len()).step_by(chunk_row_count) {
        let end = (start + chunk_row_count).min(dataset.len());
        let chunk = Chunk::new(Arc::clone(dataset), start..end);
        encode(&mut buf, &chunk).map_err(|source| DumpError::Encode {
            rows: chunk.range(),
            source,
        })?;
        writer.write_all(buf.as_bytes())?;
        written += buf.len();
        buf.clear();
    }
    writer.flush()?;
    Ok(written)
}
