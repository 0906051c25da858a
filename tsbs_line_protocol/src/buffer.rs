//! A reusable line protocol buffer with row-at-a-time and columnar entry points.

use std::fmt;

use crate::{Error, NameKind, Result, builder::LineProtocolBuilder};

/// A designated timestamp, in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampNanos(i64);

impl TimestampNanos {
    pub fn new(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

/// A batch of equally long columns handed to [`Buffer::columns`] in one call.
///
/// Symbols are written before doubles, each in the order given here.
#[derive(Debug, Clone, Copy)]
pub struct Columns<'a, S> {
    pub symbols: &'a [(&'a str, &'a [S])],
    pub doubles: &'a [(&'a str, &'a [f64])],
    pub timestamps: &'a [i64],
}

/// Accumulates encoded lines.
///
/// The buffer is meant to be reused: encode a batch, hand [`Buffer::as_bytes`] to a sender,
/// then [`Buffer::clear`] it. A failed call leaves the buffer exactly as it was before the call.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    buf: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of encoded bytes currently held.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop the contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// The contents as text. Everything the buffer writes is UTF-8.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf).unwrap_or_default()
    }

    /// Encode a single row.
    pub fn row<S: AsRef<str>>(
        &mut self,
        table: &str,
        symbols: &[(&str, S)],
        columns: &[(&str, f64)],
        at: TimestampNanos,
    ) -> Result<()> {
        validate_name(NameKind::Table, table)?;
        for (name, _) in symbols {
            validate_name(NameKind::Symbol, name)?;
        }
        for (name, _) in columns {
            validate_name(NameKind::Column, name)?;
        }

        let marker = self.buf.len();
        let res = self.write_row(
            table,
            symbols.iter().map(|(name, value)| (*name, value.as_ref())),
            columns.iter().copied(),
            at.as_i64(),
        );
        if res.is_err() {
            self.buf.truncate(marker);
        }
        res
    }

    /// Encode every row of a column batch.
    ///
    /// Produces exactly the bytes that calling [`Buffer::row`] once per row would.
    pub fn columns<S: AsRef<str>>(&mut self, table: &str, columns: &Columns<'_, S>) -> Result<()> {
        validate_name(NameKind::Table, table)?;
        let row_count = columns.timestamps.len();
        for (name, values) in columns.symbols {
            validate_name(NameKind::Symbol, name)?;
            check_len(name, row_count, values.len())?;
        }
        for (name, values) in columns.doubles {
            validate_name(NameKind::Column, name)?;
            check_len(name, row_count, values.len())?;
        }

        let marker = self.buf.len();
        for (row, ts) in columns.timestamps.iter().enumerate() {
            let res = self.write_row(
                table,
                columns
                    .symbols
                    .iter()
                    .map(|(name, values)| (*name, values[row].as_ref())),
                columns
                    .doubles
                    .iter()
                    .map(|(name, values)| (*name, values[row])),
                *ts,
            );
            if let Err(e) = res {
                self.buf.truncate(marker);
                return Err(e);
            }
        }
        Ok(())
    }

    // Names are validated by the callers; values are validated here, before anything is written.
    fn write_row<'a>(
        &mut self,
        table: &str,
        symbols: impl Iterator<Item = (&'a str, &'a str)> + Clone,
        mut columns: impl Iterator<Item = (&'a str, f64)> + Clone,
        ts: i64,
    ) -> Result<()> {
        for (name, value) in symbols.clone() {
            if value.contains(['\n', '\r']) {
                return Err(Error::InvalidSymbolValue {
                    name: name.to_owned(),
                });
            }
        }
        for (name, value) in columns.clone() {
            if !value.is_finite() {
                return Err(Error::NonFiniteValue {
                    name: name.to_owned(),
                    value,
                });
            }
        }
        let Some((first_name, first_value)) = columns.next() else {
            return Err(Error::NoColumns);
        };

        let mut line = LineProtocolBuilder::new_with(&mut self.buf).measurement(table);
        for (name, value) in symbols {
            line = line.tag(name, value);
        }
        let mut line = line.field(first_name, first_value);
        for (name, value) in columns {
            line = line.field(name, value);
        }
        line.timestamp(ts).close_line().build()?;
        Ok(())
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn validate_name(kind: NameKind, name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.chars().any(char::is_control) {
        "must not contain control characters"
    } else {
        return Ok(());
    };
    Err(Error::InvalidName {
        kind,
        name: name.to_owned(),
        reason,
    })
}

fn check_len(name: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::ColumnLength {
            name: name.to_owned(),
            expected,
            actual,
        })
    }
}
