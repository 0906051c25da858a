//! Line protocol encoding for the benchmark's `cpu` rows.
//!
//! [`LineProtocolBuilder`] is the low-level typestate writer; [`Buffer`] sits on top of it,
//! validates names and values, and offers the two ways the benchmark feeds it data: one row at a
//! time ([`Buffer::row`]) or one column batch at a time ([`Buffer::columns`]). Both produce the
//! same bytes.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

pub mod buffer;
pub mod builder;

pub use buffer::{Buffer, Columns, TimestampNanos};
pub use builder::{FieldValue, LineProtocolBuilder};

/// Which kind of name failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Table,
    Symbol,
    Column,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Symbol => write!(f, "symbol"),
            Self::Column => write!(f, "column"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: NameKind,
        name: String,
        reason: &'static str,
    },

    #[error("value of symbol {name:?} contains a line break")]
    InvalidSymbolValue { name: String },

    #[error("column {name:?} has non-finite value {value}")]
    NonFiniteValue { name: String, value: f64 },

    #[error("a row needs at least one column")]
    NoColumns,

    #[error("column {name:?} has {actual} values, expected {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("formatting a value failed")]
    Format(#[from] std::fmt::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
