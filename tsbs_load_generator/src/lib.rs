//! Library side of the `tsbs` benchmark: generate the `cpu` dataset, split it into chunks,
//! check the split, fan the chunks out to concurrent line protocol writers and confirm the
//! server stored every row.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

pub mod coordinator;
pub mod dataset;
pub mod encode;
pub mod partition;
pub mod report;
pub mod specification;
pub mod table;
pub mod verify;
pub mod worker;

/// Parameters that make a run impossible, caught before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct InvalidConfiguration(pub String);
