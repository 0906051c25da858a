//! Fan a [`WorkerAssignment`] out to one concurrent task per worker and gather the results.

use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::task::JoinError;
use tracing::{info, warn};
use tsbs_client::ilp;

use crate::{
    encode::EncodeFn,
    partition::WorkerAssignment,
    report::RunSummary,
    worker::{self, Discard, LineSink, WorkerStats, run_worker},
};

/// Opens one sink per worker.
#[async_trait]
pub trait Connector: Send + Sync {
    type Sink: LineSink + 'static;

    async fn connect(&self, worker_id: usize) -> Result<Self::Sink, ilp::Error>;
}

/// Opens a line protocol TCP connection per worker.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Sink = ilp::Sender;

    async fn connect(&self, _worker_id: usize) -> Result<Self::Sink, ilp::Error> {
        ilp::Sender::connect(&self.host, self.port).await
    }
}

/// Hands every worker a [`Discard`] sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardConnector;

#[async_trait]
impl Connector for DiscardConnector {
    type Sink = Discard;

    async fn connect(&self, _worker_id: usize) -> Result<Self::Sink, ilp::Error> {
        Ok(Discard)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("worker {worker_id} could not connect: {source}")]
    Connection {
        worker_id: usize,
        #[source]
        source: ilp::Error,
    },

    #[error("worker {worker_id} failed: {source}")]
    Worker {
        worker_id: usize,
        #[source]
        source: worker::Error,
    },

    #[error("worker task panicked or was cancelled: {0}")]
    Join(#[from] JoinError),
}

/// Send every worker's chunks concurrently.
///
/// All connections are opened before any data moves; if one cannot be opened the others are
/// closed again and nothing is sent. Once sending starts, every worker runs to completion even
/// if a sibling fails. The error of the lowest-numbered failed worker is returned.
pub async fn fan_out<C: Connector>(
    connector: &C,
    assignment: WorkerAssignment,
    encode: EncodeFn,
) -> Result<RunSummary, Error> {
    let worker_count = assignment.worker_count();
    let rows = assignment.row_count();

    let connected = join_all((0..worker_count).map(|worker_id| connector.connect(worker_id))).await;
    let mut sinks = Vec::with_capacity(worker_count);
    let mut failure = None;
    for (worker_id, result) in connected.into_iter().enumerate() {
        match result {
            Ok(sink) => sinks.push(sink),
            Err(source) if failure.is_none() => failure = Some(Error::Connection { worker_id, source }),
            Err(_) => {}
        }
    }
    if let Some(e) = failure {
        for mut sink in sinks {
            if let Err(close_error) = sink.close().await {
                warn!(%close_error, "failed to close connection");
            }
        }
        return Err(e);
    }
    info!(workers = worker_count, rows, "connections established");

    let start = Instant::now();
    let handles: Vec<_> = sinks
        .into_iter()
        .zip(assignment.into_workers())
        .enumerate()
        .map(|(worker_id, (sink, chunks))| {
            tokio::spawn(run_worker(worker_id, sink, chunks, encode))
        })
        .collect();

    // awaiting in worker order keeps the first reported failure the lowest-numbered one
    let mut stats: Vec<WorkerStats> = Vec::with_capacity(worker_count);
    let mut failure = None;
    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(s)) => stats.push(s),
            Ok(Err(source)) => {
                warn!(worker_id, error = %source, "worker failed");
                failure.get_or_insert(Error::Worker { worker_id, source });
            }
            Err(e) => {
                failure.get_or_insert(Error::Join(e));
            }
        }
    }
    let elapsed = start.elapsed();

    if let Some(e) = failure {
        return Err(e);
    }
    if let Some(slowest) = stats.iter().max_by_key(|s| s.elapsed) {
        info!(
            worker_id = slowest.worker_id,
            elapsed = ?slowest.elapsed,
            total = ?elapsed,
            "all workers finished"
        );
    }
    Ok(RunSummary {
        rows,
        bytes: stats.iter().map(|s| s.bytes).sum(),
        elapsed,
        workers: worker_count,
    })
}
