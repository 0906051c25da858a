//! One worker: encode its chunks one by one and stream them over its own connection.

use std::{
    ops::Range,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tracing::{debug, warn};
use tsbs_client::ilp;
use tsbs_line_protocol::Buffer;

use crate::{dataset::Chunk, encode::EncodeFn};

/// Where a worker's encoded bytes go.
#[async_trait]
pub trait LineSink: Send + std::fmt::Debug {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ilp::Error>;

    async fn flush(&mut self) -> Result<(), ilp::Error>;

    /// Release the connection. Called exactly once, whether or not the worker succeeded.
    async fn close(&mut self) -> Result<(), ilp::Error>;
}

#[async_trait]
impl LineSink for ilp::Sender {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ilp::Error> {
        Self::write(self, bytes).await
    }

    async fn flush(&mut self) -> Result<(), ilp::Error> {
        Self::flush(self).await
    }

    async fn close(&mut self) -> Result<(), ilp::Error> {
        Self::close(self).await
    }
}

/// Throws bytes away. Used to measure encoding alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

#[async_trait]
impl LineSink for Discard {
    async fn write(&mut self, _bytes: &[u8]) -> Result<(), ilp::Error> {
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ilp::Error> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ilp::Error> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to encode rows {rows:?}: {source}")]
    Encode {
        rows: Range<usize>,
        #[source]
        source: tsbs_line_protocol::Error,
    },

    #[error(transparent)]
    Send(#[from] ilp::Error),
}

/// What one worker did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub chunks: usize,
    pub rows: usize,
    /// Encoded bytes handed to the sink.
    pub bytes: usize,
    /// Wall-clock time from the first encode to the end of the final flush.
    pub elapsed: Duration,
}

/// Encode and send `chunks` in order over `sink`, then flush.
///
/// One buffer is reused for every chunk, so at most one chunk's encoding is held at a time.
/// The sink is closed on every path; if the run already failed, a close error is only logged.
pub async fn run_worker<S: LineSink>(
    worker_id: usize,
    mut sink: S,
    chunks: Vec<Chunk>,
    encode: EncodeFn,
) -> Result<WorkerStats, Error> {
    let mut stats = WorkerStats {
        worker_id,
        ..Default::default()
    };
    let start = Instant::now();
    let result = send_chunks(&mut sink, &chunks, encode, &mut stats).await;
    stats.elapsed = start.elapsed();
    let closed = sink.close().await;

    match (result, closed) {
        (Ok(()), Ok(())) => {
            debug!(
                worker_id,
                rows = stats.rows,
                bytes = stats.bytes,
                elapsed = ?stats.elapsed,
                "worker done"
            );
            Ok(stats)
        }
        (Ok(()), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_error)) => {
            warn!(worker_id, %close_error, "failed to close connection after error");
            Err(e)
        }
    }
}

async fn send_chunks<S: LineSink>(
    sink: &mut S,
    chunks: &[Chunk],
    encode: EncodeFn,
    stats: &mut WorkerStats,
) -> Result<(), Error> {
    let capacity = chunks.first().map(|c| c.len() * 256).unwrap_or_default();
    let mut buf = Buffer::with_capacity(capacity);
    for chunk in chunks {
        encode(&mut buf, chunk).map_err(|source| Error::Encode {
            rows: chunk.range(),
            source,
        })?;
        stats.bytes += buf.len();
        sink.write(buf.as_bytes()).await?;
        buf.clear();
        stats.chunks += 1;
        stats.rows += chunk.len();
    }
    sink.flush().await?;
    Ok(())
}
