//! Line protocol over a plain TCP connection.

use tokio::{
    io::{AsyncWriteExt, BufWriter},
    net::TcpStream,
};
use tracing::debug;

/// Size of the socket-side write buffer; bytes are pushed to the socket once it fills up.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to {addr}: {source}")]
    Write {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to flush to {addr}: {source}")]
    Flush {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to close connection to {addr}: {source}")]
    Shutdown {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A persistent, write-only line protocol connection.
///
/// Bytes handed to [`Sender::write`] are buffered and streamed to the socket as the buffer fills;
/// [`Sender::flush`] pushes whatever is left. [`Sender::close`] flushes and shuts the write half
/// down so the server sees a clean end of stream.
#[derive(Debug)]
pub struct Sender {
    addr: String,
    writer: BufWriter<TcpStream>,
    bytes_written: usize,
}

impl Sender {
    /// Connect to `host:port` with Nagle's algorithm disabled.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_capacity(host, port, DEFAULT_WRITE_BUFFER_SIZE).await
    }

    pub async fn connect_with_capacity(host: &str, port: u16, capacity: usize) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| Error::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true).map_err(|source| Error::Connect {
            addr: addr.clone(),
            source,
        })?;
        debug!(%addr, "connected line protocol sender");
        Ok(Self {
            addr,
            writer: BufWriter::with_capacity(capacity, stream),
            bytes_written: 0,
        })
    }

    /// The `host:port` this sender is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Total bytes accepted by [`Sender::write`] so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|source| Error::Write {
                addr: self.addr.clone(),
                source,
            })?;
        self.bytes_written += bytes.len();
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await.map_err(|source| Error::Flush {
            addr: self.addr.clone(),
            source,
        })
    }

    /// Flush and shut down the write half of the connection.
    pub async fn close(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .map_err(|source| Error::Shutdown {
                addr: self.addr.clone(),
                source,
            })?;
        debug!(addr = %self.addr, bytes = self.bytes_written, "closed line protocol sender");
        Ok(())
    }
}
