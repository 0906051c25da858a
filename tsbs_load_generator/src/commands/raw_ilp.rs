//! `tsbs raw-ilp`: replay a pre-encoded line protocol file over a single connection.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;
use tsbs_client::ilp::Sender;
use tsbs_load_generator::report::RunSummary;

use super::common::{QuestDbConfig, reset_table, validate_row_count};

/// Time given to the server to register a freshly created table before lines arrive.
const TABLE_CREATE_GRACE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
pub(crate) struct Config {
    /// Line protocol file to send, one row per line
    #[clap(value_name = "FILE")]
    pub(crate) file: PathBuf,

    #[clap(flatten)]
    pub(crate) questdb: QuestDbConfig,

    /// Bytes handed to the connection per write
    #[clap(long = "chunk-size", env = "TSBS_CHUNK_SIZE", default_value_t = 65536)]
    pub(crate) chunk_size: usize,
}

pub(crate) async fn command(config: Config) -> Result<(), anyhow::Error> {
    println!("Raw ILP parameters:");
    println!("  file: {}", config.file.display());
    println!("  chunk size: {}", config.chunk_size);
    config.questdb.print();

    if config.chunk_size == 0 {
        bail!("invalid configuration: chunk size must be at least 1");
    }

    let data = tokio::fs::read(&config.file)
        .await
        .with_context(|| format!("reading {}", config.file.display()))?;
    let rows = data.iter().filter(|b| **b == b'\n').count();
    info!(bytes = data.len(), rows, "loaded line protocol file");

    let table = config.questdb.cpu_table()?;
    reset_table(&table).await?;
    tokio::time::sleep(TABLE_CREATE_GRACE_PERIOD).await;

    let mut sender = Sender::connect(&config.questdb.host, config.questdb.ilp_port)
        .await
        .context("connecting")?;
    info!(addr = sender.addr(), "connected");
    let start = Instant::now();
    let sent = send_all(&mut sender, &data, config.chunk_size).await;
    let closed = sender.close().await;
    let elapsed = start.elapsed();
    sent.context("sending line protocol")?;
    closed.context("closing connection")?;

    let summary = RunSummary {
        rows,
        bytes: data.len(),
        elapsed,
        workers: 1,
    };
    println!("{}", summary.display("Sent"));

    validate_row_count(
        &table,
        rows as u64,
        config.questdb.validation_query_timeout,
    )
    .await
}

async fn send_all(
    sender: &mut Sender,
    data: &[u8],
    chunk_size: usize,
) -> Result<(), tsbs_client::ilp::Error> {
    for piece in data.chunks(chunk_size) {
        sender.write(piece).await?;
    }
    sender.flush().await
}
