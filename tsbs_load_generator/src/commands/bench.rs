//! `tsbs bench`: generate the `cpu` dataset, measure encoding, and optionally send it.

use std::{
    fs::File,
    io::{self, BufWriter},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tsbs_load_generator::{
    InvalidConfiguration,
    coordinator::{DiscardConnector, fan_out},
    dataset::{Dataset, DatasetSpec},
    encode::{EncodeStrategy, write_dataset},
    partition::chunk_up_by_worker,
    specification::ChoiceTables,
};

use super::common::{QuestDbConfig, reset_table, validate_row_count};

#[derive(Debug, Parser)]
pub(crate) struct Config {
    /// Number of rows to generate
    #[clap(long = "row-count", env = "TSBS_ROW_COUNT", default_value_t = 10_000_000)]
    pub(crate) row_count: usize,

    /// Number of distinct hosts the rows are spread over
    #[clap(long = "scale", env = "TSBS_SCALE", default_value_t = 4000)]
    pub(crate) scale: usize,

    /// Seed for the dataset generator. A random seed is picked, and printed, if omitted.
    #[clap(long = "seed", env = "TSBS_SEED")]
    pub(crate) seed: Option<u64>,

    /// Write the encoded dataset, in row order, to this file. Use `-` for stdout.
    #[clap(long = "write-ilp")]
    pub(crate) write_ilp: Option<PathBuf>,

    /// Send the dataset to the server. Without this only the encoding is measured.
    #[clap(long = "send", default_value_t = false)]
    pub(crate) send: bool,

    #[clap(flatten)]
    pub(crate) questdb: QuestDbConfig,

    /// How each chunk is encoded
    #[clap(long = "op", env = "TSBS_OP", value_enum, default_value_t = EncodeStrategy::default())]
    pub(crate) op: EncodeStrategy,

    /// Number of concurrent connections. Without it the whole dataset is one chunk sent by one
    /// worker.
    #[clap(long = "workers", env = "TSBS_WORKERS")]
    pub(crate) workers: Option<usize>,

    /// Rows per chunk when `--workers` is given
    #[clap(
        long = "worker-chunk-row-count",
        env = "TSBS_WORKER_CHUNK_ROW_COUNT",
        default_value_t = 10_000
    )]
    pub(crate) worker_chunk_row_count: usize,
}

impl Config {
    /// Worker count and chunk size actually used.
    fn split(&self, row_count: usize) -> (usize, usize) {
        match self.workers {
            Some(workers) => (workers, self.worker_chunk_row_count),
            None => (1, row_count.max(1)),
        }
    }

    /// Reject settings the generator or partitioner would refuse, before anything is generated
    /// or the server is touched.
    fn validate(&self) -> Result<(), InvalidConfiguration> {
        if self.scale == 0 {
            return Err(InvalidConfiguration("scale must be at least 1".to_owned()));
        }
        if self.workers == Some(0) {
            return Err(InvalidConfiguration(
                "worker count must be at least 1".to_owned(),
            ));
        }
        if self.workers.is_some() && self.worker_chunk_row_count == 0 {
            return Err(InvalidConfiguration(
                "chunk row count must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

pub(crate) async fn command(config: Config) -> Result<(), anyhow::Error> {
    let seed = config.seed.unwrap_or_else(rand::random);
    println!("Benchmark parameters:");
    println!("  row count: {}", config.row_count);
    println!("  scale: {}", config.scale);
    println!("  seed: {seed}");
    println!("  op: {}", config.op);
    match config.workers {
        Some(workers) => {
            println!("  workers: {workers}");
            println!("  worker chunk row count: {}", config.worker_chunk_row_count);
        }
        None => println!("  workers: 1 (single chunk)"),
    }
    println!("  send: {}", config.send);
    config.questdb.print();
    config.validate()?;

    let spec = DatasetSpec {
        seed,
        row_count: config.row_count,
        scale: config.scale,
    };
    let dataset = tokio::task::spawn_blocking(move || {
        Dataset::generate(&spec, &ChoiceTables::default())
    })
    .await
    .context("dataset generation task failed")?
    .context("generating dataset")?;
    let dataset = Arc::new(dataset);
    if let Some((first, last)) = dataset.time_range() {
        info!(rows = dataset.len(), %first, %last, "generated dataset");
    }

    let (workers, chunk_rows) = config.split(dataset.len());
    let assignment =
        chunk_up_by_worker(&dataset, workers, chunk_rows).context("splitting dataset")?;
    let encode = config.op.encode_fn();

    // the table is only reset once the run is known to be valid
    let table = if config.send {
        let table = config.questdb.cpu_table()?;
        reset_table(&table).await?;
        Some(table)
    } else {
        None
    };

    let serialized = fan_out(&DiscardConnector, assignment.clone(), encode)
        .await
        .context("serializing dataset")?;
    println!("{}", serialized.display("Serialized"));

    if let Some(path) = config.write_ilp {
        let strategy = config.op;
        let dataset = Arc::clone(&dataset);
        let written = tokio::task::spawn_blocking(move || dump(&dataset, strategy, chunk_rows, path))
            .await
            .context("line protocol dump task failed")??;
        info!(bytes = written, "wrote line protocol");
    }

    let Some(table) = table else {
        println!("Not sending. Use --send to send to server.");
        return Ok(());
    };

    let sent = fan_out(&config.questdb.connector(), assignment, encode)
        .await
        .context("sending dataset")?;
    println!("{}", sent.display("Sent"));

    validate_row_count(
        &table,
        dataset.len() as u64,
        config.questdb.validation_query_timeout,
    )
    .await
}

fn dump(
    dataset: &Arc<Dataset>,
    strategy: EncodeStrategy,
    chunk_rows: usize,
    path: PathBuf,
) -> Result<usize, anyhow::Error> {
    if path.as_os_str() == "-" {
        let stdout = io::stdout().lock();
        return write_dataset(dataset, strategy, chunk_rows, stdout)
            .context("writing line protocol to stdout");
    }
    let file = File::create(&path)
        .with_context(|| format!("creating line protocol file {}", path.display()))?;
    write_dataset(dataset, strategy, chunk_rows, BufWriter::new(file))
        .with_context(|| format!("writing line protocol to {}", path.display()))
}
