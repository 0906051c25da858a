use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tsbs_client::Client;
use tsbs_load_generator::{coordinator::TcpConnector, table::CpuTable};

/// Where the server under test listens.
#[derive(Debug, Clone, Parser)]
pub(crate) struct QuestDbConfig {
    /// Host name or IP address of the server
    #[clap(long = "host", env = "TSBS_HOST", default_value = "localhost")]
    pub(crate) host: String,

    /// Port of the line protocol TCP listener
    #[clap(long = "ilp-port", env = "TSBS_ILP_PORT", default_value_t = 9009)]
    pub(crate) ilp_port: u16,

    /// Port of the HTTP endpoint used for DDL and the row count check
    #[clap(long = "http-port", env = "TSBS_HTTP_PORT", default_value_t = 9000)]
    pub(crate) http_port: u16,

    /// How long to wait for the server to report every sent row, e.g. `30s` or `2m`
    #[clap(
        long = "validation-query-timeout",
        env = "TSBS_VALIDATION_QUERY_TIMEOUT",
        default_value = "120s",
        value_parser = humantime::parse_duration
    )]
    pub(crate) validation_query_timeout: Duration,
}

impl QuestDbConfig {
    pub(crate) fn cpu_table(&self) -> Result<CpuTable, anyhow::Error> {
        let client = Client::for_host(&self.host, self.http_port).with_context(|| {
            format!(
                "could not build HTTP client for {}:{}",
                self.host, self.http_port
            )
        })?;
        Ok(CpuTable::new(client))
    }

    pub(crate) fn connector(&self) -> TcpConnector {
        TcpConnector::new(&self.host, self.ilp_port)
    }

    pub(crate) fn print(&self) {
        println!("  host: {}", self.host);
        println!("  ilp port: {}", self.ilp_port);
        println!("  http port: {}", self.http_port);
        println!(
            "  validation query timeout: {}",
            humantime::format_duration(self.validation_query_timeout)
        );
    }
}

/// Drop and recreate the `cpu` table.
pub(crate) async fn reset_table(table: &CpuTable) -> Result<(), anyhow::Error> {
    table.drop_table().await.context("dropping table")?;
    table.create().await.context("creating table")?;
    Ok(())
}

/// Wait for the server to report `rows` rows.
pub(crate) async fn validate_row_count(
    table: &CpuTable,
    rows: u64,
    timeout: Duration,
) -> Result<(), anyhow::Error> {
    table
        .block_until_row_count(rows, timeout)
        .await
        .context("validating row count")?;
    println!("Validated {rows} rows.");
    Ok(())
}
