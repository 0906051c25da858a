//! The server-side `cpu` table: reset it before a run and confirm the row count after.

use std::time::{Duration, Instant};

use tracing::{debug, info};
use tsbs_client::{Client, ExecResponse};

use crate::specification::{TABLE_NAME, count_rows_sql, create_table_sql, drop_table_sql};

/// How often [`CpuTable::block_until_row_count`] asks for the row count.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] tsbs_client::Error),

    #[error("failed to drop table {}: {response:?}", TABLE_NAME)]
    Drop { response: ExecResponse },

    #[error("failed to create table {}: {response:?}", TABLE_NAME)]
    Create { response: ExecResponse },

    #[error("unexpected response to {query:?}: {response:?}")]
    UnexpectedResponse {
        query: String,
        response: ExecResponse,
    },

    #[error("table {} has {observed} rows, more than the {target} sent", TABLE_NAME)]
    RowCountExceeded { observed: u64, target: u64 },

    #[error(
        "table {} did not reach {target} rows within {timeout:?}, last saw {observed}",
        TABLE_NAME
    )]
    ValidationTimeout {
        target: u64,
        observed: u64,
        timeout: Duration,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The `cpu` table as seen through the `/exec` endpoint.
#[derive(Debug, Clone)]
pub struct CpuTable {
    client: Client,
    poll_interval: Duration,
}

impl CpuTable {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    /// Drop the table. `Ok(false)` if it did not exist.
    pub async fn drop_table(&self) -> Result<bool> {
        let response = self.client.exec(drop_table_sql()).await?;
        if response.is_ddl_ok() {
            info!(table = TABLE_NAME, "dropped table");
            return Ok(true);
        }
        match response.error.as_deref() {
            Some(msg) if msg.starts_with("table does not exist") => {
                debug!(table = TABLE_NAME, "table did not exist");
                Ok(false)
            }
            _ => Err(Error::Drop { response }),
        }
    }

    /// Create the table with its fixed schema.
    pub async fn create(&self) -> Result<()> {
        let response = self.client.exec(create_table_sql()).await?;
        if !response.is_ddl_ok() {
            return Err(Error::Create { response });
        }
        info!(table = TABLE_NAME, "created table");
        Ok(())
    }

    pub async fn row_count(&self) -> Result<u64> {
        let query = count_rows_sql();
        let response = self.client.exec(&query).await?;
        match response.first_value().and_then(serde_json::Value::as_u64) {
            Some(count) => Ok(count),
            None => Err(Error::UnexpectedResponse { query, response }),
        }
    }

    /// Poll until the table holds exactly `target` rows.
    ///
    /// Fails as soon as more than `target` rows are seen, or once `timeout` has passed.
    pub async fn block_until_row_count(&self, target: u64, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            let observed = self.row_count().await?;
            debug!(observed, target, "polled row count");
            if observed == target {
                info!(rows = target, elapsed = ?start.elapsed(), "row count reached");
                return Ok(());
            }
            if observed > target {
                return Err(Error::RowCountExceeded { observed, target });
            }
            if start.elapsed() >= timeout {
                return Err(Error::ValidationTimeout {
                    target,
                    observed,
                    timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn table(server: &Server) -> CpuTable {
        CpuTable::new(Client::new(server.url()).unwrap())
            .with_poll_interval(Duration::from_millis(10))
    }

    fn count_body(count: u64) -> String {
        json!({
            "query": "select count(*) from cpu",
            "columns": [{"name": "count", "type": "LONG"}],
            "dataset": [[count]],
            "count": 1
        })
        .to_string()
    }

    #[tokio::test]
    async fn drop_existing_table() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/exec")
            .match_query(Matcher::UrlEncoded("query".into(), "drop table cpu".into()))
            .with_body(r#"{"ddl":"OK"}"#)
            .create_async()
            .await;

        assert!(table(&server).drop_table().await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn drop_missing_table() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/exec")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"query":"drop table cpu","error":"table does not exist [table=cpu]","position":11}"#)
            .create_async()
            .await;

        assert!(!table(&server).drop_table().await.unwrap());
    }

    #[tokio::test]
    async fn drop_other_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/exec")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":"could not lock 'cpu'"}"#)
            .create_async()
            .await;

        let err = table(&server).drop_table().await.unwrap_err();
        assert!(matches!(err, Error::Drop { .. }), "got {err}");
    }

    #[tokio::test]
    async fn create_sends_schema() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/exec")
            .match_query(Matcher::UrlEncoded("query".into(), create_table_sql()))
            .with_body(r#"{"ddl":"OK"}"#)
            .create_async()
            .await;

        table(&server).create().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/exec")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":"table already exists"}"#)
            .create_async()
            .await;

        let err = table(&server).create().await.unwrap_err();
        assert!(matches!(err, Error::Create { .. }), "got {err}");
    }

    #[tokio::test]
    async fn row_count_reads_first_cell() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/exec")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "select count(*) from cpu".into(),
            ))
            .with_body(count_body(42))
            .create_async()
            .await;

        assert_eq!(table(&server).row_count().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn row_count_without_dataset() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/exec")
            .match_query(Matcher::Any)
            .with_body(r#"{"ddl":"OK"}"#)
            .create_async()
            .await;

        let err = table(&server).row_count().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse { .. }), "got {err}");
    }

    #[test_log::test(tokio::test)]
    async fn block_until_reached() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/exec")
            .match_query(Matcher::Any)
            .with_body(count_body(100))
            .create_async()
            .await;

        table(&server)
            .block_until_row_count(100, Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn block_until_exceeded() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/exec")
            .match_query(Matcher::Any)
            .with_body(count_body(101))
            .create_async()
            .await;

        let err = table(&server)
            .block_until_row_count(100, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                Error::RowCountExceeded {
                    observed: 101,
                    target: 100
                }
            ),
            "got {err}"
        );
    }

    #[test_log::test(tokio::test)]
    async fn block_until_times_out() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/exec")
            .match_query(Matcher::Any)
            .with_body(count_body(50))
            .expect_at_least(2)
            .create_async()
            .await;

        let timeout = Duration::from_millis(200);
        let start = Instant::now();
        let err = table(&server)
            .block_until_row_count(100, timeout)
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(
            matches!(
                err,
                Error::ValidationTimeout {
                    target: 100,
                    observed: 50,
                    ..
                }
            ),
            "got {err}"
        );
        assert!(elapsed >= timeout, "{elapsed:?}");
        mock.assert_async().await;
    }
}
