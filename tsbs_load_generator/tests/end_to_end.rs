use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mockito::{Matcher, Server};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::{io::AsyncReadExt, net::TcpListener, task::JoinHandle};
use tsbs_client::{Client, ilp};
use tsbs_line_protocol::Buffer;
use tsbs_load_generator::{
    coordinator::{self, Connector, TcpConnector, fan_out},
    dataset::{Dataset, DatasetSpec},
    encode::{EncodeStrategy, encode_rows},
    partition::{WorkerAssignment, chunk_up_by_worker},
    specification::ChoiceTables,
    table::{self, CpuTable},
    worker::{self, LineSink},
};

fn dataset(row_count: usize) -> Arc<Dataset> {
    Arc::new(
        Dataset::generate(
            &DatasetSpec {
                seed: 20160101,
                row_count,
                scale: 10,
            },
            &ChoiceTables::default(),
        )
        .unwrap(),
    )
}

/// Accept `connections` line protocol connections and return everything they sent.
async fn ilp_server(connections: usize) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut readers = Vec::with_capacity(connections);
        for _ in 0..connections {
            let (mut socket, _) = listener.accept().await.unwrap();
            readers.push(tokio::spawn(async move {
                let mut received = String::new();
                socket.read_to_string(&mut received).await.unwrap();
                received
            }));
        }
        let mut received = Vec::with_capacity(connections);
        for reader in readers {
            received.push(reader.await.unwrap());
        }
        received
    });
    (port, handle)
}

async fn oracle_reporting(server: &mut Server, count: u64) -> mockito::Mock {
    server
        .mock("GET", "/exec")
        .match_query(Matcher::UrlEncoded(
            "query".into(),
            "select count(*) from cpu".into(),
        ))
        .with_body(json!({ "dataset": [[count]], "count": 1 }).to_string())
        .create_async()
        .await
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn hundred_rows_over_three_connections() {
    let dataset = dataset(100);
    let assignment = chunk_up_by_worker(&dataset, 3, 10).unwrap();
    let sizes: Vec<usize> = assignment.workers().iter().map(Vec::len).collect();
    assert_eq!(sizes, [4, 3, 3]);

    let (port, server) = ilp_server(3).await;
    let summary = fan_out(
        &TcpConnector::new("127.0.0.1", port),
        assignment,
        EncodeStrategy::Columnar.encode_fn(),
    )
    .await
    .unwrap();
    assert_eq!(summary.rows, 100);
    assert_eq!(summary.workers, 3);

    let received = server.await.unwrap();
    let mut lines: Vec<&str> = received.iter().flat_map(|r| r.lines()).collect();
    assert_eq!(lines.len(), 100);
    assert_eq!(
        received.iter().map(String::len).sum::<usize>(),
        summary.bytes
    );

    let mut expected = Buffer::new();
    for chunk in tsbs_load_generator::partition::chunk_up(&dataset, 100).unwrap() {
        encode_rows(&mut expected, &chunk).unwrap();
    }
    let mut expected: Vec<&str> = expected.as_str().lines().collect();
    lines.sort_unstable();
    expected.sort_unstable();
    assert_eq!(lines, expected);

    let mut http = Server::new_async().await;
    let _count = oracle_reporting(&mut http, 100).await;
    CpuTable::new(Client::new(http.url()).unwrap())
        .block_until_row_count(100, Duration::from_secs(5))
        .await
        .unwrap();
}

#[tokio::test]
async fn oracle_rejects_surplus_rows() {
    let mut http = Server::new_async().await;
    let _count = oracle_reporting(&mut http, 101).await;
    let err = CpuTable::new(Client::new(http.url()).unwrap())
        .block_until_row_count(100, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            table::Error::RowCountExceeded {
                observed: 101,
                target: 100
            }
        ),
        "got {err}"
    );
}

#[tokio::test]
async fn oracle_times_out() {
    let mut http = Server::new_async().await;
    let _count = oracle_reporting(&mut http, 50).await;
    let timeout = Duration::from_millis(300);
    let start = std::time::Instant::now();
    let err = CpuTable::new(Client::new(http.url()).unwrap())
        .block_until_row_count(100, timeout)
        .await
        .unwrap_err();
    let elapsed = start.elapsed();
    assert!(
        matches!(err, table::Error::ValidationTimeout { target: 100, .. }),
        "got {err}"
    );
    // one poll interval of slack on top of the timeout, plus request time
    assert!(elapsed >= timeout, "{elapsed:?}");
    assert!(elapsed < timeout + Duration::from_secs(2), "{elapsed:?}");
}

/// Per-worker observations shared with the test.
#[derive(Debug, Default)]
struct Probe {
    closed: AtomicBool,
    written: Mutex<Vec<u8>>,
}

#[derive(Debug)]
struct ProbeSink {
    probe: Arc<Probe>,
    fail_write: bool,
}

#[async_trait]
impl LineSink for ProbeSink {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ilp::Error> {
        if self.fail_write {
            return Err(ilp::Error::Write {
                addr: "probe".to_owned(),
                source: std::io::ErrorKind::ConnectionReset.into(),
            });
        }
        self.probe.written.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ilp::Error> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ilp::Error> {
        self.probe.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
struct ProbeConnector {
    probes: Vec<Arc<Probe>>,
    refuse: Option<usize>,
    fail_write: Option<usize>,
}

impl ProbeConnector {
    fn new(workers: usize) -> Self {
        Self {
            probes: (0..workers).map(|_| Arc::default()).collect(),
            refuse: None,
            fail_write: None,
        }
    }
}

#[async_trait]
impl Connector for ProbeConnector {
    type Sink = ProbeSink;

    async fn connect(&self, worker_id: usize) -> Result<ProbeSink, ilp::Error> {
        if self.refuse == Some(worker_id) {
            return Err(ilp::Error::Connect {
                addr: "probe".to_owned(),
                source: std::io::ErrorKind::ConnectionRefused.into(),
            });
        }
        Ok(ProbeSink {
            probe: Arc::clone(&self.probes[worker_id]),
            fail_write: self.fail_write == Some(worker_id),
        })
    }
}

fn encoded_len(assignment: &WorkerAssignment, worker_id: usize) -> usize {
    let mut buf = Buffer::new();
    for chunk in &assignment.workers()[worker_id] {
        encode_rows(&mut buf, chunk).unwrap();
    }
    buf.len()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn send_failure_lets_siblings_finish() {
    let dataset = dataset(400);
    let assignment = chunk_up_by_worker(&dataset, 4, 25).unwrap();
    let connector = ProbeConnector {
        fail_write: Some(1),
        ..ProbeConnector::new(4)
    };

    let err = fan_out(&connector, assignment.clone(), encode_rows)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            coordinator::Error::Worker {
                worker_id: 1,
                source: worker::Error::Send(ilp::Error::Write { .. })
            }
        ),
        "got {err}"
    );

    for (worker_id, probe) in connector.probes.iter().enumerate() {
        assert!(probe.closed.load(Ordering::SeqCst), "worker {worker_id}");
        let written = probe.written.lock().unwrap().len();
        if worker_id == 1 {
            assert_eq!(written, 0);
        } else {
            assert_eq!(written, encoded_len(&assignment, worker_id), "worker {worker_id}");
        }
    }
}

#[tokio::test]
async fn connect_failure_sends_nothing() {
    let dataset = dataset(100);
    let assignment = chunk_up_by_worker(&dataset, 4, 10).unwrap();
    let connector = ProbeConnector {
        refuse: Some(2),
        ..ProbeConnector::new(4)
    };

    let err = fan_out(&connector, assignment, encode_rows)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            coordinator::Error::Connection {
                worker_id: 2,
                source: ilp::Error::Connect { .. }
            }
        ),
        "got {err}"
    );

    for (worker_id, probe) in connector.probes.iter().enumerate() {
        assert!(probe.written.lock().unwrap().is_empty());
        // the refused worker never had a connection to close
        assert_eq!(probe.closed.load(Ordering::SeqCst), worker_id != 2);
    }
}

#[tokio::test]
async fn unreachable_server_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dataset = dataset(10);
    let assignment = chunk_up_by_worker(&dataset, 2, 5).unwrap();
    let err = fan_out(&TcpConnector::new("127.0.0.1", port), assignment, encode_rows)
        .await
        .unwrap_err();
    assert!(
        matches!(err, coordinator::Error::Connection { .. }),
        "got {err}"
    );
}
