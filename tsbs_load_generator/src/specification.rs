//! The fixed shape of the `cpu` benchmark table and the value tables its symbols are drawn from.

use std::sync::Arc;

/// Name of the table every row is written to.
pub const TABLE_NAME: &str = "cpu";

pub const SYMBOL_COUNT: usize = 10;
pub const DOUBLE_COUNT: usize = 10;

/// Symbol (tag) columns, in wire order.
pub const SYMBOL_COLUMNS: [&str; SYMBOL_COUNT] = [
    "hostname",
    "region",
    "datacenter",
    "rack",
    "os",
    "arch",
    "team",
    "service",
    "service_version",
    "service_environment",
];

/// Double (field) columns, in wire order.
pub const DOUBLE_COLUMNS: [&str; DOUBLE_COUNT] = [
    "usage_user",
    "usage_system",
    "usage_idle",
    "usage_nice",
    "usage_iowait",
    "usage_irq",
    "usage_softirq",
    "usage_steal",
    "usage_guest",
    "usage_guest_nice",
];

pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// 2016-01-01T00:00:00Z
pub const START_TIMESTAMP_NANOS: i64 = 1_451_606_400_000_000_000;

/// Rows are sampled every 10 seconds.
pub const SAMPLE_INTERVAL_NANOS: i64 = 10_000_000_000;

/// DDL for the `cpu` table: designated timestamp, partitioned by day.
pub fn create_table_sql() -> String {
    let symbols = SYMBOL_COLUMNS
        .iter()
        .map(|col| format!("{col} symbol"))
        .collect::<Vec<_>>()
        .join(", ");
    let doubles = DOUBLE_COLUMNS
        .iter()
        .map(|col| format!("{col} double"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "create table {TABLE_NAME} ({symbols}, {doubles}, {TIMESTAMP_COLUMN} timestamp) \
         timestamp({TIMESTAMP_COLUMN}) partition by day"
    )
}

pub fn drop_table_sql() -> String {
    format!("drop table {TABLE_NAME}")
}

pub fn count_rows_sql() -> String {
    format!("select count(*) from {TABLE_NAME}")
}

/// A cloud region and the datacenters that belong to it.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: Arc<str>,
    pub datacenters: Vec<Arc<str>>,
}

impl Region {
    fn new(name: &str, datacenters: &[&str]) -> Self {
        Self {
            name: Arc::from(name),
            datacenters: interned(datacenters.iter().copied()),
        }
    }
}

/// The categorical values symbols are sampled from.
///
/// Built once per run and handed to the dataset generator; generated rows share these `Arc<str>`
/// handles instead of owning copies of the strings.
#[derive(Debug, Clone)]
pub struct ChoiceTables {
    pub regions: Vec<Region>,
    pub racks: Vec<Arc<str>>,
    pub os: Vec<Arc<str>>,
    pub arch: Vec<Arc<str>>,
    pub team: Vec<Arc<str>>,
    pub service: Vec<Arc<str>>,
    pub service_version: Vec<Arc<str>>,
    pub service_environment: Vec<Arc<str>>,
}

impl Default for ChoiceTables {
    fn default() -> Self {
        Self {
            regions: vec![
                Region::new(
                    "us-east-1",
                    &["us-east-1a", "us-east-1b", "us-east-1c", "us-east-1e"],
                ),
                Region::new("us-west-1", &["us-west-1a", "us-west-1b"]),
                Region::new("us-west-2", &["us-west-2a", "us-west-2b", "us-west-2c"]),
                Region::new("eu-west-1", &["eu-west-1a", "eu-west-1b", "eu-west-1c"]),
                Region::new("eu-central-1", &["eu-central-1a", "eu-central-1b"]),
                Region::new("ap-southeast-1", &["ap-southeast-1a", "ap-southeast-1b"]),
                Region::new("ap-southeast-2", &["ap-southeast-2a", "ap-southeast-2b"]),
                Region::new("ap-northeast-1", &["ap-northeast-1a", "ap-northeast-1c"]),
                Region::new("sa-east-1", &["sa-east-1a", "sa-east-1b", "sa-east-1c"]),
            ],
            racks: numbered(100),
            os: interned(["Ubuntu16.10", "Ubuntu16.04LTS", "Ubuntu15.10"]),
            arch: interned(["x64", "x86"]),
            team: interned(["SF", "NYC", "LON", "CHI"]),
            service: numbered(20),
            service_version: numbered(2),
            service_environment: interned(["production", "staging", "test"]),
        }
    }
}

impl ChoiceTables {
    /// Name of the first empty table, if any.
    pub(crate) fn first_empty(&self) -> Option<&'static str> {
        if self.regions.is_empty() {
            return Some("regions");
        }
        if self.regions.iter().any(|r| r.datacenters.is_empty()) {
            return Some("datacenters");
        }
        [
            ("racks", &self.racks),
            ("os", &self.os),
            ("arch", &self.arch),
            ("team", &self.team),
            ("service", &self.service),
            ("service_version", &self.service_version),
            ("service_environment", &self.service_environment),
        ]
        .into_iter()
        .find(|(_, values)| values.is_empty())
        .map(|(name, _)| name)
    }
}

fn interned<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<Arc<str>> {
    values.into_iter().map(Arc::from).collect()
}

fn numbered(n: usize) -> Vec<Arc<str>> {
    (0..n).map(|i| Arc::from(i.to_string())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    #[test]
    fn start_timestamp_is_2016() {
        let start = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(start.timestamp_nanos_opt(), Some(START_TIMESTAMP_NANOS));
    }

    #[test]
    fn create_table_ddl() {
        let sql = create_table_sql();
        assert!(sql.starts_with("create table cpu (hostname symbol, region symbol,"));
        assert!(sql.contains("usage_guest_nice double, timestamp timestamp)"));
        assert!(sql.ends_with("timestamp(timestamp) partition by day"));
        assert_eq!(sql.matches(" symbol").count(), SYMBOL_COUNT);
        assert_eq!(sql.matches(" double").count(), DOUBLE_COUNT);
    }

    #[test]
    fn default_tables_are_complete() {
        let tables = ChoiceTables::default();
        assert_eq!(tables.first_empty(), None);
        assert_eq!(tables.regions.len(), 9);
        assert_eq!(tables.racks.len(), 100);
        assert_eq!(&*tables.racks[99], "99");
        assert_eq!(tables.service.len(), 20);
        assert_eq!(tables.service_version.len(), 2);
    }

    #[test]
    fn empty_table_is_reported() {
        let tables = ChoiceTables {
            team: vec![],
            ..Default::default()
        };
        assert_eq!(tables.first_empty(), Some("team"));
    }
}
