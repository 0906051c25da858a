//! Throughput figures for a finished phase.

use std::{fmt, time::Duration};

const MIB: f64 = 1024.0 * 1024.0;

/// Totals for one fan-out run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub rows: usize,
    /// Encoded line protocol bytes across all workers.
    pub bytes: usize,
    /// From just before the workers were dispatched to just after the last one finished.
    pub elapsed: Duration,
    pub workers: usize,
}

impl RunSummary {
    pub fn mib(&self) -> f64 {
        self.bytes as f64 / MIB
    }

    /// Millions of rows per second.
    pub fn mil_rows_per_sec(&self) -> f64 {
        rate(self.rows as f64 / 1_000_000.0, self.elapsed)
    }

    pub fn mib_per_sec(&self) -> f64 {
        rate(self.mib(), self.elapsed)
    }

    /// Render the summary under a heading such as `Serialized` or `Sent`.
    pub fn display<'a>(&'a self, label: &'a str) -> impl fmt::Display + 'a {
        Labelled {
            label,
            summary: self,
        }
    }
}

fn rate(amount: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { amount / secs } else { 0.0 }
}

struct Labelled<'a> {
    label: &'a str,
    summary: &'a RunSummary,
}

impl fmt::Display for Labelled<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary;
        writeln!(f, "{}:", self.label)?;
        writeln!(
            f,
            "  {} rows in {:.2}s: {:.2} mil rows/sec.",
            s.rows,
            s.elapsed.as_secs_f64(),
            s.mil_rows_per_sec()
        )?;
        write!(
            f,
            "  ILP Buffer size: {:.2} MiB: {:.2} MiB/sec.",
            s.mib(),
            s.mib_per_sec()
        )
    }
}
