//! Entrypoint of the tsbs binary
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

use dotenvy::dotenv;

mod commands {
    pub(crate) mod bench;
    pub(crate) mod common;
    pub(crate) mod raw_ilp;
}
mod logging;
mod runtime;

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "tsbs",
    version,
    about = "CPU metrics line protocol ingestion benchmark",
    long_about = r#"CPU metrics line protocol ingestion benchmark

Examples:
    # Measure encoding of 1M rows without touching a server
    tsbs bench --row-count 1000000

    # Send 10M rows over 8 connections and wait for the server to store them all
    tsbs bench --send --workers 8

    # Replay a previously written file
    tsbs bench --row-count 1000000 --write-ilp cpu.lp
    tsbs raw-ilp cpu.lp

    # Extra verbose logging
    tsbs bench -vv --send
"#
)]
struct Config {
    #[clap(flatten)]
    runtime_config: runtime::TokioConfig,

    #[clap(flatten)]
    logging_config: logging::LoggingConfig,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Generate the cpu dataset, measure encoding, and optionally send it to the server
    Bench(commands::bench::Config),

    /// Send a line protocol file verbatim over one connection
    RawIlp(commands::raw_ilp::Config),
}

fn main() -> Result<(), std::io::Error> {
    if let Err(e) = load_dotenv() {
        eprintln!("Reading .env failed: {e}");
        std::process::exit(ReturnCode::Failure as _);
    }

    let config: Config = clap::Parser::parse();

    let tokio_runtime = config.runtime_config.builder()?.build()?;

    tokio_runtime.block_on(async move {
        if let Err(e) = config.logging_config.install_global_subscriber() {
            eprintln!("Initializing logs failed: {e}");
            std::process::exit(ReturnCode::Failure as _);
        }

        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Bench(config)) => {
                if let Err(e) = commands::bench::command(config).await {
                    eprintln!("Bench command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Some(Command::RawIlp(config)) => {
                if let Err(e) = commands::raw_ilp::command(config).await {
                    eprintln!("Raw ILP command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Settings may come from a `.env` file in the working directory; not having one is fine.
/// Variables already set in the environment win over the file.
fn load_dotenv() -> Result<(), dotenvy::Error> {
    match dotenv() {
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other.map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Config::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let config =
            Config::try_parse_from(["tsbs", "bench", "-vv", "--num-threads", "2"]).unwrap();
        assert_eq!(config.logging_config.log_verbose_count, 2);
        assert_eq!(config.runtime_config.num_threads.map(|n| n.get()), Some(2));
        assert!(matches!(config.command, Some(Command::Bench(_))));
    }

    #[test]
    fn raw_ilp_subcommand() {
        let config = Config::try_parse_from(["tsbs", "raw-ilp", "cpu.lp"]).unwrap();
        assert!(matches!(config.command, Some(Command::RawIlp(_))));
    }
}
