//! CLI flags for logging and installing the global subscriber.

use std::io::IsTerminal;

use tracing_subscriber::{EnvFilter, fmt::writer::BoxMakeWriter};

/// Used when neither `--log-filter` nor `-v` is given.
pub(crate) const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to install log subscriber: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum LogFormat {
    /// human-readable, single line
    #[default]
    Full,
    /// human-readable, multi line
    Pretty,
    /// machine-parseable
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum LogDestination {
    Stdout,
    #[default]
    Stderr,
}

/// CLI config for the logging related subset of options.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct LoggingConfig {
    /// Logs: filter directive
    ///
    /// Configures log severity level filter, by target.
    ///
    /// Simplest options: error, warn, info, debug, trace
    ///
    /// Levels for different modules can be specified. For example
    /// `debug,reqwest=info` specifies debug logging for all modules
    /// except for the `reqwest` crate which will only display info
    /// level logging.
    ///
    /// Overridden by `-v`.
    #[clap(long = "log-filter", env = "LOG_FILTER", global = true)]
    pub(crate) log_filter: Option<String>,

    /// Logs: filter short-hand
    ///
    /// Convenient way to set log severity level filter.
    /// Overrides `--log-filter`.
    ///
    /// -v   'info'
    ///
    /// -vv  'debug,hyper=info,reqwest=info'
    ///
    /// -vvv 'trace,hyper=info,reqwest=info'
    #[clap(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true
    )]
    pub(crate) log_verbose_count: u8,

    /// Logs: destination
    ///
    /// Statistics and `--write-ilp -` go to stdout, so logs default to stderr.
    #[clap(
        long = "log-destination",
        env = "LOG_DESTINATION",
        default_value_t = LogDestination::default(),
        value_enum,
        global = true
    )]
    pub(crate) log_destination: LogDestination,

    /// Logs: message format
    #[clap(
        long = "log-format",
        env = "LOG_FORMAT",
        default_value_t = LogFormat::default(),
        value_enum,
        global = true
    )]
    pub(crate) log_format: LogFormat,
}

impl LoggingConfig {
    /// The filter directive in effect: `-v` wins over `--log-filter`, which wins over the default.
    pub(crate) fn filter_directive(&self) -> &str {
        match self.log_verbose_count {
            0 => self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER),
            1 => "info",
            2 => "debug,hyper=info,reqwest=info",
            _ => "trace,hyper=info,reqwest=info",
        }
    }

    pub(crate) fn install_global_subscriber(&self) -> Result<(), Error> {
        let filter = EnvFilter::try_new(self.filter_directive())?;
        let (writer, ansi) = match self.log_destination {
            LogDestination::Stdout => (
                BoxMakeWriter::new(std::io::stdout),
                std::io::stdout().is_terminal(),
            ),
            LogDestination::Stderr => (
                BoxMakeWriter::new(std::io::stderr),
                std::io::stderr().is_terminal(),
            ),
        };
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi);
        match self.log_format {
            LogFormat::Full => builder.try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
            LogFormat::Json => builder.json().try_init(),
        }
        .map_err(Error::Install)
    }
}
