//! CLI config for the tokio runtime the commands run on.

use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

/// Tokio runtime type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum TokioRuntimeType {
    /// Current-thread runtime.
    CurrentThread,

    /// Multi-thread runtime.
    #[default]
    MultiThread,
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TokioConfig {
    /// Set the maximum number of runtime threads to use.
    ///
    /// Defaults to the number of logical cores on the system.
    #[clap(long = "num-threads", env = "TSBS_NUM_THREADS", global = true, action)]
    pub(crate) num_threads: Option<NonZeroUsize>,

    /// Tokio runtime type.
    #[clap(
        long = "runtime-type",
        env = "TSBS_RUNTIME_TYPE",
        default_value_t = TokioRuntimeType::default(),
        value_enum,
        global = true,
        action
    )]
    pub(crate) runtime_type: TokioRuntimeType,

    /// Sets a custom timeout for a thread in the blocking pool.
    #[clap(
        long = "runtime-thread-keep-alive",
        env = "TSBS_RUNTIME_THREAD_KEEP_ALIVE",
        value_parser = humantime::parse_duration,
        global = true
    )]
    pub(crate) thread_keep_alive: Option<Duration>,
}

impl TokioConfig {
    /// A runtime builder for the chosen flavour with timers and sockets enabled.
    ///
    /// Threads are named `tsbs-rt-<n>`. The worker count falls back to the number of logical
    /// cores. Logging is installed only once the runtime runs, so this must not log.
    pub(crate) fn builder(&self) -> Result<tokio::runtime::Builder, std::io::Error> {
        let mut builder = match self.runtime_type {
            TokioRuntimeType::CurrentThread => tokio::runtime::Builder::new_current_thread(),
            TokioRuntimeType::MultiThread => tokio::runtime::Builder::new_multi_thread(),
        };
        builder.enable_all();

        let next_thread = AtomicUsize::new(0);
        builder.thread_name_fn(move || {
            format!("tsbs-rt-{}", next_thread.fetch_add(1, Ordering::Relaxed))
        });

        let worker_threads = match self.num_threads {
            Some(n) => n,
            None => std::thread::available_parallelism()?,
        };
        builder.worker_threads(worker_threads.get());

        if let Some(keep_alive) = self.thread_keep_alive {
            builder.thread_keep_alive(keep_alive);
        }
        Ok(builder)
    }
}
