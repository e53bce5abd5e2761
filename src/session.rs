use crate::cli::Cli;
use crate::ops::{vector_backend, BackendKind};
use crate::parallel::Pool;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub backend: Option<BackendKind>,
    pub threads: usize,
    pub verbosity: u8,
}

impl Session {
    pub fn with_threads(mut self, threads: usize) -> Session {
        self.threads = threads;
        self
    }

    /// Default log level, before `RUST_LOG` is applied
    pub fn log_filter(&self) -> log::LevelFilter {
        match self.verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Fix the process-wide vector backend, returning the one in use
    pub fn install(&self) -> BackendKind {
        vector_backend(self.backend)
    }

    /// Workers for parallel commands, polling the process-wide interrupt
    pub fn pool(&self) -> Pool<'static> {
        Pool::new(self.threads)
    }
}

impl From<Cli> for Session {
    fn from(value: Cli) -> Self {
        Session {
            backend: value.backend,
            threads: value.threads,
            verbosity: value.verbose,
        }
    }
}
