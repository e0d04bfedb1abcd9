use mqbench_core::{ConfigError, Summary};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid benchmark config: {0}")]
    Config(#[from] ConfigError),

    /// The benchmark could not start. No measurements exist.
    #[error("could not start benchmark: setup failed on connection {connection}: {source}")]
    Setup {
        connection: u64,
        #[source]
        source: BoxError,
    },

    /// The benchmark ran, but cleanup failed on some connections. The
    /// measurements are kept in the error.
    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

impl BenchError {
    /// True when the run never started and there is no [`Summary`].
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BenchError::Teardown(_))
    }

    pub fn summary(&self) -> Option<&Summary> {
        match self {
            BenchError::Teardown(err) => Some(err.summary()),
            _ => None,
        }
    }

    pub fn into_summary(self) -> Option<Summary> {
        match self {
            BenchError::Teardown(err) => Some(err.into_summary()),
            _ => None,
        }
    }
}

/// Post-run failures: backends whose teardown failed, and worker tasks that
/// did not finish (their samples and backend are lost). A backend that panics
/// inside a request is not one of these; its worker records the failure and
/// the backend is torn down as usual.
#[derive(Debug, Error)]
#[error("benchmark ran but {} connection(s) failed to shut down cleanly", .failures.len())]
pub struct TeardownError {
    summary: Box<Summary>,
    failures: Vec<TeardownFailure>,
}

impl TeardownError {
    pub(crate) fn new(summary: Summary, failures: Vec<TeardownFailure>) -> Self {
        Self {
            summary: Box::new(summary),
            failures,
        }
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn into_summary(self) -> Summary {
        *self.summary
    }

    pub fn failures(&self) -> &[TeardownFailure] {
        &self.failures
    }
}

#[derive(Debug, Error)]
#[error("connection {connection}: {source}")]
pub struct TeardownFailure {
    pub connection: u64,
    #[source]
    pub source: BoxError,
}
