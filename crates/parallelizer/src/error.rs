//! Error types for parallel sweeps.

use thiserror::Error;

/// Boxed error carried out of a worker
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a Parallelizer sweep
#[derive(Error, Debug)]
pub enum ParallelError {
    /// A `run` call failed; the first failure to occur wins
    #[error("Worker {worker} failed on entity {index}: {source}")]
    WorkerFailure {
        worker: String,
        index: usize,
        #[source]
        source: BoxError,
    },

    /// `before_run` or `after_run` failed
    #[error("Worker {worker} failed in {stage}: {source}")]
    Hook {
        worker: String,
        stage: &'static str,
        #[source]
        source: BoxError,
    },

    /// Every entity needs exactly one output slot
    #[error("Sweep over {entities} entities given {outputs} output slots")]
    LengthMismatch { entities: usize, outputs: usize },

    /// A dedicated pool needs at least one thread
    #[error("Invalid number of worker threads: {0}")]
    InvalidThreads(usize),

    /// Rayon could not build the dedicated pool
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, ParallelError>;
