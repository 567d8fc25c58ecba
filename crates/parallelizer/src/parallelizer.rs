//! Sweep executor over a rayon pool.
//!
//! ## Algorithm
//! 1. Check there is one output slot per entity
//! 2. Run `before_run`
//! 3. Zip entities with their output slots and hand the pairs to the pool
//! 4. Drain the whole sweep, keeping only the first failure
//! 5. Run `after_run`
//!
//! `exec` returns only after the pool has joined, so every write of one
//! sweep is visible to the next.

use crate::error::{ParallelError, Result};
use crate::partible::Partible;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, debug_span, warn};

/// Applies a Partible worker to every element of an entity slice in parallel
#[derive(Debug, Clone, Default)]
pub struct Parallelizer {
    /// Dedicated pool; `None` means rayon's global pool
    pool: Option<Arc<ThreadPool>>,
}

impl Parallelizer {
    /// Use the global pool (one thread per hardware thread)
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Use a dedicated pool of exactly `threads` workers
    pub fn with_threads(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(ParallelError::InvalidThreads(threads));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("sweep-worker-{}", i))
            .build()?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    /// Number of threads a sweep can use
    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run one sweep of `worker` over `entities`.
    ///
    /// `outputs[i]` is the slot handed to the run of `entities[i]`. If any
    /// run fails the sweep still visits every entity, then the first
    /// failure is returned and `after_run` is skipped.
    pub fn exec<E, P>(
        &self,
        entities: &[E],
        worker: &mut P,
        outputs: &mut [P::Output],
    ) -> Result<()>
    where
        E: Sync,
        P: Partible<E>,
    {
        if entities.len() != outputs.len() {
            return Err(ParallelError::LengthMismatch {
                entities: entities.len(),
                outputs: outputs.len(),
            });
        }

        let name = worker.name().to_string();
        let span = debug_span!("sweep", worker = %name, entities = entities.len());
        let _enter = span.enter();
        let start = Instant::now();

        worker.before_run().map_err(|err| ParallelError::Hook {
            worker: name.clone(),
            stage: "before_run",
            source: err.into(),
        })?;

        let first_failure: OnceLock<(usize, anyhow::Error)> = OnceLock::new();
        {
            let worker: &P = worker;
            match &self.pool {
                Some(pool) => pool.install(|| sweep(entities, worker, outputs, &first_failure)),
                None => sweep(entities, worker, outputs, &first_failure),
            }
        }

        if let Some((index, err)) = first_failure.into_inner() {
            return Err(ParallelError::WorkerFailure {
                worker: name,
                index,
                source: err.into(),
            });
        }

        worker.after_run().map_err(|err| ParallelError::Hook {
            worker: name.clone(),
            stage: "after_run",
            source: err.into(),
        })?;

        debug!(elapsed_us = start.elapsed().as_micros() as u64, "Sweep complete");
        Ok(())
    }

    /// Sweep a worker that produces no per-entity output
    pub fn exec_each<E, P>(&self, entities: &[E], worker: &mut P) -> Result<()>
    where
        E: Sync,
        P: Partible<E, Output = ()>,
    {
        let mut outputs = vec![(); entities.len()];
        self.exec(entities, worker, &mut outputs)
    }
}

/// Visit every (entity, slot) pair on the current pool
fn sweep<E, P>(
    entities: &[E],
    worker: &P,
    outputs: &mut [P::Output],
    first_failure: &OnceLock<(usize, anyhow::Error)>,
) where
    E: Sync,
    P: Partible<E>,
{
    entities
        .par_iter()
        .zip(outputs.par_iter_mut())
        .enumerate()
        .for_each(|(index, (entity, output))| {
            if let Err(err) = worker.run(index, entity, output) {
                if let Err((index, err)) = first_failure.set((index, err)) {
                    warn!(index, error = %err, "Dropping later worker failure");
                }
            }
        });
}
