//! The per-entity worker contract swept by the Parallelizer.

/// A unit of work applied to every entity of a collection.
///
/// The Parallelizer calls `before_run` once, `run` exactly once per entity
/// (in no particular order, from several threads), then `after_run` once.
///
/// `run` only gets `&self`: anything shared across entities is read-only
/// during the sweep. What a run produces goes into `output`, the slot owned
/// by that entity alone, so per-entity writes never need a lock.
pub trait Partible<E: Sync>: Sync {
    /// Per-entity output slot
    type Output: Send;

    /// Returns the name of this worker (for logging/debugging)
    fn name(&self) -> &str;

    /// Called once before any `run`
    fn before_run(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Process one entity, writing its result into `output`
    fn run(&self, index: usize, entity: &E, output: &mut Self::Output) -> anyhow::Result<()>;

    /// Called once after every `run` has returned
    fn after_run(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
