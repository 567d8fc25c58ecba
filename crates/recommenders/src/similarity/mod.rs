//! All-pairs similarity between entities of one kind.
//!
//! A [`SimilaritySweep`] is a Partible worker over users or items: the run
//! for entity `a` fills row `a` of a dense [`SimilarityTable`]. Metrics only
//! see two entities and a [`SimilarityContext`]; co-rated pairs are found
//! with a two-pointer merge over the sorted adjacencies.

mod metrics;

pub use metrics::{
    AdjustedCosine, CorrelationConstrained, Cosine, Jaccard, MeanSquaredDifference, MetricKind,
    Pearson,
};

use anyhow::bail;
use data_model::{DataModel, Entity, EntityKind};
use parallelizer::Partible;
use tracing::debug;

/// Similarity between two entities of the same kind.
///
/// Higher means more similar. Return `f64::NEG_INFINITY` when the
/// similarity does not exist (no co-ratings, zero denominator).
pub trait SimilarityMetric: Send + Sync {
    /// Returns the name of this metric (for logging/debugging)
    fn name(&self) -> &str;

    fn similarity(
        &self,
        active: &dyn Entity,
        target: &dyn Entity,
        ctx: &SimilarityContext<'_>,
    ) -> f64;
}

/// Read-only data a metric may need besides the two entities
#[derive(Debug, Clone, Copy)]
pub struct SimilarityContext<'a> {
    /// Means of the entities on the other side, by index
    pub other_means: &'a [f64],
}

/// One rating shared by two entities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoRating {
    /// Index of the other-side entity both rated (or were rated by)
    pub other: usize,
    pub active: f64,
    pub target: f64,
}

/// Linear merge over two sorted adjacencies
#[derive(Debug, Clone)]
pub struct CoRatings<'a> {
    active_indices: &'a [usize],
    active_ratings: &'a [f64],
    target_indices: &'a [usize],
    target_ratings: &'a [f64],
    a: usize,
    t: usize,
}

impl Iterator for CoRatings<'_> {
    type Item = CoRating;

    fn next(&mut self) -> Option<CoRating> {
        while self.a < self.active_indices.len() && self.t < self.target_indices.len() {
            let active = self.active_indices[self.a];
            let target = self.target_indices[self.t];
            if active < target {
                self.a += 1;
            } else if active > target {
                self.t += 1;
            } else {
                let co_rating = CoRating {
                    other: active,
                    active: self.active_ratings[self.a],
                    target: self.target_ratings[self.t],
                };
                self.a += 1;
                self.t += 1;
                return Some(co_rating);
            }
        }
        None
    }
}

/// Ratings shared by two entities, in ascending other-side index
pub fn co_ratings<'a>(active: &'a dyn Entity, target: &'a dyn Entity) -> CoRatings<'a> {
    CoRatings {
        active_indices: active.adjacency(),
        active_ratings: active.ratings(),
        target_indices: target.adjacency(),
        target_ratings: target.ratings(),
        a: 0,
        t: 0,
    }
}

/// Dense N×N table of similarities, one row per entity.
///
/// Allocated up front and filled with −∞; the diagonal stays −∞.
#[derive(Debug, Clone, Default)]
pub struct SimilarityTable {
    rows: Vec<Vec<f64>>,
}

impl SimilarityTable {
    pub fn new(size: usize) -> Self {
        Self {
            rows: vec![vec![f64::NEG_INFINITY; size]; size],
        }
    }

    /// Number of rows (and columns)
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Similarities of `a` to every entity
    pub fn row(&self, a: usize) -> Option<&[f64]> {
        self.rows.get(a).map(Vec::as_slice)
    }

    /// sim(a, b); −∞ when undefined or out of range
    pub fn get(&self, a: usize, b: usize) -> f64 {
        self.rows
            .get(a)
            .and_then(|row| row.get(b))
            .copied()
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// Rows as sweep output slots
    pub fn rows_mut(&mut self) -> &mut [Vec<f64>] {
        &mut self.rows
    }
}

/// Partible worker computing one similarity row per entity
pub struct SimilaritySweep<'a, E: Entity> {
    model: &'a DataModel,
    entities: &'a [E],
    kind: EntityKind,
    metric: &'a dyn SimilarityMetric,
    other_means: Vec<f64>,
}

impl<'a, E: Entity> SimilaritySweep<'a, E> {
    pub fn new(
        model: &'a DataModel,
        entities: &'a [E],
        kind: EntityKind,
        metric: &'a dyn SimilarityMetric,
    ) -> Self {
        Self {
            model,
            entities,
            kind,
            metric,
            other_means: Vec::new(),
        }
    }
}

impl<E: Entity> Partible<E> for SimilaritySweep<'_, E> {
    type Output = Vec<f64>;

    fn name(&self) -> &str {
        self.metric.name()
    }

    fn before_run(&mut self) -> anyhow::Result<()> {
        self.other_means = self.model.means(self.kind.other());
        Ok(())
    }

    fn run(&self, index: usize, active: &E, row: &mut Vec<f64>) -> anyhow::Result<()> {
        if row.len() != self.entities.len() {
            bail!(
                "similarity row for {} {} has {} columns, expected {}",
                self.kind,
                index,
                row.len(),
                self.entities.len()
            );
        }

        let ctx = SimilarityContext {
            other_means: &self.other_means,
        };
        for (b, target) in self.entities.iter().enumerate() {
            row[b] = if b == index {
                f64::NEG_INFINITY
            } else {
                self.metric.similarity(active, target, &ctx)
            };
        }
        Ok(())
    }

    fn after_run(&mut self) -> anyhow::Result<()> {
        debug!(kind = %self.kind, metric = self.metric.name(), "Similarity rows computed");
        Ok(())
    }
}
