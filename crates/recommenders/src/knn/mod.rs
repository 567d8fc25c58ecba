//! Neighborhood-based collaborative filtering.
//!
//! Both engines share the same training: a similarity sweep fills a dense
//! table, then a neighbor sweep keeps the k most similar entities of every
//! row. They differ only in which side of the rating matrix is compared
//! and how a prediction walks the neighbor lists.

mod item_knn;
mod top_n;
mod user_knn;

pub use item_knn::ItemKnn;
pub use top_n::top_n;
pub use user_knn::UserKnn;

use crate::error::{RecommenderError, Result};
use crate::similarity::{SimilarityMetric, SimilaritySweep, SimilarityTable};
use anyhow::anyhow;
use data_model::{DataModel, Entity, EntityKind};
use parallelizer::{Parallelizer, Partible};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// How neighbor ratings are combined into a prediction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Plain mean of the neighbor ratings
    Mean,
    /// Similarity-weighted mean
    #[default]
    WeightedMean,
    /// Target mean plus the mean deviation of the neighbors
    DeviationFromMean,
    /// Target mean plus the similarity-weighted deviation
    WeightedDeviationFromMean,
}

/// One entry of a neighbor list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub similarity: f64,
}

/// A neighbor's share of a prediction
#[derive(Debug, Clone, Copy)]
pub(crate) struct Contribution {
    pub similarity: f64,
    pub rating: f64,
    pub neighbor_mean: f64,
}

impl Aggregation {
    /// Combine contributions; NaN when nothing contributes or a
    /// denominator is zero
    pub(crate) fn aggregate(
        self,
        target_mean: f64,
        contributions: impl Iterator<Item = Contribution>,
    ) -> f64 {
        let (mut num, mut den, mut count) = (0.0, 0.0, 0usize);
        for c in contributions {
            match self {
                Aggregation::Mean => num += c.rating,
                Aggregation::WeightedMean => {
                    num += c.similarity * c.rating;
                    den += c.similarity;
                }
                Aggregation::DeviationFromMean => num += c.rating - c.neighbor_mean,
                Aggregation::WeightedDeviationFromMean => {
                    num += c.similarity * (c.rating - c.neighbor_mean);
                    den += c.similarity.abs();
                }
            }
            count += 1;
        }

        if count == 0 {
            return f64::NAN;
        }
        match self {
            Aggregation::Mean => num / count as f64,
            Aggregation::DeviationFromMean => target_mean + num / count as f64,
            Aggregation::WeightedMean if den == 0.0 => f64::NAN,
            Aggregation::WeightedMean => num / den,
            Aggregation::WeightedDeviationFromMean if den == 0.0 => f64::NAN,
            Aggregation::WeightedDeviationFromMean => target_mean + num / den,
        }
    }
}

/// Partible worker turning similarity rows into top-k neighbor lists
struct NeighborSweep<'a> {
    table: &'a SimilarityTable,
    k: usize,
}

impl<E: Entity> Partible<E> for NeighborSweep<'_> {
    type Output = Vec<Neighbor>;

    fn name(&self) -> &str {
        "NeighborSweep"
    }

    fn run(&self, index: usize, _entity: &E, neighbors: &mut Vec<Neighbor>) -> anyhow::Result<()> {
        let row = self
            .table
            .row(index)
            .ok_or_else(|| anyhow!("no similarity row for entity {}", index))?;
        *neighbors = top_n(row, self.k);
        Ok(())
    }
}

/// Trained state shared by ItemKNN and UserKNN
pub(crate) struct KnnState {
    kind: EntityKind,
    k: usize,
    metric: Box<dyn SimilarityMetric>,
    aggregation: Aggregation,
    parallelizer: Parallelizer,
    similarities: SimilarityTable,
    neighbors: Vec<Vec<Neighbor>>,
}

impl KnnState {
    pub(crate) fn new(
        kind: EntityKind,
        k: usize,
        metric: Box<dyn SimilarityMetric>,
        aggregation: Aggregation,
    ) -> Result<Self> {
        if k == 0 {
            return Err(RecommenderError::invalid("k", "number of neighbors must be at least 1"));
        }
        Ok(Self {
            kind,
            k,
            metric,
            aggregation,
            parallelizer: Parallelizer::new(),
            similarities: SimilarityTable::default(),
            neighbors: Vec::new(),
        })
    }

    pub(crate) fn set_parallelizer(&mut self, parallelizer: Parallelizer) {
        self.parallelizer = parallelizer;
    }

    /// Similarity sweep followed by the neighbor sweep
    pub(crate) fn fit<E: Entity>(&mut self, model: &DataModel, entities: &[E]) -> Result<()> {
        let start = Instant::now();
        let n = entities.len();

        self.similarities = SimilarityTable::new(n);
        let mut similarity_sweep =
            SimilaritySweep::new(model, entities, self.kind, self.metric.as_ref());
        self.parallelizer
            .exec(entities, &mut similarity_sweep, self.similarities.rows_mut())?;

        self.neighbors = vec![Vec::new(); n];
        let mut neighbor_sweep = NeighborSweep {
            table: &self.similarities,
            k: self.k,
        };
        self.parallelizer
            .exec(entities, &mut neighbor_sweep, &mut self.neighbors)?;

        info!(
            kind = %self.kind,
            metric = self.metric.name(),
            entities = n,
            k = self.k,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Neighborhoods computed"
        );
        Ok(())
    }

    pub(crate) fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub(crate) fn k(&self) -> usize {
        self.k
    }

    pub(crate) fn metric(&self) -> &dyn SimilarityMetric {
        self.metric.as_ref()
    }

    pub(crate) fn similarities(&self, index: usize) -> Option<&[f64]> {
        self.similarities.row(index)
    }

    pub(crate) fn neighbors(&self, index: usize) -> Option<&[Neighbor]> {
        self.neighbors.get(index).map(Vec::as_slice)
    }

    /// Neighbor list of `index` as a k-wide array right-padded with -1
    pub(crate) fn padded_neighbors(&self, index: usize) -> Option<Vec<i64>> {
        let neighbors = self.neighbors.get(index)?;
        let mut padded: Vec<i64> = neighbors.iter().map(|n| n.index as i64).collect();
        padded.resize(self.k, -1);
        Some(padded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contributions(values: &[(f64, f64, f64)]) -> impl Iterator<Item = Contribution> + '_ {
        values.iter().map(|&(similarity, rating, neighbor_mean)| Contribution {
            similarity,
            rating,
            neighbor_mean,
        })
    }

    #[test]
    fn test_aggregations() {
        let values = [(0.8, 4.0, 3.5), (0.2, 2.0, 2.5)];

        let mean = Aggregation::Mean.aggregate(3.0, contributions(&values));
        assert!((mean - 3.0).abs() < 1e-12);

        let weighted = Aggregation::WeightedMean.aggregate(3.0, contributions(&values));
        assert!((weighted - 3.6).abs() < 1e-12);

        // 3 + ((0.5) + (-0.5)) / 2
        let deviation = Aggregation::DeviationFromMean.aggregate(3.0, contributions(&values));
        assert!((deviation - 3.0).abs() < 1e-12);

        // 3 + (0.8 * 0.5 + 0.2 * -0.5) / 1.0
        let weighted_deviation =
            Aggregation::WeightedDeviationFromMean.aggregate(3.0, contributions(&values));
        assert!((weighted_deviation - 3.3).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_deviation_uses_absolute_weights() {
        let values = [(0.5, 4.0, 3.0), (-0.5, 2.0, 3.0)];
        // 3 + (0.5 * 1 + -0.5 * -1) / 1.0
        let prediction =
            Aggregation::WeightedDeviationFromMean.aggregate(3.0, contributions(&values));
        assert!((prediction - 4.0).abs() < 1e-12);
        // Signed weights cancel out for the weighted mean
        assert!(Aggregation::WeightedMean.aggregate(3.0, contributions(&values)).is_nan());
    }

    #[test]
    fn test_no_contributions_is_nan() {
        for aggregation in [
            Aggregation::Mean,
            Aggregation::WeightedMean,
            Aggregation::DeviationFromMean,
            Aggregation::WeightedDeviationFromMean,
        ] {
            assert!(aggregation.aggregate(3.0, contributions(&[])).is_nan());
        }
    }

    #[test]
    fn test_zero_k_is_rejected() {
        let metric = Box::new(crate::similarity::Cosine);
        let err = KnnState::new(EntityKind::Item, 0, metric, Aggregation::Mean);
        assert!(matches!(err, Err(RecommenderError::InvalidConfig { parameter: "k", .. })));
    }

    #[test]
    fn test_aggregation_serde_names() {
        let aggregation: Aggregation =
            serde_json::from_str("\"weighted_deviation_from_mean\"").unwrap();
        assert_eq!(aggregation, Aggregation::WeightedDeviationFromMean);
        assert_eq!(Aggregation::default(), Aggregation::WeightedMean);
    }
}
