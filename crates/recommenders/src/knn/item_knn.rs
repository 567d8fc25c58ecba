//! Item-to-item neighborhood recommender.

use super::{Aggregation, Contribution, KnnState, Neighbor};
use crate::error::Result;
use crate::recommender::Recommender;
use crate::similarity::SimilarityMetric;
use data_model::{DataModel, EntityKind};
use parallelizer::Parallelizer;
use std::sync::Arc;
use tracing::instrument;

/// ItemKNN: predicts from the ratings a user gave to the k items most
/// similar to the target item.
pub struct ItemKnn {
    model: Arc<DataModel>,
    state: KnnState,
}

impl ItemKnn {
    /// Create an untrained recommender; `k` must be at least 1
    pub fn new(
        model: Arc<DataModel>,
        k: usize,
        metric: Box<dyn SimilarityMetric>,
        aggregation: Aggregation,
    ) -> Result<Self> {
        Ok(Self {
            model,
            state: KnnState::new(EntityKind::Item, k, metric, aggregation)?,
        })
    }

    /// Run training sweeps on this parallelizer instead of the global pool
    pub fn with_parallelizer(mut self, parallelizer: Parallelizer) -> Self {
        self.state.set_parallelizer(parallelizer);
        self
    }

    /// Similarity row of an item; `None` before `fit`
    pub fn similarities(&self, item_index: usize) -> Option<&[f64]> {
        self.state.similarities(item_index)
    }

    /// Up to k neighbors of an item, best first
    pub fn neighbors(&self, item_index: usize) -> Option<&[Neighbor]> {
        self.state.neighbors(item_index)
    }

    /// Neighbor indices padded to k with -1
    pub fn padded_neighbors(&self, item_index: usize) -> Option<Vec<i64>> {
        self.state.padded_neighbors(item_index)
    }

    pub fn number_of_neighbors(&self) -> usize {
        self.state.k()
    }

    pub fn aggregation(&self) -> Aggregation {
        self.state.aggregation()
    }

    pub fn metric(&self) -> &dyn SimilarityMetric {
        self.state.metric()
    }
}

impl Recommender for ItemKnn {
    fn name(&self) -> &str {
        "ItemKNN"
    }

    fn data_model(&self) -> &DataModel {
        &self.model
    }

    #[instrument(skip(self), fields(items = self.model.number_of_items(), k = self.state.k()))]
    fn fit(&mut self) -> Result<()> {
        self.state.fit(&self.model, self.model.items())
    }

    fn predict(&self, user_index: usize, item_index: usize) -> f64 {
        let (Some(user), Some(item)) = (self.model.user(user_index), self.model.item(item_index))
        else {
            return f64::NAN;
        };
        let neighbors = self.state.neighbors(item_index).unwrap_or_default();
        let items = self.model.items();

        let contributions = neighbors.iter().filter_map(|neighbor| {
            let position = user.find_item(neighbor.index)?;
            Some(Contribution {
                similarity: neighbor.similarity,
                rating: user.rating_at(position),
                neighbor_mean: items[neighbor.index].rating_average(),
            })
        });
        self.state.aggregation().aggregate(item.rating_average(), contributions)
    }
}
