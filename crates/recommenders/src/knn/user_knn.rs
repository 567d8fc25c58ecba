//! User-to-user neighborhood recommender.

use super::{Aggregation, Contribution, KnnState, Neighbor};
use crate::error::Result;
use crate::recommender::Recommender;
use crate::similarity::SimilarityMetric;
use data_model::{DataModel, EntityKind};
use parallelizer::Parallelizer;
use std::sync::Arc;
use tracing::instrument;

/// UserKNN: predicts from the ratings the k users most similar to the
/// target user gave to the item.
pub struct UserKnn {
    model: Arc<DataModel>,
    state: KnnState,
}

impl UserKnn {
    pub fn new(
        model: Arc<DataModel>,
        k: usize,
        metric: Box<dyn SimilarityMetric>,
        aggregation: Aggregation,
    ) -> Result<Self> {
        Ok(Self {
            model,
            state: KnnState::new(EntityKind::User, k, metric, aggregation)?,
        })
    }

    pub fn with_parallelizer(mut self, parallelizer: Parallelizer) -> Self {
        self.state.set_parallelizer(parallelizer);
        self
    }

    pub fn similarities(&self, user_index: usize) -> Option<&[f64]> {
        self.state.similarities(user_index)
    }

    pub fn neighbors(&self, user_index: usize) -> Option<&[Neighbor]> {
        self.state.neighbors(user_index)
    }

    pub fn padded_neighbors(&self, user_index: usize) -> Option<Vec<i64>> {
        self.state.padded_neighbors(user_index)
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

impl Recommender for UserKnn {
    fn name(&self) -> &str {
        "UserKNN"
    }

    fn data_model(&self) -> &DataModel {
        &self.model
    }

    #[instrument(skip(self), fields(users = self.model.number_of_users(), k = self.state.k()))]
    fn fit(&mut self) -> Result<()> {
        self.state.fit(&self.model, self.model.users())
    }

    fn predict(&self, user_index: usize, item_index: usize) -> f64 {
        let (Some(user), Some(item)) = (self.model.user(user_index), self.model.item(item_index))
        else {
            return f64::NAN;
        };
        let neighbors = self.state.neighbors(user_index).unwrap_or_default();
        let users = self.model.users();

        let contributions = neighbors.iter().filter_map(|neighbor| {
            let position = item.find_user(neighbor.index)?;
            Some(Contribution {
                similarity: neighbor.similarity,
                rating: item.rating_at(position),
                neighbor_mean: users[neighbor.index].rating_average(),
            })
        });
        self.state.aggregation().aggregate(user.rating_average(), contributions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::Pearson;

    fn create_test_model() -> Arc<DataModel> {
        Arc::new(
            DataModel::from_ratings(vec![
                ("alice", "a", 5.0),
                ("alice", "b", 1.0),
                ("alice", "c", 4.0),
                ("bob", "a", 4.0),
                ("bob", "b", 2.0),
                ("bob", "d", 5.0),
                ("carol", "a", 1.0),
                ("carol", "b", 5.0),
                ("carol", "d", 2.0),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_neighbor_table_sized_by_users() {
        let model = create_test_model();
        let mut knn =
            UserKnn::new(model.clone(), 2, Box::new(Pearson), Aggregation::WeightedMean).unwrap();
        knn.fit().unwrap();

        assert!(knn.neighbors(model.number_of_users() - 1).is_some());
        assert!(knn.neighbors(model.number_of_users()).is_none());
        assert_eq!(knn.similarities(0).unwrap().len(), model.number_of_users());
    }

    #[test]
    fn test_predict_from_similar_user() {
        let model = create_test_model();
        let mut knn = UserKnn::new(model.clone(), 1, Box::new(Pearson), Aggregation::Mean).unwrap();
        knn.fit().unwrap();

        // alice agrees with bob on a/b and disagrees with carol
        let alice = model.user_index("alice").unwrap();
        let bob = model.user_index("bob").unwrap();
        assert_eq!(knn.neighbors(alice).unwrap()[0].index, bob);

        // bob gave d a 5
        let d = model.item_index("d").unwrap();
        assert_eq!(knn.predict(alice, d), 5.0);
    }

    #[test]
    fn test_unrated_by_neighbors_is_nan() {
        let model = create_test_model();
        let mut knn = UserKnn::new(model.clone(), 1, Box::new(Pearson), Aggregation::Mean).unwrap();
        knn.fit().unwrap();

        // carol disagrees with everyone; bob (-0.84) still beats alice (-1)
        let carol = model.user_index("carol").unwrap();
        let bob = model.user_index("bob").unwrap();
        assert_eq!(knn.neighbors(carol).unwrap()[0].index, bob);
        assert!(knn.neighbors(carol).unwrap()[0].similarity < 0.0);

        // Only alice rated c
        let c = model.item_index("c").unwrap();
        assert!(knn.predict(carol, c).is_nan());
        assert!(knn.recommend(carol, &[c], 5).is_empty());
    }
}
