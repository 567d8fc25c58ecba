//! The contract shared by every recommendation engine.

use crate::error::Result;
use data_model::DataModel;

/// Common `fit` / `predict` / ranking contract.
///
/// ## Design Note
/// - `Send + Sync` lets a trained recommender serve predictions from many
///   threads at once
/// - `predict` never fails: an undefined prediction is NaN, and ranking
///   filters NaN out
pub trait Recommender: Send + Sync {
    /// Returns the name of this engine (for logging/debugging)
    fn name(&self) -> &str;

    /// The rating store this recommender was built on
    fn data_model(&self) -> &DataModel;

    /// Train the model. Calling it twice gives the same model as calling it
    /// once, up to the random seed.
    fn fit(&mut self) -> Result<()>;

    /// Predicted rating of a user for an item, NaN when undefined
    fn predict(&self, user_index: usize, item_index: usize) -> f64;

    /// Rank `candidates` for a user.
    ///
    /// Returns at most `n` item indices by descending prediction; NaN
    /// predictions are dropped and ties go to the lower item index.
    fn recommend(&self, user_index: usize, candidates: &[usize], n: usize) -> Vec<usize> {
        let mut candidates = candidates.to_vec();
        candidates.sort_unstable();
        candidates.dedup();
        rank(
            candidates
                .into_iter()
                .map(|item_index| (item_index, self.predict(user_index, item_index))),
            n,
        )
    }
}

/// Order (index, score) pairs by descending score, then ascending index,
/// dropping NaN scores and keeping the first `n`
pub fn rank(scored: impl IntoIterator<Item = (usize, f64)>, n: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = scored
        .into_iter()
        .filter(|(_, score)| !score.is_nan())
        .collect();
    scored.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(n);
    scored.into_iter().map(|(index, _)| index).collect()
}
