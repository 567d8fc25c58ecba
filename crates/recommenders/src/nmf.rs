//! Non-negative matrix factorization with multiplicative updates.
//!
//! The rating matrix R (users × items, observed cells only) is approximated
//! by W·Hᵀ with W ∈ ℝ^{U×F} and H ∈ ℝ^{I×F}, both strictly positive. Each
//! iteration is two sweeps: every user row of W is updated against a frozen
//! H, then every item row of H against the new W.

use crate::error::{RecommenderError, Result};
use crate::recommender::Recommender;
use data_model::{DataModel, Entity};
use parallelizer::{Parallelizer, Partible};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{Level, debug, info, instrument};

/// Keeps the multiplicative update finite when every prediction is zero
const EPSILON: f64 = 1e-10;

/// Partible worker for one multiplicative update of W (or H).
///
/// The entity's own factor row is its output slot; the opposite matrix is
/// shared read-only.
struct UpdateFactors<'a> {
    name: &'static str,
    opposite: &'a [Vec<f64>],
}

impl<E: Entity> Partible<E> for UpdateFactors<'_> {
    type Output = Vec<f64>;

    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, _index: usize, entity: &E, factors: &mut Vec<f64>) -> anyhow::Result<()> {
        // Nothing observed: leave the (positive) initial values alone
        if entity.number_of_ratings() == 0 {
            return Ok(());
        }

        let predictions: Vec<f64> = entity
            .adjacency()
            .iter()
            .map(|&other| dot(factors, &self.opposite[other]))
            .collect();

        for k in 0..factors.len() {
            let mut sum_ratings = 0.0;
            let mut sum_predictions = 0.0;
            let observed = entity.adjacency().iter().zip(entity.ratings()).zip(&predictions);
            for ((&other, &rating), &prediction) in observed {
                let opposite = self.opposite[other][k];
                sum_ratings += opposite * rating;
                sum_predictions += opposite * prediction;
            }
            factors[k] *= sum_ratings / (sum_predictions + EPSILON);
        }
        Ok(())
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// NMF recommender
pub struct Nmf {
    model: Arc<DataModel>,
    num_factors: usize,
    num_iters: usize,
    seed: u64,
    parallelizer: Parallelizer,
    user_factors: Vec<Vec<f64>>,
    item_factors: Vec<Vec<f64>>,
}

impl Nmf {
    /// Create and randomly initialize a factorization.
    ///
    /// Every training rating must be strictly positive. Without a seed, the
    /// current wall-clock time in milliseconds is used.
    pub fn new(
        model: Arc<DataModel>,
        num_factors: usize,
        num_iters: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        if num_factors == 0 {
            return Err(RecommenderError::invalid("num_factors", "must be at least 1"));
        }
        if num_iters == 0 {
            return Err(RecommenderError::invalid("num_iters", "must be at least 1"));
        }
        // Multiplicative updates only keep factors positive on positive data
        let non_positive = model
            .users()
            .iter()
            .flat_map(|user| user.ratings().iter().copied())
            .find(|&rating| rating <= 0.0);
        if let Some(rating) = non_positive {
            return Err(RecommenderError::invalid(
                "ratings",
                format!("NMF requires strictly positive ratings, found {}", rating),
            ));
        }
        let seed = seed.unwrap_or_else(wall_clock_millis);

        let mut nmf = Self {
            model,
            num_factors,
            num_iters,
            seed,
            parallelizer: Parallelizer::new(),
            user_factors: Vec::new(),
            item_factors: Vec::new(),
        };
        nmf.initialize();
        Ok(nmf)
    }

    pub fn with_parallelizer(mut self, parallelizer: Parallelizer) -> Self {
        self.parallelizer = parallelizer;
        self
    }

    /// Draw every factor as `1 - u`, u uniform in [0, 1): users first, then
    /// items, from a generator seeded with `seed`
    fn initialize(&mut self) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let num_factors = self.num_factors;
        let mut draw = |rows: usize| -> Vec<Vec<f64>> {
            (0..rows)
                .map(|_| (0..num_factors).map(|_| 1.0 - rng.random::<f64>()).collect())
                .collect()
        };
        self.user_factors = draw(self.model.number_of_users());
        self.item_factors = draw(self.model.number_of_items());
    }

    /// One update of W followed by one update of H
    pub fn iterate(&mut self) -> Result<()> {
        let mut users = UpdateFactors {
            name: "NmfUserFactors",
            opposite: &self.item_factors,
        };
        self.parallelizer
            .exec(self.model.users(), &mut users, &mut self.user_factors)?;

        let mut items = UpdateFactors {
            name: "NmfItemFactors",
            opposite: &self.user_factors,
        };
        self.parallelizer
            .exec(self.model.items(), &mut items, &mut self.item_factors)?;
        Ok(())
    }

    /// Sum of squared errors over the observed ratings
    pub fn reconstruction_error(&self) -> f64 {
        let per_user: Vec<f64> = self
            .model
            .users()
            .par_iter()
            .zip(self.user_factors.par_iter())
            .map(|(user, factors)| {
                user.items()
                    .iter()
                    .zip(user.ratings())
                    .map(|(&item, &rating)| {
                        (rating - dot(factors, &self.item_factors[item])).powi(2)
                    })
                    .sum::<f64>()
            })
            .collect();
        // Summed in index order so the result does not depend on scheduling
        per_user.iter().sum()
    }

    pub fn user_factors(&self, user_index: usize) -> Option<&[f64]> {
        self.user_factors.get(user_index).map(Vec::as_slice)
    }

    pub fn item_factors(&self, item_index: usize) -> Option<&[f64]> {
        self.item_factors.get(item_index).map(Vec::as_slice)
    }

    pub fn num_factors(&self) -> usize {
        self.num_factors
    }

    pub fn num_iters(&self) -> usize {
        self.num_iters
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

impl Recommender for Nmf {
    fn name(&self) -> &str {
        "NMF"
    }

    fn data_model(&self) -> &DataModel {
        &self.model
    }

    /// Re-initialize from the seed, then run every iteration
    #[instrument(
        skip(self),
        fields(factors = self.num_factors, iters = self.num_iters, seed = self.seed)
    )]
    fn fit(&mut self) -> Result<()> {
        let start = Instant::now();
        self.initialize();

        for iteration in 1..=self.num_iters {
            self.iterate()?;
            if tracing::enabled!(Level::DEBUG) {
                debug!(iteration, error = self.reconstruction_error(), "NMF iteration");
            }
        }

        info!(
            factors = self.num_factors,
            iters = self.num_iters,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "NMF trained"
        );
        Ok(())
    }

    fn predict(&self, user_index: usize, item_index: usize) -> f64 {
        match (self.user_factors.get(user_index), self.item_factors.get(item_index)) {
            (Some(w), Some(h)) => dot(w, h),
            _ => f64::NAN,
        }
    }
}
