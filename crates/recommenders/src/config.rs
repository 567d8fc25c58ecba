//! Recommender configuration.
//!
//! A configuration names the engine and its hyperparameters, e.g.
//!
//! ```json
//! { "model": "item_knn", "k": 30, "metric": "adjusted_cosine", "threads": 8 }
//! { "model": "user_knn", "k": 50, "metric": { "correlation_constrained": { "median": 3.0 } } }
//! { "model": "nmf", "num_factors": 10, "num_iters": 100, "seed": 42 }
//! ```
//!
//! `aggregation` defaults to `weighted_mean`, `seed` to the wall clock and
//! `threads` to the global rayon pool.

use crate::error::{RecommenderError, Result};
use crate::knn::{Aggregation, ItemKnn, UserKnn};
use crate::nmf::Nmf;
use crate::recommender::Recommender;
use crate::similarity::MetricKind;
use data_model::DataModel;
use parallelizer::Parallelizer;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Engine and hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelConfig {
    ItemKnn {
        k: usize,
        metric: MetricKind,
        #[serde(default)]
        aggregation: Aggregation,
    },
    UserKnn {
        k: usize,
        metric: MetricKind,
        #[serde(default)]
        aggregation: Aggregation,
    },
    Nmf {
        num_factors: usize,
        num_iters: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
}

/// Full configuration of one recommender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommenderConfig {
    #[serde(flatten)]
    pub model: ModelConfig,
    /// Worker threads for training sweeps; the global pool when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

impl RecommenderConfig {
    pub fn new(model: ModelConfig) -> Self {
        Self { model, threads: None }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every hyperparameter against its domain
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(RecommenderError::invalid("threads", "must be at least 1"));
        }
        match &self.model {
            ModelConfig::ItemKnn { k, metric, .. } | ModelConfig::UserKnn { k, metric, .. } => {
                if *k == 0 {
                    return Err(RecommenderError::invalid(
                        "k",
                        "number of neighbors must be at least 1",
                    ));
                }
                metric.validate()
            }
            ModelConfig::Nmf {
                num_factors, num_iters, ..
            } => {
                if *num_factors == 0 {
                    return Err(RecommenderError::invalid("num_factors", "must be at least 1"));
                }
                if *num_iters == 0 {
                    return Err(RecommenderError::invalid("num_iters", "must be at least 1"));
                }
                Ok(())
            }
        }
    }

    /// Validate and instantiate the configured recommender (untrained)
    pub fn build(&self, model: Arc<DataModel>) -> Result<Box<dyn Recommender>> {
        self.validate()?;
        let parallelizer = match self.threads {
            Some(threads) => Parallelizer::with_threads(threads)?,
            None => Parallelizer::new(),
        };
        debug!(config = ?self.model, threads = ?self.threads, "Building recommender");

        let recommender: Box<dyn Recommender> = match self.model {
            ModelConfig::ItemKnn { k, metric, aggregation } => {
                let knn = ItemKnn::new(model, k, metric.build()?, aggregation)?;
                Box::new(knn.with_parallelizer(parallelizer))
            }
            ModelConfig::UserKnn { k, metric, aggregation } => {
                let knn = UserKnn::new(model, k, metric.build()?, aggregation)?;
                Box::new(knn.with_parallelizer(parallelizer))
            }
            ModelConfig::Nmf {
                num_factors,
                num_iters,
                seed,
            } => {
                let nmf = Nmf::new(model, num_factors, num_iters, seed)?;
                Box::new(nmf.with_parallelizer(parallelizer))
            }
        };
        Ok(recommender)
    }
}
