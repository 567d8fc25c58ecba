//! # Recommenders Crate
//!
//! Collaborative-filtering engines on top of a shared [`DataModel`].
//!
//! ## Main Components
//!
//! - **recommender**: The `Recommender` trait (fit / predict / recommend)
//! - **similarity**: Similarity metrics and the all-pairs similarity sweep
//! - **knn**: ItemKNN and UserKNN neighborhood engines
//! - **nmf**: Non-negative matrix factorization
//! - **config**: Serde configuration that builds any engine
//!
//! ## Example Usage
//!
//! ```
//! use data_model::DataModel;
//! use recommenders::{Aggregation, ItemKnn, MetricKind, Recommender};
//! use std::sync::Arc;
//!
//! let model = Arc::new(DataModel::from_ratings(vec![
//!     ("u1", "i1", 5.0),
//!     ("u1", "i2", 4.0),
//!     ("u2", "i1", 4.0),
//!     ("u2", "i2", 5.0),
//!     ("u2", "i3", 2.0),
//! ])?);
//!
//! let metric = MetricKind::Cosine.build()?;
//! let mut knn = ItemKnn::new(model.clone(), 2, metric, Aggregation::WeightedMean)?;
//! knn.fit()?;
//!
//! let u1 = model.user_index("u1").unwrap();
//! let i3 = model.item_index("i3").unwrap();
//! assert!(knn.predict(u1, i3).is_finite());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`DataModel`]: data_model::DataModel

pub mod config;
pub mod error;
pub mod knn;
pub mod nmf;
pub mod recommender;
pub mod similarity;

pub use config::{ModelConfig, RecommenderConfig};
pub use error::{RecommenderError, Result};
pub use knn::{Aggregation, ItemKnn, Neighbor, UserKnn, top_n};
pub use nmf::Nmf;
pub use recommender::{Recommender, rank};
pub use similarity::{
    AdjustedCosine, CoRating, CorrelationConstrained, Cosine, Jaccard, MeanSquaredDifference,
    MetricKind, Pearson, SimilarityContext, SimilarityMetric, SimilaritySweep, SimilarityTable,
    co_ratings,
};
