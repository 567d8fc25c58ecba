//! Built-in similarity metrics.
//!
//! Every metric works for users and items alike. All of them return −∞
//! when the two entities share no rating or when a denominator is zero.

use super::{SimilarityContext, SimilarityMetric, co_ratings};
use crate::error::{RecommenderError, Result};
use data_model::Entity;
use serde::{Deserialize, Serialize};

fn correlation(common: usize, num: f64, den_active: f64, den_target: f64) -> f64 {
    if common == 0 || den_active == 0.0 || den_target == 0.0 {
        return f64::NEG_INFINITY;
    }
    num / (den_active * den_target).sqrt()
}

/// Correlation of the deviations from fixed centers
fn centered_correlation(
    active: &dyn Entity,
    target: &dyn Entity,
    active_center: f64,
    target_center: f64,
) -> f64 {
    let (mut num, mut den_active, mut den_target, mut common) = (0.0, 0.0, 0.0, 0);
    for co in co_ratings(active, target) {
        let fa = co.active - active_center;
        let ft = co.target - target_center;
        num += fa * ft;
        den_active += fa * fa;
        den_target += ft * ft;
        common += 1;
    }
    correlation(common, num, den_active, den_target)
}

/// Pearson correlation around each entity's own mean
#[derive(Debug, Clone, Copy, Default)]
pub struct Pearson;

impl SimilarityMetric for Pearson {
    fn name(&self) -> &str {
        "Pearson"
    }

    fn similarity(
        &self,
        active: &dyn Entity,
        target: &dyn Entity,
        _ctx: &SimilarityContext<'_>,
    ) -> f64 {
        centered_correlation(active, target, active.mean(), target.mean())
    }
}

/// Pearson-like correlation around the median of the rating scale.
///
/// The median is supplied by the caller; it is never inferred from data.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationConstrained {
    median: f64,
}

impl CorrelationConstrained {
    pub fn new(median: f64) -> Self {
        Self { median }
    }

    pub fn median(&self) -> f64 {
        self.median
    }
}

impl SimilarityMetric for CorrelationConstrained {
    fn name(&self) -> &str {
        "CorrelationConstrained"
    }

    fn similarity(
        &self,
        active: &dyn Entity,
        target: &dyn Entity,
        _ctx: &SimilarityContext<'_>,
    ) -> f64 {
        centered_correlation(active, target, self.median, self.median)
    }
}

/// Cosine of the raw co-rating vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine;

impl SimilarityMetric for Cosine {
    fn name(&self) -> &str {
        "Cosine"
    }

    fn similarity(
        &self,
        active: &dyn Entity,
        target: &dyn Entity,
        _ctx: &SimilarityContext<'_>,
    ) -> f64 {
        centered_correlation(active, target, 0.0, 0.0)
    }
}

/// Cosine after removing the mean of the entity on the other side.
///
/// Item-to-item subtracts the mean of the user who gave each rating.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdjustedCosine;

impl SimilarityMetric for AdjustedCosine {
    fn name(&self) -> &str {
        "AdjustedCosine"
    }

    fn similarity(
        &self,
        active: &dyn Entity,
        target: &dyn Entity,
        ctx: &SimilarityContext<'_>,
    ) -> f64 {
        let (mut num, mut den_active, mut den_target, mut common) = (0.0, 0.0, 0.0, 0);
        for co in co_ratings(active, target) {
            let mean = ctx.other_means[co.other];
            let fa = co.active - mean;
            let ft = co.target - mean;
            num += fa * ft;
            den_active += fa * fa;
            den_target += ft * ft;
            common += 1;
        }
        correlation(common, num, den_active, den_target)
    }
}

/// Mean squared difference, reported as 1 / (1 + msd)
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredDifference;

impl SimilarityMetric for MeanSquaredDifference {
    fn name(&self) -> &str {
        "MeanSquaredDifference"
    }

    fn similarity(
        &self,
        active: &dyn Entity,
        target: &dyn Entity,
        _ctx: &SimilarityContext<'_>,
    ) -> f64 {
        let (mut sum, mut common) = (0.0, 0usize);
        for co in co_ratings(active, target) {
            sum += (co.active - co.target).powi(2);
            common += 1;
        }
        if common == 0 {
            return f64::NEG_INFINITY;
        }
        1.0 / (1.0 + sum / common as f64)
    }
}

/// Jaccard index of the two rating sets
#[derive(Debug, Clone, Copy, Default)]
pub struct Jaccard;

impl SimilarityMetric for Jaccard {
    fn name(&self) -> &str {
        "Jaccard"
    }

    fn similarity(
        &self,
        active: &dyn Entity,
        target: &dyn Entity,
        _ctx: &SimilarityContext<'_>,
    ) -> f64 {
        let common = co_ratings(active, target).count();
        if common == 0 {
            return f64::NEG_INFINITY;
        }
        let union = active.number_of_ratings() + target.number_of_ratings() - common;
        common as f64 / union as f64
    }
}

/// Configurable name of a built-in metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Pearson,
    CorrelationConstrained { median: f64 },
    Cosine,
    AdjustedCosine,
    MeanSquaredDifference,
    Jaccard,
}

impl MetricKind {
    pub fn validate(&self) -> Result<()> {
        if let MetricKind::CorrelationConstrained { median } = self {
            if !median.is_finite() {
                return Err(RecommenderError::invalid(
                    "median",
                    format!("must be finite, got {}", median),
                ));
            }
        }
        Ok(())
    }

    /// Instantiate the metric
    pub fn build(&self) -> Result<Box<dyn SimilarityMetric>> {
        self.validate()?;
        Ok(match *self {
            MetricKind::Pearson => Box::new(Pearson),
            MetricKind::CorrelationConstrained { median } => {
                Box::new(CorrelationConstrained::new(median))
            }
            MetricKind::Cosine => Box::new(Cosine),
            MetricKind::AdjustedCosine => Box::new(AdjustedCosine),
            MetricKind::MeanSquaredDifference => Box::new(MeanSquaredDifference),
            MetricKind::Jaccard => Box::new(Jaccard),
        })
    }
}
