//! End-to-end scenarios for the similarity metrics and the three engines.

use data_model::{DataModel, Entity, EntityKind, Rating};
use parallelizer::Parallelizer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use recommenders::{
    AdjustedCosine, Aggregation, CorrelationConstrained, Cosine, ItemKnn, Jaccard,
    MeanSquaredDifference, MetricKind, Nmf, Pearson, Recommender, SimilarityContext,
    SimilarityMetric, UserKnn,
};
use std::sync::Arc;

// =============================================================================
// Helpers
// =============================================================================

fn create_random_model(users: usize, items: usize, density: f64, seed: u64) -> Arc<DataModel> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ratings = Vec::new();
    for u in 0..users {
        for i in 0..items {
            if rng.random::<f64>() < density {
                let value = rng.random_range(1..=5) as f64;
                ratings.push(Rating::new(format!("u{:03}", u), format!("i{:03}", i), value));
            }
        }
    }
    Arc::new(DataModel::from_ratings(ratings).unwrap())
}

fn similarity(
    metric: &dyn SimilarityMetric,
    model: &DataModel,
    kind: EntityKind,
    a: usize,
    b: usize,
) -> f64 {
    let other_means = model.means(kind.other());
    let ctx = SimilarityContext {
        other_means: &other_means,
    };
    match kind {
        EntityKind::User => metric.similarity(model.user(a).unwrap(), model.user(b).unwrap(), &ctx),
        EntityKind::Item => metric.similarity(model.item(a).unwrap(), model.item(b).unwrap(), &ctx),
    }
}

fn all_metrics() -> Vec<Box<dyn SimilarityMetric>> {
    vec![
        Box::new(Pearson),
        Box::new(CorrelationConstrained::new(3.0)),
        Box::new(Cosine),
        Box::new(AdjustedCosine),
        Box::new(MeanSquaredDifference),
        Box::new(Jaccard),
    ]
}

/// Bit-level equality that treats every NaN as equal
fn same(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

/// Metric with hand-picked item similarities, looked up by code
struct FixedSimilarity;

impl SimilarityMetric for FixedSimilarity {
    fn name(&self) -> &str {
        "FixedSimilarity"
    }

    fn similarity(
        &self,
        active: &dyn Entity,
        target: &dyn Entity,
        _ctx: &SimilarityContext<'_>,
    ) -> f64 {
        let mut pair = [active.code(), target.code()];
        pair.sort_unstable();
        match pair {
            ["i1", "i2"] => 0.8,
            ["i1", "i3"] => 0.2,
            ["i2", "i3"] => 0.1,
            _ => f64::NEG_INFINITY,
        }
    }
}

/// u rated i2 = 4 and i3 = 2; v keeps i1 and i4 in the model
fn create_neighborhood_model() -> Arc<DataModel> {
    Arc::new(
        DataModel::from_ratings(vec![
            ("u", "i2", 4.0),
            ("u", "i3", 2.0),
            ("v", "i1", 3.0),
            ("v", "i4", 1.0),
        ])
        .unwrap(),
    )
}

// =============================================================================
// Similarity scenarios
// =============================================================================

#[test]
fn test_pearson_trivial() {
    let model = DataModel::from_ratings(vec![
        ("u1", "i1", 5.0),
        ("u1", "i2", 3.0),
        ("u2", "i1", 5.0),
        ("u2", "i2", 3.0),
    ])
    .unwrap();
    let (u1, u2) = (model.user_index("u1").unwrap(), model.user_index("u2").unwrap());
    let (i1, i2) = (model.item_index("i1").unwrap(), model.item_index("i2").unwrap());

    assert_eq!(similarity(&Pearson, &model, EntityKind::User, u1, u2), 1.0);
    assert_eq!(similarity(&Cosine, &model, EntityKind::Item, i1, i2), 1.0);
    // Each item got the same rating from both users: no variance around
    // its own mean, so the correlation is undefined
    assert_eq!(similarity(&Pearson, &model, EntityKind::Item, i1, i2), f64::NEG_INFINITY);
}

#[test]
fn test_no_co_rating_under_every_metric() {
    let model = DataModel::from_ratings(vec![("u1", "i1", 4.0), ("u2", "i2", 4.0)]).unwrap();
    for metric in all_metrics() {
        assert_eq!(similarity(metric.as_ref(), &model, EntityKind::User, 0, 1), f64::NEG_INFINITY);
        assert_eq!(similarity(metric.as_ref(), &model, EntityKind::Item, 0, 1), f64::NEG_INFINITY);
    }
}

#[test]
fn test_similarity_symmetry() {
    let model = create_random_model(30, 20, 0.3, 5);
    for metric in all_metrics() {
        for kind in [EntityKind::User, EntityKind::Item] {
            let n = model.number_of(kind);
            for a in 0..n {
                for b in (a + 1)..n {
                    let ab = similarity(metric.as_ref(), &model, kind, a, b);
                    let ba = similarity(metric.as_ref(), &model, kind, b, a);
                    assert!(
                        same(ab, ba) || (ab - ba).abs() < 1e-12,
                        "{} not symmetric on {} {}/{}: {} vs {}",
                        metric.name(),
                        kind,
                        a,
                        b,
                        ab,
                        ba
                    );
                }
            }
        }
    }
}

// =============================================================================
// Neighborhood scenarios
// =============================================================================

#[test]
fn test_item_knn_mean() {
    let model = create_neighborhood_model();
    let mut knn =
        ItemKnn::new(model.clone(), 2, Box::new(FixedSimilarity), Aggregation::Mean).unwrap();
    knn.fit().unwrap();

    let i1 = model.item_index("i1").unwrap();
    let neighbors: Vec<usize> = knn.neighbors(i1).unwrap().iter().map(|n| n.index).collect();
    assert_eq!(neighbors, vec![model.item_index("i2").unwrap(), model.item_index("i3").unwrap()]);

    let u = model.user_index("u").unwrap();
    assert!((knn.predict(u, i1) - 3.0).abs() < 1e-12);
}

#[test]
fn test_item_knn_weighted_mean() {
    let model = create_neighborhood_model();
    let metric = Box::new(FixedSimilarity);
    let mut knn = ItemKnn::new(model.clone(), 2, metric, Aggregation::WeightedMean).unwrap();
    knn.fit().unwrap();

    let u = model.user_index("u").unwrap();
    let i1 = model.item_index("i1").unwrap();
    assert!((knn.predict(u, i1) - 3.6).abs() < 1e-12);
}

#[test]
fn test_unpredictable_item() {
    let model = create_neighborhood_model();
    let metric = Box::new(FixedSimilarity);
    let mut knn = ItemKnn::new(model.clone(), 2, metric, Aggregation::WeightedMean).unwrap();
    knn.fit().unwrap();

    // i4 is similar to nothing, so it has no neighbors at all
    let u = model.user_index("u").unwrap();
    let i4 = model.item_index("i4").unwrap();
    assert!(knn.neighbors(i4).unwrap().is_empty());
    assert!(knn.predict(u, i4).is_nan());
    assert!(knn.recommend(u, &[i4], 1).is_empty());
}

#[test]
fn test_top_n_correctness() {
    let model = create_random_model(40, 30, 0.25, 9);
    let k = 5;
    let mut knn =
        ItemKnn::new(model.clone(), k, Box::new(Pearson), Aggregation::WeightedMean).unwrap();
    knn.fit().unwrap();

    for a in 0..model.number_of_items() {
        let row = knn.similarities(a).unwrap();
        let neighbors = knn.neighbors(a).unwrap();
        assert!(neighbors.len() <= k);

        for pair in neighbors.windows(2) {
            let ordered = pair[0].similarity > pair[1].similarity
                || (pair[0].similarity == pair[1].similarity && pair[0].index < pair[1].index);
            assert!(ordered, "neighbors of {} out of order", a);
        }
        for neighbor in neighbors {
            assert_ne!(neighbor.index, a);
            assert!(neighbor.similarity.is_finite());
            assert_eq!(row[neighbor.index], neighbor.similarity);
        }

        // Nothing left out beats the weakest kept neighbor
        if neighbors.len() == k {
            let weakest = neighbors[k - 1];
            for (b, &sim) in row.iter().enumerate() {
                if neighbors.iter().any(|n| n.index == b) || !sim.is_finite() {
                    continue;
                }
                let tie_after = sim == weakest.similarity && b > weakest.index;
                assert!(sim < weakest.similarity || tie_after);
            }
        } else {
            let finite = row.iter().filter(|s| s.is_finite()).count();
            assert_eq!(neighbors.len(), finite);
        }

        let padded = knn.padded_neighbors(a).unwrap();
        assert_eq!(padded.len(), k);
        assert!(padded[neighbors.len()..].iter().all(|&p| p == -1));
    }
}

#[test]
fn test_prediction_determinism() {
    let model = create_random_model(25, 25, 0.3, 17);
    let metric = Box::new(AdjustedCosine);
    let mut knn = UserKnn::new(model.clone(), 4, metric, Aggregation::DeviationFromMean).unwrap();
    knn.fit().unwrap();

    for u in 0..model.number_of_users() {
        for i in 0..model.number_of_items() {
            assert!(same(knn.predict(u, i), knn.predict(u, i)));
        }
    }
}

#[test]
fn test_sweeps_invariant_to_thread_count() {
    let model = create_random_model(50, 40, 0.2, 23);

    let fit_knn = |threads: usize| {
        let metric = MetricKind::Pearson.build().unwrap();
        let mut knn = ItemKnn::new(model.clone(), 6, metric, Aggregation::WeightedMean)
            .unwrap()
            .with_parallelizer(Parallelizer::with_threads(threads).unwrap());
        knn.fit().unwrap();
        knn
    };
    let single = fit_knn(1);
    let multi = fit_knn(4);
    for a in 0..model.number_of_items() {
        let (s, m) = (single.similarities(a).unwrap(), multi.similarities(a).unwrap());
        assert!(s.iter().zip(m).all(|(x, y)| same(*x, *y)));
        assert_eq!(single.neighbors(a), multi.neighbors(a));
    }

    let fit_nmf = |threads: usize| {
        let mut nmf = Nmf::new(model.clone(), 3, 15, Some(8))
            .unwrap()
            .with_parallelizer(Parallelizer::with_threads(threads).unwrap());
        nmf.fit().unwrap();
        nmf
    };
    let single = fit_nmf(1);
    let multi = fit_nmf(4);
    for u in 0..model.number_of_users() {
        assert_eq!(single.user_factors(u), multi.user_factors(u));
    }
    for i in 0..model.number_of_items() {
        assert_eq!(single.item_factors(i), multi.item_factors(i));
    }
}

// =============================================================================
// NMF scenarios
// =============================================================================

#[test]
fn test_nmf_rank_one_matrix() {
    let mut ratings = Vec::new();
    for u in ["u1", "u2", "u3"] {
        for i in ["i1", "i2", "i3"] {
            ratings.push(Rating::new(u, i, 2.0));
        }
    }
    let model = Arc::new(DataModel::from_ratings(ratings).unwrap());

    let mut nmf = Nmf::new(model, 1, 50, Some(42)).unwrap();
    nmf.fit().unwrap();
    for u in 0..3 {
        for i in 0..3 {
            assert!((nmf.predict(u, i) - 2.0).abs() < 1e-3);
        }
    }
}

#[test]
fn test_nmf_error_non_increasing_and_factors_positive() {
    let model = create_random_model(30, 30, 0.3, 31);
    let mut nmf = Nmf::new(model.clone(), 4, 1, Some(42)).unwrap();

    let mut previous = nmf.reconstruction_error();
    for _ in 0..40 {
        nmf.iterate().unwrap();
        let error = nmf.reconstruction_error();
        assert!(error <= previous * (1.0 + 1e-9), "error went up: {} -> {}", previous, error);
        previous = error;
    }

    for u in 0..model.number_of_users() {
        assert!(nmf.user_factors(u).unwrap().iter().all(|&v| v > 0.0));
    }
    for i in 0..model.number_of_items() {
        assert!(nmf.item_factors(i).unwrap().iter().all(|&v| v > 0.0));
    }
}
