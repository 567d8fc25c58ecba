//! DataModel building and indexing logic.
//!
//! Construction happens in one pass over the ingested triples:
//! - Collect user and item codes into sorted, deduplicated arrays
//! - Assign indices by sort order
//! - Push every rating into both adjacencies, then sort them by index
//! - Compute per-entity mean and standard deviation in parallel
//! - Index held-out ratings into the test pools

use crate::error::{DataModelError, Result};
use crate::parser;
use crate::types::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Collects ratings and options, then freezes them into a DataModel
#[derive(Debug, Default, Clone)]
pub struct DataModelBuilder {
    ratings: Vec<Rating>,
    held_out: Vec<Rating>,
    rating_range: Option<RatingRange>,
    split: Option<(f64, u64)>,
}

impl DataModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the rating domain; values outside it are rejected
    pub fn rating_range(mut self, min: f64, max: f64) -> Self {
        self.rating_range = Some(RatingRange { min, max });
        self
    }

    /// Add training ratings
    pub fn ratings<I, R>(mut self, ratings: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rating>,
    {
        self.ratings.extend(ratings.into_iter().map(Into::into));
        self
    }

    /// Add a single training rating
    pub fn rating(
        mut self,
        user_code: impl Into<String>,
        item_code: impl Into<String>,
        value: f64,
    ) -> Self {
        self.ratings.push(Rating::new(user_code, item_code, value));
        self
    }

    /// Add held-out ratings that form the test pools
    pub fn held_out<I, R>(mut self, ratings: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rating>,
    {
        self.held_out.extend(ratings.into_iter().map(Into::into));
        self
    }

    /// Hold out a deterministic random fraction of the training ratings
    pub fn split(mut self, test_fraction: f64, seed: u64) -> Self {
        self.split = Some((test_fraction, seed));
        self
    }

    /// Validate, index and freeze the collected ratings
    #[instrument(skip(self), fields(ratings = self.ratings.len(), held_out = self.held_out.len()))]
    pub fn build(self) -> Result<DataModel> {
        let DataModelBuilder {
            mut ratings,
            mut held_out,
            rating_range,
            split,
        } = self;

        if let Some(range) = rating_range {
            if !range.min.is_finite() || !range.max.is_finite() || range.min >= range.max {
                return Err(DataModelError::InvalidRange {
                    min: range.min,
                    max: range.max,
                });
            }
        }

        if let Some((test_fraction, seed)) = split {
            let (train, test) = split_ratings(ratings, test_fraction, seed)?;
            ratings = train;
            held_out.extend(test);
        }

        for rating in ratings.iter().chain(held_out.iter()) {
            validate_rating(rating, rating_range)?;
        }

        // 1. Sorted, deduplicated code pools. Held-out codes belong to the
        //    pool too, so a user known only through test ratings still gets
        //    a (ratingless) training index.
        let all = || ratings.iter().chain(held_out.iter());
        let user_codes = sorted_codes(all().map(|r| r.user_code.as_str()));
        let item_codes = sorted_codes(all().map(|r| r.item_code.as_str()));

        // 2. Entities indexed by sort order
        let mut users: Vec<User> = user_codes
            .into_iter()
            .enumerate()
            .map(|(index, code)| User {
                code,
                index,
                items: Adjacency::default(),
                mean: f64::NAN,
                std_dev: f64::NAN,
                attributes: Attributes::default(),
            })
            .collect();
        let mut items: Vec<Item> = item_codes
            .into_iter()
            .enumerate()
            .map(|(index, code)| Item {
                code,
                index,
                users: Adjacency::default(),
                mean: f64::NAN,
                std_dev: f64::NAN,
                attributes: Attributes::default(),
            })
            .collect();

        // 3. Both views of every rating
        for rating in &ratings {
            let u = code_position(&users, &rating.user_code, |u| &u.code, EntityKind::User)?;
            let i = code_position(&items, &rating.item_code, |i| &i.code, EntityKind::Item)?;
            users[u].items.indices.push(i);
            users[u].items.values.push(rating.value);
            items[i].users.indices.push(u);
            items[i].users.values.push(rating.value);
        }

        // 4. Sort adjacencies; a repeated index means a repeated pair
        let duplicate = users
            .par_iter_mut()
            .filter_map(|user| user.items.sort().map(|item| (user.index, item)))
            .min();
        if let Some((u, i)) = duplicate {
            return Err(DataModelError::DuplicateRating {
                user_code: users[u].code.clone(),
                item_code: items[i].code.clone(),
            });
        }
        items.par_iter_mut().for_each(|item| {
            item.users.sort();
        });

        // 5. Per-entity statistics
        compute_stats(&mut users, &mut items);

        let mut model = DataModel {
            users,
            items,
            test_users: Vec::new(),
            test_items: Vec::new(),
            rating_range,
            number_of_ratings: ratings.len(),
        };

        // 6. Test pools
        let resolved = resolve_held_out(&model, &held_out)?;
        attach_test_pools(&mut model, resolved)?;

        info!(
            users = model.number_of_users(),
            items = model.number_of_items(),
            ratings = model.number_of_ratings(),
            test_users = model.number_of_test_users(),
            test_items = model.number_of_test_items(),
            "DataModel built"
        );
        Ok(model)
    }
}

impl DataModel {
    /// Start building a DataModel
    pub fn builder() -> DataModelBuilder {
        DataModelBuilder::new()
    }

    /// Build a DataModel from training ratings only
    pub fn from_ratings<I, R>(ratings: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rating>,
    {
        DataModelBuilder::new().ratings(ratings).build()
    }

    /// Load training ratings from a delimited file
    ///
    /// Format: `user<sep>item<sep>rating[<sep>...]`, e.g. MovieLens
    /// `ratings.dat` with separator `::`.
    pub fn load_from_file(path: &Path, separator: &str) -> Result<Self> {
        let ratings = parser::parse_ratings(path, separator)?;
        DataModelBuilder::new().ratings(ratings).build()
    }

    /// Attach held-out ratings to a frozen model.
    ///
    /// Every code must already be known; the training pool never grows
    /// after build. Existing test ratings are kept.
    pub fn with_held_out<I, R>(mut self, ratings: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rating>,
    {
        let ratings: Vec<Rating> = ratings.into_iter().map(Into::into).collect();
        for rating in &ratings {
            validate_rating(rating, self.rating_range)?;
        }

        let mut resolved = resolve_held_out(&self, &ratings)?;
        for test_user in &self.test_users {
            for (&i, &value) in test_user.items.indices.iter().zip(&test_user.items.values) {
                resolved.push((test_user.user_index, i, value));
            }
        }
        attach_test_pools(&mut self, resolved)?;

        debug!(
            test_users = self.number_of_test_users(),
            test_items = self.number_of_test_items(),
            "Held-out ratings attached"
        );
        Ok(self)
    }
}

fn validate_rating(rating: &Rating, range: Option<RatingRange>) -> Result<()> {
    if !rating.value.is_finite() {
        return Err(DataModelError::NonFiniteRating {
            user_code: rating.user_code.clone(),
            item_code: rating.item_code.clone(),
            value: rating.value,
        });
    }
    if let Some(range) = range {
        if !range.contains(rating.value) {
            return Err(DataModelError::OutOfRange {
                user_code: rating.user_code.clone(),
                item_code: rating.item_code.clone(),
                value: rating.value,
                min: range.min,
                max: range.max,
            });
        }
    }
    Ok(())
}

fn sorted_codes<'a>(codes: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut codes: Vec<String> = codes.map(str::to_string).collect();
    codes.par_sort_unstable();
    codes.dedup();
    codes
}

fn code_position<T>(
    entities: &[T],
    code: &str,
    code_of: impl Fn(&T) -> &String,
    kind: EntityKind,
) -> Result<usize> {
    entities
        .binary_search_by(|e| code_of(e).as_str().cmp(code))
        .map_err(|_| DataModelError::UnknownCode {
            kind,
            code: code.to_string(),
        })
}

fn compute_stats(users: &mut [User], items: &mut [Item]) {
    users.par_iter_mut().for_each(|user| {
        let (mean, std_dev) = user.items.stats();
        user.mean = mean;
        user.std_dev = std_dev;
    });
    items.par_iter_mut().for_each(|item| {
        let (mean, std_dev) = item.users.stats();
        item.mean = mean;
        item.std_dev = std_dev;
    });
}

/// Shuffle with a seeded RNG and hold out `round(fraction * n)` ratings.
/// Both halves keep the ingestion order.
fn split_ratings(
    ratings: Vec<Rating>,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<Rating>, Vec<Rating>)> {
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(DataModelError::InvalidSplit(test_fraction));
    }

    let mut order: Vec<usize> = (0..ratings.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let num_test = (test_fraction * ratings.len() as f64).round() as usize;
    let mut is_test = vec![false; ratings.len()];
    for &position in &order[..num_test] {
        is_test[position] = true;
    }

    let (test, train): (Vec<_>, Vec<_>) = ratings
        .into_iter()
        .zip(is_test)
        .partition(|(_, is_test)| *is_test);

    debug!(train = train.len(), test = test.len(), seed, "Ratings split");
    Ok((
        train.into_iter().map(|(r, _)| r).collect(),
        test.into_iter().map(|(r, _)| r).collect(),
    ))
}

/// Map held-out codes to training indices, rejecting unknown codes and
/// pairs that already carry a training rating
fn resolve_held_out(model: &DataModel, ratings: &[Rating]) -> Result<Vec<(usize, usize, f64)>> {
    ratings
        .iter()
        .map(|rating| {
            let u = model.user_index(&rating.user_code).ok_or_else(|| DataModelError::UnknownCode {
                kind: EntityKind::User,
                code: rating.user_code.clone(),
            })?;
            let i = model.item_index(&rating.item_code).ok_or_else(|| DataModelError::UnknownCode {
                kind: EntityKind::Item,
                code: rating.item_code.clone(),
            })?;
            if model.users[u].find_item(i).is_some() {
                return Err(DataModelError::DuplicateRating {
                    user_code: rating.user_code.clone(),
                    item_code: rating.item_code.clone(),
                });
            }
            Ok((u, i, rating.value))
        })
        .collect()
}

/// Rebuild both test pools from resolved (user, item, value) triples.
///
/// BTreeMap keys are training indices, which follow code order, so the
/// dense test indices are also in code order and code lookups stay a
/// binary search.
fn attach_test_pools(model: &mut DataModel, resolved: Vec<(usize, usize, f64)>) -> Result<()> {
    let mut by_user: BTreeMap<usize, Adjacency> = BTreeMap::new();
    let mut by_item: BTreeMap<usize, Adjacency> = BTreeMap::new();
    for &(u, i, value) in &resolved {
        let adjacency = by_user.entry(u).or_default();
        adjacency.indices.push(i);
        adjacency.values.push(value);
        let adjacency = by_item.entry(i).or_default();
        adjacency.indices.push(u);
        adjacency.values.push(value);
    }

    let mut test_users = Vec::with_capacity(by_user.len());
    for (test_index, (user_index, mut items)) in by_user.into_iter().enumerate() {
        if let Some(item_index) = items.sort() {
            return Err(DataModelError::DuplicateRating {
                user_code: model.users[user_index].code.clone(),
                item_code: model.items[item_index].code.clone(),
            });
        }
        test_users.push(TestUser {
            code: model.users[user_index].code.clone(),
            test_index,
            user_index,
            items,
        });
    }

    let test_items = by_item
        .into_iter()
        .enumerate()
        .map(|(test_index, (item_index, mut users))| {
            users.sort();
            TestItem {
                code: model.items[item_index].code.clone(),
                test_index,
                item_index,
                users,
            }
        })
        .collect();

    model.test_users = test_users;
    model.test_items = test_items;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_model() -> DataModel {
        DataModel::builder()
            .rating_range(1.0, 5.0)
            .rating("carol", "matrix", 4.0)
            .rating("alice", "matrix", 5.0)
            .rating("alice", "alien", 3.0)
            .rating("bob", "heat", 2.0)
            .rating("bob", "alien", 4.0)
            .rating("alice", "heat", 1.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_indices_follow_code_order() {
        let model = create_test_model();
        let (users, items, ratings) = model.counts();
        assert_eq!((users, items, ratings), (3, 3, 6));

        assert_eq!(model.user_index("alice"), Some(0));
        assert_eq!(model.user_index("bob"), Some(1));
        assert_eq!(model.user_index("carol"), Some(2));
        assert_eq!(model.item_index("alien"), Some(0));
        assert_eq!(model.item_index("heat"), Some(1));
        assert_eq!(model.item_index("matrix"), Some(2));
        assert_eq!(model.user_index("dave"), None);
    }

    #[test]
    fn test_adjacencies_are_sorted_and_consistent() {
        let model = create_test_model();
        let alice = model.user_by_code("alice").unwrap();
        assert_eq!(alice.items(), &[0, 1, 2]);
        assert_eq!(alice.rating_at(0), 3.0);
        assert_eq!(alice.rating_at(2), 5.0);

        for user in model.users() {
            assert!(user.items().windows(2).all(|w| w[0] < w[1]));
            for k in 0..user.number_of_ratings() {
                let item = model.item(user.item_at(k)).unwrap();
                let pos = item.find_user(user.user_index()).unwrap();
                assert_eq!(item.rating_at(pos), user.rating_at(k));
            }
        }
    }

    #[test]
    fn test_mean_and_std_dev() {
        let model = create_test_model();
        let alice = model.user_by_code("alice").unwrap();
        assert_eq!(alice.rating_average(), 3.0);
        let expected = (8.0f64 / 3.0).sqrt();
        assert!((alice.rating_std_dev() - expected).abs() < 1e-12);

        let matrix = model.item_by_code("matrix").unwrap();
        assert_eq!(matrix.rating_average(), 4.5);
        assert_eq!(matrix.rating_std_dev(), 0.5);
    }

    #[test]
    fn test_duplicate_rating_is_rejected() {
        let result = DataModel::builder()
            .rating("u1", "i1", 3.0)
            .rating("u1", "i1", 4.0)
            .build();
        let err = result.unwrap_err();
        assert!(matches!(err, DataModelError::DuplicateRating { .. }));
        assert!(err.is_bad_input());
    }

    #[test]
    fn test_non_finite_rating_is_rejected() {
        let result = DataModel::from_ratings(vec![("u1", "i1", f64::NAN)]);
        let err = result.unwrap_err();
        assert!(err.is_bad_input());
        assert!(matches!(err, DataModelError::NonFiniteRating { .. }));
    }

    #[test]
    fn test_out_of_range_rating_is_rejected() {
        let result = DataModel::builder().rating_range(1.0, 5.0).rating("u1", "i1", 6.0).build();
        assert!(matches!(result, Err(DataModelError::OutOfRange { .. })));

        let result = DataModel::builder().rating_range(5.0, 1.0).build();
        assert!(matches!(result, Err(DataModelError::InvalidRange { .. })));
    }

    #[test]
    fn test_held_out_pools() {
        let model = DataModel::builder()
            .rating("u1", "i1", 3.0)
            .rating("u2", "i2", 4.0)
            .held_out(vec![("u2", "i1", 5.0), ("u2", "i3", 1.0), ("u3", "i1", 2.0)])
            .build()
            .unwrap();

        // u3 and i3 only appear in held-out data but still get training indices
        assert_eq!(model.number_of_users(), 3);
        assert_eq!(model.number_of_items(), 3);
        assert_eq!(model.user_by_code("u3").unwrap().number_of_ratings(), 0);
        assert!(model.user_by_code("u3").unwrap().rating_average().is_nan());

        assert_eq!(model.number_of_test_users(), 2);
        assert_eq!(model.number_of_test_items(), 2);
        assert_eq!(model.number_of_test_ratings(), 3);

        let u2 = model.test_user_by_code("u2").unwrap();
        assert_eq!(u2.test_user_index(), 0);
        assert_eq!(u2.user_index(), model.user_index("u2").unwrap());
        assert_eq!(u2.test_items(), &[0, 2]);
        assert_eq!(u2.find_test_item(2), Some(1));

        let i1 = model.test_item_by_code("i1").unwrap();
        assert_eq!(i1.number_of_test_ratings(), 2);
        assert!(model.test_item_by_code("i2").is_none());
    }

    #[test]
    fn test_held_out_overlapping_training_is_duplicate() {
        let result = DataModel::builder()
            .rating("u1", "i1", 3.0)
            .held_out(vec![("u1", "i1", 4.0)])
            .build();
        assert!(matches!(result, Err(DataModelError::DuplicateRating { .. })));
    }

    #[test]
    fn test_with_held_out_after_freeze() {
        let model = create_test_model();
        let model = model.with_held_out(vec![("carol", "alien", 2.0)]).unwrap();
        assert_eq!(model.number_of_test_users(), 1);

        let model = model.with_held_out(vec![("bob", "matrix", 5.0)]).unwrap();
        assert_eq!(model.number_of_test_users(), 2);
        assert_eq!(model.number_of_test_ratings(), 2);

        let err = model.with_held_out(vec![("zed", "alien", 2.0)]).unwrap_err();
        assert!(matches!(
            err,
            DataModelError::UnknownCode { kind: EntityKind::User, .. }
        ));
        assert!(err.is_bad_input());
    }

    #[test]
    fn test_split_is_deterministic() {
        let ratings: Vec<Rating> = (0..50)
            .map(|n| Rating::new(format!("u{}", n % 7), format!("i{}", n), 1.0 + (n % 5) as f64))
            .collect();

        let a = DataModel::builder().ratings(ratings.clone()).split(0.2, 7).build().unwrap();
        let b = DataModel::builder().ratings(ratings.clone()).split(0.2, 7).build().unwrap();

        assert_eq!(a.number_of_ratings(), 40);
        assert_eq!(a.number_of_test_ratings(), 10);
        let codes = |m: &DataModel| -> Vec<(String, Vec<usize>)> {
            m.test_users()
                .iter()
                .map(|u| (u.user_code().to_string(), u.test_items().to_vec()))
                .collect()
        };
        assert_eq!(codes(&a), codes(&b));

        let err = DataModel::builder().ratings(ratings).split(1.0, 7).build().unwrap_err();
        assert!(matches!(err, DataModelError::InvalidSplit(_)));
    }

    #[test]
    fn test_empty_model() {
        let model = DataModel::from_ratings(Vec::<Rating>::new()).unwrap();
        assert_eq!(model.counts(), (0, 0, 0));
        assert!(model.global_mean().is_nan());
        assert!(model.user(0).is_none());
    }
}
