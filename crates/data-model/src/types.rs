//! Core domain types for the rating store.
//!
//! Users and items are symmetric: each owns a sorted adjacency of
//! (other index, rating value) pairs. The relation between them is the
//! shared index space, not references, so the whole model is plain data
//! that can be shared read-only across worker threads.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

// =============================================================================
// Ratings
// =============================================================================

/// A single (user, item, value) triple as ingested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_code: String,
    pub item_code: String,
    pub value: f64,
}

impl Rating {
    pub fn new(user_code: impl Into<String>, item_code: impl Into<String>, value: f64) -> Self {
        Self {
            user_code: user_code.into(),
            item_code: item_code.into(),
            value,
        }
    }
}

impl<U: Into<String>, I: Into<String>> From<(U, I, f64)> for Rating {
    fn from((user_code, item_code, value): (U, I, f64)) -> Self {
        Rating::new(user_code, item_code, value)
    }
}

/// Caller-declared domain of the rating values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingRange {
    pub min: f64,
    pub max: f64,
}

impl RatingRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Middle of the scale, e.g. 3.0 for [1, 5]
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

/// Which side of the rating matrix an entity lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    Item,
}

impl EntityKind {
    /// The kind found in this kind's adjacency lists
    pub fn other(self) -> EntityKind {
        match self {
            EntityKind::User => EntityKind::Item,
            EntityKind::Item => EntityKind::User,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => write!(f, "user"),
            EntityKind::Item => write!(f, "item"),
        }
    }
}

// =============================================================================
// Attribute store
// =============================================================================

/// Opaque value stored in an entity's attribute map
pub type AttributeValue = Arc<dyn Any + Send + Sync>;

/// Open key/value extension slot carried by every user and item.
///
/// The map is guarded, so threads writing different keys on the same
/// entity do not race. Training outputs never live here; recommenders keep
/// them in typed tables.
#[derive(Default)]
pub struct Attributes {
    map: RwLock<HashMap<String, AttributeValue>>,
}

impl Attributes {
    /// Store a value, returning the previous value for the key if any
    pub fn put<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Option<AttributeValue> {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Arc::new(value))
    }

    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Typed lookup; `None` if the key is absent or holds another type
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key)?.downcast::<T>().ok()
    }

    pub fn remove(&self, key: &str) -> Option<AttributeValue> {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        f.debug_struct("Attributes").field("keys", &keys).finish()
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Sorted (index, value) pairs stored as two parallel arrays
#[derive(Debug, Clone, Default)]
pub(crate) struct Adjacency {
    pub(crate) indices: Vec<usize>,
    pub(crate) values: Vec<f64>,
}

impl Adjacency {
    /// Sort by index; returns the first index that appears twice, if any
    pub(crate) fn sort(&mut self) -> Option<usize> {
        let mut pairs: Vec<(usize, f64)> = self
            .indices
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect();
        pairs.sort_unstable_by_key(|&(index, _)| index);

        let duplicate = pairs
            .windows(2)
            .find(|w| w[0].0 == w[1].0)
            .map(|w| w[0].0);

        self.indices = pairs.iter().map(|&(index, _)| index).collect();
        self.values = pairs.iter().map(|&(_, value)| value).collect();
        duplicate
    }

    /// Mean and population standard deviation; NaN when empty
    pub(crate) fn stats(&self) -> (f64, f64) {
        if self.values.is_empty() {
            return (f64::NAN, f64::NAN);
        }
        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let variance = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, variance.sqrt())
    }

    fn find(&self, index: usize) -> Option<usize> {
        self.indices.binary_search(&index).ok()
    }
}

/// Common read-only view over users and items.
///
/// Neighborhood methods treat both roles symmetrically: the adjacency of a
/// user holds item indices, the adjacency of an item holds user indices.
pub trait Entity: Send + Sync {
    fn code(&self) -> &str;

    fn index(&self) -> usize;

    /// Indices of the entities on the other side, strictly ascending
    fn adjacency(&self) -> &[usize];

    /// Rating values aligned with `adjacency()`
    fn ratings(&self) -> &[f64];

    fn mean(&self) -> f64;

    fn std_dev(&self) -> f64;

    fn number_of_ratings(&self) -> usize {
        self.adjacency().len()
    }

    /// Position of `other` in the adjacency, by binary search
    fn position_of(&self, other: usize) -> Option<usize> {
        self.adjacency().binary_search(&other).ok()
    }

    /// Rating this entity shares with `other`, if any
    fn rating_with(&self, other: usize) -> Option<f64> {
        self.position_of(other).map(|pos| self.ratings()[pos])
    }
}

/// A user of the training pool
#[derive(Debug)]
pub struct User {
    pub(crate) code: String,
    pub(crate) index: usize,
    pub(crate) items: Adjacency,
    pub(crate) mean: f64,
    pub(crate) std_dev: f64,
    pub(crate) attributes: Attributes,
}

impl User {
    pub fn user_code(&self) -> &str {
        &self.code
    }

    pub fn user_index(&self) -> usize {
        self.index
    }

    pub fn number_of_ratings(&self) -> usize {
        self.items.indices.len()
    }

    /// Index of the k-th rated item
    pub fn item_at(&self, k: usize) -> usize {
        self.items.indices[k]
    }

    /// Value of the k-th rating
    pub fn rating_at(&self, k: usize) -> f64 {
        self.items.values[k]
    }

    /// Position of `item_index` in this user's adjacency
    pub fn find_item(&self, item_index: usize) -> Option<usize> {
        self.items.find(item_index)
    }

    pub fn items(&self) -> &[usize] {
        &self.items.indices
    }

    pub fn rating_average(&self) -> f64 {
        self.mean
    }

    pub fn rating_std_dev(&self) -> f64 {
        self.std_dev
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn put<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Option<AttributeValue> {
        self.attributes.put(key, value)
    }

    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        self.attributes.get(key)
    }
}

impl Entity for User {
    fn code(&self) -> &str {
        &self.code
    }
    fn index(&self) -> usize {
        self.index
    }
    fn adjacency(&self) -> &[usize] {
        &self.items.indices
    }
    fn ratings(&self) -> &[f64] {
        &self.items.values
    }
    fn mean(&self) -> f64 {
        self.mean
    }
    fn std_dev(&self) -> f64 {
        self.std_dev
    }
}

/// An item of the training pool
#[derive(Debug)]
pub struct Item {
    pub(crate) code: String,
    pub(crate) index: usize,
    pub(crate) users: Adjacency,
    pub(crate) mean: f64,
    pub(crate) std_dev: f64,
    pub(crate) attributes: Attributes,
}

impl Item {
    pub fn item_code(&self) -> &str {
        &self.code
    }

    pub fn item_index(&self) -> usize {
        self.index
    }

    pub fn number_of_ratings(&self) -> usize {
        self.users.indices.len()
    }

    /// Index of the k-th user who rated this item
    pub fn user_at(&self, k: usize) -> usize {
        self.users.indices[k]
    }

    pub fn rating_at(&self, k: usize) -> f64 {
        self.users.values[k]
    }

    /// Position of `user_index` in this item's adjacency
    pub fn find_user(&self, user_index: usize) -> Option<usize> {
        self.users.find(user_index)
    }

    pub fn users(&self) -> &[usize] {
        &self.users.indices
    }

    pub fn rating_average(&self) -> f64 {
        self.mean
    }

    pub fn rating_std_dev(&self) -> f64 {
        self.std_dev
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn put<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Option<AttributeValue> {
        self.attributes.put(key, value)
    }

    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        self.attributes.get(key)
    }
}

impl Entity for Item {
    fn code(&self) -> &str {
        &self.code
    }
    fn index(&self) -> usize {
        self.index
    }
    fn adjacency(&self) -> &[usize] {
        &self.users.indices
    }
    fn ratings(&self) -> &[f64] {
        &self.users.values
    }
    fn mean(&self) -> f64 {
        self.mean
    }
    fn std_dev(&self) -> f64 {
        self.std_dev
    }
}

/// A user holding held-out ratings for evaluation
#[derive(Debug)]
pub struct TestUser {
    pub(crate) code: String,
    pub(crate) test_index: usize,
    pub(crate) user_index: usize,
    pub(crate) items: Adjacency,
}

impl TestUser {
    pub fn user_code(&self) -> &str {
        &self.code
    }

    /// Dense index among test users
    pub fn test_user_index(&self) -> usize {
        self.test_index
    }

    /// Index of the same user in the training pool
    pub fn user_index(&self) -> usize {
        self.user_index
    }

    pub fn number_of_test_ratings(&self) -> usize {
        self.items.indices.len()
    }

    pub fn test_item_at(&self, k: usize) -> usize {
        self.items.indices[k]
    }

    pub fn test_rating_at(&self, k: usize) -> f64 {
        self.items.values[k]
    }

    pub fn find_test_item(&self, item_index: usize) -> Option<usize> {
        self.items.find(item_index)
    }

    pub fn test_items(&self) -> &[usize] {
        &self.items.indices
    }
}

/// An item holding held-out ratings for evaluation
#[derive(Debug)]
pub struct TestItem {
    pub(crate) code: String,
    pub(crate) test_index: usize,
    pub(crate) item_index: usize,
    pub(crate) users: Adjacency,
}

impl TestItem {
    pub fn item_code(&self) -> &str {
        &self.code
    }

    pub fn test_item_index(&self) -> usize {
        self.test_index
    }

    pub fn item_index(&self) -> usize {
        self.item_index
    }

    pub fn number_of_test_ratings(&self) -> usize {
        self.users.indices.len()
    }

    pub fn test_user_at(&self, k: usize) -> usize {
        self.users.indices[k]
    }

    pub fn test_rating_at(&self, k: usize) -> f64 {
        self.users.values[k]
    }

    pub fn find_test_user(&self, user_index: usize) -> Option<usize> {
        self.users.find(user_index)
    }

    pub fn test_users(&self) -> &[usize] {
        &self.users.indices
    }
}

// =============================================================================
// DataModel - the frozen rating store
// =============================================================================

/// Sparse, dual-indexed rating store.
///
/// Users and items are kept sorted by code, so the position in the vector
/// is the entity index and code lookups are a binary search. A DataModel
/// is only ever produced by `DataModelBuilder::build` and is read-only
/// afterwards.
#[derive(Debug)]
pub struct DataModel {
    pub(crate) users: Vec<User>,
    pub(crate) items: Vec<Item>,
    pub(crate) test_users: Vec<TestUser>,
    pub(crate) test_items: Vec<TestItem>,
    pub(crate) rating_range: Option<RatingRange>,
    pub(crate) number_of_ratings: usize,
}

impl DataModel {
    pub fn number_of_users(&self) -> usize {
        self.users.len()
    }

    pub fn number_of_items(&self) -> usize {
        self.items.len()
    }

    pub fn number_of_test_users(&self) -> usize {
        self.test_users.len()
    }

    pub fn number_of_test_items(&self) -> usize {
        self.test_items.len()
    }

    /// Number of training ratings
    pub fn number_of_ratings(&self) -> usize {
        self.number_of_ratings
    }

    /// Number of held-out ratings
    pub fn number_of_test_ratings(&self) -> usize {
        self.test_users.iter().map(|u| u.number_of_test_ratings()).sum()
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn test_users(&self) -> &[TestUser] {
        &self.test_users
    }

    pub fn test_items(&self) -> &[TestItem] {
        &self.test_items
    }

    pub fn user(&self, index: usize) -> Option<&User> {
        self.users.get(index)
    }

    pub fn item(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn test_user(&self, index: usize) -> Option<&TestUser> {
        self.test_users.get(index)
    }

    pub fn test_item(&self, index: usize) -> Option<&TestItem> {
        self.test_items.get(index)
    }

    pub fn user_index(&self, code: &str) -> Option<usize> {
        self.users.binary_search_by(|u| u.code.as_str().cmp(code)).ok()
    }

    pub fn item_index(&self, code: &str) -> Option<usize> {
        self.items.binary_search_by(|i| i.code.as_str().cmp(code)).ok()
    }

    pub fn user_by_code(&self, code: &str) -> Option<&User> {
        self.user_index(code).map(|index| &self.users[index])
    }

    pub fn item_by_code(&self, code: &str) -> Option<&Item> {
        self.item_index(code).map(|index| &self.items[index])
    }

    pub fn test_user_by_code(&self, code: &str) -> Option<&TestUser> {
        self.test_users
            .binary_search_by(|u| u.code.as_str().cmp(code))
            .ok()
            .map(|index| &self.test_users[index])
    }

    pub fn test_item_by_code(&self, code: &str) -> Option<&TestItem> {
        self.test_items
            .binary_search_by(|i| i.code.as_str().cmp(code))
            .ok()
            .map(|index| &self.test_items[index])
    }

    pub fn rating_range(&self) -> Option<RatingRange> {
        self.rating_range
    }

    /// Training rating of user `u` for item `i`, if present
    pub fn rating(&self, user_index: usize, item_index: usize) -> Option<f64> {
        let user = self.users.get(user_index)?;
        user.find_item(item_index).map(|pos| user.rating_at(pos))
    }

    pub fn number_of(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::User => self.number_of_users(),
            EntityKind::Item => self.number_of_items(),
        }
    }

    /// Cached means of every entity of one kind, indexed by entity index
    pub fn means(&self, kind: EntityKind) -> Vec<f64> {
        match kind {
            EntityKind::User => self.users.iter().map(|u| u.mean).collect(),
            EntityKind::Item => self.items.iter().map(|i| i.mean).collect(),
        }
    }

    /// Mean of every training rating; NaN on an empty model
    pub fn global_mean(&self) -> f64 {
        if self.number_of_ratings == 0 {
            return f64::NAN;
        }
        let total: f64 = self.users.iter().flat_map(|u| u.items.values.iter()).sum();
        total / self.number_of_ratings as f64
    }

    /// Counts for debugging/validation: (users, items, ratings)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.users.len(), self.items.len(), self.number_of_ratings)
    }
}
