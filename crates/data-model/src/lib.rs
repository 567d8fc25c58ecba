//! # Data Model Crate
//!
//! Sparse, dual-indexed store of users, items and ratings.
//!
//! ## Main Components
//!
//! - **types**: Rating, User, Item, TestUser, TestItem and the DataModel itself
//! - **index**: DataModelBuilder, which ingests, sorts, indexes and freezes ratings
//! - **parser**: Read delimited rating files into rating triples
//! - **error**: Error types for model construction
//!
//! ## Example Usage
//!
//! ```
//! use data_model::DataModel;
//!
//! let model = DataModel::from_ratings(vec![
//!     ("u1", "i1", 5.0),
//!     ("u1", "i2", 3.0),
//!     ("u2", "i1", 4.0),
//! ])?;
//!
//! let user = model.user_by_code("u1").unwrap();
//! assert_eq!(user.number_of_ratings(), 2);
//! assert_eq!(user.find_item(model.item_index("i2").unwrap()), Some(1));
//! # Ok::<(), data_model::DataModelError>(())
//! ```
//!
//! Indices are dense and follow code order, and every rating is visible
//! from both sides with the same value. Once built, a DataModel is
//! read-only and is meant to be shared behind an `Arc`.

pub mod error;
pub mod index;
pub mod parser;
pub mod types;

pub use error::{DataModelError, Result};
pub use index::DataModelBuilder;
pub use types::{
    AttributeValue, Attributes, DataModel, Entity, EntityKind, Item, Rating, RatingRange, TestItem,
    TestUser, User,
};
