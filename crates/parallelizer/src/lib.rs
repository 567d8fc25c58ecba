//! # Parallelizer Crate
//!
//! Work distribution for per-entity training passes.
//!
//! A [`Partible`] worker supplies three hooks (`before_run`, `run`,
//! `after_run`). The [`Parallelizer`] applies `run` exactly once to every
//! entity of a slice on a rayon pool, giving each run exclusive access to
//! that entity's output slot.
//!
//! ## Example Usage
//!
//! ```
//! use parallelizer::{Parallelizer, Partible};
//!
//! struct Double;
//!
//! impl Partible<f64> for Double {
//!     type Output = f64;
//!
//!     fn name(&self) -> &str {
//!         "Double"
//!     }
//!
//!     fn run(&self, _index: usize, value: &f64, out: &mut f64) -> anyhow::Result<()> {
//!         *out = value * 2.0;
//!         Ok(())
//!     }
//! }
//!
//! let values = vec![1.0, 2.0, 3.0];
//! let mut doubled = vec![0.0; values.len()];
//! Parallelizer::new().exec(&values, &mut Double, &mut doubled)?;
//! assert_eq!(doubled, vec![2.0, 4.0, 6.0]);
//! # Ok::<(), parallelizer::ParallelError>(())
//! ```

pub mod error;
pub mod parallelizer;
pub mod partible;

pub use error::{BoxError, ParallelError, Result};
pub use parallelizer::Parallelizer;
pub use partible::Partible;
