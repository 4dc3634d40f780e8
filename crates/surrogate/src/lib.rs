//! Surrogate model layer used by the `nsbo-solver` crate.
//!
//! The solver consumes probabilistic regression models through two small
//! contracts:
//!
//! - [`SurrogateModel`] - a fitted model producing posterior mean and
//!   standard deviation over a batch of points
//! - [`SurrogateBuilder`] - the fallible training step producing a boxed
//!   [`SurrogateModel`]
//!
//! A default implementation, [`GpSurrogateBuilder`], fits a Matérn 5/2
//! Gaussian process via Cholesky factorization so the workspace is usable
//! without an external modeling stack. The solver treats training failure as
//! fatal to the current iteration; see [`SurrogateError`].
//!
//! This crate also owns the [`ParameterType`] vocabulary describing the
//! mixed design spaces the optimizer searches.

mod errors;
mod gp;
mod model;
mod params;

pub use errors::{Result, SurrogateError};
pub use gp::{GpSurrogate, GpSurrogateBuilder};
pub use model::{SurrogateBuilder, SurrogateModel};
pub use params::ParameterType;
