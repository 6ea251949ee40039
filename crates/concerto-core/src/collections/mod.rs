//! Non-empty collections for compile-time guarantees.

pub mod non_empty_vec;

pub use non_empty_vec::{EmptyVecError, NonEmptyVec};
