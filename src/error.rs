//! Internal error types.
//!
//! Nothing here crosses the public [`crate::Tree`] API: every public
//! operation is total (see the crate root docs). This variant exists
//! for the one crate-private precondition a leaf can violate if called
//! out of order; callers that hold the invariant convert it into a
//! panic with `.expect(..)`, which is the documented behavior for a
//! detected invariant violation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("leaf is not over the split threshold")]
    NotSplittable,
}

pub type Result<T> = std::result::Result<T, Error>;
