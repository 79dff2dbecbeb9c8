//! An in-memory ordered key-value index: a B+-tree whose leaves are
//! *gapped arrays* augmented with a per-leaf learned linear positional
//! model.
//!
//! The hard engineering lives in the leaf layer ([`leaf`]): a gapped
//! array amortizes insertion cost by leaving intentional holes, an
//! adaptive policy grows leaf capacity under sustained compaction
//! pressure, and a linear regression model ([`model`]) predicts a slot
//! index from a key so lookups can run a short exponential search
//! instead of a full binary search. The surrounding B+-tree skeleton —
//! internal routing nodes ([`node`]), split propagation, root promotion
//! — is the conventional host that frames that core, coordinated by
//! [`Tree`].
//!
//! Every public operation is total: `search` returns a distinguished
//! absent value rather than an error, and `insert` cannot fail on valid
//! arguments. There is no deletion, no enumerated range query (the leaf
//! chain exists only for internal statistics), no concurrency, and no
//! persistence.

mod error;
mod leaf;
mod logging;
mod model;
mod node;
mod tree;

/// Keys are a fixed, ordered numeric type so the positional model is
/// meaningful; see the crate's design notes on dynamic key typing.
pub type Key = i64;

pub use error::{Error, Result};
pub use logging::init as init_logging;
pub use tree::{Stats, Tree};
