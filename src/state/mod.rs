//! Document states and the structural diff engine.
//!
//! A [`State`] is one snapshot of a document's property tree. [`diff`] computes
//! the patch turning one snapshot into another and [`apply_diff`] replays it
//! onto a copy of the first. For any `a` and `b`:
//!
//! ```ignore
//! let mut copy = a.deep_copy();
//! if let Some(d) = diff_states(&a, &b) {
//!     apply_diff(&mut copy, &d)?;
//! }
//! assert_eq!(copy, b);
//! ```

mod apply;
mod diff;
mod equality;
mod value;

pub use apply::apply_diff;
pub use diff::{diff, diff_states, Differ, ListDiff, Patch, StateDiff};
pub use equality::{equals, states_equal};
pub use value::{deep_copy, Scalar, State, Value};
