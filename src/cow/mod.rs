//! Copy-on-write containers.
//!
//! Copies are O(1): the copy aliases the source's backing store and the
//! reference count records that it is shared. The first mutating call on a
//! shared container clones its backing store; nested containers inside it are
//! cloned by reference and materialize only when they are written in turn.
//! Only the written branch of a tree is ever copied.

mod list;
mod map;

pub use list::CowList;
pub use map::CowMap;
