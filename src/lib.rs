//! # docstate
//!
//! Copy-on-write document states with structural diffs.
//!
//! ## Core Concepts
//!
//! - **State**: A map from property names to values, nested arbitrarily
//! - **Diff**: The minimal patch between two states, with list push/pop
//!   detection so appends don't rewrite whole lists
//! - **Copy-on-write**: Copies share storage until written, so snapshots are O(1)
//! - **Transactions**: Transient documents saved as diffs against what was read,
//!   held back until commit so a rollback leaves the repository untouched
//!
//! ## Example
//!
//! ```ignore
//! use docstate::{MemRepository, State, TransactionState, Value};
//! use std::sync::Arc;
//!
//! let repo = Arc::new(MemRepository::default());
//! let mut tx = TransactionState::new(Arc::clone(&repo));
//!
//! let doc = tx.create(None, State::new().with("title", "draft"))?;
//! let id = doc.id().unwrap().to_string();
//! tx.commit()?;
//!
//! // Only the changed key reaches the repository.
//! tx.get_state_for_update(&id)?.unwrap().put("title", "final");
//! tx.commit()?;
//! ```

pub mod codec;
pub mod config;
pub mod cow;
pub mod document;
pub mod error;
pub mod repository;
pub mod state;
pub mod transaction;
pub mod types;
pub mod updates;

// Re-exports
pub use config::{DiffConfig, RepositoryConfig};
pub use cow::{CowList, CowMap};
pub use document::DocumentState;
pub use error::{Result, StateError};
pub use repository::{MemRepository, Repository};
pub use state::{
    apply_diff, deep_copy, diff, diff_states, equals, states_equal, Differ, ListDiff, Patch,
    Scalar, State, StateDiff, Value,
};
pub use transaction::{SaveSummary, TransactionState};
pub use types::*;
pub use updates::{apply_batches, UpdateBatch, UpdateOp, Updates};
