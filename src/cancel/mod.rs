//! Hierarchical cancellation scopes
//!
//! A [`CancelScope`] is the observer half of a cancellation signal and the
//! [`CancelGuard`] created with it is the authority that fires it. Scopes
//! form a tree: firing a parent fires every descendant, while a child can
//! fire without touching its parent. Deadline-bound scopes fire themselves
//! when their timeout elapses, and every observer can ask [`CancelScope::reason`]
//! why the signal fired.

mod scope;

pub use scope::{CancelGuard, CancelReason, CancelScope};
