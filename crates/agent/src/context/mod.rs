//! Per-run state shared between the step loop and its collaborators.
//!
//! | Type | Role |
//! |------|------|
//! | [`ExecutionContext`] | Inputs, metadata, cancellation, checkpoint id |
//! | [`MemoryState`] | Bounded conversation memory, shared across branches |

pub mod execution;
pub mod memory_state;

pub use execution::{ExecutionContext, InputValue, USER_PROMPT_KEY};
pub use memory_state::{DEFAULT_CAPACITY, MemoryState};
