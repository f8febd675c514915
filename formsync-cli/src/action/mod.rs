//! Persistence action builder
//!
//! Turns a node's derived original/new snapshots into a [`MutationPlan`],
//! runs it against the table's capability functions and collects the
//! per-row outcome in [`NodeResults`].

pub mod execute;
pub mod plan;
pub mod results;

pub use execute::execute_plan;
pub use plan::{ChangeType, MutationPlan, PlannedInsert, PlannedUpdate, build_plan};
pub use results::{NodeError, NodeResults, PersistedRows};
