//! Domain records held by the state store. Everything returned from a read
//! is shared and treated as immutable; mutation goes through copy-on-write
//! in the store's write paths.

mod alloc;
mod eval;
mod job;
mod node;

pub use alloc::{AllocClientStatus, AllocDesiredStatus, Allocation};
pub use eval::{EvalStatus, Evaluation};
pub use job::{Job, JobStatus, JobSummary, Task, TaskState, TaskSummary};
pub use node::{Node, NodeStatus};

use serde::{Deserialize, Serialize};

/// One row of the `index` table: the greatest log index that has modified
/// the named table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    pub value: u64,
}
