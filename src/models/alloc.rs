use crate::models::job::{Job, TaskState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocDesiredStatus {
    #[default]
    Run,
    Stop,
    Evict,
    Pause,
}

impl AllocDesiredStatus {
    pub fn terminal(self) -> bool {
        matches!(self, AllocDesiredStatus::Stop | AllocDesiredStatus::Evict)
    }
}

impl fmt::Display for AllocDesiredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocDesiredStatus::Run => write!(f, "run"),
            AllocDesiredStatus::Stop => write!(f, "stop"),
            AllocDesiredStatus::Evict => write!(f, "evict"),
            AllocDesiredStatus::Pause => write!(f, "pause"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocClientStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
    Lost,
}

impl AllocClientStatus {
    pub fn terminal(self) -> bool {
        matches!(
            self,
            AllocClientStatus::Complete | AllocClientStatus::Failed | AllocClientStatus::Lost
        )
    }
}

impl fmt::Display for AllocClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocClientStatus::Pending => write!(f, "pending"),
            AllocClientStatus::Running => write!(f, "running"),
            AllocClientStatus::Complete => write!(f, "complete"),
            AllocClientStatus::Failed => write!(f, "failed"),
            AllocClientStatus::Lost => write!(f, "lost"),
        }
    }
}

/// A scheduler's assignment of one task instance to a node. The desired
/// status is scheduler-authored; the client status is node-authored and
/// flows in through `update_allocs_from_client` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    pub eval_id: String,
    pub job_id: String,
    pub task: String,
    pub node_id: String,
    pub desired_status: AllocDesiredStatus,
    pub desired_description: String,
    pub client_status: AllocClientStatus,
    pub client_description: String,
    pub task_states: HashMap<String, TaskState>,
    /// Denormalized copy of the job at placement time. Derivations ignore
    /// the allocation when this is absent or points at an older job
    /// version (differing `create_index`).
    pub job: Option<Arc<Job>>,
    pub create_index: u64,
    pub modify_index: u64,
    /// Bumped only by scheduler-side upserts, not by client updates.
    pub alloc_modify_index: u64,
}

impl Allocation {
    /// The allocation will not transition further: the scheduler told it to
    /// stop, or the client reported a terminal state.
    pub fn terminal_status(&self) -> bool {
        if self.desired_status.terminal() {
            return true;
        }
        self.client_terminal_status()
    }

    pub fn client_terminal_status(&self) -> bool {
        self.client_status.terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::{AllocClientStatus, AllocDesiredStatus, Allocation};

    #[test]
    fn desired_stop_or_evict_is_terminal_regardless_of_client() {
        let alloc = Allocation {
            desired_status: AllocDesiredStatus::Evict,
            client_status: AllocClientStatus::Running,
            ..Allocation::default()
        };
        assert!(alloc.terminal_status());
        assert!(!alloc.client_terminal_status());
    }

    #[test]
    fn client_terminal_states() {
        for (status, terminal) in [
            (AllocClientStatus::Pending, false),
            (AllocClientStatus::Running, false),
            (AllocClientStatus::Complete, true),
            (AllocClientStatus::Failed, true),
            (AllocClientStatus::Lost, true),
        ] {
            let alloc = Allocation {
                client_status: status,
                ..Allocation::default()
            };
            assert_eq!(alloc.client_terminal_status(), terminal);
            assert_eq!(alloc.terminal_status(), terminal);
        }
    }
}
