use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    Blocked,
    #[default]
    Pending,
    Complete,
    Failed,
    Cancelled,
}

impl EvalStatus {
    pub fn terminal(self) -> bool {
        matches!(
            self,
            EvalStatus::Complete | EvalStatus::Failed | EvalStatus::Cancelled
        )
    }
}

impl fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalStatus::Blocked => write!(f, "blocked"),
            EvalStatus::Pending => write!(f, "pending"),
            EvalStatus::Complete => write!(f, "complete"),
            EvalStatus::Failed => write!(f, "failed"),
            EvalStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A unit of scheduling work targeting one job. Blocked evaluations park
/// until capacity frees up and are cancelled when a later evaluation for
/// the same job completes cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub job_id: String,
    pub eval_type: String,
    pub triggered_by: String,
    pub status: EvalStatus,
    pub status_description: String,
    /// Failure reason per task type that could not be placed; a clean
    /// completion has none.
    pub failed_tg_allocs: HashMap<String, String>,
    /// Count of allocations still queued per task type.
    pub queued_allocations: HashMap<String, u64>,
    pub create_index: u64,
    pub modify_index: u64,
}

impl Evaluation {
    pub fn terminal_status(&self) -> bool {
        self.status.terminal()
    }
}
