use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Dead,
    Pause,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Dead => write!(f, "dead"),
            JobStatus::Pause => write!(f, "pause"),
        }
    }
}

/// A unit of work inside a job. `task_type` is the join key to the job
/// summary's per-task entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_type: String,
    pub driver: String,
    pub config: HashMap<String, String>,
}

/// A registered workload. Status is derived from allocations and
/// evaluations except while paused, which freezes it until explicitly
/// changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub job_type: String,
    pub status: JobStatus,
    pub tasks: Vec<Task>,
    pub create_index: u64,
    pub modify_index: u64,
    /// Bumped only when the job definition itself changes, not on derived
    /// status rewrites.
    pub job_modify_index: u64,
}

/// Observed state of one task, as aggregated into the job summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    #[serde(rename = "")]
    Unset,
    Queued,
    Starting,
    Running,
    Complete,
    Failed,
    Lost,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Unset => Ok(()),
            TaskState::Queued => write!(f, "queued"),
            TaskState::Starting => write!(f, "starting"),
            TaskState::Running => write!(f, "running"),
            TaskState::Complete => write!(f, "complete"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Lost => write!(f, "lost"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub status: TaskState,
}

/// Denormalized per-job view keyed by task type, maintained synchronously
/// with job and allocation writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub tasks: HashMap<String, TaskSummary>,
    pub create_index: u64,
    pub modify_index: u64,
}
