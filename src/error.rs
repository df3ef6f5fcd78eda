use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanedbErrorCode {
    UnknownTable,
    UnknownIndex,
    SchemaViolation,
    UniqueViolation,
    DeleteMissing,
    NotFound,
    SummaryMissing,
    TaskMissing,
}

impl PlanedbErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanedbErrorCode::UnknownTable => "unknown_table",
            PlanedbErrorCode::UnknownIndex => "unknown_index",
            PlanedbErrorCode::SchemaViolation => "schema_violation",
            PlanedbErrorCode::UniqueViolation => "unique_violation",
            PlanedbErrorCode::DeleteMissing => "delete_missing",
            PlanedbErrorCode::NotFound => "not_found",
            PlanedbErrorCode::SummaryMissing => "summary_missing",
            PlanedbErrorCode::TaskMissing => "task_missing",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PlanedbError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("unknown index '{index}' on table '{table}'")]
    UnknownIndex { table: String, index: String },
    #[error("record does not belong to table '{table}'")]
    SchemaViolation { table: String },
    #[error("unique constraint violation on index '{index}' of table '{table}'")]
    UniqueViolation { table: String, index: String },
    #[error("delete from '{table}' failed: record not found")]
    DeleteMissing { table: String },
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("job summary for job '{job_id}' is not present")]
    SummaryMissing { job_id: String },
    #[error("task '{task}' missing from the summary of job '{job_id}'")]
    TaskMissing { job_id: String, task: String },
}

impl PlanedbError {
    pub fn code(&self) -> PlanedbErrorCode {
        match self {
            PlanedbError::UnknownTable(_) => PlanedbErrorCode::UnknownTable,
            PlanedbError::UnknownIndex { .. } => PlanedbErrorCode::UnknownIndex,
            PlanedbError::SchemaViolation { .. } => PlanedbErrorCode::SchemaViolation,
            PlanedbError::UniqueViolation { .. } => PlanedbErrorCode::UniqueViolation,
            PlanedbError::DeleteMissing { .. } => PlanedbErrorCode::DeleteMissing,
            PlanedbError::NotFound { .. } => PlanedbErrorCode::NotFound,
            PlanedbError::SummaryMissing { .. } => PlanedbErrorCode::SummaryMissing,
            PlanedbError::TaskMissing { .. } => PlanedbErrorCode::TaskMissing,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}
