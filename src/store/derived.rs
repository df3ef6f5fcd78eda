//! Derived state: job status is a function of the job's allocations and
//! evaluations, and job summaries mirror the latest observed task states.
//! These helpers run inside the caller's write transaction; the enclosing
//! façade operation owns the commit.

use crate::error::PlanedbError;
use crate::memdb::WriteTxn;
use crate::models::{
    AllocClientStatus, AllocDesiredStatus, Allocation, Job, JobStatus, JobSummary, TaskState,
    TaskSummary,
};
use crate::store::schema::{
    StateRecord, TABLE_ALLOCS, TABLE_EVALS, TABLE_JOBS, TABLE_JOB_SUMMARY, eval_job_prefix_key,
    id_key,
};
use crate::store::{StateStore, write_index};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

/// Status a job should carry given its allocations and evaluations:
/// any live allocation means running, any live evaluation means pending,
/// and a job whose work has all reached a terminal state is dead.
/// `eval_delete` forces the dead verdict even with no rows left, because
/// the caller is garbage-collecting evaluations.
pub(crate) fn get_job_status(
    txn: &WriteTxn<'_, StateRecord>,
    job: &Job,
    eval_delete: bool,
) -> Result<JobStatus, PlanedbError> {
    let mut has_alloc = false;
    for record in txn.get(TABLE_ALLOCS, "job", &id_key(&job.id))? {
        let Some(alloc) = record.into_alloc() else {
            continue;
        };
        has_alloc = true;
        if !alloc.terminal_status() {
            return Ok(JobStatus::Running);
        }
    }

    let mut has_eval = false;
    for record in txn.get(TABLE_EVALS, "job_prefix", &eval_job_prefix_key(&job.id))? {
        let Some(eval) = record.into_eval() else {
            continue;
        };
        // The prefix index also matches longer job ids.
        if eval.job_id != job.id {
            continue;
        }
        has_eval = true;
        if !eval.terminal_status() {
            return Ok(JobStatus::Pending);
        }
    }

    if eval_delete || has_eval || has_alloc {
        return Ok(JobStatus::Dead);
    }
    Ok(JobStatus::Pending)
}

/// Recompute (or force) a job's status and publish the change. A job whose
/// `create_index` equals the current log index is brand new and always
/// publishes, whatever status the caller-supplied record carried.
pub(crate) fn set_job_status(
    txn: &mut WriteTxn<'_, StateRecord>,
    index: u64,
    job: &Job,
    eval_delete: bool,
    force_status: Option<JobStatus>,
) -> Result<(), PlanedbError> {
    let old_status = if index == job.create_index {
        None
    } else {
        Some(job.status)
    };

    let new_status = match force_status {
        Some(status) => status,
        None => get_job_status(txn, job, eval_delete)?,
    };

    if old_status == Some(new_status) {
        return Ok(());
    }

    let mut updated = job.clone();
    updated.status = new_status;
    updated.modify_index = index;
    txn.insert(TABLE_JOBS, StateRecord::Job(Arc::new(updated)))?;
    write_index(txn, TABLE_JOBS, index)?;
    Ok(())
}

/// Apply [`set_job_status`] to a batch of jobs keyed by id, with an
/// optional forced status per job. Absent jobs are skipped, and a paused
/// job is never automatically restatused.
pub(crate) fn set_job_statuses(
    txn: &mut WriteTxn<'_, StateRecord>,
    index: u64,
    jobs: &HashMap<String, Option<JobStatus>>,
    eval_delete: bool,
) -> Result<(), PlanedbError> {
    for (job_id, force_status) in jobs {
        let Some(job) = txn
            .first(TABLE_JOBS, "id", &id_key(job_id))?
            .and_then(StateRecord::into_job)
        else {
            continue;
        };
        if job.status == JobStatus::Pause {
            continue;
        }
        set_job_status(txn, index, &job, eval_delete, *force_status)?;
    }
    Ok(())
}

/// Create the job's summary if missing and make sure it carries an entry
/// for every task type the job declares.
pub(crate) fn update_summary_with_job(
    txn: &mut WriteTxn<'_, StateRecord>,
    index: u64,
    job: &Job,
) -> Result<(), PlanedbError> {
    let existing = txn
        .first(TABLE_JOB_SUMMARY, "id", &id_key(&job.id))?
        .and_then(StateRecord::into_summary);

    let mut changed = existing.is_none();
    let mut summary = match existing {
        Some(summary) => (*summary).clone(),
        None => JobSummary {
            job_id: job.id.clone(),
            create_index: index,
            ..JobSummary::default()
        },
    };

    for task in &job.tasks {
        if !summary.tasks.contains_key(&task.task_type) {
            summary.tasks.insert(task.task_type.clone(), TaskSummary::default());
            changed = true;
        }
    }

    if changed {
        summary.modify_index = index;
        write_index(txn, TABLE_JOB_SUMMARY, index)?;
        txn.insert(TABLE_JOB_SUMMARY, StateRecord::Summary(Arc::new(summary)))?;
    }
    Ok(())
}

fn task_state_for(client_status: AllocClientStatus) -> TaskState {
    match client_status {
        AllocClientStatus::Pending => TaskState::Starting,
        AllocClientStatus::Running => TaskState::Running,
        AllocClientStatus::Complete => TaskState::Complete,
        AllocClientStatus::Failed => TaskState::Failed,
        AllocClientStatus::Lost => TaskState::Lost,
    }
}

/// Fold an allocation insert or update into its job's summary. Skips
/// silently when the allocation carries no denormalized job, the job has
/// been deregistered, or the summary belongs to a newer job version;
/// a missing summary (or task entry) for a live job is an invariant
/// violation and fails the transaction.
pub(crate) fn update_summary_with_alloc(
    txn: &mut WriteTxn<'_, StateRecord>,
    index: u64,
    alloc: &Allocation,
    existing_alloc: Option<&Allocation>,
) -> Result<(), PlanedbError> {
    let Some(alloc_job) = alloc.job.as_ref() else {
        return Ok(());
    };

    let Some(summary) = txn
        .first(TABLE_JOB_SUMMARY, "id", &id_key(&alloc.job_id))?
        .and_then(StateRecord::into_summary)
    else {
        if txn.first(TABLE_JOBS, "id", &id_key(&alloc.job_id))?.is_none() {
            // De-registered job; nothing to maintain.
            return Ok(());
        }
        return Err(PlanedbError::SummaryMissing {
            job_id: alloc.job_id.clone(),
        });
    };

    let mut summary = (*summary).clone();

    // The allocation points at an older version of the job.
    if summary.create_index != alloc_job.create_index {
        return Ok(());
    }

    let Some(task_summary) = summary.tasks.get_mut(&alloc.task) else {
        return Err(PlanedbError::TaskMissing {
            job_id: alloc.job_id.clone(),
            task: alloc.task.clone(),
        });
    };

    let mut changed = false;
    match existing_alloc {
        None => {
            if matches!(
                alloc.desired_status,
                AllocDesiredStatus::Stop | AllocDesiredStatus::Evict
            ) {
                error!(
                    alloc_id = %alloc.id,
                    desired_status = %alloc.desired_status,
                    "new allocation inserted with terminal desired status"
                );
            }
            match alloc.client_status {
                AllocClientStatus::Pending => {
                    task_summary.status = TaskState::Starting;
                    changed = true;
                }
                AllocClientStatus::Running
                | AllocClientStatus::Failed
                | AllocClientStatus::Complete => {
                    error!(
                        alloc_id = %alloc.id,
                        client_status = %alloc.client_status,
                        "new allocation inserted with advanced client status"
                    );
                }
                AllocClientStatus::Lost => {}
            }
        }
        Some(existing) if existing.client_status != alloc.client_status => {
            task_summary.status = task_state_for(alloc.client_status);
            changed = true;
        }
        Some(_) => {}
    }

    if changed {
        summary.modify_index = index;
        write_index(txn, TABLE_JOB_SUMMARY, index)?;
        txn.insert(TABLE_JOB_SUMMARY, StateRecord::Summary(Arc::new(summary)))?;
    }
    Ok(())
}

impl StateStore {
    /// Rebuild every job's summary from its current allocations. Used by
    /// the replication layer after upgrades or repairs; allocations whose
    /// denormalized job is absent or stale are ignored.
    pub fn reconcile_job_summaries(&self, index: u64) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        let jobs: Vec<Arc<Job>> = txn
            .get_all(TABLE_JOBS, "id")?
            .filter_map(StateRecord::into_job)
            .collect();
        for job in jobs {
            let mut summary = JobSummary {
                job_id: job.id.clone(),
                create_index: job.create_index,
                modify_index: index,
                ..JobSummary::default()
            };
            for task in &job.tasks {
                summary.tasks.insert(task.task_type.clone(), TaskSummary::default());
            }

            for record in txn.get(TABLE_ALLOCS, "job", &id_key(&job.id))? {
                let Some(alloc) = record.into_alloc() else {
                    continue;
                };
                let stale = alloc
                    .job
                    .as_ref()
                    .map(|j| j.create_index != job.create_index)
                    .unwrap_or(true);
                if stale {
                    continue;
                }
                let task_summary = summary.tasks.entry(alloc.task.clone()).or_default();
                task_summary.status = task_state_for(alloc.client_status);
            }

            txn.insert(TABLE_JOB_SUMMARY, StateRecord::Summary(Arc::new(summary)))?;
        }

        write_index(&mut txn, TABLE_JOB_SUMMARY, index)?;
        txn.commit();
        Ok(())
    }
}
