use crate::error::PlanedbError;
use crate::memdb::{WatchSet, WriteTxn};
use crate::models::{EvalStatus, Evaluation, JobStatus, TaskState};
use crate::store::derived::set_job_statuses;
use crate::store::schema::{
    StateRecord, TABLE_ALLOCS, TABLE_EVALS, TABLE_JOB_SUMMARY, eval_job_key,
    eval_job_prefix_key, id_key, id_prefix_key,
};
use crate::store::{StateStore, write_index};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

impl StateStore {
    /// Upsert a batch of evaluations, then rederive the status of every job
    /// they target.
    pub fn upsert_evals(&self, index: u64, evals: Vec<Evaluation>) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        let mut jobs: HashMap<String, Option<JobStatus>> = HashMap::with_capacity(evals.len());
        for eval in evals {
            jobs.insert(eval.job_id.clone(), None);
            self.nested_upsert_eval(&mut txn, index, eval)?;
        }

        set_job_statuses(&mut txn, index, &jobs, false)?;

        txn.commit();
        Ok(())
    }

    fn nested_upsert_eval(
        &self,
        txn: &mut WriteTxn<'_, StateRecord>,
        index: u64,
        mut eval: Evaluation,
    ) -> Result<(), PlanedbError> {
        let existing = txn
            .first(TABLE_EVALS, "id", &id_key(&eval.id))?
            .and_then(StateRecord::into_eval);
        if let Some(existing) = existing {
            eval.create_index = existing.create_index;
            eval.modify_index = index;
        } else {
            eval.create_index = index;
            eval.modify_index = index;
        }

        // Tasks the evaluation reports as queued go back to the queued
        // state in the job summary.
        let summary = txn
            .first(TABLE_JOB_SUMMARY, "id", &id_key(&eval.job_id))?
            .and_then(StateRecord::into_summary);
        if let Some(summary) = summary {
            let mut summary = (*summary).clone();
            let mut changed = false;
            for task in eval.queued_allocations.keys() {
                match summary.tasks.get_mut(task) {
                    Some(task_summary) => {
                        if task_summary.status != TaskState::Queued {
                            task_summary.status = TaskState::Queued;
                            changed = true;
                        }
                    }
                    None => {
                        error!(
                            job_id = %eval.job_id,
                            task = %task,
                            "unable to update queued state for unknown task"
                        );
                    }
                }
            }
            if changed {
                summary.modify_index = index;
                txn.insert(TABLE_JOB_SUMMARY, StateRecord::Summary(Arc::new(summary)))?;
                write_index(txn, TABLE_JOB_SUMMARY, index)?;
            }
        }

        // A clean completion cancels every evaluation still parked behind
        // this job.
        if eval.status == EvalStatus::Complete && eval.failed_tg_allocs.is_empty() {
            let blocked: Vec<Arc<Evaluation>> = txn
                .get(
                    TABLE_EVALS,
                    "job",
                    &eval_job_key(&eval.job_id, EvalStatus::Blocked),
                )?
                .filter_map(StateRecord::into_eval)
                .collect();
            for parked in blocked {
                let mut cancelled = (*parked).clone();
                cancelled.status = EvalStatus::Cancelled;
                cancelled.status_description =
                    format!("evaluation \"{}\" successful", eval.id);
                cancelled.modify_index = index;
                txn.insert(TABLE_EVALS, StateRecord::Eval(Arc::new(cancelled)))?;
            }
        }

        txn.insert(TABLE_EVALS, StateRecord::Eval(Arc::new(eval)))?;
        write_index(txn, TABLE_EVALS, index)?;
        Ok(())
    }

    /// Garbage-collect evaluations and allocations by id. Missing ids are
    /// skipped, never errors. The `evals` and `allocs` watermarks are
    /// bumped unconditionally so they track the log rather than the store
    /// contents.
    pub fn delete_eval(
        &self,
        index: u64,
        eval_ids: &[String],
        alloc_ids: &[String],
    ) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        let mut jobs: HashMap<String, Option<JobStatus>> = HashMap::with_capacity(eval_ids.len());
        for eval_id in eval_ids {
            let Some(existing) = txn.first(TABLE_EVALS, "id", &id_key(eval_id))? else {
                continue;
            };
            txn.delete(TABLE_EVALS, &existing)?;
            if let Some(eval) = existing.into_eval() {
                jobs.insert(eval.job_id.clone(), None);
            }
        }

        for alloc_id in alloc_ids {
            let Some(existing) = txn.first(TABLE_ALLOCS, "id", &id_key(alloc_id))? else {
                continue;
            };
            txn.delete(TABLE_ALLOCS, &existing)?;
        }

        write_index(&mut txn, TABLE_EVALS, index)?;
        write_index(&mut txn, TABLE_ALLOCS, index)?;

        set_job_statuses(&mut txn, index, &jobs, true)?;

        txn.commit();
        Ok(())
    }

    pub fn eval_by_id(
        &self,
        ws: &mut WatchSet,
        eval_id: &str,
    ) -> Result<Option<Arc<Evaluation>>, PlanedbError> {
        let txn = self.db.read();
        let (watch, existing) = txn.first_watch(TABLE_EVALS, "id", &id_key(eval_id))?;
        ws.add(watch);
        Ok(existing.and_then(StateRecord::into_eval))
    }

    pub fn evals_by_id_prefix(
        &self,
        ws: &mut WatchSet,
        prefix: &str,
    ) -> Result<Vec<Arc<Evaluation>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get(TABLE_EVALS, "id_prefix", &id_prefix_key(prefix))?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_eval).collect())
    }

    /// Every evaluation targeting the job. The underlying index scan is a
    /// string prefix over the job id, so exact matches are filtered here.
    pub fn evals_by_job(
        &self,
        ws: &mut WatchSet,
        job_id: &str,
    ) -> Result<Vec<Arc<Evaluation>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get(TABLE_EVALS, "job_prefix", &eval_job_prefix_key(job_id))?;
        ws.add(iter.watch_channel());
        Ok(iter
            .filter_map(StateRecord::into_eval)
            .filter(|eval| eval.job_id == job_id)
            .collect())
    }

    pub fn evals(&self, ws: &mut WatchSet) -> Result<Vec<Arc<Evaluation>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get_all(TABLE_EVALS, "id")?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_eval).collect())
    }
}
