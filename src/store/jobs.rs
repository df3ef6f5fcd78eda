use crate::error::PlanedbError;
use crate::memdb::WatchSet;
use crate::models::{Job, JobStatus, JobSummary};
use crate::store::derived::{get_job_status, set_job_status, update_summary_with_job};
use crate::store::schema::{
    StateRecord, TABLE_JOBS, TABLE_JOB_SUMMARY, id_key, id_prefix_key,
};
use crate::store::{StateStore, write_index};
use std::sync::Arc;

impl StateStore {
    /// Register a job or update its definition. The status of an existing
    /// job is recomputed from its allocations and evaluations; a brand-new
    /// job goes through [`set_job_status`] so the initial status is derived
    /// rather than trusted from the caller.
    pub fn upsert_job(&self, index: u64, mut job: Job) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        let existing = txn
            .first(TABLE_JOBS, "id", &id_key(&job.id))?
            .and_then(StateRecord::into_job);
        if let Some(existing) = existing {
            job.create_index = existing.create_index;
            job.modify_index = index;
            job.job_modify_index = index;
            job.status = get_job_status(&txn, &job, false)?;
        } else {
            job.create_index = index;
            job.modify_index = index;
            job.job_modify_index = index;

            set_job_status(&mut txn, index, &job, false, None)?;
            // set_job_status may have inserted an updated copy; reload it
            // before the final insert below.
            if let Some(updated) = txn
                .first(TABLE_JOBS, "id", &id_key(&job.id))?
                .and_then(StateRecord::into_job)
            {
                job = (*updated).clone();
            }
        }

        update_summary_with_job(&mut txn, index, &job)?;

        txn.insert(TABLE_JOBS, StateRecord::Job(Arc::new(job)))?;
        write_index(&mut txn, TABLE_JOBS, index)?;

        txn.commit();
        Ok(())
    }

    /// Explicit status change, e.g. pausing or resuming a job. Fails when
    /// the job is unknown.
    pub fn update_job_status(
        &self,
        index: u64,
        job_id: &str,
        status: JobStatus,
    ) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        let existing = txn
            .first(TABLE_JOBS, "id", &id_key(job_id))?
            .and_then(StateRecord::into_job)
            .ok_or_else(|| PlanedbError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            })?;

        let mut updated = (*existing).clone();
        updated.status = status;
        updated.modify_index = index;
        updated.job_modify_index = index;

        update_summary_with_job(&mut txn, index, &updated)?;

        txn.insert(TABLE_JOBS, StateRecord::Job(Arc::new(updated)))?;
        write_index(&mut txn, TABLE_JOBS, index)?;

        txn.commit();
        Ok(())
    }

    /// Deregister a job and drop its summary. Fails when the job is
    /// unknown.
    pub fn delete_job(&self, index: u64, job_id: &str) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        let existing = txn.first(TABLE_JOBS, "id", &id_key(job_id))?.ok_or_else(|| {
            PlanedbError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            }
        })?;

        txn.delete(TABLE_JOBS, &existing)?;
        write_index(&mut txn, TABLE_JOBS, index)?;

        txn.delete_all(TABLE_JOB_SUMMARY, "id", &id_key(job_id))?;
        write_index(&mut txn, TABLE_JOB_SUMMARY, index)?;

        txn.commit();
        Ok(())
    }

    /// Import a job payload whose fields the client is authoritative on.
    /// No status derivation runs; `create_index` is preserved from the
    /// registered version so log replays cannot rewrite it.
    pub fn update_job_from_client(&self, index: u64, mut job: Job) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        if let Some(existing) = txn
            .first(TABLE_JOBS, "id", &id_key(&job.id))?
            .and_then(StateRecord::into_job)
        {
            job.create_index = existing.create_index;
        }

        txn.insert(TABLE_JOBS, StateRecord::Job(Arc::new(job)))?;
        write_index(&mut txn, TABLE_JOBS, index)?;

        txn.commit();
        Ok(())
    }

    /// Raw summary upsert, used when replaying reconciliation entries from
    /// the log.
    pub fn upsert_job_summary(
        &self,
        index: u64,
        summary: JobSummary,
    ) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        txn.insert(TABLE_JOB_SUMMARY, StateRecord::Summary(Arc::new(summary)))?;
        write_index(&mut txn, TABLE_JOB_SUMMARY, index)?;

        txn.commit();
        Ok(())
    }

    pub fn job_by_id(
        &self,
        ws: &mut WatchSet,
        job_id: &str,
    ) -> Result<Option<Arc<Job>>, PlanedbError> {
        let txn = self.db.read();
        let (watch, existing) = txn.first_watch(TABLE_JOBS, "id", &id_key(job_id))?;
        ws.add(watch);
        Ok(existing.and_then(StateRecord::into_job))
    }

    pub fn jobs_by_id_prefix(
        &self,
        ws: &mut WatchSet,
        prefix: &str,
    ) -> Result<Vec<Arc<Job>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get(TABLE_JOBS, "id_prefix", &id_prefix_key(prefix))?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_job).collect())
    }

    pub fn jobs(&self, ws: &mut WatchSet) -> Result<Vec<Arc<Job>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get_all(TABLE_JOBS, "id")?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_job).collect())
    }

    /// Jobs handled by the given scheduler type.
    pub fn jobs_by_scheduler(
        &self,
        ws: &mut WatchSet,
        scheduler_type: &str,
    ) -> Result<Vec<Arc<Job>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get(TABLE_JOBS, "type", &id_key(scheduler_type))?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_job).collect())
    }

    pub fn job_summary_by_id(
        &self,
        ws: &mut WatchSet,
        job_id: &str,
    ) -> Result<Option<Arc<JobSummary>>, PlanedbError> {
        let txn = self.db.read();
        let (watch, existing) = txn.first_watch(TABLE_JOB_SUMMARY, "id", &id_key(job_id))?;
        ws.add(watch);
        Ok(existing.and_then(StateRecord::into_summary))
    }

    pub fn job_summary_by_prefix(
        &self,
        ws: &mut WatchSet,
        prefix: &str,
    ) -> Result<Vec<Arc<JobSummary>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get(TABLE_JOB_SUMMARY, "id_prefix", &id_prefix_key(prefix))?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_summary).collect())
    }

    pub fn job_summaries(&self, ws: &mut WatchSet) -> Result<Vec<Arc<JobSummary>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get_all(TABLE_JOB_SUMMARY, "id")?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_summary).collect())
    }
}
