use crate::error::PlanedbError;
use crate::memdb::{WatchSet, WriteTxn};
use crate::models::{AllocClientStatus, AllocDesiredStatus, Allocation, JobStatus};
use crate::store::derived::{set_job_statuses, update_summary_with_alloc};
use crate::store::schema::{
    StateRecord, TABLE_ALLOCS, TABLE_JOBS, alloc_node_key, alloc_node_prefix_key, id_key,
    id_prefix_key,
};
use crate::store::{StateStore, write_index};
use std::collections::HashMap;
use std::sync::Arc;

impl StateStore {
    /// Scheduler-side upsert: evict and place allocations in one entry.
    /// Client-authored fields are retained from the existing version unless
    /// the scheduler is marking the allocation lost; jobs with at least one
    /// non-terminal allocation in the batch are forced to running.
    pub fn upsert_allocs(&self, index: u64, allocs: Vec<Allocation>) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        let mut jobs: HashMap<String, Option<JobStatus>> = HashMap::new();
        for mut alloc in allocs {
            let existing = txn
                .first(TABLE_ALLOCS, "id", &id_key(&alloc.id))?
                .and_then(StateRecord::into_alloc);

            match existing.as_deref() {
                None => {
                    alloc.create_index = index;
                    alloc.modify_index = index;
                    alloc.alloc_modify_index = index;
                }
                Some(exist) => {
                    alloc.create_index = exist.create_index;
                    alloc.modify_index = index;
                    alloc.alloc_modify_index = index;

                    // The client owns these fields; only a lost verdict
                    // from the scheduler overrides them.
                    if alloc.client_status != AllocClientStatus::Lost {
                        alloc.client_status = exist.client_status;
                        alloc.client_description = exist.client_description.clone();
                    }

                    // Re-attach the denormalized job when the scheduler
                    // sent a stripped payload.
                    if alloc.job.is_none() {
                        alloc.job = exist.job.clone();
                    }
                }
            }

            update_summary_with_alloc(&mut txn, index, &alloc, existing.as_deref())?;

            let force_status = if alloc.client_terminal_status() {
                None
            } else {
                Some(JobStatus::Running)
            };
            jobs.insert(alloc.job_id.clone(), force_status);

            txn.insert(TABLE_ALLOCS, StateRecord::Alloc(Arc::new(alloc)))?;
        }

        write_index(&mut txn, TABLE_ALLOCS, index)?;

        set_job_statuses(&mut txn, index, &jobs, false)?;

        txn.commit();
        Ok(())
    }

    /// Client-side update: the node is authoritative on client status,
    /// description and task states. Unknown allocations are skipped
    /// silently; a paused allocation rejects client overrides.
    pub fn update_allocs_from_client(
        &self,
        index: u64,
        allocs: Vec<Allocation>,
    ) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        for alloc in allocs {
            self.nested_update_alloc_from_client(&mut txn, index, alloc)?;
        }

        write_index(&mut txn, TABLE_ALLOCS, index)?;

        txn.commit();
        Ok(())
    }

    fn nested_update_alloc_from_client(
        &self,
        txn: &mut WriteTxn<'_, StateRecord>,
        index: u64,
        alloc: Allocation,
    ) -> Result<(), PlanedbError> {
        let Some(existing) = txn
            .first(TABLE_ALLOCS, "id", &id_key(&alloc.id))?
            .and_then(StateRecord::into_alloc)
        else {
            return Ok(());
        };

        let mut updated = (*existing).clone();
        if existing.desired_status != AllocDesiredStatus::Pause {
            updated.client_status = alloc.client_status;
            updated.client_description = alloc.client_description;
            updated.task_states = alloc.task_states;
        }
        updated.modify_index = index;

        update_summary_with_alloc(txn, index, &updated, Some(&existing))?;

        let force_status = if updated.client_terminal_status() {
            None
        } else {
            Some(JobStatus::Running)
        };
        let job_id = existing.job_id.clone();

        txn.insert(TABLE_ALLOCS, StateRecord::Alloc(Arc::new(updated)))?;

        let jobs = HashMap::from([(job_id, force_status)]);
        set_job_statuses(txn, index, &jobs, false)?;
        Ok(())
    }

    pub fn alloc_by_id(
        &self,
        ws: &mut WatchSet,
        alloc_id: &str,
    ) -> Result<Option<Arc<Allocation>>, PlanedbError> {
        let txn = self.db.read();
        let (watch, existing) = txn.first_watch(TABLE_ALLOCS, "id", &id_key(alloc_id))?;
        ws.add(watch);
        Ok(existing.and_then(StateRecord::into_alloc))
    }

    pub fn allocs_by_id_prefix(
        &self,
        ws: &mut WatchSet,
        prefix: &str,
    ) -> Result<Vec<Arc<Allocation>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get(TABLE_ALLOCS, "id_prefix", &id_prefix_key(prefix))?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_alloc).collect())
    }

    /// Every allocation placed on the node, whatever its terminal state.
    pub fn allocs_by_node(
        &self,
        ws: &mut WatchSet,
        node_id: &str,
    ) -> Result<Vec<Arc<Allocation>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get(TABLE_ALLOCS, "node_prefix", &alloc_node_prefix_key(node_id))?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_alloc).collect())
    }

    /// Allocations on the node filtered by terminal state, straight off the
    /// composite index.
    pub fn allocs_by_node_terminal(
        &self,
        ws: &mut WatchSet,
        node_id: &str,
        terminal: bool,
    ) -> Result<Vec<Arc<Allocation>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get(TABLE_ALLOCS, "node", &alloc_node_key(node_id, terminal))?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_alloc).collect())
    }

    /// Allocations for a job. With `all` unset, allocations whose embedded
    /// job belongs to an older registration (differing `create_index`) are
    /// dropped.
    pub fn allocs_by_job(
        &self,
        ws: &mut WatchSet,
        job_id: &str,
        all: bool,
    ) -> Result<Vec<Arc<Allocation>>, PlanedbError> {
        let txn = self.db.read();

        let job = txn
            .first(TABLE_JOBS, "id", &id_key(job_id))?
            .and_then(StateRecord::into_job);

        let iter = txn.get(TABLE_ALLOCS, "job", &id_key(job_id))?;
        ws.add(iter.watch_channel());

        Ok(iter
            .filter_map(StateRecord::into_alloc)
            .filter(|alloc| {
                if all {
                    return true;
                }
                match (&job, alloc.job.as_ref()) {
                    (Some(job), Some(alloc_job)) => alloc_job.create_index == job.create_index,
                    _ => true,
                }
            })
            .collect())
    }

    pub fn allocs_by_eval(
        &self,
        ws: &mut WatchSet,
        eval_id: &str,
    ) -> Result<Vec<Arc<Allocation>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get(TABLE_ALLOCS, "eval", &id_key(eval_id))?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_alloc).collect())
    }

    pub fn allocs(&self, ws: &mut WatchSet) -> Result<Vec<Arc<Allocation>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get_all(TABLE_ALLOCS, "id")?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_alloc).collect())
    }
}
