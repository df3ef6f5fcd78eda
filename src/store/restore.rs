use crate::error::PlanedbError;
use crate::memdb::WriteTxn;
use crate::models::{Allocation, Evaluation, IndexEntry, Job, JobSummary, Node};
use crate::store::StateStore;
use crate::store::schema::{
    StateRecord, TABLE_ALLOCS, TABLE_EVALS, TABLE_INDEX, TABLE_JOBS, TABLE_JOB_SUMMARY,
    TABLE_NODES,
};
use std::ops::Deref;
use std::sync::Arc;

/// A point-in-time view of the state store. Derefs to the full read API;
/// writes on the live store are invisible here, and the snapshot blocks
/// nothing.
pub struct StateSnapshot {
    store: StateStore,
}

impl StateSnapshot {
    pub(crate) fn new(store: StateStore) -> Self {
        Self { store }
    }
}

impl Deref for StateSnapshot {
    type Target = StateStore;

    fn deref(&self) -> &StateStore {
        &self.store
    }
}

/// Bulk load for rebuilding a store from a snapshot stream: one long write
/// transaction, raw record inserts with no derivation and no index-register
/// accounting, published atomically by `commit`. Dropping without commit
/// discards everything.
pub struct StateRestore<'a> {
    txn: WriteTxn<'a, StateRecord>,
}

impl<'a> StateRestore<'a> {
    pub(crate) fn new(txn: WriteTxn<'a, StateRecord>) -> Self {
        Self { txn }
    }

    pub fn node_restore(&mut self, node: Node) -> Result<(), PlanedbError> {
        self.txn.insert(TABLE_NODES, StateRecord::Node(Arc::new(node)))
    }

    pub fn job_restore(&mut self, job: Job) -> Result<(), PlanedbError> {
        self.txn.insert(TABLE_JOBS, StateRecord::Job(Arc::new(job)))
    }

    pub fn eval_restore(&mut self, eval: Evaluation) -> Result<(), PlanedbError> {
        self.txn.insert(TABLE_EVALS, StateRecord::Eval(Arc::new(eval)))
    }

    pub fn alloc_restore(&mut self, alloc: Allocation) -> Result<(), PlanedbError> {
        self.txn.insert(TABLE_ALLOCS, StateRecord::Alloc(Arc::new(alloc)))
    }

    pub fn job_summary_restore(&mut self, summary: JobSummary) -> Result<(), PlanedbError> {
        self.txn
            .insert(TABLE_JOB_SUMMARY, StateRecord::Summary(Arc::new(summary)))
    }

    pub fn index_restore(&mut self, entry: IndexEntry) -> Result<(), PlanedbError> {
        self.txn.insert(TABLE_INDEX, StateRecord::Index(entry))
    }

    pub fn commit(self) {
        self.txn.commit();
    }

    /// Discard the restore. Dropping has the same effect; this spells it
    /// out at call sites.
    pub fn abort(self) {}
}
