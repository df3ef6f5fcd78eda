//! The state store façade: typed operations over the domain tables, the
//! derived-state engine that keeps job statuses and summaries consistent,
//! and the snapshot/restore protocol used by the replication layer.
//!
//! Every mutator follows the same skeleton: open the single write
//! transaction, perform the table operations, bump the index register for
//! every table touched, commit. Any error propagates and the dropped
//! transaction aborts, so callers observe all-or-nothing. Log indices are
//! supplied by the caller (the replication FSM) and are monotonic per table.

mod allocs;
mod derived;
mod evals;
mod jobs;
mod nodes;
mod restore;
mod schema;

pub use restore::{StateRestore, StateSnapshot};
pub use schema::StateRecord;

use crate::error::PlanedbError;
use crate::memdb::{MemDb, WatchChannel, WriteTxn};
use crate::models::IndexEntry;
use crate::store::schema::{TABLE_INDEX, id_key, state_store_schema};
use std::sync::atomic::{AtomicBool, Ordering};

/// The authoritative in-memory state of the control plane. Reads are
/// lock-free over a stable view and register watch channels; writes are
/// serialized and driven by replicated log entries. Every object returned
/// from a read is shared and must never be mutated in place.
pub struct StateStore {
    pub(crate) db: MemDb<StateRecord>,
    abandon_ch: WatchChannel,
    abandoned: AtomicBool,
}

impl StateStore {
    pub fn new() -> Result<Self, PlanedbError> {
        Ok(Self {
            db: MemDb::new(state_store_schema())?,
            abandon_ch: WatchChannel::new(),
            abandoned: AtomicBool::new(false),
        })
    }

    /// Point-in-time snapshot exposing the whole read API. O(1): shares the
    /// frozen root, blocks no writers, never observes later commits.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::new(StateStore {
            db: self.db.snapshot(),
            abandon_ch: WatchChannel::new(),
            abandoned: AtomicBool::new(false),
        })
    }

    /// One long write transaction for bulk loads: raw inserts, no
    /// derivation, no index-register accounting.
    pub fn restore(&self) -> StateRestore<'_> {
        StateRestore::new(self.db.write())
    }

    /// Closed exactly once by [`StateStore::abandon`], signalling watchers
    /// that this store has been replaced (typically after a restore into a
    /// fresh instance).
    pub fn abandon_ch(&self) -> WatchChannel {
        self.abandon_ch.clone()
    }

    /// Signal that this store has been abandoned. Calling twice is a
    /// programmer error and panics.
    pub fn abandon(&self) {
        let already = self.abandoned.swap(true, Ordering::SeqCst);
        assert!(!already, "state store abandoned more than once");
        self.abandon_ch.close();
    }

    /// The greatest log index that modified the named table, 0 when the
    /// table has never been written.
    pub fn index(&self, name: &str) -> Result<u64, PlanedbError> {
        let txn = self.db.read();
        Ok(txn
            .first(TABLE_INDEX, "id", &id_key(name))?
            .and_then(StateRecord::into_index_entry)
            .map(|entry| entry.value)
            .unwrap_or(0))
    }

    /// The greatest index value across every table watermark.
    pub fn latest_index(&self) -> Result<u64, PlanedbError> {
        Ok(self
            .indexes()?
            .into_iter()
            .map(|entry| entry.value)
            .max()
            .unwrap_or(0))
    }

    pub fn indexes(&self) -> Result<Vec<IndexEntry>, PlanedbError> {
        let txn = self.db.read();
        Ok(txn
            .get_all(TABLE_INDEX, "id")?
            .filter_map(StateRecord::into_index_entry)
            .collect())
    }

    /// Drop a table watermark. Test helper; not part of the replication
    /// protocol.
    pub fn remove_index(&self, name: &str) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();
        txn.delete_all(TABLE_INDEX, "id", &id_key(name))?;
        txn.commit();
        Ok(())
    }
}

/// Record that `table` was modified at `index`. Called by every write path
/// for every table it touches; the index register is the single accounting
/// point for table watermarks.
pub(crate) fn write_index(
    txn: &mut WriteTxn<'_, StateRecord>,
    table: &str,
    index: u64,
) -> Result<(), PlanedbError> {
    txn.insert(
        TABLE_INDEX,
        StateRecord::Index(IndexEntry {
            key: table.to_string(),
            value: index,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::StateStore;
    use crate::models::Node;

    #[test]
    fn index_defaults_to_zero_and_tracks_writes() {
        let store = StateStore::new().expect("store");
        assert_eq!(store.index("nodes").expect("index"), 0);
        assert_eq!(store.latest_index().expect("latest"), 0);

        store
            .upsert_node(7, Node { id: "n1".into(), ..Node::default() })
            .expect("upsert");
        assert_eq!(store.index("nodes").expect("index"), 7);
        assert_eq!(store.latest_index().expect("latest"), 7);
        assert_eq!(store.indexes().expect("indexes").len(), 1);
    }

    #[test]
    fn remove_index_clears_the_watermark() {
        let store = StateStore::new().expect("store");
        store
            .upsert_node(3, Node { id: "n1".into(), ..Node::default() })
            .expect("upsert");
        store.remove_index("nodes").expect("remove");
        assert_eq!(store.index("nodes").expect("index"), 0);
    }

    #[test]
    #[should_panic(expected = "abandoned more than once")]
    fn double_abandon_panics() {
        let store = StateStore::new().expect("store");
        let ch = store.abandon_ch();
        store.abandon();
        assert!(ch.is_closed());
        store.abandon();
    }
}
