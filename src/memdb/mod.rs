//! Transactional in-memory database: named tables with declared secondary
//! indexes, persistent (structurally shared) storage so read transactions
//! and snapshots observe a frozen root, a single serialized writer, and
//! close-to-signal watch channels on reads.

pub mod encoded_key;
pub mod index;
pub mod schema;
mod table;
pub mod txn;
pub mod watch;

pub use encoded_key::{EncodedKey, KeyBuilder, prefix_successor};
pub use schema::{IndexSchema, Keyer, Schema, TableSchema};
pub use txn::{ReadTxn, TableIter, WriteTxn};
pub use watch::{WatchChannel, WatchSet};

use crate::error::PlanedbError;
use crate::memdb::table::Table;
use crate::memdb::watch::WatchRegistry;
use parking_lot::Mutex;
use std::sync::Arc;

/// The versioned database state: every commit publishes a fresh root; old
/// roots stay alive for as long as a reader or snapshot references them.
#[derive(Clone)]
pub(crate) struct DbRoot<R> {
    tables: im::HashMap<&'static str, Table<R>>,
}

impl<R: Clone> DbRoot<R> {
    pub(crate) fn table(&self, name: &'static str) -> &Table<R> {
        // Tables are created for every schema entry at construction and
        // never removed; callers resolve the name against the schema first.
        self.tables
            .get(name)
            .expect("table exists for every schema entry")
    }

    pub(crate) fn table_mut(&mut self, name: &'static str) -> &mut Table<R> {
        self.tables
            .get_mut(name)
            .expect("table exists for every schema entry")
    }
}

pub struct MemDb<R> {
    pub(crate) schema: Arc<Schema<R>>,
    pub(crate) root: Mutex<Arc<DbRoot<R>>>,
    writer: Mutex<()>,
    pub(crate) watches: Arc<WatchRegistry>,
}

impl<R: Clone> MemDb<R> {
    pub fn new(schema: Schema<R>) -> Result<Self, PlanedbError> {
        schema.validate()?;
        let mut tables = im::HashMap::new();
        for table in &schema.tables {
            tables.insert(table.name, Table::new(table));
        }
        Ok(Self {
            schema: Arc::new(schema),
            root: Mutex::new(Arc::new(DbRoot { tables })),
            writer: Mutex::new(()),
            watches: Arc::new(WatchRegistry::default()),
        })
    }

    /// Lock-free consistent read view.
    pub fn read(&self) -> ReadTxn<'_, R> {
        ReadTxn::new(self)
    }

    /// Acquire the writer permit. One writer at a time; readers are never
    /// blocked and observe the pre-commit root until `commit`.
    pub fn write(&self) -> WriteTxn<'_, R> {
        let permit = self.writer.lock();
        WriteTxn::new(self, permit)
    }

    /// O(1) point-in-time copy: shares the frozen root, carries its own
    /// writer permit and watch registry. Writes to either database are
    /// invisible to the other.
    pub fn snapshot(&self) -> MemDb<R> {
        MemDb {
            schema: Arc::clone(&self.schema),
            root: Mutex::new(self.current_root()),
            writer: Mutex::new(()),
            watches: Arc::new(WatchRegistry::default()),
        }
    }

    pub(crate) fn current_root(&self) -> Arc<DbRoot<R>> {
        Arc::clone(&self.root.lock())
    }
}
