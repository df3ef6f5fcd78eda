use crate::error::PlanedbError;
use crate::memdb::encoded_key::EncodedKey;
use crate::memdb::schema::{Schema, TableSchema};
use crate::memdb::watch::WatchChannel;
use crate::memdb::{DbRoot, MemDb};
use std::sync::Arc;

/// Iterator over matched records in index order. The attached watch channel
/// signals when anything in the iterated table changes (a superset of the
/// iterated range, which the watch contract permits).
pub struct TableIter<R> {
    items: std::vec::IntoIter<R>,
    watch: WatchChannel,
}

impl<R> TableIter<R> {
    pub fn watch_channel(&self) -> WatchChannel {
        self.watch.clone()
    }
}

impl<R> Iterator for TableIter<R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        self.items.next()
    }
}

/// `index` may carry the `_prefix` suffix, selecting a byte-prefix scan over
/// the base index.
fn split_index(index: &str) -> (&str, bool) {
    match index.strip_suffix("_prefix") {
        Some(base) => (base, true),
        None => (index, false),
    }
}

fn resolve<'s, R>(
    schema: &'s Schema<R>,
    table: &str,
) -> Result<&'s TableSchema<R>, PlanedbError> {
    schema
        .tables
        .iter()
        .find(|t| t.name == table)
        .ok_or_else(|| PlanedbError::UnknownTable(table.to_string()))
}

fn resolved_index_name<R>(
    table_schema: &TableSchema<R>,
    base: &str,
) -> Result<&'static str, PlanedbError> {
    if base == "id" {
        return Ok("id");
    }
    table_schema
        .indexes
        .iter()
        .find(|i| i.name == base)
        .map(|i| i.name)
        .ok_or_else(|| PlanedbError::UnknownIndex {
            table: table_schema.name.to_string(),
            index: base.to_string(),
        })
}

fn lookup_first<R: Clone>(
    schema: &Schema<R>,
    root: &DbRoot<R>,
    table: &str,
    index: &str,
    key: &EncodedKey,
) -> Result<Option<R>, PlanedbError> {
    let table_schema = resolve(schema, table)?;
    let (base, prefix) = split_index(index);
    let data = root.table(table_schema.name);
    let pks = data.matching_pks(table_schema, base, Some(key), prefix)?;
    Ok(pks.first().and_then(|pk| data.get_row(pk)).cloned())
}

fn lookup_all<R: Clone>(
    schema: &Schema<R>,
    root: &DbRoot<R>,
    table: &str,
    index: &str,
    key: Option<&EncodedKey>,
) -> Result<Vec<R>, PlanedbError> {
    let table_schema = resolve(schema, table)?;
    let (base, prefix) = split_index(index);
    let data = root.table(table_schema.name);
    let pks = data.matching_pks(table_schema, base, key, prefix)?;
    Ok(pks
        .iter()
        .filter_map(|pk| data.get_row(pk))
        .cloned()
        .collect())
}

/// A stable read view. Concurrent writers are invisible; obtain a fresh
/// transaction to observe later commits.
pub struct ReadTxn<'db, R> {
    db: &'db MemDb<R>,
    root: Arc<DbRoot<R>>,
}

impl<'db, R: Clone> ReadTxn<'db, R> {
    pub(crate) fn new(db: &'db MemDb<R>) -> Self {
        let root = db.current_root();
        Self { db, root }
    }

    pub fn first(
        &self,
        table: &str,
        index: &str,
        key: &EncodedKey,
    ) -> Result<Option<R>, PlanedbError> {
        lookup_first(&self.db.schema, &self.root, table, index, key)
    }

    /// Point lookup plus a watch channel that signals when a future commit
    /// adds, removes, or rewrites a record under the looked-up index key.
    pub fn first_watch(
        &self,
        table: &str,
        index: &str,
        key: &EncodedKey,
    ) -> Result<(WatchChannel, Option<R>), PlanedbError> {
        let table_schema = resolve(&self.db.schema, table)?;
        let (base, prefix) = split_index(index);
        let index_name = resolved_index_name(table_schema, base)?;
        let record = lookup_first(&self.db.schema, &self.root, table, index, key)?;
        let channel = if prefix {
            self.db.watches.table_channel(table_schema.name)
        } else {
            self.db
                .watches
                .key_channel(table_schema.name, index_name, key.clone())
        };
        Ok((channel, record))
    }

    pub fn get(
        &self,
        table: &str,
        index: &str,
        key: &EncodedKey,
    ) -> Result<TableIter<R>, PlanedbError> {
        let name = resolve(&self.db.schema, table)?.name;
        let items = lookup_all(&self.db.schema, &self.root, table, index, Some(key))?;
        Ok(TableIter {
            items: items.into_iter(),
            watch: self.db.watches.table_channel(name),
        })
    }

    pub fn get_all(&self, table: &str, index: &str) -> Result<TableIter<R>, PlanedbError> {
        let name = resolve(&self.db.schema, table)?.name;
        let items = lookup_all(&self.db.schema, &self.root, table, index, None)?;
        Ok(TableIter {
            items: items.into_iter(),
            watch: self.db.watches.table_channel(name),
        })
    }
}

/// The single write transaction. Reads observe the transaction's own
/// uncommitted mutations. Dropping without `commit` discards everything.
pub struct WriteTxn<'db, R> {
    db: &'db MemDb<R>,
    _permit: parking_lot::MutexGuard<'db, ()>,
    root: DbRoot<R>,
    watch_keys: Vec<(&'static str, &'static str, EncodedKey)>,
    touched: Vec<&'static str>,
}

impl<'db, R: Clone> WriteTxn<'db, R> {
    pub(crate) fn new(db: &'db MemDb<R>, permit: parking_lot::MutexGuard<'db, ()>) -> Self {
        let root = (*db.current_root()).clone();
        Self {
            db,
            _permit: permit,
            root,
            watch_keys: Vec::new(),
            touched: Vec::new(),
        }
    }

    pub fn first(
        &self,
        table: &str,
        index: &str,
        key: &EncodedKey,
    ) -> Result<Option<R>, PlanedbError> {
        lookup_first(&self.db.schema, &self.root, table, index, key)
    }

    pub fn get(
        &self,
        table: &str,
        index: &str,
        key: &EncodedKey,
    ) -> Result<TableIter<R>, PlanedbError> {
        let items = lookup_all(&self.db.schema, &self.root, table, index, Some(key))?;
        Ok(TableIter {
            items: items.into_iter(),
            watch: WatchChannel::new(),
        })
    }

    pub fn get_all(&self, table: &str, index: &str) -> Result<TableIter<R>, PlanedbError> {
        let items = lookup_all(&self.db.schema, &self.root, table, index, None)?;
        Ok(TableIter {
            items: items.into_iter(),
            watch: WatchChannel::new(),
        })
    }

    /// Upsert by primary key, updating every index.
    pub fn insert(&mut self, table: &str, record: R) -> Result<(), PlanedbError> {
        let table_schema = resolve(&self.db.schema, table)?;
        let name = table_schema.name;
        let change = self.root.table_mut(name).insert(table_schema, record)?;
        let data = self.root.table(name);
        let new = data.get_row(&change.pk).cloned();
        self.record_change(table_schema, change.old.as_ref());
        self.record_change(table_schema, new.as_ref());
        self.mark_touched(name);
        Ok(())
    }

    /// Delete by the primary-key identity of the passed record.
    pub fn delete(&mut self, table: &str, record: &R) -> Result<(), PlanedbError> {
        let table_schema = resolve(&self.db.schema, table)?;
        let name = table_schema.name;
        let (_, stored) = self.root.table_mut(name).delete(table_schema, record)?;
        self.record_change(table_schema, Some(&stored));
        self.mark_touched(name);
        Ok(())
    }

    /// Delete every record matching the index lookup. Returns the count.
    pub fn delete_all(
        &mut self,
        table: &str,
        index: &str,
        key: &EncodedKey,
    ) -> Result<usize, PlanedbError> {
        let matches = lookup_all(&self.db.schema, &self.root, table, index, Some(key))?;
        for record in &matches {
            self.delete(table, record)?;
        }
        Ok(matches.len())
    }

    /// Publish atomically, then fire the watch channels invalidated by this
    /// transaction's changes.
    pub fn commit(self) {
        {
            let mut root = self.db.root.lock();
            *root = Arc::new(self.root);
        }
        self.db.watches.fire(&self.watch_keys, self.touched);
    }

    fn record_change(&mut self, table_schema: &TableSchema<R>, record: Option<&R>) {
        let Some(record) = record else {
            return;
        };
        for index in &table_schema.indexes {
            if let Some(key) = (index.keyer)(record) {
                self.watch_keys.push((table_schema.name, index.name, key));
            }
        }
    }

    fn mark_touched(&mut self, table: &'static str) {
        if !self.touched.contains(&table) {
            self.touched.push(table);
        }
    }
}
