use crate::error::PlanedbError;
use crate::memdb::encoded_key::{EncodedKey, prefix_successor};
use crate::memdb::index::IndexStore;
use crate::memdb::schema::TableSchema;
use std::ops::Bound;

/// One table: a persistent ordered map of rows keyed by primary key plus the
/// secondary index stores declared in the schema. Cloning is cheap (structural
/// sharing), which is what makes whole-database snapshots O(1).
#[derive(Clone)]
pub(crate) struct Table<R> {
    pub(crate) rows: im::OrdMap<EncodedKey, R>,
    indexes: im::HashMap<&'static str, IndexStore>,
}

pub(crate) struct RowChange<R> {
    pub pk: EncodedKey,
    pub old: Option<R>,
}

impl<R: Clone> Table<R> {
    pub(crate) fn new(schema: &TableSchema<R>) -> Self {
        let mut indexes = im::HashMap::new();
        for index in schema.indexes.iter().skip(1) {
            indexes.insert(index.name, IndexStore::new(index.unique));
        }
        Self {
            rows: im::OrdMap::new(),
            indexes,
        }
    }

    fn primary_key(schema: &TableSchema<R>, record: &R) -> Result<EncodedKey, PlanedbError> {
        (schema.indexes[0].keyer)(record).ok_or_else(|| PlanedbError::SchemaViolation {
            table: schema.name.to_string(),
        })
    }

    /// Upsert by primary key, maintaining every secondary index. Returns the
    /// replaced row, if any, so the caller can fire watches for both the old
    /// and the new index keys.
    pub(crate) fn insert(
        &mut self,
        schema: &TableSchema<R>,
        record: R,
    ) -> Result<RowChange<R>, PlanedbError> {
        let pk = Self::primary_key(schema, &record)?;

        for index in schema.indexes.iter().skip(1) {
            if !index.unique {
                continue;
            }
            if let Some(key) = (index.keyer)(&record) {
                if let Some(store) = self.indexes.get(index.name) {
                    if let Some(holder) = store.unique_existing(&key) {
                        if *holder != pk {
                            return Err(PlanedbError::UniqueViolation {
                                table: schema.name.to_string(),
                                index: index.name.to_string(),
                            });
                        }
                    }
                }
            }
        }

        let old = self.rows.insert(pk.clone(), record.clone());
        for index in schema.indexes.iter().skip(1) {
            let Some(store) = self.indexes.get_mut(index.name) else {
                continue;
            };
            if let Some(prev) = old.as_ref().and_then(|o| (index.keyer)(o)) {
                store.remove(&prev, &pk);
            }
            if let Some(key) = (index.keyer)(&record) {
                store.insert(key, pk.clone());
            }
        }
        Ok(RowChange { pk, old })
    }

    /// Delete by the primary-key identity of the passed record. The stored
    /// row, not the argument, drives index maintenance.
    pub(crate) fn delete(
        &mut self,
        schema: &TableSchema<R>,
        record: &R,
    ) -> Result<(EncodedKey, R), PlanedbError> {
        let pk = Self::primary_key(schema, record)?;
        let stored = self
            .rows
            .remove(&pk)
            .ok_or_else(|| PlanedbError::DeleteMissing {
                table: schema.name.to_string(),
            })?;
        for index in schema.indexes.iter().skip(1) {
            let Some(store) = self.indexes.get_mut(index.name) else {
                continue;
            };
            if let Some(key) = (index.keyer)(&stored) {
                store.remove(&key, &pk);
            }
        }
        Ok((pk, stored))
    }

    /// Primary keys matching an index lookup, in index order.
    pub(crate) fn matching_pks(
        &self,
        schema: &TableSchema<R>,
        index: &str,
        key: Option<&EncodedKey>,
        prefix: bool,
    ) -> Result<Vec<EncodedKey>, PlanedbError> {
        if index == "id" {
            return Ok(match (key, prefix) {
                (None, _) => self.rows.keys().cloned().collect(),
                (Some(key), false) => {
                    if self.rows.contains_key(key) {
                        vec![key.clone()]
                    } else {
                        Vec::new()
                    }
                }
                (Some(key), true) => {
                    let end = match prefix_successor(key) {
                        Some(end) => Bound::Excluded(end),
                        None => Bound::Unbounded,
                    };
                    self.rows
                        .range((Bound::Included(key.clone()), end))
                        .map(|(pk, _)| pk.clone())
                        .collect()
                }
            });
        }

        let store = self
            .indexes
            .get(index)
            .ok_or_else(|| PlanedbError::UnknownIndex {
                table: schema.name.to_string(),
                index: index.to_string(),
            })?;
        Ok(match (key, prefix) {
            (None, _) => store.scan_all(),
            (Some(key), false) => store.scan_eq(key),
            (Some(key), true) => store.scan_prefix(key),
        })
    }

    pub(crate) fn get_row(&self, pk: &EncodedKey) -> Option<&R> {
        self.rows.get(pk)
    }
}

#[cfg(test)]
mod tests {
    use super::Table;
    use crate::memdb::encoded_key::{EncodedKey, KeyBuilder};
    use crate::memdb::schema::{IndexSchema, TableSchema};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        group: String,
    }

    fn item_id(item: &Item) -> Option<EncodedKey> {
        Some(KeyBuilder::new().push_str(&item.id).finish())
    }

    fn item_group(item: &Item) -> Option<EncodedKey> {
        Some(KeyBuilder::new().push_str(&item.group).finish())
    }

    fn schema() -> TableSchema<Item> {
        TableSchema {
            name: "items",
            indexes: vec![
                IndexSchema { name: "id", unique: true, keyer: item_id },
                IndexSchema { name: "group", unique: false, keyer: item_group },
            ],
        }
    }

    fn item(id: &str, group: &str) -> Item {
        Item {
            id: id.into(),
            group: group.into(),
        }
    }

    #[test]
    fn upsert_moves_secondary_index_entries() {
        let schema = schema();
        let mut table = Table::new(&schema);

        table.insert(&schema, item("a", "g1")).expect("insert");
        table.insert(&schema, item("b", "g1")).expect("insert");
        let g1 = KeyBuilder::new().push_str("g1").finish();
        assert_eq!(
            table.matching_pks(&schema, "group", Some(&g1), false).expect("scan").len(),
            2
        );

        // Re-inserting "a" under g2 must drop the stale g1 entry.
        let change = table.insert(&schema, item("a", "g2")).expect("upsert");
        assert_eq!(change.old, Some(item("a", "g1")));
        assert_eq!(
            table.matching_pks(&schema, "group", Some(&g1), false).expect("scan").len(),
            1
        );
    }

    #[test]
    fn delete_uses_stored_row_for_index_cleanup() {
        let schema = schema();
        let mut table = Table::new(&schema);
        table.insert(&schema, item("a", "g1")).expect("insert");

        // The caller's copy carries a stale group; cleanup still targets g1.
        let (_, stored) = table.delete(&schema, &item("a", "stale")).expect("delete");
        assert_eq!(stored.group, "g1");
        let g1 = KeyBuilder::new().push_str("g1").finish();
        assert!(table.matching_pks(&schema, "group", Some(&g1), false).expect("scan").is_empty());

        let err = table.delete(&schema, &item("a", "g1")).expect_err("missing");
        assert_eq!(err.code_str(), "delete_missing");
    }

    #[test]
    fn id_prefix_scan_walks_primary_order() {
        let schema = schema();
        let mut table = Table::new(&schema);
        for id in ["n2", "n1", "m1"] {
            table.insert(&schema, item(id, "g")).expect("insert");
        }
        let prefix = KeyBuilder::new().finish_str_prefix("n");
        let pks = table.matching_pks(&schema, "id", Some(&prefix), true).expect("scan");
        assert_eq!(
            pks,
            vec![
                KeyBuilder::new().push_str("n1").finish(),
                KeyBuilder::new().push_str("n2").finish(),
            ]
        );
    }
}
