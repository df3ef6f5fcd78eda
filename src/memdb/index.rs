use crate::memdb::encoded_key::{EncodedKey, prefix_successor};
use im::{OrdMap, OrdSet};
use std::ops::Bound;

/// Secondary index storage: an ordered persistent map from encoded index key
/// to the primary keys carrying it. Unique indexes map each key to exactly
/// one primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStore {
    Multi(OrdMap<EncodedKey, OrdSet<EncodedKey>>),
    Unique(OrdMap<EncodedKey, EncodedKey>),
}

impl IndexStore {
    pub fn new(unique: bool) -> Self {
        if unique {
            IndexStore::Unique(OrdMap::new())
        } else {
            IndexStore::Multi(OrdMap::new())
        }
    }

    pub fn insert(&mut self, key: EncodedKey, pk: EncodedKey) {
        match self {
            IndexStore::Multi(entries) => {
                let mut pks = entries.get(&key).cloned().unwrap_or_default();
                pks.insert(pk);
                entries.insert(key, pks);
            }
            IndexStore::Unique(entries) => {
                entries.insert(key, pk);
            }
        }
    }

    pub fn remove(&mut self, key: &EncodedKey, pk: &EncodedKey) {
        match self {
            IndexStore::Multi(entries) => {
                let Some(mut pks) = entries.get(key).cloned() else {
                    return;
                };
                pks.remove(pk);
                if pks.is_empty() {
                    entries.remove(key);
                } else {
                    entries.insert(key.clone(), pks);
                }
            }
            IndexStore::Unique(entries) => {
                if entries.get(key) == Some(pk) {
                    entries.remove(key);
                }
            }
        }
    }

    /// The primary key holding `key` in a unique index, if any.
    pub fn unique_existing(&self, key: &EncodedKey) -> Option<&EncodedKey> {
        match self {
            IndexStore::Unique(entries) => entries.get(key),
            IndexStore::Multi(_) => None,
        }
    }

    pub fn scan_eq(&self, key: &EncodedKey) -> Vec<EncodedKey> {
        match self {
            IndexStore::Multi(entries) => entries
                .get(key)
                .map(|pks| pks.iter().cloned().collect())
                .unwrap_or_default(),
            IndexStore::Unique(entries) => {
                entries.get(key).map(|pk| vec![pk.clone()]).unwrap_or_default()
            }
        }
    }

    pub fn scan_prefix(&self, prefix: &EncodedKey) -> Vec<EncodedKey> {
        let end = match prefix_successor(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        let range = (Bound::Included(prefix.clone()), end);
        match self {
            IndexStore::Multi(entries) => entries
                .range(range)
                .flat_map(|(_, pks)| pks.iter().cloned())
                .collect(),
            IndexStore::Unique(entries) => {
                entries.range(range).map(|(_, pk)| pk.clone()).collect()
            }
        }
    }

    pub fn scan_all(&self) -> Vec<EncodedKey> {
        match self {
            IndexStore::Multi(entries) => entries
                .iter()
                .flat_map(|(_, pks)| pks.iter().cloned())
                .collect(),
            IndexStore::Unique(entries) => entries.iter().map(|(_, pk)| pk.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IndexStore;
    use crate::memdb::encoded_key::KeyBuilder;

    fn key(s: &str) -> crate::memdb::encoded_key::EncodedKey {
        KeyBuilder::new().push_str(s).finish()
    }

    #[test]
    fn multi_index_insert_remove_and_scan() {
        let mut idx = IndexStore::new(false);
        idx.insert(key("j1"), key("a1"));
        idx.insert(key("j1"), key("a2"));
        idx.insert(key("j2"), key("a3"));

        let mut hits = idx.scan_eq(&key("j1"));
        hits.sort();
        assert_eq!(hits, vec![key("a1"), key("a2")]);

        idx.remove(&key("j1"), &key("a1"));
        assert_eq!(idx.scan_eq(&key("j1")), vec![key("a2")]);

        idx.remove(&key("j1"), &key("a2"));
        assert!(idx.scan_eq(&key("j1")).is_empty());
        assert_eq!(idx.scan_all().len(), 1);
    }

    #[test]
    fn unique_index_replaces_and_reports_holder() {
        let mut idx = IndexStore::new(true);
        idx.insert(key("t"), key("job-a"));
        assert_eq!(idx.unique_existing(&key("t")), Some(&key("job-a")));

        idx.insert(key("t"), key("job-b"));
        assert_eq!(idx.scan_eq(&key("t")), vec![key("job-b")]);

        // Removing with a stale primary key is a no-op.
        idx.remove(&key("t"), &key("job-a"));
        assert_eq!(idx.unique_existing(&key("t")), Some(&key("job-b")));
    }

    #[test]
    fn prefix_scan_returns_index_order() {
        let mut idx = IndexStore::new(false);
        idx.insert(key("node-2"), key("a2"));
        idx.insert(key("node-1"), key("a1"));
        idx.insert(key("other"), key("a3"));

        let prefix = KeyBuilder::new().finish_str_prefix("node-");
        assert_eq!(idx.scan_prefix(&prefix), vec![key("a1"), key("a2")]);
    }
}
