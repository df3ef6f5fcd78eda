use crate::error::PlanedbError;
use crate::memdb::WatchSet;
use crate::models::{Node, NodeStatus};
use crate::store::schema::{StateRecord, TABLE_NODES, id_key, id_prefix_key};
use crate::store::{StateStore, write_index};
use std::sync::Arc;

impl StateStore {
    /// Register a node or update its definition. Registration is
    /// client-driven, so the scheduler-authored `drain` flag of an existing
    /// node is carried over.
    pub fn upsert_node(&self, index: u64, mut node: Node) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        let existing = txn
            .first(TABLE_NODES, "id", &id_key(&node.id))?
            .and_then(StateRecord::into_node);
        if let Some(existing) = existing {
            node.create_index = existing.create_index;
            node.modify_index = index;
            node.drain = existing.drain;
        } else {
            node.create_index = index;
            node.modify_index = index;
        }

        txn.insert(TABLE_NODES, StateRecord::Node(Arc::new(node)))?;
        write_index(&mut txn, TABLE_NODES, index)?;

        txn.commit();
        Ok(())
    }

    /// Deregister a node. Fails when the node is unknown.
    pub fn delete_node(&self, index: u64, node_id: &str) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        let existing = txn.first(TABLE_NODES, "id", &id_key(node_id))?.ok_or_else(|| {
            PlanedbError::NotFound {
                entity: "node",
                id: node_id.to_string(),
            }
        })?;

        txn.delete(TABLE_NODES, &existing)?;
        write_index(&mut txn, TABLE_NODES, index)?;

        txn.commit();
        Ok(())
    }

    /// Copy-on-write status update. Fails when the node is unknown.
    pub fn update_node_status(
        &self,
        index: u64,
        node_id: &str,
        status: NodeStatus,
    ) -> Result<(), PlanedbError> {
        let mut txn = self.db.write();

        let existing = txn
            .first(TABLE_NODES, "id", &id_key(node_id))?
            .and_then(StateRecord::into_node)
            .ok_or_else(|| PlanedbError::NotFound {
                entity: "node",
                id: node_id.to_string(),
            })?;

        let mut updated = (*existing).clone();
        updated.status = status;
        updated.modify_index = index;

        txn.insert(TABLE_NODES, StateRecord::Node(Arc::new(updated)))?;
        write_index(&mut txn, TABLE_NODES, index)?;

        txn.commit();
        Ok(())
    }

    pub fn node_by_id(
        &self,
        ws: &mut WatchSet,
        node_id: &str,
    ) -> Result<Option<Arc<Node>>, PlanedbError> {
        let txn = self.db.read();
        let (watch, existing) = txn.first_watch(TABLE_NODES, "id", &id_key(node_id))?;
        ws.add(watch);
        Ok(existing.and_then(StateRecord::into_node))
    }

    pub fn nodes_by_id_prefix(
        &self,
        ws: &mut WatchSet,
        prefix: &str,
    ) -> Result<Vec<Arc<Node>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get(TABLE_NODES, "id_prefix", &id_prefix_key(prefix))?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_node).collect())
    }

    pub fn nodes(&self, ws: &mut WatchSet) -> Result<Vec<Arc<Node>>, PlanedbError> {
        let txn = self.db.read();
        let iter = txn.get_all(TABLE_NODES, "id")?;
        ws.add(iter.watch_channel());
        Ok(iter.filter_map(StateRecord::into_node).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node {
            id: id.into(),
            datacenter: "dc1".into(),
            status: NodeStatus::Init,
            ..Node::default()
        }
    }

    #[test]
    fn upsert_assigns_and_preserves_indices() {
        let store = StateStore::new().expect("store");
        let mut ws = WatchSet::new();

        store.upsert_node(5, node("n1")).expect("upsert");
        let stored = store.node_by_id(&mut ws, "n1").expect("read").expect("node");
        assert_eq!(stored.create_index, 5);
        assert_eq!(stored.modify_index, 5);

        store.upsert_node(9, node("n1")).expect("upsert");
        let stored = store.node_by_id(&mut ws, "n1").expect("read").expect("node");
        assert_eq!(stored.create_index, 5);
        assert_eq!(stored.modify_index, 9);
        assert_eq!(store.index("nodes").expect("index"), 9);
    }

    #[test]
    fn upsert_preserves_scheduler_drain() {
        let store = StateStore::new().expect("store");
        let mut ws = WatchSet::new();

        let mut drained = node("n1");
        drained.drain = true;
        store.upsert_node(5, drained).expect("upsert");

        // Client re-registration never carries drain.
        store.upsert_node(6, node("n1")).expect("upsert");
        let stored = store.node_by_id(&mut ws, "n1").expect("read").expect("node");
        assert!(stored.drain);
    }

    #[test]
    fn delete_and_status_update_require_existence() {
        let store = StateStore::new().expect("store");
        let mut ws = WatchSet::new();

        let err = store.delete_node(2, "ghost").expect_err("missing");
        assert_eq!(err.code_str(), "not_found");
        let err = store
            .update_node_status(2, "ghost", NodeStatus::Ready)
            .expect_err("missing");
        assert_eq!(err.code_str(), "not_found");

        store.upsert_node(5, node("n1")).expect("upsert");
        store.update_node_status(6, "n1", NodeStatus::Ready).expect("status");
        let stored = store.node_by_id(&mut ws, "n1").expect("read").expect("node");
        assert_eq!(stored.status, NodeStatus::Ready);
        assert_eq!(stored.modify_index, 6);

        store.delete_node(7, "n1").expect("delete");
        assert!(store.node_by_id(&mut ws, "n1").expect("read").is_none());
        assert_eq!(store.index("nodes").expect("index"), 7);
    }

    #[test]
    fn prefix_reads_scan_in_id_order() {
        let store = StateStore::new().expect("store");
        let mut ws = WatchSet::new();
        for (i, id) in ["web-2", "web-1", "db-1"].iter().enumerate() {
            store.upsert_node(i as u64 + 1, node(id)).expect("upsert");
        }

        let web: Vec<String> = store
            .nodes_by_id_prefix(&mut ws, "web")
            .expect("prefix")
            .iter()
            .map(|n| n.id.clone())
            .collect();
        assert_eq!(web, vec!["web-1", "web-2"]);
        assert_eq!(store.nodes(&mut ws).expect("all").len(), 3);
    }
}
