//! Doubly linked list operations over a node store
//!
//! Every public operation opens exactly one transaction through the
//! adapter, performs a bounded number of node reads and writes inside it,
//! and returns once the engine confirms commit. A failure at any point
//! aborts the whole transaction, so a partially relinked chain is never
//! observable.

use crate::error::{LedgerError, LedgerResult};
use crate::list::node::{Direction, LinkedRecord, NodeKey};
use crate::list::store::{NodeReadTxn, NodeStore, NodeWriteTxn};
use std::marker::PhantomData;

/// List-level operations, generic over any record carrying the two link
/// fields. The repository holds no engine connection; the adapter is
/// passed per call.
pub struct ListRepository<N: LinkedRecord> {
    _record: PhantomData<fn() -> N>,
}

impl<N: LinkedRecord> Default for ListRepository<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: LinkedRecord> ListRepository<N> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }

    /// Retrieve the whole collection in list order as a key/node snapshot,
    /// consistent as of a single read transaction. An empty list yields an
    /// empty Vec, never an error.
    pub fn get_all<S: NodeStore<N>>(
        &self,
        store: &S,
        direction: Direction,
    ) -> LedgerResult<Vec<(NodeKey, N)>> {
        let txn = store.begin_read()?;
        let limit = txn.len()?;
        let mut nodes = Vec::with_capacity(limit);

        let mut key = match direction {
            Direction::Ascending => txn.first_node_key()?,
            Direction::Descending => txn.last_node_key()?,
        };

        while !key.is_nullish() {
            if nodes.len() >= limit {
                return Err(LedgerError::Storage(format!(
                    "Chain longer than store ({} nodes), links are corrupt",
                    limit
                )));
            }

            let node = txn.require(key)?;
            let next = match direction {
                Direction::Ascending => node.next_key(),
                Direction::Descending => node.prev_key(),
            };

            nodes.push((key, node));
            key = next;
        }

        Ok(nodes)
    }

    /// Append a node at the tail and return its assigned key
    pub fn add_to_end<S: NodeStore<N>>(&self, store: &S, node: N) -> LedgerResult<NodeKey> {
        let mut txn = store.begin_write()?;
        let key = self.add_to_end_in(&mut txn, node)?;
        txn.commit()?;

        tracing::debug!("appended node {}", key);
        Ok(key)
    }

    /// Append when no key is given; otherwise overwrite the payload of the
    /// node stored under `key` in place. An update never repositions a
    /// node — the stored link fields win over whatever the caller passed.
    pub fn put<S: NodeStore<N>>(
        &self,
        store: &S,
        node: N,
        key: Option<NodeKey>,
    ) -> LedgerResult<NodeKey> {
        let Some(key) = key else {
            return self.add_to_end(store, node);
        };

        let mut txn = store.begin_write()?;
        let current = txn.require(key)?;

        let mut node = node;
        node.set_prev_key(current.prev_key());
        node.set_next_key(current.next_key());
        txn.update(key, &node)?;
        txn.commit()?;

        Ok(key)
    }

    /// Delete a node, splicing its former neighbors together
    pub fn delete<S: NodeStore<N>>(&self, store: &S, key: NodeKey) -> LedgerResult<()> {
        let mut txn = store.begin_write()?;
        self.exclude_and_glue_neighbors(&mut txn, key)?;
        txn.remove(key)?;
        txn.commit()?;

        tracing::debug!("deleted node {}", key);
        Ok(())
    }

    /// Move a node one position toward the head; no-op on the head itself
    pub fn move_up<S: NodeStore<N>>(&self, store: &S, key: NodeKey) -> LedgerResult<()> {
        let mut txn = store.begin_write()?;
        let node = txn.require(key)?;

        // Moving the predecessor after this node is the same single step
        if !node.prev_key().is_nullish() {
            self.place_after_in(&mut txn, node.prev_key(), key)?;
        }

        txn.commit()
    }

    /// Move a node one position toward the tail; no-op on the tail itself
    pub fn move_down<S: NodeStore<N>>(&self, store: &S, key: NodeKey) -> LedgerResult<()> {
        let mut txn = store.begin_write()?;
        let node = txn.require(key)?;

        if !node.next_key().is_nullish() {
            self.place_after_in(&mut txn, key, node.next_key())?;
        }

        txn.commit()
    }

    /// Relocate `node_key` so it immediately follows `target_key`, in O(1)
    /// node touches regardless of list length
    pub fn place_after<S: NodeStore<N>>(
        &self,
        store: &S,
        node_key: NodeKey,
        target_key: NodeKey,
    ) -> LedgerResult<()> {
        let mut txn = store.begin_write()?;
        self.place_after_in(&mut txn, node_key, target_key)?;
        txn.commit()
    }

    /// Relocate `node_key` so it immediately precedes `target_key`.
    ///
    /// Defined as two `place_after` steps: first `node_key` is placed
    /// after `target_key`, then `target_key` is placed after `node_key`,
    /// swapping the pair's relative order.
    pub fn place_before<S: NodeStore<N>>(
        &self,
        store: &S,
        node_key: NodeKey,
        target_key: NodeKey,
    ) -> LedgerResult<()> {
        let mut txn = store.begin_write()?;
        self.place_after_in(&mut txn, node_key, target_key)?;
        self.place_after_in(&mut txn, target_key, node_key)?;
        txn.commit()
    }

    /// Chain every record into a list following store-native enumeration
    /// order. For upgrading a store whose records predate ordering; runs
    /// inside the caller's upgrade transaction and must be invoked exactly
    /// once per store — on an already linked store it would re-derive the
    /// order from store enumeration instead of preserving the chain.
    pub fn link_nodes_in_store_order<T: NodeWriteTxn<N>>(&self, txn: &mut T) -> LedgerResult<()> {
        let mut keys = Vec::new();
        txn.for_each(&mut |key, _| {
            keys.push(key);
            Ok(())
        })?;

        let mut prev = NodeKey::NULLISH;
        for (position, &key) in keys.iter().enumerate() {
            let mut node = txn.require(key)?;
            node.set_prev_key(prev);
            node.set_next_key(keys.get(position + 1).copied().unwrap_or(NodeKey::NULLISH));
            txn.update(key, &node)?;
            prev = key;
        }

        tracing::debug!("linked {} node(s) in store order", keys.len());
        Ok(())
    }

    /// Append inside an already open transaction
    fn add_to_end_in<T: NodeWriteTxn<N>>(&self, txn: &mut T, mut node: N) -> LedgerResult<NodeKey> {
        // Resolve the tail before creating, so the fresh node (whose own
        // successor is the sentinel) cannot be mistaken for it
        let old_tail = txn.last_node_key()?;

        node.set_prev_key(NodeKey::NULLISH);
        node.set_next_key(NodeKey::NULLISH);
        let key = txn.create(&node)?;

        if !old_tail.is_nullish() {
            self.place_after_in(txn, key, old_tail)?;
        }

        Ok(key)
    }

    /// Logically remove a node from the chain without touching its record:
    /// the neighbors are glued together, the node's own links still
    /// describe its old position. Callers wanting real removal must also
    /// overwrite or delete the node afterwards.
    fn exclude_and_glue_neighbors<T: NodeWriteTxn<N>>(
        &self,
        txn: &mut T,
        key: NodeKey,
    ) -> LedgerResult<N> {
        let node = txn.require(key)?;
        let (prev, next) = (node.prev_key(), node.next_key());

        // Either neighbor may be the sentinel or gone; glue what exists
        if let Some(mut predecessor) = txn.get(prev)? {
            predecessor.set_next_key(next);
            txn.update(prev, &predecessor)?;
        }
        if let Some(mut successor) = txn.get(next)? {
            successor.set_prev_key(prev);
            txn.update(next, &successor)?;
        }

        Ok(node)
    }

    fn place_after_in<T: NodeWriteTxn<N>>(
        &self,
        txn: &mut T,
        node_key: NodeKey,
        target_key: NodeKey,
    ) -> LedgerResult<()> {
        if node_key == target_key {
            return Ok(());
        }

        // Both keys must resolve before anything is mutated
        let mut node = txn.require(node_key)?;
        txn.require(target_key)?;

        self.exclude_and_glue_neighbors(txn, node_key)?;

        // Splicing may have rewritten the target's links if it was a
        // neighbor of the moving node, so it is re-read here
        let mut target = txn.require(target_key)?;
        let old_next = target.next_key();

        if let Some(mut successor) = txn.get(old_next)? {
            successor.set_prev_key(node_key);
            txn.update(old_next, &successor)?;
        }

        node.set_prev_key(target_key);
        node.set_next_key(old_next);
        txn.update(node_key, &node)?;

        target.set_next_key(node_key);
        txn.update(target_key, &target)?;

        Ok(())
    }
}
