//! Node store contract and the record-engine adapter
//!
//! The list algorithms speak only the [`NodeStore`] contract; any engine
//! offering atomic multi-write transactions, point lookup by primary key
//! and an equality index on each link field can implement it. Transaction
//! scoping is a pair of RAII guard handles: a read handle cannot issue
//! writes at all, and a write handle that is dropped without `commit`
//! rolls back.

use crate::error::{LedgerError, LedgerResult};
use crate::list::node::{LinkedRecord, NodeKey};
use crate::storage::{ReadTransaction, RecordEngine, StoredRecord, WriteTransaction};
use std::marker::PhantomData;
use std::sync::Arc;

/// Secondary-index field holding each record's predecessor key
pub const PREV_LINK_FIELD: &str = "prev_node_key";
/// Secondary-index field holding each record's successor key
pub const NEXT_LINK_FIELD: &str = "next_node_key";

/// Read operations available inside any node-store transaction
pub trait NodeReadTxn<N: LinkedRecord> {
    /// Node by key; `None` for the sentinel and for absent keys
    fn get(&self, key: NodeKey) -> LedgerResult<Option<N>>;

    /// Node by key, `NotFound` when it does not resolve
    fn require(&self, key: NodeKey) -> LedgerResult<N> {
        self.get(key)?.ok_or(LedgerError::NotFound(key))
    }

    /// Key of the node whose predecessor is the sentinel, or the sentinel
    /// itself when the store is empty. Index probe, not a scan.
    fn first_node_key(&self) -> LedgerResult<NodeKey>;

    /// Key of the node whose successor is the sentinel, or the sentinel
    /// itself when the store is empty. Index probe, not a scan.
    fn last_node_key(&self) -> LedgerResult<NodeKey>;

    /// Number of nodes in the store
    fn len(&self) -> LedgerResult<usize>;

    /// Visit every node in store-native order, not list order
    fn for_each(
        &self,
        callback: &mut dyn FnMut(NodeKey, N) -> LedgerResult<()>,
    ) -> LedgerResult<()>;
}

/// Write operations; only available on a read-write transaction
pub trait NodeWriteTxn<N: LinkedRecord>: NodeReadTxn<N> {
    /// Persist a new node and return its assigned key
    fn create(&mut self, node: &N) -> LedgerResult<NodeKey>;

    /// Replace the node stored under `key`
    fn update(&mut self, key: NodeKey, node: &N) -> LedgerResult<()>;

    /// Discard the record stored under `key`
    fn remove(&mut self, key: NodeKey) -> LedgerResult<()>;

    /// Commit every write issued through this handle atomically
    fn commit(self) -> LedgerResult<()>
    where
        Self: Sized;
}

/// Binding of one record store (plus the two link indexes) to the list
/// abstraction, implemented once per concrete engine.
pub trait NodeStore<N: LinkedRecord> {
    type Read<'a>: NodeReadTxn<N>
    where
        Self: 'a;
    type Write<'a>: NodeWriteTxn<N>
    where
        Self: 'a;

    /// The reserved key value meaning "no such neighbor", fixed for the
    /// adapter's lifetime
    fn nullish_key(&self) -> NodeKey {
        NodeKey::NULLISH
    }

    fn begin_read(&self) -> LedgerResult<Self::Read<'_>>;

    fn begin_write(&self) -> LedgerResult<Self::Write<'_>>;
}

/// Node store over one [`RecordEngine`] store with secondary indexes on
/// both link fields. Holds nothing beyond the engine handle and the store
/// name.
pub struct EngineNodeStore<N> {
    engine: Arc<RecordEngine>,
    store: String,
    _record: PhantomData<fn() -> N>,
}

impl<N: LinkedRecord> EngineNodeStore<N> {
    /// Bind to `store`, creating it with the two link indexes on first use
    pub fn attach(engine: Arc<RecordEngine>, store: &str) -> LedgerResult<Self> {
        engine.create_store(store, &[PREV_LINK_FIELD, NEXT_LINK_FIELD])?;

        Ok(Self {
            engine,
            store: store.to_string(),
            _record: PhantomData,
        })
    }

    /// Name of the bound record store
    pub fn store_name(&self) -> &str {
        &self.store
    }
}

fn encode_node<N: LinkedRecord>(node: &N) -> LedgerResult<StoredRecord> {
    let data = bincode::serialize(node)
        .map_err(|e| LedgerError::Serialization(format!("Failed to serialize node: {}", e)))?;

    Ok(StoredRecord {
        data,
        indexed: vec![
            (PREV_LINK_FIELD.to_string(), node.prev_key().0),
            (NEXT_LINK_FIELD.to_string(), node.next_key().0),
        ],
    })
}

fn decode_node<N: LinkedRecord>(record: &StoredRecord) -> LedgerResult<N> {
    bincode::deserialize(&record.data)
        .map_err(|e| LedgerError::Serialization(format!("Failed to deserialize node: {}", e)))
}

impl<N: LinkedRecord> NodeStore<N> for EngineNodeStore<N> {
    type Read<'a>
        = EngineReadTxn<'a, N>
    where
        Self: 'a;
    type Write<'a>
        = EngineWriteTxn<'a, N>
    where
        Self: 'a;

    fn begin_read(&self) -> LedgerResult<EngineReadTxn<'_, N>> {
        Ok(EngineReadTxn {
            txn: self.engine.begin_read(),
            store: &self.store,
            _record: PhantomData,
        })
    }

    fn begin_write(&self) -> LedgerResult<EngineWriteTxn<'_, N>> {
        Ok(EngineWriteTxn {
            txn: self.engine.begin_write()?,
            store: &self.store,
            _record: PhantomData,
        })
    }
}

/// Read transaction scoped to the adapter's store
pub struct EngineReadTxn<'a, N> {
    txn: ReadTransaction<'a>,
    store: &'a str,
    _record: PhantomData<fn() -> N>,
}

impl<N: LinkedRecord> NodeReadTxn<N> for EngineReadTxn<'_, N> {
    fn get(&self, key: NodeKey) -> LedgerResult<Option<N>> {
        if key.is_nullish() {
            return Ok(None);
        }

        match self.txn.get(self.store, key.0)? {
            Some(record) => Ok(Some(decode_node(record)?)),
            None => Ok(None),
        }
    }

    fn first_node_key(&self) -> LedgerResult<NodeKey> {
        let key = self
            .txn
            .lookup_index(self.store, PREV_LINK_FIELD, NodeKey::NULLISH.0)?;
        Ok(key.map(NodeKey).unwrap_or(NodeKey::NULLISH))
    }

    fn last_node_key(&self) -> LedgerResult<NodeKey> {
        let key = self
            .txn
            .lookup_index(self.store, NEXT_LINK_FIELD, NodeKey::NULLISH.0)?;
        Ok(key.map(NodeKey).unwrap_or(NodeKey::NULLISH))
    }

    fn len(&self) -> LedgerResult<usize> {
        self.txn.len(self.store)
    }

    fn for_each(
        &self,
        callback: &mut dyn FnMut(NodeKey, N) -> LedgerResult<()>,
    ) -> LedgerResult<()> {
        self.txn.scan(self.store, |key, record| {
            callback(NodeKey(key), decode_node(record)?)?;
            Ok(true)
        })
    }
}

/// Write transaction scoped to the adapter's store
pub struct EngineWriteTxn<'a, N> {
    txn: WriteTransaction<'a>,
    store: &'a str,
    _record: PhantomData<fn() -> N>,
}

impl<N: LinkedRecord> NodeReadTxn<N> for EngineWriteTxn<'_, N> {
    fn get(&self, key: NodeKey) -> LedgerResult<Option<N>> {
        if key.is_nullish() {
            return Ok(None);
        }

        match self.txn.get(self.store, key.0)? {
            Some(record) => Ok(Some(decode_node(record)?)),
            None => Ok(None),
        }
    }

    fn first_node_key(&self) -> LedgerResult<NodeKey> {
        let key = self
            .txn
            .lookup_index(self.store, PREV_LINK_FIELD, NodeKey::NULLISH.0)?;
        Ok(key.map(NodeKey).unwrap_or(NodeKey::NULLISH))
    }

    fn last_node_key(&self) -> LedgerResult<NodeKey> {
        let key = self
            .txn
            .lookup_index(self.store, NEXT_LINK_FIELD, NodeKey::NULLISH.0)?;
        Ok(key.map(NodeKey).unwrap_or(NodeKey::NULLISH))
    }

    fn len(&self) -> LedgerResult<usize> {
        self.txn.len(self.store)
    }

    fn for_each(
        &self,
        callback: &mut dyn FnMut(NodeKey, N) -> LedgerResult<()>,
    ) -> LedgerResult<()> {
        self.txn.scan(self.store, |key, record| {
            callback(NodeKey(key), decode_node(record)?)?;
            Ok(true)
        })
    }
}

impl<N: LinkedRecord> NodeWriteTxn<N> for EngineWriteTxn<'_, N> {
    fn create(&mut self, node: &N) -> LedgerResult<NodeKey> {
        let key = self.txn.insert(self.store, encode_node(node)?)?;
        Ok(NodeKey(key))
    }

    fn update(&mut self, key: NodeKey, node: &N) -> LedgerResult<()> {
        self.txn.update(self.store, key.0, encode_node(node)?)
    }

    fn remove(&mut self, key: NodeKey) -> LedgerResult<()> {
        self.txn.delete(self.store, key.0)
    }

    fn commit(self) -> LedgerResult<()> {
        self.txn.commit()
    }
}
