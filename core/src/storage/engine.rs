//! Record engine coordinating stores, transactions and recovery

use crate::Config;
use crate::error::{LedgerError, LedgerResult};
use crate::storage::{PersistentCatalog, TxnId, WalManager, WalRecord};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const CATALOG_FILE: &str = "catalog.json";
const SNAPSHOT_FILE: &str = "snapshot.db";
const WAL_FILE: &str = "wal.log";

/// A record as the engine stores it: opaque payload bytes plus the
/// secondary-index field values the writer declared for it. The engine
/// never parses the payload; index maintenance relies on `indexed` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub data: Vec<u8>,
    pub indexed: Vec<(String, u64)>,
}

/// In-memory state of one record store
struct StoreState {
    next_key: u64,
    records: BTreeMap<u64, StoredRecord>,
    indexes: HashMap<String, BTreeMap<u64, BTreeSet<u64>>>,
}

impl StoreState {
    fn new(index_fields: &[String]) -> Self {
        let indexes = index_fields
            .iter()
            .map(|field| (field.clone(), BTreeMap::new()))
            .collect();

        Self {
            next_key: 1,
            records: BTreeMap::new(),
            indexes,
        }
    }

    /// Insert or replace a record, keeping the indexes in step
    fn put_record(&mut self, key: u64, record: StoredRecord) {
        if let Some(old) = self.records.remove(&key) {
            self.unindex(key, &old);
        }
        self.index(key, &record);
        self.records.insert(key, record);
    }

    fn remove_record(&mut self, key: u64) -> Option<StoredRecord> {
        let old = self.records.remove(&key)?;
        self.unindex(key, &old);
        Some(old)
    }

    fn index(&mut self, key: u64, record: &StoredRecord) {
        for (field, value) in &record.indexed {
            if let Some(tree) = self.indexes.get_mut(field) {
                tree.entry(*value).or_default().insert(key);
            }
        }
    }

    fn unindex(&mut self, key: u64, record: &StoredRecord) {
        for (field, value) in &record.indexed {
            if let Some(tree) = self.indexes.get_mut(field) {
                if let Some(keys) = tree.get_mut(value) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        tree.remove(value);
                    }
                }
            }
        }
    }

    /// Lowest key whose indexed field equals `value`
    fn lookup_index(&self, field: &str, value: u64) -> LedgerResult<Option<u64>> {
        let tree = self
            .indexes
            .get(field)
            .ok_or_else(|| LedgerError::Storage(format!("No index on field '{}'", field)))?;

        Ok(tree.get(&value).and_then(|keys| keys.iter().next().copied()))
    }
}

struct EngineState {
    stores: HashMap<String, StoreState>,
}

impl EngineState {
    fn store(&self, name: &str) -> LedgerResult<&StoreState> {
        self.stores
            .get(name)
            .ok_or_else(|| LedgerError::Storage(format!("Store '{}' not found", name)))
    }

    fn store_mut(&mut self, name: &str) -> LedgerResult<&mut StoreState> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| LedgerError::Storage(format!("Store '{}' not found", name)))
    }
}

/// Serialized engine contents written at checkpoint time
#[derive(Serialize, Deserialize)]
struct Snapshot {
    stores: HashMap<String, StoreSnapshot>,
}

#[derive(Serialize, Deserialize)]
struct StoreSnapshot {
    next_key: u64,
    records: Vec<(u64, StoredRecord)>,
}

/// Transactional record engine: named stores with auto-incrementing u64
/// primary keys, point lookup, key-ordered scan and secondary indexes on
/// caller-declared u64 fields. Durable when opened with a data directory,
/// purely in-memory otherwise.
pub struct RecordEngine {
    state: RwLock<EngineState>,
    catalog: RwLock<PersistentCatalog>,
    wal: Option<WalManager>,
    next_txn_id: AtomicU64,
    data_dir: Option<PathBuf>,
}

impl RecordEngine {
    /// Open a durable engine rooted at the configured data directory,
    /// replaying any committed WAL tail over the last snapshot.
    pub fn open(config: &Config) -> LedgerResult<Self> {
        let data_dir = PathBuf::from(&config.data_dir);
        std::fs::create_dir_all(&data_dir)?;

        let catalog = PersistentCatalog::load(data_dir.join(CATALOG_FILE))?;

        let mut state = EngineState {
            stores: HashMap::new(),
        };
        for def in catalog.stores.values() {
            state
                .stores
                .insert(def.name.clone(), StoreState::new(&def.index_fields));
        }

        let snapshot_path = data_dir.join(SNAPSHOT_FILE);
        if snapshot_path.exists() {
            load_snapshot(&mut state, &snapshot_path)?;
        }

        let mut next_txn_id = 1;
        let wal = if config.wal_enabled {
            let wal = WalManager::new(data_dir.join(WAL_FILE))?;
            next_txn_id = replay(&mut state, &wal)? + 1;
            Some(wal)
        } else {
            None
        };

        let engine = Self {
            state: RwLock::new(state),
            catalog: RwLock::new(catalog),
            wal,
            next_txn_id: AtomicU64::new(next_txn_id),
            data_dir: Some(data_dir),
        };

        tracing::info!(
            "opened record engine with {} store(s)",
            engine.catalog.read().stores.len()
        );

        if config.checkpoint_on_open {
            engine.checkpoint()?;
        }

        Ok(engine)
    }

    /// Create an engine with no backing files. Same API, nothing survives
    /// the process; useful for tests and scratch collections.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(EngineState {
                stores: HashMap::new(),
            }),
            catalog: RwLock::new(PersistentCatalog::new()),
            wal: None,
            next_txn_id: AtomicU64::new(1),
            data_dir: None,
        }
    }

    /// Create a record store with secondary indexes on the given u64
    /// fields. Creating an existing store with the same indexes is a no-op.
    pub fn create_store(&self, name: &str, index_fields: &[&str]) -> LedgerResult<()> {
        let mut catalog = self.catalog.write();

        if let Some(def) = catalog.get_store(name) {
            if def.index_fields.iter().map(String::as_str).ne(index_fields.iter().copied()) {
                return Err(LedgerError::Storage(format!(
                    "Store '{}' already exists with different indexes",
                    name
                )));
            }
            return Ok(());
        }

        let fields: Vec<String> = index_fields.iter().map(|field| field.to_string()).collect();
        catalog.add_store(name.to_string(), fields.clone());
        self.save_catalog(&catalog)?;

        self.state
            .write()
            .stores
            .insert(name.to_string(), StoreState::new(&fields));

        tracing::info!("created store '{}'", name);
        Ok(())
    }

    /// Drop a record store and everything in it
    pub fn drop_store(&self, name: &str) -> LedgerResult<()> {
        let mut catalog = self.catalog.write();
        catalog.remove_store(name);
        self.save_catalog(&catalog)?;

        self.state.write().stores.remove(name);
        tracing::info!("dropped store '{}'", name);
        Ok(())
    }

    fn save_catalog(&self, catalog: &PersistentCatalog) -> LedgerResult<()> {
        if let Some(data_dir) = &self.data_dir {
            catalog.save(data_dir.join(CATALOG_FILE))?;
        }
        Ok(())
    }

    /// Begin a read transaction. The handle sees a consistent committed
    /// snapshot for its whole lifetime and cannot issue writes.
    pub fn begin_read(&self) -> ReadTransaction<'_> {
        ReadTransaction {
            state: self.state.read(),
        }
    }

    /// Begin a write transaction. The handle holds the engine's exclusive
    /// writer lock; dropping it without `commit` rolls every change back.
    pub fn begin_write(&self) -> LedgerResult<WriteTransaction<'_>> {
        let state = self.state.write();
        let id = TxnId(self.next_txn_id.fetch_add(1, Ordering::SeqCst));

        if let Some(wal) = &self.wal {
            wal.write(WalRecord::Begin { txn_id: id })?;
        }

        Ok(WriteTransaction {
            id,
            state,
            wal: self.wal.as_ref(),
            undo: Vec::new(),
            committed: false,
        })
    }

    /// Write the full engine contents to the snapshot file and truncate
    /// the WAL. Blocks until no write transaction is active.
    pub fn checkpoint(&self) -> LedgerResult<()> {
        let Some(data_dir) = &self.data_dir else {
            return Ok(());
        };

        let state = self.state.write();

        let snapshot = Snapshot {
            stores: state
                .stores
                .iter()
                .map(|(name, store)| {
                    (
                        name.clone(),
                        StoreSnapshot {
                            next_key: store.next_key,
                            records: store
                                .records
                                .iter()
                                .map(|(key, record)| (*key, record.clone()))
                                .collect(),
                        },
                    )
                })
                .collect(),
        };

        let data = bincode::serialize(&snapshot)
            .map_err(|e| LedgerError::Serialization(format!("Failed to serialize snapshot: {}", e)))?;

        let mut file = std::fs::File::create(data_dir.join(SNAPSHOT_FILE))?;
        file.write_all(&data)?;
        file.sync_all()?;

        if let Some(wal) = &self.wal {
            wal.truncate()?;
            wal.write(WalRecord::Checkpoint)?;
        }

        tracing::info!("checkpoint complete ({} store(s))", state.stores.len());
        Ok(())
    }

    /// List all stores known to the catalog
    pub fn list_stores(&self) -> Vec<String> {
        self.catalog.read().list_stores()
    }

    /// Check if a store exists in the catalog
    pub fn store_exists(&self, name: &str) -> bool {
        self.catalog.read().get_store(name).is_some()
    }
}

/// Apply every committed WAL transaction to the state. Returns the highest
/// transaction id seen, so new transactions never collide with old entries.
fn replay(state: &mut EngineState, wal: &WalManager) -> LedgerResult<u64> {
    let entries = wal.recover()?;
    if entries.is_empty() {
        return Ok(0);
    }

    let mut committed = HashSet::new();
    let mut max_txn_id = 0;
    for entry in &entries {
        if let Some(TxnId(id)) = entry.record.txn_id() {
            max_txn_id = max_txn_id.max(id);
        }
        if let WalRecord::Commit { txn_id } = &entry.record {
            committed.insert(*txn_id);
        }
    }

    let mut applied = 0usize;
    for entry in entries {
        match entry.record {
            WalRecord::Insert {
                txn_id,
                store,
                key,
                record,
            } if committed.contains(&txn_id) => {
                if let Ok(st) = state.store_mut(&store) {
                    st.put_record(key, record);
                    if st.next_key <= key {
                        st.next_key = key + 1;
                    }
                    applied += 1;
                } else {
                    tracing::warn!("WAL insert for unknown store '{}' skipped", store);
                }
            }
            WalRecord::Update {
                txn_id,
                store,
                key,
                new,
                ..
            } if committed.contains(&txn_id) => {
                if let Ok(st) = state.store_mut(&store) {
                    st.put_record(key, new);
                    applied += 1;
                }
            }
            WalRecord::Delete {
                txn_id, store, key, ..
            } if committed.contains(&txn_id) => {
                if let Ok(st) = state.store_mut(&store) {
                    st.remove_record(key);
                    applied += 1;
                }
            }
            _ => {}
        }
    }

    tracing::info!("replayed {} committed WAL write(s)", applied);
    Ok(max_txn_id)
}

fn load_snapshot(state: &mut EngineState, path: &Path) -> LedgerResult<()> {
    let data = std::fs::read(path)?;
    let snapshot: Snapshot = bincode::deserialize(&data)
        .map_err(|e| LedgerError::Serialization(format!("Failed to parse snapshot: {}", e)))?;

    for (name, store_snapshot) in snapshot.stores {
        let Ok(store) = state.store_mut(&name) else {
            tracing::warn!("snapshot contains unknown store '{}', skipped", name);
            continue;
        };

        store.next_key = store_snapshot.next_key;
        for (key, record) in store_snapshot.records {
            store.put_record(key, record);
        }
    }

    Ok(())
}

/// Read-only transaction over the committed engine state
pub struct ReadTransaction<'a> {
    state: RwLockReadGuard<'a, EngineState>,
}

impl ReadTransaction<'_> {
    /// Point lookup by primary key
    pub fn get(&self, store: &str, key: u64) -> LedgerResult<Option<&StoredRecord>> {
        Ok(self.state.store(store)?.records.get(&key))
    }

    /// Visit records in store-native (key) order until the callback
    /// returns false
    pub fn scan<F>(&self, store: &str, mut callback: F) -> LedgerResult<()>
    where
        F: FnMut(u64, &StoredRecord) -> LedgerResult<bool>,
    {
        for (key, record) in &self.state.store(store)?.records {
            if !callback(*key, record)? {
                break;
            }
        }
        Ok(())
    }

    /// Lowest key whose indexed field equals `value`
    pub fn lookup_index(&self, store: &str, field: &str, value: u64) -> LedgerResult<Option<u64>> {
        self.state.store(store)?.lookup_index(field, value)
    }

    /// Number of records in the store
    pub fn len(&self, store: &str) -> LedgerResult<usize> {
        Ok(self.state.store(store)?.records.len())
    }
}

enum UndoOp {
    Insert {
        store: String,
        key: u64,
    },
    Update {
        store: String,
        key: u64,
        old: StoredRecord,
    },
    Delete {
        store: String,
        key: u64,
        old: StoredRecord,
    },
}

/// Exclusive write transaction. Mutations are WAL-logged, applied eagerly
/// and recorded in an undo log; `commit` seals them, dropping the handle
/// without committing rolls them all back.
pub struct WriteTransaction<'a> {
    id: TxnId,
    state: RwLockWriteGuard<'a, EngineState>,
    wal: Option<&'a WalManager>,
    undo: Vec<UndoOp>,
    committed: bool,
}

impl WriteTransaction<'_> {
    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Point lookup by primary key, seeing this transaction's own writes
    pub fn get(&self, store: &str, key: u64) -> LedgerResult<Option<&StoredRecord>> {
        Ok(self.state.store(store)?.records.get(&key))
    }

    /// Visit records in store-native (key) order until the callback
    /// returns false
    pub fn scan<F>(&self, store: &str, mut callback: F) -> LedgerResult<()>
    where
        F: FnMut(u64, &StoredRecord) -> LedgerResult<bool>,
    {
        for (key, record) in &self.state.store(store)?.records {
            if !callback(*key, record)? {
                break;
            }
        }
        Ok(())
    }

    /// Lowest key whose indexed field equals `value`
    pub fn lookup_index(&self, store: &str, field: &str, value: u64) -> LedgerResult<Option<u64>> {
        self.state.store(store)?.lookup_index(field, value)
    }

    /// Number of records in the store
    pub fn len(&self, store: &str) -> LedgerResult<usize> {
        Ok(self.state.store(store)?.records.len())
    }

    /// Insert a record, assigning the next primary key
    pub fn insert(&mut self, store: &str, record: StoredRecord) -> LedgerResult<u64> {
        let key = self.state.store(store)?.next_key;

        self.log(WalRecord::Insert {
            txn_id: self.id,
            store: store.to_string(),
            key,
            record: record.clone(),
        })?;

        let st = self.state.store_mut(store)?;
        st.next_key = key + 1;
        st.put_record(key, record);

        self.undo.push(UndoOp::Insert {
            store: store.to_string(),
            key,
        });
        Ok(key)
    }

    /// Replace an existing record
    pub fn update(&mut self, store: &str, key: u64, record: StoredRecord) -> LedgerResult<()> {
        let old = self
            .state
            .store(store)?
            .records
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                LedgerError::Storage(format!("Record {} not found in store '{}'", key, store))
            })?;

        self.log(WalRecord::Update {
            txn_id: self.id,
            store: store.to_string(),
            key,
            old: old.clone(),
            new: record.clone(),
        })?;

        self.state.store_mut(store)?.put_record(key, record);
        self.undo.push(UndoOp::Update {
            store: store.to_string(),
            key,
            old,
        });
        Ok(())
    }

    /// Delete an existing record
    pub fn delete(&mut self, store: &str, key: u64) -> LedgerResult<()> {
        let old = self
            .state
            .store(store)?
            .records
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                LedgerError::Storage(format!("Record {} not found in store '{}'", key, store))
            })?;

        self.log(WalRecord::Delete {
            txn_id: self.id,
            store: store.to_string(),
            key,
            record: old.clone(),
        })?;

        self.state.store_mut(store)?.remove_record(key);
        self.undo.push(UndoOp::Delete {
            store: store.to_string(),
            key,
            old,
        });
        Ok(())
    }

    /// Seal the transaction. All writes become durable and visible
    /// together; an error here leaves the rollback to the drop path.
    pub fn commit(mut self) -> LedgerResult<()> {
        if let Some(wal) = self.wal {
            wal.write(WalRecord::Commit { txn_id: self.id })?;
        }

        self.committed = true;
        tracing::debug!("committed transaction {}", self.id.0);
        Ok(())
    }

    fn log(&self, record: WalRecord) -> LedgerResult<()> {
        if let Some(wal) = self.wal {
            wal.write(record)?;
        }
        Ok(())
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        // Unwind in reverse order so earlier state is restored last
        for op in std::mem::take(&mut self.undo).into_iter().rev() {
            match op {
                UndoOp::Insert { store, key } => {
                    if let Ok(st) = self.state.store_mut(&store) {
                        st.remove_record(key);
                        st.next_key = key;
                    }
                }
                UndoOp::Update { store, key, old } => {
                    if let Ok(st) = self.state.store_mut(&store) {
                        st.put_record(key, old);
                    }
                }
                UndoOp::Delete { store, key, old } => {
                    if let Ok(st) = self.state.store_mut(&store) {
                        st.put_record(key, old);
                    }
                }
            }
        }

        if let Some(wal) = self.wal {
            let _ = wal.write(WalRecord::Abort { txn_id: self.id });
        }

        tracing::debug!("rolled back transaction {}", self.id.0);
    }
}
