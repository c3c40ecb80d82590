//! Storage engine module providing transactional record persistence

pub mod catalog;
pub mod engine;
pub mod wal;

// Re-export core types
pub use catalog::{PersistentCatalog, StoreDef};
pub use engine::{ReadTransaction, RecordEngine, StoredRecord, WriteTransaction};
pub use wal::{Lsn, TxnId, WalManager, WalRecord};
