//! LedgerDB - persistence core for the ledger application
//!
//! Keeps user-reorderable, insertion-ordered collections (monetary
//! amounts, favorite currency pairs) as a persistent doubly linked list
//! over a transactional record store.

pub mod domain;
pub mod error;
pub mod list;
pub mod storage;

pub use error::{LedgerError, LedgerResult};
pub use list::{Direction, EngineNodeStore, LinkedRecord, ListRepository, NodeKey, NodeStore};
pub use storage::RecordEngine;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub wal_enabled: bool,
    pub checkpoint_on_open: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            wal_enabled: true,
            checkpoint_on_open: false,
        }
    }
}
