//! Write-Ahead Logging implementation

use crate::error::{LedgerError, LedgerResult};
use crate::storage::engine::StoredRecord;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Log Sequence Number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lsn(pub u64);

/// Transaction ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId(pub u64);

/// WAL record types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalRecord {
	Begin {
		txn_id: TxnId,
	},
	Commit {
		txn_id: TxnId,
	},
	Abort {
		txn_id: TxnId,
	},
	Insert {
		txn_id: TxnId,
		store: String,
		key: u64,
		record: StoredRecord,
	},
	Update {
		txn_id: TxnId,
		store: String,
		key: u64,
		old: StoredRecord,
		new: StoredRecord,
	},
	Delete {
		txn_id: TxnId,
		store: String,
		key: u64,
		record: StoredRecord,
	},
	Checkpoint,
}

impl WalRecord {
	/// Transaction the record belongs to, if any
	pub fn txn_id(&self) -> Option<TxnId> {
		match self {
			WalRecord::Begin { txn_id }
			| WalRecord::Commit { txn_id }
			| WalRecord::Abort { txn_id }
			| WalRecord::Insert { txn_id, .. }
			| WalRecord::Update { txn_id, .. }
			| WalRecord::Delete { txn_id, .. } => Some(*txn_id),
			WalRecord::Checkpoint => None,
		}
	}
}

/// WAL entry with metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct WalEntry {
	pub lsn: Lsn,
	pub record: WalRecord,
	pub timestamp: u64,
}

/// WAL manager
pub struct WalManager {
	file: Mutex<File>,
	current_lsn: Mutex<Lsn>,
}

impl WalManager {
	/// Create a new WAL manager
	pub fn new<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
		let mut file = OpenOptions::new()
			.create(true)
			.read(true)
			.write(true)
			.open(path)?;

		let current_lsn = read_entries(&mut file)?
			.last()
			.map(|entry| entry.lsn)
			.unwrap_or(Lsn(0));

		Ok(Self {
			file: Mutex::new(file),
			current_lsn: Mutex::new(current_lsn),
		})
	}

	/// Write a WAL record
	pub fn write(&self, record: WalRecord) -> LedgerResult<Lsn> {
		let mut file = self.file.lock().unwrap();
		let mut current_lsn = self.current_lsn.lock().unwrap();

		// Increment LSN
		current_lsn.0 += 1;
		let lsn = *current_lsn;

		let entry = WalEntry {
			lsn,
			record,
			timestamp: std::time::SystemTime::now()
				.duration_since(std::time::UNIX_EPOCH)
				.unwrap()
				.as_secs(),
		};

		// Serialize entry using bincode
		let data = bincode::serialize(&entry)
			.map_err(|e| LedgerError::Wal(format!("Failed to serialize WAL entry: {}", e)))?;

		// Write length prefix, checksum, then payload
		let len = data.len() as u32;
		let checksum = crc32fast::hash(&data);
		file.seek(SeekFrom::End(0))?;
		file.write_all(&len.to_le_bytes())?;
		file.write_all(&checksum.to_le_bytes())?;
		file.write_all(&data)?;
		file.sync_all()?;

		Ok(lsn)
	}

	/// Read every intact entry from the WAL
	pub fn recover(&self) -> LedgerResult<Vec<WalEntry>> {
		let mut file = self.file.lock().unwrap();
		read_entries(&mut file)
	}

	/// Discard all entries, e.g. after a checkpoint made them redundant
	pub fn truncate(&self) -> LedgerResult<()> {
		let mut file = self.file.lock().unwrap();
		file.set_len(0)?;
		file.seek(SeekFrom::Start(0))?;
		file.sync_all()?;
		*self.current_lsn.lock().unwrap() = Lsn(0);
		Ok(())
	}

	/// Get current LSN
	pub fn current_lsn(&self) -> Lsn {
		*self.current_lsn.lock().unwrap()
	}

	/// Flush WAL to disk
	pub fn flush(&self) -> LedgerResult<()> {
		let file = self.file.lock().unwrap();
		file.sync_all()?;
		Ok(())
	}
}

fn read_entries(file: &mut File) -> LedgerResult<Vec<WalEntry>> {
	file.seek(SeekFrom::Start(0))?;

	let mut entries = Vec::new();

	loop {
		// Read length prefix
		let mut len_bytes = [0u8; 4];
		match file.read_exact(&mut len_bytes) {
			Ok(_) => {}
			Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
			Err(e) => return Err(LedgerError::Io(e)),
		}

		let len = u32::from_le_bytes(len_bytes) as usize;

		// Sanity check
		if len > 1024 * 1024 {
			tracing::warn!("WAL entry too large ({} bytes), ignoring tail", len);
			break;
		}

		// Read checksum
		let mut checksum_bytes = [0u8; 4];
		if file.read_exact(&mut checksum_bytes).is_err() {
			tracing::warn!("torn WAL entry header, ignoring tail");
			break;
		}
		let checksum = u32::from_le_bytes(checksum_bytes);

		// Read entry data
		let mut data = vec![0u8; len];
		if file.read_exact(&mut data).is_err() {
			tracing::warn!("torn WAL entry payload, ignoring tail");
			break;
		}

		if crc32fast::hash(&data) != checksum {
			tracing::warn!("WAL entry checksum mismatch, ignoring tail");
			break;
		}

		// Deserialize entry
		match bincode::deserialize::<WalEntry>(&data) {
			Ok(entry) => entries.push(entry),
			Err(e) => {
				tracing::warn!("Failed to deserialize WAL entry: {}", e);
				break;
			}
		}
	}

	Ok(entries)
}
