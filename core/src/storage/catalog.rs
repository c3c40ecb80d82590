//! Persistent store catalog

use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

/// Definition of a record store and its secondary indexes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDef {
	pub name: String,
	pub index_fields: Vec<String>,
	pub created_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PersistentCatalog {
	pub stores: HashMap<String, StoreDef>,
}

impl PersistentCatalog {
	pub fn new() -> Self {
		Self {
			stores: HashMap::new(),
		}
	}

	/// Load catalog from disk
	pub fn load<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
		match File::open(path) {
			Ok(mut file) => {
				let mut contents = String::new();
				file.read_to_string(&mut contents)?;

				serde_json::from_str(&contents)
					.map_err(|e| LedgerError::Storage(format!("Failed to parse catalog: {}", e)))
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
			Err(e) => Err(LedgerError::Io(e)),
		}
	}

	/// Save catalog to disk
	pub fn save<P: AsRef<Path>>(&self, path: P) -> LedgerResult<()> {
		let json = serde_json::to_string_pretty(self)
			.map_err(|e| LedgerError::Storage(format!("Failed to serialize catalog: {}", e)))?;

		let mut file = OpenOptions::new()
			.create(true)
			.write(true)
			.truncate(true)
			.open(path)?;

		file.write_all(json.as_bytes())?;
		file.sync_all()?;

		Ok(())
	}

	/// Add a store to the catalog
	pub fn add_store(&mut self, name: String, index_fields: Vec<String>) {
		let def = StoreDef {
			name: name.clone(),
			index_fields,
			created_at: std::time::SystemTime::now()
				.duration_since(std::time::UNIX_EPOCH)
				.unwrap()
				.as_secs(),
		};

		self.stores.insert(name, def);
	}

	/// Remove a store from the catalog
	pub fn remove_store(&mut self, name: &str) {
		self.stores.remove(name);
	}

	/// Get a store definition
	pub fn get_store(&self, name: &str) -> Option<&StoreDef> {
		self.stores.get(name)
	}

	/// List all stores
	pub fn list_stores(&self) -> Vec<String> {
		self.stores.keys().cloned().collect()
	}
}
