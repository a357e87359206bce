//! Peer-local shard storage
//!
//! A shard is what one peer can currently see: entries by address, typed links
//! in the order they arrived, and the peer's own source chain.

use std::collections::{HashMap, HashSet};

use crate::address::Address;
use crate::entry::{Link, StoredEntry};
use crate::error::StorageError;

/// Writes that must land together or not at all
#[derive(Debug, Clone, Default)]
pub struct ShardBatch {
    pub entries: Vec<(Address, StoredEntry)>,
    pub chain: Vec<Address>,
    pub links: Vec<Link>,
}

/// Backend for one peer's local view of the DHT
pub trait Shard: Send + Sync {
    /// Store an entry. Re-storing the same address is a no-op.
    fn put_entry(&mut self, address: &Address, stored: &StoredEntry) -> Result<(), StorageError>;

    fn get_entry(&self, address: &Address) -> Result<Option<StoredEntry>, StorageError>;

    fn has_entry(&self, address: &Address) -> Result<bool, StorageError> {
        Ok(self.get_entry(address)?.is_some())
    }

    /// Add a link. Returns `false` if an identical link was already present.
    fn add_link(&mut self, link: &Link) -> Result<bool, StorageError>;

    /// Links from `base` of `link_type`, oldest first
    fn links(&self, base: &Address, link_type: &str) -> Result<Vec<Link>, StorageError>;

    /// Append an authored entry to this peer's source chain
    fn append_to_chain(&mut self, address: &Address) -> Result<(), StorageError>;

    /// Source chain addresses, oldest first
    fn chain(&self) -> Result<Vec<Address>, StorageError>;

    /// Apply every write in `batch` atomically. On error nothing in the
    /// batch is visible.
    fn apply_batch(&mut self, batch: &ShardBatch) -> Result<(), StorageError>;

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// In-memory shard, the default for tests and ephemeral peers
#[derive(Debug, Default)]
pub struct MemoryShard {
    entries: HashMap<Address, StoredEntry>,
    links: Vec<Link>,
    link_keys: HashSet<String>,
    chain: Vec<Address>,
}

impl MemoryShard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Shard for MemoryShard {
    fn put_entry(&mut self, address: &Address, stored: &StoredEntry) -> Result<(), StorageError> {
        self.entries
            .entry(address.clone())
            .or_insert_with(|| stored.clone());
        Ok(())
    }

    fn get_entry(&self, address: &Address) -> Result<Option<StoredEntry>, StorageError> {
        Ok(self.entries.get(address).cloned())
    }

    fn add_link(&mut self, link: &Link) -> Result<bool, StorageError> {
        if !self.link_keys.insert(link.key()) {
            return Ok(false);
        }
        self.links.push(link.clone());
        Ok(true)
    }

    fn links(&self, base: &Address, link_type: &str) -> Result<Vec<Link>, StorageError> {
        Ok(self
            .links
            .iter()
            .filter(|l| &l.base == base && l.link_type == link_type)
            .cloned()
            .collect())
    }

    fn append_to_chain(&mut self, address: &Address) -> Result<(), StorageError> {
        self.chain.push(address.clone());
        Ok(())
    }

    fn chain(&self) -> Result<Vec<Address>, StorageError> {
        Ok(self.chain.clone())
    }

    fn apply_batch(&mut self, batch: &ShardBatch) -> Result<(), StorageError> {
        // In-memory writes cannot fail part way through
        for (address, stored) in &batch.entries {
            self.put_entry(address, stored)?;
        }
        for address in &batch.chain {
            self.append_to_chain(address)?;
        }
        for link in &batch.links {
            self.add_link(link)?;
        }
        Ok(())
    }
}
