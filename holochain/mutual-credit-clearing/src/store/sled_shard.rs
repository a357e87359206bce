//! Durable shard backed by sled
//!
//! ## Trees
//!
//! | Tree | Key | Value |
//! |------|-----|-------|
//! | `entries` | address | msgpack `StoredEntry` |
//! | `links` | sequence id (big-endian) | msgpack `Link` |
//! | `link_index` | `base\|type\|target` | empty |
//! | `chain` | sequence id (big-endian) | address |
//!
//! Sequence ids come from `generate_id`, which only ever increases, so
//! iterating `links` and `chain` yields arrival order.
//!
//! A link row and its `link_index` key are always written in one sled
//! transaction; batches span all four trees.

use sled::transaction::{
    ConflictableTransactionResult, TransactionError, Transactional, TransactionalTree,
};
use std::path::Path;
use tracing::info;

use crate::address::Address;
use crate::entry::{Link, StoredEntry};
use crate::error::StorageError;
use crate::store::shard::{Shard, ShardBatch};

pub struct SledShard {
    db: sled::Db,
    entries: sled::Tree,
    links: sled::Tree,
    link_index: sled::Tree,
    chain: sled::Tree,
}

impl SledShard {
    /// Open (or create) a shard database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::Config::new().path(path).open()?;

        let entries = db.open_tree("entries")?;
        let links = db.open_tree("links")?;
        let link_index = db.open_tree("link_index")?;
        let chain = db.open_tree("chain")?;

        info!(path = %path.display(), entries = entries.len(), "Opened sled shard");

        Ok(Self {
            db,
            entries,
            links,
            link_index,
            chain,
        })
    }

    fn next_key(&self) -> Result<[u8; 8], StorageError> {
        Ok(self.db.generate_id()?.to_be_bytes())
    }
}

fn abort_reason(e: TransactionError<StorageError>) -> StorageError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    }
}

/// Insert a link row unless its index key already exists. Returns whether
/// the link was new.
fn insert_link(
    links: &TransactionalTree,
    link_index: &TransactionalTree,
    key: &str,
    bytes: &[u8],
) -> ConflictableTransactionResult<bool, StorageError> {
    if link_index.insert(key, &b""[..])?.is_some() {
        return Ok(false);
    }
    let seq = links.generate_id()?.to_be_bytes().to_vec();
    links.insert(seq, bytes)?;
    Ok(true)
}

impl Shard for SledShard {
    fn put_entry(&mut self, address: &Address, stored: &StoredEntry) -> Result<(), StorageError> {
        if self.entries.contains_key(address.as_str())? {
            return Ok(());
        }
        let bytes = rmp_serde::to_vec_named(stored)?;
        self.entries.insert(address.as_str(), bytes)?;
        Ok(())
    }

    fn get_entry(&self, address: &Address) -> Result<Option<StoredEntry>, StorageError> {
        match self.entries.get(address.as_str())? {
            Some(bytes) => Ok(Some(rmp_serde::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn add_link(&mut self, link: &Link) -> Result<bool, StorageError> {
        let key = link.key();
        let bytes = rmp_serde::to_vec_named(link)?;

        (&self.links, &self.link_index)
            .transaction(|(links, link_index)| insert_link(links, link_index, &key, &bytes))
            .map_err(abort_reason)
    }

    fn links(&self, base: &Address, link_type: &str) -> Result<Vec<Link>, StorageError> {
        let mut found = Vec::new();
        for item in self.links.iter() {
            let (_, bytes) = item?;
            let link: Link = rmp_serde::from_slice(&bytes)?;
            if &link.base == base && link.link_type == link_type {
                found.push(link);
            }
        }
        Ok(found)
    }

    fn append_to_chain(&mut self, address: &Address) -> Result<(), StorageError> {
        self.chain.insert(self.next_key()?, address.as_str())?;
        Ok(())
    }

    fn chain(&self) -> Result<Vec<Address>, StorageError> {
        self.chain
            .iter()
            .values()
            .map(|value| {
                let value = value?;
                let s = String::from_utf8(value.to_vec())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Address::parse(&s)
            })
            .collect()
    }

    fn apply_batch(&mut self, batch: &ShardBatch) -> Result<(), StorageError> {
        let entries = batch
            .entries
            .iter()
            .map(|(address, stored)| Ok((address.as_str(), rmp_serde::to_vec_named(stored)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;
        let links = batch
            .links
            .iter()
            .map(|link| Ok((link.key(), rmp_serde::to_vec_named(link)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;

        let trees = (&self.entries, &self.links, &self.link_index, &self.chain);
        trees
            .transaction(
                |(entry_tree, link_tree, link_index, chain_tree)| -> ConflictableTransactionResult<(), StorageError> {
                    for (address, bytes) in &entries {
                        if entry_tree.get(*address)?.is_none() {
                            entry_tree.insert(*address, bytes.as_slice())?;
                        }
                    }
                    for address in &batch.chain {
                        let seq = chain_tree.generate_id()?.to_be_bytes().to_vec();
                        chain_tree.insert(seq, address.as_str())?;
                    }
                    for (key, bytes) in &links {
                        insert_link(link_tree, link_index, key, bytes)?;
                    }
                    Ok(())
                },
            )
            .map_err(abort_reason)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
