//! Registry store adapter
//!
//! The registry only needs three capabilities from the replicated substrate:
//! commit a user under its author, list every visible user, and find the user
//! an agent authored. [`RegistryStore`] captures exactly that.
//!
//! ## Consistency
//!
//! | Guarantee | Scope |
//! |-----------|-------|
//! | Read-your-writes | A successful `commit` is visible to later reads on the same peer |
//! | Eventual visibility | Other peers see it after gossip, with no latency bound |
//! | Stable order | Repeated `list_all` on a converged peer returns the same order |
//!
//! The in-process substrate in [`network`] implements these for tests and the
//! CLI: every [`Peer`] holds its own [`Shard`] (its visibility set), and
//! [`Network`] decides when ops published by one peer reach the others.

use async_trait::async_trait;

use crate::address::Address;
use crate::agent::AgentId;
use crate::entry::{GetResponse, User};
use crate::error::StorageError;

pub mod network;
pub mod shard;
pub mod sled_shard;

pub use network::{Network, Peer, PeerId};
pub use shard::{MemoryShard, Shard, ShardBatch};
pub use sled_shard::SledShard;

/// Capabilities the registry consumes from the storage substrate
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Durably store `user` attributed to `author` and return its address.
    ///
    /// Committing identical content again returns the same address.
    async fn commit(&self, user: &User, author: &AgentId) -> Result<Address, StorageError>;

    /// Every user visible to this peer, in peer-local order
    async fn list_all(&self) -> Result<Vec<GetResponse<User>>, StorageError>;

    /// The user authored by `agent`, if visible to this peer
    async fn get_by_identity(
        &self,
        agent: &AgentId,
    ) -> Result<Option<GetResponse<User>>, StorageError>;
}
