//! Mutual Credit Clearing - distributed user registry
//!
//! The user registry underneath a mutual-credit clearing system. Every agent
//! on the network may register exactly one user with a valid name; any peer
//! can list the users it can see and look up its own.
//!
//! ## Architecture
//!
//! ```text
//! caller → Conductor (zome call) → UserRegistry → validation (reject early)
//!                                        ↓
//!                                  RegistryStore (Peer) → Shard (local view)
//!                                        ↓
//!                                  Network (gossip) → other peers' shards
//! ```
//!
//! - [`address`] - CIDv0 content addresses for entries
//! - [`validation`] - name rules and the substrate's entry integrity check
//! - [`store`] - store adapter trait, shards, and the in-process network
//! - [`registry`] - `create_user`, `get_users`, `get_my_user`
//! - [`conductor`] - named instances and JSON zome-call dispatch
//!
//! Writes are visible on the writing peer immediately and on other peers
//! only after gossip; nothing here bounds how long that takes.

pub mod address;
pub mod agent;
pub mod conductor;
pub mod config;
pub mod entry;
pub mod error;
pub mod registry;
pub mod store;
pub mod validation;

// Re-exports
pub use address::{address_of, Address};
pub use agent::{AgentId, AgentKey, Provenance};
pub use conductor::{Conductor, ZomeApiError, ZOME_NAME};
pub use config::{Config, RegistryConfig};
pub use entry::{Entry, GetResponse, User};
pub use error::{ConductorError, ConfigError, RegistryError, StorageError, ValidationError};
pub use registry::UserRegistry;
pub use store::{MemoryShard, Network, Peer, RegistryStore, Shard, SledShard};
pub use validation::{validate_user_name, DEFAULT_USER_NAME_MAX_LENGTH};
