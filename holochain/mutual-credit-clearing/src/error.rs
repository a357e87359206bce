//! Error types for the mutual credit clearing registry

use thiserror::Error;

use crate::address::Address;
use crate::agent::AgentId;

/// A user name failed the registration rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("User name string cannot be empty")]
    EmptyName,

    #[error("User name string too long: {len} characters (max {max})")]
    NameTooLong { len: usize, max: usize },
}

/// Failures raised by the storage substrate.
///
/// The registry never generates these itself; they are passed through to the
/// caller as [`RegistryError::StorageUnavailable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Peer unavailable: {0}")]
    Unavailable(String),

    #[error("Validation rejected: {0}")]
    ValidationRejected(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid agent: {0}")]
    InvalidAgent(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl From<sled::Error> for StorageError {
    fn from(e: sled::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StorageError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StorageError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Errors returned by the user registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid name: {0}")]
    InvalidName(#[from] ValidationError),

    #[error("Agent {agent} is already registered as {address}")]
    AlreadyRegistered { agent: AgentId, address: Address },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),
}

/// Errors from the zome-call dispatch layer.
#[derive(Error, Debug)]
pub enum ConductorError {
    #[error("Unknown instance: {0}")]
    UnknownInstance(String),

    #[error("Instance already exists: {0}")]
    DuplicateInstance(String),

    #[error("Unknown zome: {0}")]
    UnknownZome(String),

    #[error("Unknown zome function: {0}")]
    UnknownFunction(String),

    #[error("Invalid payload for {function}: {reason}")]
    InvalidPayload { function: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors loading or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
