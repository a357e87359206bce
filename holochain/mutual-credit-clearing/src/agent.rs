//! Agent identity and provenance
//!
//! Every participant is an ed25519 keypair, the same key type Holochain uses
//! for agents. The public half, rendered as a `uhCAk...` string, is the
//! [`AgentId`] that user records are attributed to. Every committed entry
//! carries a [`Provenance`] signed by its author so receiving peers can check
//! who wrote it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::address::Address;
use crate::error::StorageError;

/// Prefix of the string form of an agent public key
pub const AGENT_PREFIX: &str = "uhCAk";

/// Opaque identifier of a network participant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(format!("{}{}", AGENT_PREFIX, URL_SAFE_NO_PAD.encode(key.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the public key this id was derived from.
    pub fn verifying_key(&self) -> Result<VerifyingKey, StorageError> {
        let encoded = self
            .0
            .strip_prefix(AGENT_PREFIX)
            .ok_or_else(|| StorageError::InvalidAgent(format!("missing prefix: {}", self.0)))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| StorageError::InvalidAgent(format!("{}: {}", self.0, e)))?;

        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StorageError::InvalidAgent(format!("wrong key length: {}", self.0)))?;

        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| StorageError::InvalidAgent(format!("{}: {}", self.0, e)))
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An agent's signing key together with its derived id
#[derive(Clone)]
pub struct AgentKey {
    signing_key: SigningKey,
    agent: AgentId,
}

impl AgentKey {
    /// Generate a fresh keypair from the OS random number generator
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Deterministic key from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&seed))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let agent = AgentId::from_verifying_key(&signing_key.verifying_key());
        Self { signing_key, agent }
    }

    /// Load the key stored at `path`, or generate one and write it there.
    pub async fn load_or_generate<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let path = path.as_ref();

        if tokio::fs::try_exists(path).await? {
            let bytes = tokio::fs::read(path).await?;
            let seed: [u8; 32] = bytes.try_into().map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "agent key must be 32 bytes")
            })?;
            return Ok(Self::from_seed(seed));
        }

        let key = Self::generate();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, key.signing_key.to_bytes()).await?;

        info!(agent = %key.agent, path = %path.display(), "Generated agent key");
        Ok(key)
    }

    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    /// Sign an entry address, producing the provenance for it
    pub fn sign(&self, address: &Address) -> Provenance {
        let signature = self.signing_key.sign(address.as_str().as_bytes());
        Provenance {
            author: self.agent.clone(),
            signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
        }
    }
}

impl fmt::Debug for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentKey").field("agent", &self.agent).finish()
    }
}

/// Who authored an entry, and their signature over its address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub author: AgentId,
    pub signature: String,
}

impl Provenance {
    /// Check the signature against the author's public key.
    pub fn verify(&self, address: &Address) -> Result<(), String> {
        let key = self.author.verifying_key().map_err(|e| e.to_string())?;

        let bytes = URL_SAFE_NO_PAD
            .decode(&self.signature)
            .map_err(|e| format!("Malformed signature: {}", e))?;
        let signature =
            Signature::from_slice(&bytes).map_err(|e| format!("Malformed signature: {}", e))?;

        key.verify(address.as_str().as_bytes(), &signature)
            .map_err(|_| format!("Signature by {} does not match entry {}", self.author, address))
    }
}
