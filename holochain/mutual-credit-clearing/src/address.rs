//! Content addressing for entries
//!
//! An entry's address is the CIDv0 of the SHA2-256 multihash of its canonical
//! JSON form. CIDv0 strings are base58btc and always 46 characters (`Qm...`).
//! Identical content always yields the same address, so the author's agent id
//! (part of a user's content) keeps two agents' same-named users apart.

use cid::{Cid, Version};
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

use crate::entry::Entry;
use crate::error::StorageError;

/// Length of a CIDv0 string
pub const ADDRESS_LEN: usize = 46;

/// Content-derived handle for a committed entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse a CIDv0 string
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let cid = Cid::from_str(s).map_err(|e| StorageError::InvalidAddress(format!("{}: {}", s, e)))?;
        if cid.version() != Version::V0 {
            return Err(StorageError::InvalidAddress(format!("not a CIDv0: {}", s)));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = StorageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

/// Canonical serialized form that addresses are computed over.
///
/// Built from a `serde_json::Value` so keys come out in a fixed order no
/// matter how the Rust types evolve.
pub fn canonical_json(entry: &Entry) -> String {
    let value = match entry {
        Entry::User(user) => json!({
            "entry_type": entry.entry_type(),
            "content": {
                "agent": user.agent.as_str(),
                "name": user.name,
            },
        }),
        Entry::UserAnchor(anchor) => json!({
            "entry_type": entry.entry_type(),
            "content": anchor,
        }),
    };
    value.to_string()
}

/// Compute the address of an entry
pub fn address_of(entry: &Entry) -> Address {
    let hash = Code::Sha2_256.digest(canonical_json(entry).as_bytes());
    // A 32-byte SHA2-256 multihash is exactly what CIDv0 requires.
    let cid = Cid::new_v0(hash).expect("sha2-256 multihash is a valid CIDv0");
    Address(cid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use crate::entry::User;

    fn user(agent: &str, name: &str) -> Entry {
        Entry::User(User {
            agent: AgentId::from(agent),
            name: name.to_string(),
        })
    }

    #[test]
    fn test_address_is_cidv0() {
        let address = address_of(&user("uhCAkamy", "Amy"));
        assert_eq!(address.as_str().len(), ADDRESS_LEN);
        assert!(address.as_str().starts_with("Qm"));
    }

    #[test]
    fn test_address_is_deterministic() {
        assert_eq!(
            address_of(&user("uhCAkamy", "Amy")),
            address_of(&user("uhCAkamy", "Amy"))
        );
    }

    #[test]
    fn test_address_depends_on_all_content() {
        let base = address_of(&user("uhCAkamy", "Amy"));
        assert_ne!(base, address_of(&user("uhCAkbrad", "Amy")));
        assert_ne!(base, address_of(&user("uhCAkamy", "Amy2")));
        assert_ne!(base, address_of(&Entry::UserAnchor("Amy".into())));
    }

    #[test]
    fn test_parse_accepts_computed_address() {
        let address = address_of(&user("uhCAkamy", "Amy"));
        assert_eq!(Address::parse(address.as_str()).unwrap(), address);
    }

    #[test]
    fn test_parse_rejects_garbage_and_cidv1() {
        assert!(Address::parse("not-an-address").is_err());

        let hash = Code::Sha2_256.digest(b"Amy");
        let v1 = Cid::new_v1(0x55, hash).to_string();
        assert!(Address::parse(&v1).is_err());
    }

    #[test]
    fn test_address_serde_validates() {
        let address = address_of(&user("uhCAkamy", "Amy"));
        let json = serde_json::to_string(&address).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);

        assert!(serde_json::from_str::<Address>("\"Qmbogus\"").is_err());
    }
}
