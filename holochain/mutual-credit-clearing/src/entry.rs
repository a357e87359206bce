//! Entry definitions
//!
//! A holochain agent id is tied to a user. The relationship is one-to-one:
//! an agent can register only one user. Nothing verifies that each agent is a
//! distinct person, so one person running several agents still gets several
//! users.
//!
//! Users are found through an anchor: a well-known entry (`user_anchor` /
//! `"users"`) with a `user_registration` link to every user entry.

use serde::{Deserialize, Serialize};

use crate::address::{address_of, Address};
use crate::agent::{AgentId, Provenance};

pub const USER_ENTRY_TYPE: &str = "user";
pub const USER_ANCHOR_TYPE: &str = "user_anchor";
pub const USER_ANCHOR_ENTRY: &str = "users";
pub const USER_REGISTRATION_LINK: &str = "user_registration";

/// Represents an agent registered on the network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub agent: AgentId,
    pub name: String,
}

/// Entry together with its address, as returned from queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse<T> {
    pub entry: T,
    pub address: Address,
}

/// App entries known to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry_type", content = "content", rename_all = "snake_case")]
pub enum Entry {
    User(User),
    UserAnchor(String),
}

impl Entry {
    pub fn entry_type(&self) -> &'static str {
        match self {
            Entry::User(_) => USER_ENTRY_TYPE,
            Entry::UserAnchor(_) => USER_ANCHOR_TYPE,
        }
    }

    pub fn address(&self) -> Address {
        address_of(self)
    }
}

/// Address of the anchor all user registrations hang off
pub fn user_anchor_address() -> Address {
    address_of(&Entry::UserAnchor(USER_ANCHOR_ENTRY.to_string()))
}

/// Entry as held in a shard, with the author's signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub entry: Entry,
    pub provenance: Provenance,
}

/// Typed link between two entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub base: Address,
    pub target: Address,
    pub link_type: String,
    pub tag: String,
    pub author: AgentId,
}

impl Link {
    /// Registration link from the user anchor to a user entry
    pub fn registration(target: Address, author: AgentId) -> Self {
        Self {
            base: user_anchor_address(),
            target,
            link_type: USER_REGISTRATION_LINK.to_string(),
            tag: String::new(),
            author,
        }
    }

    /// Links are identified by base, type and target; author and tag don't
    /// make a second copy of the same link.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.base, self.link_type, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_json_shape() {
        let entry = Entry::User(User {
            agent: AgentId::from("uhCAkagent"),
            name: "Amy".to_string(),
        });
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["entry_type"], "user");
        assert_eq!(json["content"]["name"], "Amy");
        assert_eq!(json["content"]["agent"], "uhCAkagent");

        let anchor = serde_json::to_value(Entry::UserAnchor(USER_ANCHOR_ENTRY.into())).unwrap();
        assert_eq!(anchor["entry_type"], "user_anchor");
        assert_eq!(anchor["content"], "users");
    }

    #[test]
    fn test_registration_link_key_ignores_author() {
        let target = Entry::UserAnchor("x".into()).address();
        let a = Link::registration(target.clone(), AgentId::from("uhCAka"));
        let b = Link::registration(target, AgentId::from("uhCAkb"));
        assert_eq!(a.key(), b.key());
        assert_eq!(a.base, user_anchor_address());
    }
}
