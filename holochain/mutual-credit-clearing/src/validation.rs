//! Registration rules
//!
//! [`validate_user_name`] is the local pre-write check the registry runs
//! before touching the store. [`validate_entry`] is the integrity check the
//! substrate runs on every entry, both when its author commits it and when
//! another peer receives it through gossip.

use crate::address::Address;
use crate::agent::{AgentId, Provenance};
use crate::entry::{Entry, User};
use crate::error::ValidationError;

/// Default upper bound on user name length, in characters
pub const DEFAULT_USER_NAME_MAX_LENGTH: usize = 50;

/// Where an entry is being validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryLifecycle {
    /// On the author's own source chain, at commit time
    Chain,
    /// On a receiving peer, after gossip
    Dht,
}

/// Check if user name string is valid
pub fn validate_user_name(name: &str, max_len: usize) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let len = name.chars().count();
    if len > max_len {
        return Err(ValidationError::NameTooLong { len, max: max_len });
    }

    Ok(())
}

/// Check that the author's chain has no user for `agent` yet.
pub fn validate_user_not_registered(chain: &[Entry], agent: &AgentId) -> Result<(), String> {
    let found = chain.iter().any(|entry| match entry {
        Entry::User(user) => &user.agent == agent,
        _ => false,
    });

    if found {
        return Err("Agent can only register once".to_string());
    }
    Ok(())
}

/// Integrity check for an entry about to be stored.
///
/// `chain` is the author's source chain and is only consulted for
/// [`EntryLifecycle::Chain`]; receiving peers can't see it.
pub fn validate_entry(
    entry: &Entry,
    address: &Address,
    provenance: &Provenance,
    chain: &[Entry],
    lifecycle: EntryLifecycle,
    max_name_len: usize,
) -> Result<(), String> {
    provenance.verify(address)?;

    match entry {
        Entry::User(user) => {
            validate_user(user, provenance, max_name_len)?;
            if lifecycle == EntryLifecycle::Chain {
                validate_user_not_registered(chain, &user.agent)?;
            }
            Ok(())
        }
        // Anchors are a central known location to link from; anyone may write one.
        Entry::UserAnchor(_) => Ok(()),
    }
}

fn validate_user(user: &User, provenance: &Provenance, max_name_len: usize) -> Result<(), String> {
    validate_user_name(&user.name, max_name_len).map_err(|e| e.to_string())?;

    if provenance.author != user.agent {
        return Err("Cannot register a user from another agent".to_string());
    }
    Ok(())
}
