//! User registry service
//!
//! Validation, duplicate detection and the store adapter wired together into
//! `create_user`, `get_users` and `get_my_user`. The service keeps no state of
//! its own beyond the store handle and its config, so any number of peers can
//! each have a registry in the same process.

use tracing::{debug, info};

use crate::address::Address;
use crate::agent::AgentId;
use crate::config::RegistryConfig;
use crate::entry::{GetResponse, User};
use crate::error::RegistryError;
use crate::store::RegistryStore;
use crate::validation::validate_user_name;

pub struct UserRegistry<S> {
    store: S,
    config: RegistryConfig,
}

impl<S: RegistryStore> UserRegistry<S> {
    pub fn new(store: S, config: RegistryConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register `name` as the user for `caller`.
    ///
    /// The name is validated before anything is read, and the duplicate check
    /// runs before anything is written, so a failed call leaves no trace.
    /// The duplicate check only sees what this peer can see; see
    /// [`crate::store::network`] for the race that leaves open.
    pub async fn create_user(&self, name: &str, caller: &AgentId) -> Result<Address, RegistryError> {
        validate_user_name(name, self.config.user_name_max_length)?;

        if let Some(existing) = self.store.get_by_identity(caller).await? {
            debug!(agent = %caller, address = %existing.address, "Agent already registered");
            return Err(RegistryError::AlreadyRegistered {
                agent: caller.clone(),
                address: existing.address,
            });
        }

        let user = User {
            agent: caller.clone(),
            name: name.to_string(),
        };
        let address = self.store.commit(&user, caller).await?;

        info!(agent = %caller, address = %address, "User registered");
        Ok(address)
    }

    /// All users visible to this peer, in peer-local order
    pub async fn get_users(&self) -> Result<Vec<GetResponse<User>>, RegistryError> {
        Ok(self.store.list_all().await?)
    }

    /// Address of the caller's own user, if this peer can see one
    pub async fn get_my_user(&self, caller: &AgentId) -> Result<Option<Address>, RegistryError> {
        Ok(self
            .store
            .get_by_identity(caller)
            .await?
            .map(|found| found.address))
    }
}
