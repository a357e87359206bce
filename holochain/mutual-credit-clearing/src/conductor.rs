//! Conductor - hosts zome instances and dispatches zome calls
//!
//! Each instance is one agent running the `mutual_credit_clearing` zome on
//! its own peer. Calls are scoped to the instance's agent; callers never pass
//! an identity. Results use Holochain's envelope:
//!
//! ```text
//! {"Ok": <value>}
//! {"Err": {"InvalidName": "..."}}
//! ```
//!
//! ## Zome functions
//!
//! | Function | Payload | Ok value |
//! |----------|---------|----------|
//! | `create_user` | `{"name": "Amy"}` | address |
//! | `get_users` | `{}` | `[{"entry": {"agent", "name"}, "address"}]` |
//! | `get_my_user` | `{}` | address or `null` |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::agent::{AgentId, AgentKey};
use crate::config::Config;
use crate::error::{ConductorError, RegistryError};
use crate::registry::UserRegistry;
use crate::store::{MemoryShard, Network, Peer, Shard, SledShard};

pub const ZOME_NAME: &str = "mutual_credit_clearing";

/// Error half of a zome call result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZomeApiError {
    InvalidName(String),
    AlreadyRegistered(String),
    StorageUnavailable(String),
}

impl From<RegistryError> for ZomeApiError {
    fn from(e: RegistryError) -> Self {
        match &e {
            RegistryError::InvalidName(inner) => ZomeApiError::InvalidName(inner.to_string()),
            RegistryError::AlreadyRegistered { .. } => ZomeApiError::AlreadyRegistered(e.to_string()),
            RegistryError::StorageUnavailable(inner) => {
                ZomeApiError::StorageUnavailable(inner.to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateUserInput {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoInput {}

pub struct Conductor {
    config: Config,
    network: Network,
    instances: BTreeMap<String, UserRegistry<Peer>>,
}

impl Conductor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            network: Network::new(),
            instances: BTreeMap::new(),
        }
    }

    /// Create a conductor with every instance listed in `config`
    pub async fn from_config(config: Config) -> Result<Self, ConductorError> {
        let names = config.instances.clone();
        let mut conductor = Self::new(config);
        for name in names {
            conductor.add_instance(&name).await?;
        }
        Ok(conductor)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Start an instance with a new agent, persisted if configured
    pub async fn add_instance(&mut self, name: &str) -> Result<AgentId, ConductorError> {
        if self.config.persist {
            let key = AgentKey::load_or_generate(self.config.key_path(name)).await?;
            let shard_path = self.config.shard_path(name);
            if let Some(parent) = shard_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let shard = SledShard::open(&shard_path)?;
            self.add_instance_with(name, key, Box::new(shard)).await
        } else {
            self.add_instance_with(name, AgentKey::generate(), Box::new(MemoryShard::new()))
                .await
        }
    }

    /// Start an instance with a given key and shard
    pub async fn add_instance_with(
        &mut self,
        name: &str,
        key: AgentKey,
        shard: Box<dyn Shard>,
    ) -> Result<AgentId, ConductorError> {
        if self.instances.contains_key(name) {
            return Err(ConductorError::DuplicateInstance(name.to_string()));
        }

        let registry_config = self.config.registry.clone();
        let peer = self
            .network
            .join(key, shard, registry_config.user_name_max_length)
            .await;
        let agent = peer.agent().clone();

        genesis(name, &agent);
        self.instances
            .insert(name.to_string(), UserRegistry::new(peer, registry_config));

        info!(instance = %name, agent = %agent, "Instance started");
        Ok(agent)
    }

    pub fn agent_of(&self, instance: &str) -> Option<&AgentId> {
        self.instances.get(instance).map(|r| r.store().agent())
    }

    pub fn peer(&self, instance: &str) -> Option<&Peer> {
        self.instances.get(instance).map(|r| r.store())
    }

    pub fn instance_names(&self) -> Vec<&str> {
        self.instances.keys().map(String::as_str).collect()
    }

    /// Gossip every published op to every peer
    pub async fn converge(&self) -> usize {
        self.network.converge().await
    }

    /// Call a zome function on an instance.
    ///
    /// Registry failures come back inside the `{"Err": ...}` envelope;
    /// `ConductorError` is reserved for calls that could not be dispatched.
    pub async fn call(
        &self,
        instance: &str,
        zome: &str,
        function: &str,
        payload: Value,
    ) -> Result<Value, ConductorError> {
        let registry = self
            .instances
            .get(instance)
            .ok_or_else(|| ConductorError::UnknownInstance(instance.to_string()))?;
        if zome != ZOME_NAME {
            return Err(ConductorError::UnknownZome(zome.to_string()));
        }

        let agent = registry.store().agent().clone();
        debug!(instance = %instance, function = %function, "Zome call");

        let result: Result<Value, ZomeApiError> = match function {
            "create_user" => {
                let input: CreateUserInput = parse_payload(function, payload)?;
                match registry.create_user(&input.name, &agent).await {
                    Ok(address) => Ok(serde_json::to_value(address)?),
                    Err(e) => Err(e.into()),
                }
            }
            "get_users" => {
                let _: NoInput = parse_payload(function, payload)?;
                match registry.get_users().await {
                    Ok(users) => Ok(serde_json::to_value(users)?),
                    Err(e) => Err(e.into()),
                }
            }
            "get_my_user" => {
                let _: NoInput = parse_payload(function, payload)?;
                match registry.get_my_user(&agent).await {
                    Ok(address) => Ok(serde_json::to_value(address)?),
                    Err(e) => Err(e.into()),
                }
            }
            other => return Err(ConductorError::UnknownFunction(other.to_string())),
        };

        Ok(serde_json::to_value(result)?)
    }
}

/// Instance initialization hook. The registry needs nothing committed up
/// front.
fn genesis(instance: &str, agent: &AgentId) {
    debug!(instance = %instance, agent = %agent, "Genesis");
}

fn parse_payload<T: DeserializeOwned>(function: &str, payload: Value) -> Result<T, ConductorError> {
    let payload = if payload.is_null() { json!({}) } else { payload };
    serde_json::from_value(payload).map_err(|e| ConductorError::InvalidPayload {
        function: function.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;

    async fn conductor() -> Conductor {
        Conductor::from_config(Config::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_from_config_starts_instances() {
        let conductor = conductor().await;
        assert_eq!(conductor.instance_names(), vec!["amy", "brad"]);
        assert_ne!(conductor.agent_of("amy"), conductor.agent_of("brad"));
        assert!(conductor.agent_of("carl").is_none());
    }

    #[tokio::test]
    async fn test_ok_envelope() {
        let conductor = conductor().await;

        let result = conductor
            .call("amy", ZOME_NAME, "get_users", json!({}))
            .await
            .unwrap();
        assert_eq!(result, json!({"Ok": []}));

        let result = conductor
            .call("amy", ZOME_NAME, "get_my_user", Value::Null)
            .await
            .unwrap();
        assert_eq!(result, json!({"Ok": null}));
    }

    #[tokio::test]
    async fn test_err_envelope() {
        let conductor = conductor().await;

        let result = conductor
            .call("amy", ZOME_NAME, "create_user", json!({"name": ""}))
            .await
            .unwrap();
        assert!(result["Err"]["InvalidName"].is_string());

        conductor
            .call("amy", ZOME_NAME, "create_user", json!({"name": "Amy"}))
            .await
            .unwrap();
        let result = conductor
            .call("amy", ZOME_NAME, "create_user", json!({"name": "Amy"}))
            .await
            .unwrap();
        assert!(result["Err"]["AlreadyRegistered"].is_string());
    }

    #[tokio::test]
    async fn test_storage_failure_envelope() {
        let conductor = conductor().await;
        conductor.peer("amy").unwrap().set_online(false).await;

        let result = conductor
            .call("amy", ZOME_NAME, "get_users", json!({}))
            .await
            .unwrap();
        assert!(result["Err"]["StorageUnavailable"].is_string());
    }

    #[tokio::test]
    async fn test_dispatch_errors() {
        let conductor = conductor().await;

        assert!(matches!(
            conductor.call("carl", ZOME_NAME, "get_users", json!({})).await,
            Err(ConductorError::UnknownInstance(_))
        ));
        assert!(matches!(
            conductor.call("amy", "ledger", "get_users", json!({})).await,
            Err(ConductorError::UnknownZome(_))
        ));
        assert!(matches!(
            conductor.call("amy", ZOME_NAME, "delete_user", json!({})).await,
            Err(ConductorError::UnknownFunction(_))
        ));
        assert!(matches!(
            conductor.call("amy", ZOME_NAME, "create_user", json!({"nom": "Amy"})).await,
            Err(ConductorError::InvalidPayload { .. })
        ));
        assert!(matches!(
            conductor.call("amy", ZOME_NAME, "get_users", json!({"extra": 1})).await,
            Err(ConductorError::InvalidPayload { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_instance_rejected() {
        let mut conductor = conductor().await;
        assert!(matches!(
            conductor.add_instance("amy").await,
            Err(ConductorError::DuplicateInstance(_))
        ));
    }

    #[tokio::test]
    async fn test_persisted_instance_keeps_identity_and_user() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = Config {
            data_dir: temp.path().to_path_buf(),
            persist: true,
            instances: vec!["amy".to_string()],
            registry: RegistryConfig::default(),
        };

        let (agent, address) = {
            let conductor = Conductor::from_config(config.clone()).await.unwrap();
            let result = conductor
                .call("amy", ZOME_NAME, "create_user", json!({"name": "Amy"}))
                .await
                .unwrap();
            (conductor.agent_of("amy").unwrap().clone(), result["Ok"].clone())
        };

        let conductor = Conductor::from_config(config).await.unwrap();
        assert_eq!(conductor.agent_of("amy"), Some(&agent));
        let result = conductor
            .call("amy", ZOME_NAME, "get_my_user", json!({}))
            .await
            .unwrap();
        assert_eq!(result["Ok"], address);
    }
}
