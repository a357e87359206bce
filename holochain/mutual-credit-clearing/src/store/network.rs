//! In-process gossip network
//!
//! Stands in for the DHT so several peers can run in one process. Each
//! [`Peer`] commits to its own shard first (read-your-writes) and publishes
//! the resulting ops to the shared log. Nothing reaches other peers until
//! the network is told to gossip:
//!
//! - [`Network::converge`] delivers every published op to every online peer
//! - [`Network::deliver`] delivers one peer's ops to one other peer
//!
//! Receiving peers re-run entry validation and drop ops that fail it, the
//! same way a DHT authority would refuse to hold an invalid entry. An op's
//! registration link must point from the user anchor to the op's own entry
//! and carry the entry author.
//!
//! Every commit and every received op is written to the shard as one
//! [`ShardBatch`], so a storage failure leaves nothing behind and the call
//! can simply be retried.
//!
//! ## Registration race
//!
//! The duplicate check in the registry only sees what is visible on the
//! calling peer, and the source chain check only sees that peer's chain. Two
//! peers running the same agent key can therefore both register before
//! gossip reaches either of them. Identical content collapses to one entry
//! (same address, same link); differing names leave two users for one agent
//! once converged. This race is accepted, not resolved.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::agent::{AgentId, AgentKey};
use crate::entry::{
    user_anchor_address, Entry, GetResponse, Link, StoredEntry, User, USER_ANCHOR_ENTRY,
    USER_REGISTRATION_LINK,
};
use crate::error::StorageError;
use crate::store::shard::{MemoryShard, Shard, ShardBatch};
use crate::store::RegistryStore;
use crate::validation::{validate_entry, EntryLifecycle};

/// Index of a peer on its network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub usize);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// An authored entry (and its registration link, if any) on its way to
/// other peers
#[derive(Debug, Clone)]
struct PublishedOp {
    origin: PeerId,
    address: Address,
    stored: StoredEntry,
    link: Option<Link>,
}

type GossipLog = Arc<RwLock<Vec<PublishedOp>>>;

/// Shared gossip bus connecting peers
#[derive(Clone, Default)]
pub struct Network {
    log: GossipLog,
    peers: Arc<RwLock<Vec<Peer>>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer for `key` backed by `shard`
    pub async fn join(&self, key: AgentKey, shard: Box<dyn Shard>, max_name_length: usize) -> Peer {
        let mut peers = self.peers.write().await;
        let id = PeerId(peers.len());

        let peer = Peer {
            inner: Arc::new(PeerInner {
                id,
                key,
                log: self.log.clone(),
                max_name_length,
                state: RwLock::new(PeerState {
                    shard,
                    online: true,
                    delivered: HashSet::new(),
                }),
            }),
        };

        info!(peer = %id, agent = %peer.agent(), "Peer joined network");
        peers.push(peer.clone());
        peer
    }

    /// Add a peer with an in-memory shard
    pub async fn join_in_memory(&self, key: AgentKey, max_name_length: usize) -> Peer {
        self.join(key, Box::new(MemoryShard::new()), max_name_length).await
    }

    pub async fn peers(&self) -> Vec<Peer> {
        self.peers.read().await.clone()
    }

    /// Number of ops published so far
    pub async fn published(&self) -> usize {
        self.log.read().await.len()
    }

    /// Deliver every published op to every online peer.
    ///
    /// Returns the number of ops newly stored across all peers.
    pub async fn converge(&self) -> usize {
        let ops = self.log.read().await.clone();
        let peers = self.peers().await;

        let mut applied = 0;
        for peer in &peers {
            applied += peer.receive_all(&ops, |_| true).await;
        }

        debug!(ops = ops.len(), peers = peers.len(), applied, "Network converged");
        applied
    }

    /// Deliver only the ops authored on `from` to `to`.
    pub async fn deliver(&self, from: &Peer, to: &Peer) -> usize {
        let ops = self.log.read().await.clone();
        let origin = from.id();
        let applied = to.receive_all(&ops, |op| op.origin == origin).await;

        debug!(from = %origin, to = %to.id(), applied, "Delivered ops");
        applied
    }
}

/// One agent's node: its key, source chain and local view of the DHT.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    id: PeerId,
    key: AgentKey,
    log: GossipLog,
    max_name_length: usize,
    state: RwLock<PeerState>,
}

struct PeerState {
    shard: Box<dyn Shard>,
    online: bool,
    /// Log indices already seen by this peer (applied, rejected or authored)
    delivered: HashSet<usize>,
}

impl PeerState {
    fn ensure_online(&self, id: PeerId) -> Result<(), StorageError> {
        if self.online {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!("{} is offline", id)))
        }
    }

    fn chain_entries(&self) -> Result<Vec<Entry>, StorageError> {
        let mut entries = Vec::new();
        for address in self.shard.chain()? {
            if let Some(stored) = self.shard.get_entry(&address)? {
                entries.push(stored.entry);
            }
        }
        Ok(entries)
    }

    /// Follow the registration links from the user anchor
    fn users(&self) -> Result<Vec<GetResponse<User>>, StorageError> {
        let links = self
            .shard
            .links(&user_anchor_address(), USER_REGISTRATION_LINK)?;

        let mut users = Vec::with_capacity(links.len());
        for link in links {
            match self.shard.get_entry(&link.target)? {
                Some(StoredEntry {
                    entry: Entry::User(user),
                    ..
                }) => users.push(GetResponse {
                    entry: user,
                    address: link.target,
                }),
                _ => warn!(target = %link.target, "Registration link without user entry"),
            }
        }
        Ok(users)
    }
}

impl Peer {
    pub fn id(&self) -> PeerId {
        self.inner.id
    }

    pub fn agent(&self) -> &AgentId {
        self.inner.key.agent()
    }

    /// Take the peer on or off the network. Offline peers fail every store
    /// call and receive no gossip.
    pub async fn set_online(&self, online: bool) {
        self.inner.state.write().await.online = online;
        info!(peer = %self.id(), online, "Peer availability changed");
    }

    pub async fn is_online(&self) -> bool {
        self.inner.state.read().await.online
    }

    /// Entries authored on this peer, oldest first
    pub async fn source_chain(&self) -> Result<Vec<Entry>, StorageError> {
        self.inner.state.read().await.chain_entries()
    }

    async fn receive_all<F>(&self, ops: &[PublishedOp], filter: F) -> usize
    where
        F: Fn(&PublishedOp) -> bool,
    {
        let mut state = self.inner.state.write().await;
        if !state.online {
            return 0;
        }

        let mut applied = 0;
        for (index, op) in ops.iter().enumerate() {
            if state.delivered.contains(&index) || !filter(op) {
                continue;
            }
            match self.apply(&mut state, op) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => {
                    // Leave undelivered so a later round retries it
                    warn!(peer = %self.id(), address = %op.address, error = %e, "Failed to store gossiped op");
                    continue;
                }
            }
            state.delivered.insert(index);
        }

        if applied > 0 {
            if let Err(e) = state.shard.flush() {
                warn!(peer = %self.id(), error = %e, "Failed to flush shard");
            }
        }
        applied
    }

    /// Validate and store one gossiped op. `Ok(false)` means rejected.
    fn apply(&self, state: &mut PeerState, op: &PublishedOp) -> Result<bool, StorageError> {
        if op.stored.entry.address() != op.address {
            warn!(peer = %self.id(), address = %op.address, "Rejected op: content does not match address");
            return Ok(false);
        }

        if let Err(reason) = validate_entry(
            &op.stored.entry,
            &op.address,
            &op.stored.provenance,
            &[],
            EntryLifecycle::Dht,
            self.inner.max_name_length,
        ) {
            warn!(peer = %self.id(), address = %op.address, reason = %reason, "Rejected gossiped entry");
            return Ok(false);
        }

        if let Some(link) = &op.link {
            if let Err(reason) = check_registration_link(op, link) {
                warn!(peer = %self.id(), address = %op.address, reason = %reason, "Rejected gossiped link");
                return Ok(false);
            }
        }

        state.shard.apply_batch(&ShardBatch {
            entries: vec![(op.address.clone(), op.stored.clone())],
            chain: Vec::new(),
            links: op.link.iter().cloned().collect(),
        })?;
        Ok(true)
    }

    async fn publish(&self, state: &mut PeerState, ops: Vec<PublishedOp>) {
        let mut log = self.inner.log.write().await;
        for op in ops {
            state.delivered.insert(log.len());
            log.push(op);
        }
    }

    fn stored(&self, entry: Entry) -> (Address, StoredEntry) {
        let address = entry.address();
        let provenance = self.inner.key.sign(&address);
        (address, StoredEntry { entry, provenance })
    }
}

/// A registration link may only index the user entry it travels with
fn check_registration_link(op: &PublishedOp, link: &Link) -> Result<(), String> {
    if !matches!(op.stored.entry, Entry::User(_)) {
        return Err("Link attached to a non-user entry".to_string());
    }
    if link.link_type != USER_REGISTRATION_LINK || link.base != user_anchor_address() {
        return Err("Link is not a user registration".to_string());
    }
    if link.target != op.address {
        return Err("Link target does not match entry".to_string());
    }
    if link.author != op.stored.provenance.author {
        return Err("Link author does not match entry author".to_string());
    }
    Ok(())
}

#[async_trait]
impl RegistryStore for Peer {
    async fn commit(&self, user: &User, author: &AgentId) -> Result<Address, StorageError> {
        let mut state = self.inner.state.write().await;
        state.ensure_online(self.id())?;

        if author != self.agent() || &user.agent != author {
            return Err(StorageError::ValidationRejected(
                "Cannot register a user from another agent".to_string(),
            ));
        }

        let (address, stored) = self.stored(Entry::User(user.clone()));
        let link = Link::registration(address.clone(), author.clone());

        let entry_held = state.shard.has_entry(&address)?;
        if entry_held
            && state
                .shard
                .links(&user_anchor_address(), USER_REGISTRATION_LINK)?
                .iter()
                .any(|l| l.key() == link.key())
        {
            debug!(peer = %self.id(), address = %address, "User already registered on this peer");
            return Ok(address);
        }

        let on_chain = state.shard.chain()?.contains(&address);

        // Re-registering the same content only repairs the index
        let mut chain = state.chain_entries()?;
        chain.retain(|e| e != &stored.entry);
        validate_entry(
            &stored.entry,
            &address,
            &stored.provenance,
            &chain,
            EntryLifecycle::Chain,
            self.inner.max_name_length,
        )
        .map_err(StorageError::ValidationRejected)?;

        let mut batch = ShardBatch::default();
        let mut ops = Vec::with_capacity(2);

        let (anchor_address, anchor) = self.stored(Entry::UserAnchor(USER_ANCHOR_ENTRY.to_string()));
        if !state.shard.has_entry(&anchor_address)? {
            batch.entries.push((anchor_address.clone(), anchor.clone()));
            batch.chain.push(anchor_address.clone());
            ops.push(PublishedOp {
                origin: self.id(),
                address: anchor_address,
                stored: anchor,
                link: None,
            });
        }

        if !entry_held {
            batch.entries.push((address.clone(), stored.clone()));
        }
        if !on_chain {
            batch.chain.push(address.clone());
        }
        batch.links.push(link.clone());

        state.shard.apply_batch(&batch)?;

        ops.push(PublishedOp {
            origin: self.id(),
            address: address.clone(),
            stored,
            link: Some(link),
        });
        self.publish(&mut state, ops).await;
        state.shard.flush()?;

        info!(peer = %self.id(), agent = %author, address = %address, name = %user.name, "Committed user");
        Ok(address)
    }

    async fn list_all(&self) -> Result<Vec<GetResponse<User>>, StorageError> {
        let state = self.inner.state.read().await;
        state.ensure_online(self.id())?;

        let users = state.users()?;
        debug!(peer = %self.id(), count = users.len(), "Listed users");
        Ok(users)
    }

    async fn get_by_identity(
        &self,
        agent: &AgentId,
    ) -> Result<Option<GetResponse<User>>, StorageError> {
        let state = self.inner.state.read().await;
        state.ensure_online(self.id())?;

        Ok(state.users()?.into_iter().find(|u| &u.entry.agent == agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::error::RegistryError;
    use crate::registry::UserRegistry;
    use crate::validation::DEFAULT_USER_NAME_MAX_LENGTH as MAX;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory shard that fails its next `failures` batches
    struct FlakyShard {
        inner: MemoryShard,
        failures: Arc<AtomicUsize>,
    }

    impl Shard for FlakyShard {
        fn put_entry(&mut self, address: &Address, stored: &StoredEntry) -> Result<(), StorageError> {
            self.inner.put_entry(address, stored)
        }

        fn get_entry(&self, address: &Address) -> Result<Option<StoredEntry>, StorageError> {
            self.inner.get_entry(address)
        }

        fn add_link(&mut self, link: &Link) -> Result<bool, StorageError> {
            self.inner.add_link(link)
        }

        fn links(&self, base: &Address, link_type: &str) -> Result<Vec<Link>, StorageError> {
            self.inner.links(base, link_type)
        }

        fn append_to_chain(&mut self, address: &Address) -> Result<(), StorageError> {
            self.inner.append_to_chain(address)
        }

        fn chain(&self) -> Result<Vec<Address>, StorageError> {
            self.inner.chain()
        }

        fn apply_batch(&mut self, batch: &ShardBatch) -> Result<(), StorageError> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StorageError::Database("disk full".to_string()));
            }
            self.inner.apply_batch(batch)
        }
    }

    async fn join_flaky(network: &Network, seed: u8, failures: usize) -> Peer {
        let shard = FlakyShard {
            inner: MemoryShard::new(),
            failures: Arc::new(AtomicUsize::new(failures)),
        };
        network
            .join(AgentKey::from_seed([seed; 32]), Box::new(shard), MAX)
            .await
    }

    fn user(key: &AgentKey, name: &str) -> User {
        User {
            agent: key.agent().clone(),
            name: name.to_string(),
        }
    }

    async fn two_peers() -> (Network, Peer, Peer) {
        let network = Network::new();
        let amy = network.join_in_memory(AgentKey::from_seed([1u8; 32]), MAX).await;
        let brad = network.join_in_memory(AgentKey::from_seed([2u8; 32]), MAX).await;
        (network, amy, brad)
    }

    #[tokio::test]
    async fn test_commit_is_visible_locally_before_gossip() {
        let (_network, amy, brad) = two_peers().await;
        let key = AgentKey::from_seed([1u8; 32]);

        let address = amy.commit(&user(&key, "Amy"), amy.agent()).await.unwrap();

        let local = amy.list_all().await.unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].address, address);
        assert!(brad.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_converge_replicates_to_other_peers() {
        let (network, amy, brad) = two_peers().await;
        let key = AgentKey::from_seed([1u8; 32]);
        let address = amy.commit(&user(&key, "Amy"), amy.agent()).await.unwrap();

        // anchor + user
        assert_eq!(network.published().await, 2);
        assert_eq!(network.converge().await, 2);
        assert_eq!(network.converge().await, 0);

        let found = brad.get_by_identity(amy.agent()).await.unwrap().unwrap();
        assert_eq!(found.address, address);
        assert_eq!(found.entry.name, "Amy");
    }

    #[tokio::test]
    async fn test_deliver_is_directional() {
        let network = Network::new();
        let amy = network.join_in_memory(AgentKey::from_seed([1u8; 32]), MAX).await;
        let brad = network.join_in_memory(AgentKey::from_seed([2u8; 32]), MAX).await;
        let carl = network.join_in_memory(AgentKey::from_seed([3u8; 32]), MAX).await;

        amy.commit(&user(&AgentKey::from_seed([1u8; 32]), "Amy"), amy.agent())
            .await
            .unwrap();
        brad.commit(&user(&AgentKey::from_seed([2u8; 32]), "Brad"), brad.agent())
            .await
            .unwrap();

        network.deliver(&amy, &carl).await;
        let names: Vec<String> = carl
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.entry.name)
            .collect();
        assert_eq!(names, vec!["Amy"]);
        assert_eq!(amy.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_for_other_agent_rejected() {
        let (_network, amy, brad) = two_peers().await;
        let brad_key = AgentKey::from_seed([2u8; 32]);

        let err = amy
            .commit(&user(&brad_key, "Brad"), brad.agent())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ValidationRejected(_)));
        assert!(amy.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_identical_content_is_idempotent() {
        let (network, amy, _brad) = two_peers().await;
        let key = AgentKey::from_seed([1u8; 32]);

        let first = amy.commit(&user(&key, "Amy"), amy.agent()).await.unwrap();
        let second = amy.commit(&user(&key, "Amy"), amy.agent()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(amy.list_all().await.unwrap().len(), 1);
        assert_eq!(network.published().await, 2);
    }

    #[tokio::test]
    async fn test_second_user_on_same_chain_rejected() {
        let (_network, amy, _brad) = two_peers().await;
        let key = AgentKey::from_seed([1u8; 32]);

        amy.commit(&user(&key, "Amy"), amy.agent()).await.unwrap();
        let err = amy
            .commit(&user(&key, "Amy Two"), amy.agent())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::ValidationRejected("Agent can only register once".to_string())
        );
    }

    #[tokio::test]
    async fn test_offline_peer_fails_and_catches_up() {
        let (network, amy, brad) = two_peers().await;
        let key = AgentKey::from_seed([1u8; 32]);

        brad.set_online(false).await;
        assert!(matches!(
            brad.list_all().await,
            Err(StorageError::Unavailable(_))
        ));

        amy.commit(&user(&key, "Amy"), amy.agent()).await.unwrap();
        network.converge().await;

        brad.set_online(true).await;
        assert!(brad.list_all().await.unwrap().is_empty());
        network.converge().await;
        assert_eq!(brad.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_gossip_is_dropped() {
        let (network, amy, brad) = two_peers().await;
        let key = AgentKey::from_seed([1u8; 32]);

        // A user with a name over the bound, signed correctly, pushed straight
        // onto the log as if a misbehaving node had authored it.
        let (address, stored) = amy.stored(Entry::User(user(&key, &"a".repeat(76))));
        network.log.write().await.push(PublishedOp {
            origin: amy.id(),
            address: address.clone(),
            stored,
            link: Some(Link::registration(address, key.agent().clone())),
        });

        assert_eq!(network.converge().await, 0);
        assert!(brad.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_agent_on_two_peers_can_race() {
        let network = Network::new();
        let laptop = network.join_in_memory(AgentKey::from_seed([9u8; 32]), MAX).await;
        let phone = network.join_in_memory(AgentKey::from_seed([9u8; 32]), MAX).await;
        let key = AgentKey::from_seed([9u8; 32]);

        laptop.commit(&user(&key, "Amy"), laptop.agent()).await.unwrap();
        phone.commit(&user(&key, "Amy B"), phone.agent()).await.unwrap();
        network.converge().await;

        let users = laptop.list_all().await.unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| &u.entry.agent == key.agent()));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_nothing_and_retry_registers() {
        let network = Network::new();
        let amy = join_flaky(&network, 1, 1).await;
        let brad = network.join_in_memory(AgentKey::from_seed([2u8; 32]), MAX).await;
        let registry = UserRegistry::new(amy.clone(), RegistryConfig::default());

        let err = registry.create_user("Amy", amy.agent()).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::StorageUnavailable(StorageError::Database(_))
        ));
        assert!(amy.source_chain().await.unwrap().is_empty());
        assert_eq!(registry.get_my_user(amy.agent()).await.unwrap(), None);
        assert_eq!(network.published().await, 0);

        let address = registry.create_user("Amy", amy.agent()).await.unwrap();
        assert_eq!(
            registry.get_my_user(amy.agent()).await.unwrap(),
            Some(address.clone())
        );
        assert_eq!(registry.get_users().await.unwrap().len(), 1);
        assert_eq!(network.published().await, 2);

        network.converge().await;
        let seen = brad.get_by_identity(amy.agent()).await.unwrap().unwrap();
        assert_eq!(seen.address, address);
    }

    #[tokio::test]
    async fn test_commit_repairs_missing_registration_link() {
        let network = Network::new();
        let key = AgentKey::from_seed([1u8; 32]);

        // Entry and chain written without the link that indexes them
        let (address, stored) = {
            let entry = Entry::User(user(&key, "Amy"));
            let address = entry.address();
            let provenance = key.sign(&address);
            (address, StoredEntry { entry, provenance })
        };
        let mut shard = MemoryShard::new();
        shard.put_entry(&address, &stored).unwrap();
        shard.append_to_chain(&address).unwrap();

        let amy = network.join(key.clone(), Box::new(shard), MAX).await;
        let brad = network.join_in_memory(AgentKey::from_seed([2u8; 32]), MAX).await;
        assert!(amy.list_all().await.unwrap().is_empty());

        let repaired = amy.commit(&user(&key, "Amy"), amy.agent()).await.unwrap();
        assert_eq!(repaired, address);
        assert_eq!(amy.list_all().await.unwrap().len(), 1);
        assert_eq!(network.published().await, 2);

        // Still one user entry on the chain
        let users_on_chain = amy
            .source_chain()
            .await
            .unwrap()
            .into_iter()
            .filter(|e| matches!(e, Entry::User(_)))
            .count();
        assert_eq!(users_on_chain, 1);

        network.converge().await;
        assert_eq!(brad.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_gossip_write_is_retried() {
        let network = Network::new();
        let amy = network.join_in_memory(AgentKey::from_seed([1u8; 32]), MAX).await;
        let brad = join_flaky(&network, 2, 2).await;

        amy.commit(&user(&AgentKey::from_seed([1u8; 32]), "Amy"), amy.agent())
            .await
            .unwrap();

        // Both ops fail to store on brad and stay pending
        assert_eq!(network.converge().await, 0);
        assert!(brad.list_all().await.unwrap().is_empty());

        assert_eq!(network.converge().await, 2);
        let seen = brad.list_all().await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].entry.name, "Amy");
    }

    #[tokio::test]
    async fn test_held_user_of_other_agent_cannot_be_committed() {
        let (network, amy, brad) = two_peers().await;
        let brad_user = user(&AgentKey::from_seed([2u8; 32]), "Brad");

        brad.commit(&brad_user, brad.agent()).await.unwrap();
        network.converge().await;

        let err = amy.commit(&brad_user, amy.agent()).await.unwrap_err();
        assert_eq!(
            err,
            StorageError::ValidationRejected("Cannot register a user from another agent".to_string())
        );
        assert_eq!(amy.get_by_identity(amy.agent()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_gossip_with_mismatched_link_is_dropped() {
        let (network, amy, brad) = two_peers().await;
        let amy_key = AgentKey::from_seed([1u8; 32]);
        let brad_key = AgentKey::from_seed([2u8; 32]);

        let (address, stored) = amy.stored(Entry::User(user(&amy_key, "Amy")));
        let (other, _) = amy.stored(Entry::User(user(&amy_key, "Someone else")));
        let (anchor, anchor_stored) =
            amy.stored(Entry::UserAnchor(USER_ANCHOR_ENTRY.to_string()));

        let bad_links = vec![
            Link::registration(other, amy_key.agent().clone()),
            Link::registration(address.clone(), brad_key.agent().clone()),
            Link {
                base: address.clone(),
                ..Link::registration(address.clone(), amy_key.agent().clone())
            },
        ];
        {
            let mut log = network.log.write().await;
            for link in bad_links {
                log.push(PublishedOp {
                    origin: amy.id(),
                    address: address.clone(),
                    stored: stored.clone(),
                    link: Some(link),
                });
            }
            // A link riding on the anchor entry
            log.push(PublishedOp {
                origin: amy.id(),
                address: anchor.clone(),
                stored: anchor_stored,
                link: Some(Link::registration(address.clone(), amy_key.agent().clone())),
            });
        }

        assert_eq!(network.converge().await, 0);
        assert!(brad.list_all().await.unwrap().is_empty());

        let state = brad.inner.state.read().await;
        assert!(!state.shard.has_entry(&address).unwrap());
        assert!(!state.shard.has_entry(&anchor).unwrap());
    }
}
