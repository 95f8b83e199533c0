//! # Local Node
//!
//! Owns the peer table and is the single gate every relayed object passes:
//!
//! ```text
//! relay(item)
//!   ├─ seen within the TTL? ─────────────── drop
//!   ├─ block ─▶ ledger add_block ─┐
//!   ├─ tx ────▶ pool add_transaction ─┤ refused ─▶ drop
//!   ├─ consensus ─▶ own verify ───┘
//!   └─ announce to peers, cache for getdata, publish InventoryReceived
//! ```
//!
//! Transactions from peers skip the inline check: they are staged in the
//! memory pool and announced when the pool admits them.

use super::events::NetworkEvent;
use super::remote_node::{run_session, Ending, RemoteNode};
use crate::adapters::{tcp, websocket};
use crate::config::NetworkConfig;
use crate::domain::{
    unix_time, AddrPayload, Command, InvPayload, InventoryItem, KnownHashes, Message, Missions,
    NetworkAddressWithTime, NetworkResult, RelayCache, MAX_ADDRESSES, NODE_NETWORK,
};
use crate::ports::Connection;
use dc_02_ledger::{AddBlockResult, Blockchain, InventoryType};
use dc_05_mempool::{MemoryPool, MempoolEvent};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use shared_bus::{EventPublisher, InMemoryEventBus, Subscription};
use shared_types::UInt256;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct LocalNode {
    config: NetworkConfig,
    chain: Arc<Blockchain>,
    mempool: Arc<MemoryPool>,
    magic: u32,
    nonce: u32,
    known_hashes: Mutex<KnownHashes>,
    missions: Mutex<Missions>,
    relay_cache: Mutex<RelayCache>,
    peers: RwLock<HashMap<SocketAddr, Arc<RemoteNode>>>,
    unconnected: Mutex<HashSet<SocketAddr>>,
    pending: Mutex<HashSet<SocketAddr>>,
    bad_peers: Mutex<HashSet<SocketAddr>>,
    events: InMemoryEventBus<NetworkEvent>,
}

impl LocalNode {
    pub fn new(config: NetworkConfig, chain: Arc<Blockchain>, mempool: Arc<MemoryPool>) -> Self {
        let pool_config = mempool.config();
        let known_hashes =
            KnownHashes::new(pool_config.known_hash_ttl, pool_config.known_hash_capacity);
        Self {
            magic: chain.settings().magic,
            nonce: rand::random(),
            known_hashes: Mutex::new(known_hashes),
            missions: Mutex::new(Missions::new()),
            relay_cache: Mutex::new(RelayCache::default()),
            peers: RwLock::new(HashMap::new()),
            unconnected: Mutex::new(HashSet::new()),
            pending: Mutex::new(HashSet::new()),
            bad_peers: Mutex::new(HashSet::new()),
            events: InMemoryEventBus::new(),
            config,
            chain,
            mempool,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<Blockchain> {
        &self.chain
    }

    pub fn mempool(&self) -> &Arc<MemoryPool> {
        &self.mempool
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    /// Random per-process value used to detect connections to ourselves.
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn subscribe(&self) -> Subscription<NetworkEvent> {
        self.events.subscribe()
    }

    pub fn peers(&self) -> Vec<Arc<RemoteNode>> {
        self.peers.read().values().cloned().collect()
    }

    /// Peers that completed the handshake.
    pub fn ready_peers(&self) -> Vec<Arc<RemoteNode>> {
        self.peers
            .read()
            .values()
            .filter(|peer| peer.is_ready())
            .cloned()
            .collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn unconnected_count(&self) -> usize {
        self.unconnected.lock().len()
    }

    pub fn is_bad(&self, endpoint: &SocketAddr) -> bool {
        self.bad_peers.lock().contains(endpoint)
    }

    /// Admit `item` and gossip it. Returns false when it was a repeat or
    /// was refused.
    pub fn relay(&self, item: InventoryItem) -> bool {
        if let InventoryItem::Transaction(tx) = &item {
            if tx.is_miner() {
                return false;
            }
        }
        let hash = item.hash();
        if !self.known_hashes.lock().try_add(hash, Instant::now()) {
            return false;
        }
        match &item {
            InventoryItem::Block(block) => match self.chain.add_block(block.clone()) {
                Ok(AddBlockResult::Accepted | AddBlockResult::Cached) => {}
                Ok(result) => {
                    debug!(block = %hash, ?result, "Block not relayed");
                    return false;
                }
                Err(error) => {
                    warn!(block = %hash, %error, "Block could not be added");
                    return false;
                }
            },
            // the pool announces what it admits, see relay_pool_additions
            InventoryItem::Transaction(tx) => {
                return match self.mempool.add_transaction(tx.clone()) {
                    Ok(()) => true,
                    Err(error) => {
                        debug!(tx = %hash, %error, "Transaction not relayed");
                        false
                    }
                };
            }
            InventoryItem::Consensus(payload) => {
                if !payload.verify(&self.chain.snapshot(), self.chain.verifier().as_ref()) {
                    debug!(payload = %hash, "Consensus payload failed verification");
                    return false;
                }
            }
        }
        self.relay_directly(&item);
        self.events.publish(NetworkEvent::InventoryReceived {
            item: Arc::new(item),
        });
        true
    }

    /// Announce `item` to every peer and keep it for their `getdata`.
    /// Returns how many peers it was announced to.
    pub fn relay_directly(&self, item: &InventoryItem) -> usize {
        let announced = self
            .ready_peers()
            .iter()
            .filter(|peer| peer.relay(item))
            .count();
        self.relay_cache.lock().add(item.clone());
        announced
    }

    /// Entry point for objects a peer delivered.
    pub fn on_inventory_received(&self, item: InventoryItem) {
        match item {
            InventoryItem::Transaction(tx) => {
                if tx.is_miner() {
                    return;
                }
                let hash = tx.hash();
                if !self.known_hashes.lock().try_add(hash, Instant::now()) {
                    return;
                }
                if self.mempool.contains(&hash)
                    || self.chain.contains_transaction(&hash).unwrap_or(false)
                {
                    return;
                }
                self.mempool.stage(tx);
            }
            other => {
                self.relay(other);
            }
        }
    }

    /// Ask every peer for `hashes`, admitting them again even if they were
    /// seen recently.
    pub fn request_transactions(&self, hashes: &[UInt256]) {
        {
            let mut known = self.known_hashes.lock();
            for hash in hashes {
                known.remove(hash);
            }
        }
        let groups = InvPayload::create_group(InventoryType::Transaction, hashes);
        for peer in self.ready_peers() {
            for group in &groups {
                peer.enqueue(Message::new(Command::GetData, group));
            }
        }
    }

    /// Ask every peer for the contents of its memory pool.
    pub fn synchronize_memory_pool(&self) {
        for peer in self.ready_peers() {
            peer.enqueue(Message::empty(Command::MemPool));
        }
    }

    pub fn is_known(&self, hash: &UInt256, now: Instant) -> bool {
        self.known_hashes.lock().contains(hash, now)
    }

    pub fn cached(&self, hash: &UInt256) -> Option<InventoryItem> {
        self.relay_cache.lock().get(hash).cloned()
    }

    pub(crate) fn claim_missions(&self, hashes: Vec<UInt256>) -> Vec<UInt256> {
        self.missions.lock().claim(hashes)
    }

    pub(crate) fn complete_mission(&self, hash: &UInt256) {
        self.missions.lock().complete(hash);
    }

    /// Remember candidate endpoints, skipping ourselves, bad and connected
    /// peers, up to the unconnected limit.
    pub fn add_peers<I>(&self, endpoints: I)
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        let connected: HashSet<SocketAddr> = self
            .peers
            .read()
            .values()
            .flat_map(|peer| [Some(peer.remote()), peer.listener()])
            .flatten()
            .collect();
        let bad = self.bad_peers.lock();
        let mut unconnected = self.unconnected.lock();
        for endpoint in endpoints {
            if unconnected.len() >= self.config.unconnected_max {
                break;
            }
            if endpoint.port() == 0
                || self.is_local(&endpoint)
                || bad.contains(&endpoint)
                || connected.contains(&endpoint)
            {
                continue;
            }
            unconnected.insert(endpoint);
        }
    }

    /// Up to [`MAX_ADDRESSES`] listener endpoints of connected peers,
    /// chosen at random.
    pub fn addr_payload(&self) -> Option<AddrPayload> {
        let endpoints: Vec<SocketAddr> = self
            .ready_peers()
            .iter()
            .filter_map(|peer| peer.listener())
            .collect();
        if endpoints.is_empty() {
            return None;
        }
        let now = unix_time();
        let addresses = endpoints
            .choose_multiple(&mut rand::thread_rng(), MAX_ADDRESSES)
            .map(|endpoint| NetworkAddressWithTime::new(*endpoint, NODE_NETWORK, now))
            .collect();
        Some(AddrPayload { addresses })
    }

    fn is_local(&self, endpoint: &SocketAddr) -> bool {
        self.config.port != 0
            && endpoint.port() == self.config.port
            && (endpoint.ip().is_loopback() || endpoint.ip().is_unspecified())
    }

    /// Another ready peer at the same address already uses `nonce`.
    pub(crate) fn is_duplicate(&self, peer: &RemoteNode, nonce: u32) -> bool {
        self.peers.read().values().any(|other| {
            other.remote() != peer.remote()
                && other.remote().ip() == peer.remote().ip()
                && other.is_ready()
                && other.version().is_some_and(|version| version.nonce == nonce)
        })
    }

    pub(crate) fn on_peer_ready(&self, peer: &RemoteNode) {
        let start_height = peer.start_height();
        info!(peer = %peer.remote(), start_height, "Peer connected");
        self.events.publish(NetworkEvent::PeerConnected {
            peer: peer.remote(),
            start_height,
        });
    }

    /// Register `connection` and run its session in the background.
    pub fn add_connection(
        self: &Arc<Self>,
        connection: Connection,
        listener: Option<SocketAddr>,
    ) -> Arc<RemoteNode> {
        let remote = connection.remote;
        let peer = Arc::new(RemoteNode::new(remote, listener));
        if let Some(previous) = self.peers.write().insert(remote, Arc::clone(&peer)) {
            previous.disconnect();
        }
        if let Some(listener) = listener {
            self.unconnected.lock().remove(&listener);
        }
        let node = Arc::clone(self);
        let session_peer = Arc::clone(&peer);
        tokio::spawn(async move {
            let ending = run_session(Arc::clone(&node), Arc::clone(&session_peer), connection).await;
            node.remove_peer(&session_peer, ending);
        });
        peer
    }

    fn remove_peer(&self, peer: &Arc<RemoteNode>, ending: Ending) {
        peer.disconnect();
        {
            let mut peers = self.peers.write();
            if peers
                .get(&peer.remote())
                .is_some_and(|current| Arc::ptr_eq(current, peer))
            {
                peers.remove(&peer.remote());
            }
        }
        let missions = peer.take_missions();
        self.missions.lock().release(&missions);

        let endpoint = peer.listener().unwrap_or(peer.remote());
        match ending {
            Ending::Bad(error) => {
                warn!(peer = %peer.remote(), %error, "Peer misbehaved, disconnecting");
                self.bad_peers.lock().insert(endpoint);
            }
            Ending::Quiet(error) => {
                debug!(peer = %peer.remote(), %error, "Session ended");
            }
        }
        if peer.is_ready() {
            info!(peer = %peer.remote(), "Peer disconnected");
        }
        self.events
            .publish(NetworkEvent::PeerDisconnected { peer: peer.remote() });
    }

    fn is_connected_to(&self, endpoint: &SocketAddr) -> bool {
        self.peers
            .read()
            .values()
            .any(|peer| peer.remote() == *endpoint || peer.listener() == Some(*endpoint))
    }

    /// Dial `endpoint` unless it is ourselves, already connected or already
    /// being dialled.
    pub async fn connect_to(self: &Arc<Self>, endpoint: SocketAddr) -> Option<Arc<RemoteNode>> {
        if self.is_local(&endpoint) || self.is_connected_to(&endpoint) {
            return None;
        }
        if !self.pending.lock().insert(endpoint) {
            return None;
        }
        let dialled = tcp::connect(endpoint, self.magic, self.config.handshake_timeout).await;
        self.pending.lock().remove(&endpoint);
        match dialled {
            Ok(connection) => Some(self.add_connection(connection, Some(endpoint))),
            Err(error) => {
                debug!(peer = %endpoint, %error, "Connect failed");
                None
            }
        }
    }

    /// One round of the connection loop: dial remembered candidates, else
    /// ask peers for more, else fall back to the seed list.
    pub async fn connect_round(self: &Arc<Self>) {
        let connected = self.peer_count();
        if connected >= self.config.connected_max {
            return;
        }
        let wanted = self.config.connected_max - connected;
        let candidates: Vec<SocketAddr> = {
            let mut unconnected = self.unconnected.lock();
            let picked: Vec<SocketAddr> = unconnected.iter().copied().take(wanted).collect();
            for endpoint in &picked {
                unconnected.remove(endpoint);
            }
            picked
        };
        if !candidates.is_empty() {
            join_all(candidates.into_iter().map(|endpoint| self.connect_to(endpoint))).await;
        } else if connected > 0 {
            for peer in self.ready_peers() {
                peer.request_peers();
            }
        } else {
            let seeds = join_all(self.config.seed_list.iter().map(|seed| resolve(seed))).await;
            join_all(seeds.into_iter().flatten().map(|endpoint| self.connect_to(endpoint))).await;
        }
    }

    fn accepts_inbound(&self) -> bool {
        self.peer_count() < self.config.desired_available
    }

    async fn listen_tcp(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, remote)) => {
                    if !self.accepts_inbound() {
                        debug!(peer = %remote, "Peer table full, refusing connection");
                        continue;
                    }
                    match tcp::tcp_connection(stream, self.magic) {
                        Ok(connection) => {
                            self.add_connection(connection, None);
                        }
                        Err(error) => debug!(peer = %remote, %error, "Accept failed"),
                    }
                }
                Err(error) => warn!(%error, "TCP accept failed"),
            }
        }
    }

    async fn listen_ws(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, remote)) => {
                    if !self.accepts_inbound() {
                        debug!(peer = %remote, "Peer table full, refusing WebSocket");
                        continue;
                    }
                    let node = Arc::clone(&self);
                    tokio::spawn(async move {
                        match websocket::accept(stream, node.magic).await {
                            Ok(connection) => {
                                node.add_connection(connection, None);
                            }
                            Err(error) => debug!(peer = %remote, %error, "WebSocket upgrade failed"),
                        }
                    });
                }
                Err(error) => warn!(%error, "WebSocket accept failed"),
            }
        }
    }

    /// Announce transactions as the memory pool admits them.
    pub fn spawn_pool_relay(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut added = self.mempool.subscribe();
        let node = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = added.recv() => event,
                };
                let Some(MempoolEvent::TransactionsAdded { transactions }) = event else {
                    break;
                };
                for tx in transactions {
                    let item = InventoryItem::Transaction((*tx).clone());
                    node.relay_directly(&item);
                    node.events.publish(NetworkEvent::InventoryReceived {
                        item: Arc::new(item),
                    });
                }
            }
        })
    }

    /// Listen, keep the peer table topped up and relay pool additions until
    /// `shutdown`.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> NetworkResult<()> {
        let relay = self.spawn_pool_relay(shutdown.clone());
        if self.config.port != 0 {
            let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
            info!(port = self.config.port, "Listening for peers");
            tokio::spawn(Arc::clone(&self).listen_tcp(listener, shutdown.clone()));
        }
        if self.config.ws_port != 0 {
            let listener = TcpListener::bind(("0.0.0.0", self.config.ws_port)).await?;
            info!(port = self.config.ws_port, "Listening for WebSocket peers");
            tokio::spawn(Arc::clone(&self).listen_ws(listener, shutdown.clone()));
        }
        loop {
            self.connect_round().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.connect_interval) => {}
            }
        }
        for peer in self.peers() {
            peer.disconnect();
        }
        if let Err(error) = relay.await {
            debug!(%error, "Pool relay task ended abnormally");
        }
        info!("Local node stopped");
        Ok(())
    }
}

async fn resolve(seed: &str) -> Option<SocketAddr> {
    match tokio::net::lookup_host(seed).await {
        Ok(mut addresses) => addresses.next(),
        Err(error) => {
            debug!(seed, %error, "Seed did not resolve");
            None
        }
    }
}
