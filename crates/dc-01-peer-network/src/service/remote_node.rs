//! # Remote Node
//!
//! One connected peer. [`RemoteNode`] is the handle the local node keeps:
//! outbound queues, the negotiated version, the peer's bloom filter and its
//! outstanding requests. [`run_session`] drives the protocol over a
//! [`Connection`]:
//!
//! ```text
//! send version ─▶ expect version ─▶ send verack ─▶ expect verack
//!                      │
//!                      └─ own nonce: self-connection, address marked bad
//!
//! receive loop: 30 min timeout while idle, 1 min with requests outstanding
//! send loop:    drains the high-priority queue before the low one
//! ```

use super::local_node::LocalNode;
use super::queue::OutboundQueue;
use crate::domain::{
    AddrPayload, Command, FilterAddPayload, FilterLoadPayload, GetBlocksPayload, HeadersPayload,
    InvPayload, InventoryItem, MerkleBlockPayload, Message, NetworkError, NetworkResult,
    PeerMissions, VersionPayload, MAX_HASHES, MAX_HEADERS,
};
use crate::ports::{Connection, FrameReader, FrameWriter};
use dc_02_ledger::{Block, InventoryType, Transaction};
use dc_06_bloom_filters::{match_flags, test_transaction, BloomFilter};
use parking_lot::Mutex;
use shared_types::UInt256;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct PeerState {
    version: Option<VersionPayload>,
    listener: Option<SocketAddr>,
    ready: bool,
    filter: Option<BloomFilter>,
    missions: PeerMissions,
}

#[derive(Debug)]
pub struct RemoteNode {
    remote: SocketAddr,
    queue: OutboundQueue,
    state: Mutex<PeerState>,
    disconnect: CancellationToken,
}

impl RemoteNode {
    /// `listener` is the endpoint that was dialled, for outbound peers.
    pub fn new(remote: SocketAddr, listener: Option<SocketAddr>) -> Self {
        Self {
            remote,
            queue: OutboundQueue::new(),
            state: Mutex::new(PeerState {
                listener,
                ..PeerState::default()
            }),
            disconnect: CancellationToken::new(),
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Where the peer accepts connections, once known.
    pub fn listener(&self) -> Option<SocketAddr> {
        self.state.lock().listener
    }

    pub fn version(&self) -> Option<VersionPayload> {
        self.state.lock().version.clone()
    }

    /// Handshake completed.
    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    pub fn start_height(&self) -> u32 {
        self.state
            .lock()
            .version
            .as_ref()
            .map_or(0, |version| version.start_height)
    }

    pub fn enqueue(&self, message: Message) -> bool {
        self.queue.push(message)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Announce `item` unless the peer asked not to be sent inventory or
    /// its filter rejects the transaction.
    pub fn relay(&self, item: &InventoryItem) -> bool {
        {
            let state = self.state.lock();
            if !state.ready || !state.version.as_ref().is_some_and(|version| version.relay) {
                return false;
            }
            if let (InventoryItem::Transaction(tx), Some(filter)) = (item, &state.filter) {
                if !test_transaction(filter, tx) {
                    return false;
                }
            }
        }
        self.enqueue(Message::new(
            Command::Inv,
            &InvPayload::new(item.inventory_type(), vec![item.hash()]),
        ))
    }

    pub fn request_peers(&self) {
        self.enqueue(Message::empty(Command::GetAddr));
    }

    pub fn has_filter(&self) -> bool {
        self.state.lock().filter.is_some()
    }

    pub fn disconnect(&self) {
        self.disconnect.cancel();
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnect.is_cancelled()
    }

    fn accept_version(&self, version: VersionPayload) {
        let mut state = self.state.lock();
        if version.port > 0 {
            let ip = state.listener.map_or(self.remote.ip(), |listener| listener.ip());
            state.listener = Some(SocketAddr::new(ip, version.port));
        }
        state.version = Some(version);
    }

    fn set_ready(&self) {
        self.state.lock().ready = true;
    }

    fn set_filter(&self, filter: Option<BloomFilter>) {
        self.state.lock().filter = filter;
    }

    fn add_to_filter(&self, element: &[u8]) {
        if let Some(filter) = self.state.lock().filter.as_mut() {
            filter.add(element);
        }
    }

    /// Hashes of the transactions the peer's filter lets through, all of
    /// them when no filter is loaded.
    fn filtered_hashes(&self, transactions: &[Transaction]) -> Vec<UInt256> {
        let state = self.state.lock();
        transactions
            .iter()
            .filter(|tx| match &state.filter {
                Some(filter) => test_transaction(filter, tx),
                None => true,
            })
            .map(Transaction::hash)
            .collect()
    }

    /// Per-transaction matches when the peer loaded a filter.
    fn merkle_flags(&self, block: &Block) -> Option<Vec<bool>> {
        self.state
            .lock()
            .filter
            .as_ref()
            .map(|filter| match_flags(filter, block))
    }

    fn add_missions(&self, hashes: &[UInt256], now: Instant) {
        self.state.lock().missions.add(hashes, now);
    }

    fn complete_mission(&self, hash: &UInt256, now: Instant) {
        self.state.lock().missions.complete(hash, now);
    }

    pub(crate) fn has_missions(&self) -> bool {
        !self.state.lock().missions.is_empty()
    }

    fn is_stalled(&self, now: Instant, limit: std::time::Duration) -> bool {
        self.state.lock().missions.is_stalled(now, limit)
    }

    pub(crate) fn take_missions(&self) -> Vec<UInt256> {
        self.state.lock().missions.drain()
    }
}

/// How a session ended.
#[derive(Debug)]
pub(crate) enum Ending {
    /// The address may be dialled again.
    Quiet(NetworkError),
    /// The peer broke the protocol and its address is marked bad.
    Bad(NetworkError),
}

impl Ending {
    fn handshake(peer: SocketAddr, reason: &'static str) -> Self {
        Self::Bad(NetworkError::Handshake { peer, reason })
    }
}

/// Run the handshake and then the message loops until either side quits.
pub(crate) async fn run_session(
    local: Arc<LocalNode>,
    peer: Arc<RemoteNode>,
    connection: Connection,
) -> Ending {
    let Connection {
        mut reader,
        mut writer,
        ..
    } = connection;
    let session = Session {
        local,
        peer: Arc::clone(&peer),
    };

    let handshake = tokio::select! {
        _ = peer.disconnect.cancelled() => Err(Ending::Quiet(NetworkError::ConnectionClosed)),
        result = session.handshake(reader.as_mut(), writer.as_mut()) => result,
    };
    if let Err(ending) = handshake {
        writer.close().await;
        return ending;
    }
    peer.set_ready();
    session.local.on_peer_ready(&peer);

    let sender = tokio::spawn(send_loop(Arc::clone(&peer), writer));
    let ending = session.receive_loop(reader.as_mut()).await;
    peer.disconnect();
    if let Err(error) = sender.await {
        debug!(peer = %peer.remote, %error, "Send loop ended abnormally");
    }
    ending
}

async fn send_loop(peer: Arc<RemoteNode>, mut writer: Box<dyn FrameWriter>) {
    loop {
        let message = tokio::select! {
            _ = peer.disconnect.cancelled() => break,
            message = peer.queue.next() => message,
        };
        trace!(peer = %peer.remote, command = %message.command, "Sending");
        if let Err(error) = writer.write_message(&message).await {
            debug!(peer = %peer.remote, %error, "Write failed");
            peer.disconnect();
            break;
        }
    }
    writer.close().await;
}

struct Session {
    local: Arc<LocalNode>,
    peer: Arc<RemoteNode>,
}

impl Session {
    async fn handshake(
        &self,
        reader: &mut dyn FrameReader,
        writer: &mut dyn FrameWriter,
    ) -> Result<(), Ending> {
        let remote = self.peer.remote;
        let config = self.local.config();
        let ours = VersionPayload::new(
            config.port,
            self.local.nonce(),
            &config.user_agent,
            self.local.chain().height(),
        );
        writer
            .write_message(&Message::new(Command::Version, &ours))
            .await
            .map_err(Ending::Quiet)?;

        let message = self.expect(reader).await?;
        if message.command != Command::Version {
            return Err(Ending::handshake(remote, "expected version"));
        }
        let theirs: VersionPayload = message.payload_as().map_err(Ending::Bad)?;
        if theirs.nonce == self.local.nonce() {
            return Err(Ending::handshake(remote, "connected to self"));
        }
        if self.local.is_duplicate(&self.peer, theirs.nonce) {
            return Err(Ending::Quiet(NetworkError::Handshake {
                peer: remote,
                reason: "already connected",
            }));
        }
        self.peer.accept_version(theirs);

        writer
            .write_message(&Message::empty(Command::Verack))
            .await
            .map_err(Ending::Quiet)?;
        let message = self.expect(reader).await?;
        if message.command != Command::Verack {
            return Err(Ending::handshake(remote, "expected verack"));
        }
        Ok(())
    }

    async fn expect(&self, reader: &mut dyn FrameReader) -> Result<Message, Ending> {
        let timeout = self.local.config().handshake_timeout;
        match tokio::time::timeout(timeout, reader.read_message()).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(error)) => Err(Ending::Quiet(error)),
            Err(_) => Err(Ending::Quiet(NetworkError::Timeout(self.peer.remote))),
        }
    }

    async fn receive_loop(&self, reader: &mut dyn FrameReader) -> Ending {
        let remote = self.peer.remote;
        let config = self.local.config();
        let chain = self.local.chain();
        if chain.header_height() < self.peer.start_height() {
            self.request_headers();
        }
        loop {
            let busy = self.peer.has_missions();
            if !busy && chain.height() < self.peer.start_height() {
                self.peer.enqueue(Message::new(
                    Command::GetBlocks,
                    &GetBlocksPayload::new(chain.current_block_hash()),
                ));
            }
            let timeout = if busy {
                config.mission_timeout
            } else {
                config.idle_timeout
            };
            let received = tokio::select! {
                _ = self.peer.disconnect.cancelled() => {
                    return Ending::Quiet(NetworkError::ConnectionClosed);
                }
                received = tokio::time::timeout(timeout, reader.read_message()) => received,
            };
            let message = match received {
                Ok(Ok(message)) => message,
                Ok(Err(NetworkError::UnknownCommand(command))) => {
                    trace!(peer = %remote, command, "Ignoring unknown command");
                    continue;
                }
                Ok(Err(error)) => return Ending::Quiet(error),
                Err(_) => return Ending::Quiet(NetworkError::Timeout(remote)),
            };
            if message.command != Command::Consensus
                && self.peer.is_stalled(Instant::now(), config.mission_timeout)
            {
                return Ending::Quiet(NetworkError::Stalled(remote));
            }
            if let Err(error) = self.on_message(message) {
                return match error {
                    NetworkError::Ledger(_) => Ending::Quiet(error),
                    other => Ending::Bad(other),
                };
            }
        }
    }

    fn on_message(&self, message: Message) -> NetworkResult<()> {
        trace!(
            peer = %self.peer.remote,
            command = %message.command,
            len = message.payload.len(),
            "Received"
        );
        match message.command {
            Command::Addr => self.on_addr(message.payload_as()?),
            Command::Block => self.on_block(message.payload_as()?)?,
            Command::Consensus => self.on_inventory(InventoryItem::Consensus(message.payload_as()?)),
            Command::FilterAdd => {
                let payload: FilterAddPayload = message.payload_as()?;
                self.peer.add_to_filter(&payload.data);
            }
            Command::FilterClear => self.peer.set_filter(None),
            Command::FilterLoad => {
                let payload: FilterLoadPayload = message.payload_as()?;
                self.peer.set_filter(Some(payload.to_filter()?));
            }
            Command::GetAddr => self.on_get_addr(),
            Command::GetBlocks => self.on_get_blocks(message.payload_as()?)?,
            Command::GetData => self.on_get_data(message.payload_as()?)?,
            Command::GetHeaders => self.on_get_headers(message.payload_as()?)?,
            Command::Headers => self.on_headers(message.payload_as()?)?,
            Command::Inv => self.on_inv(message.payload_as()?)?,
            Command::MemPool => self.on_mempool(),
            Command::Tx => {
                let tx: Transaction = message.payload_as()?;
                if tx.is_miner() {
                    // requested but never pooled; release it all the same
                    self.complete_mission(&tx.hash());
                } else {
                    self.on_inventory(tx.into());
                }
            }
            Command::Version | Command::Verack => {
                return Err(NetworkError::Protocol("handshake message after handshake"));
            }
            Command::Alert | Command::MerkleBlock | Command::NotFound => {}
        }
        Ok(())
    }

    fn complete_mission(&self, hash: &UInt256) {
        self.peer.complete_mission(hash, Instant::now());
        self.local.complete_mission(hash);
    }

    fn on_inventory(&self, item: InventoryItem) {
        self.complete_mission(&item.hash());
        self.local.on_inventory_received(item);
    }

    fn on_addr(&self, payload: AddrPayload) {
        self.local
            .add_peers(payload.addresses.iter().map(|address| address.endpoint));
    }

    fn on_block(&self, block: Block) -> NetworkResult<()> {
        if self.local.chain().contains_block(&block.hash())? {
            self.complete_mission(&block.hash());
            return Ok(());
        }
        self.on_inventory(block.into());
        Ok(())
    }

    fn on_get_addr(&self) {
        if let Some(payload) = self.local.addr_payload() {
            self.peer.enqueue(Message::new(Command::Addr, &payload));
        }
    }

    /// Height of the first start hash on our header chain.
    fn first_known(&self, hashes: &[UInt256]) -> NetworkResult<Option<u32>> {
        let chain = self.local.chain();
        for hash in hashes {
            if let Some(header) = chain.get_header(hash)? {
                if chain.get_block_hash(header.index) == Some(*hash) {
                    return Ok(Some(header.index));
                }
            }
        }
        Ok(None)
    }

    fn on_get_blocks(&self, payload: GetBlocksPayload) -> NetworkResult<()> {
        let Some(start) = self.first_known(&payload.hash_start)? else {
            return Ok(());
        };
        let chain = self.local.chain();
        let hashes: Vec<UInt256> = (start.saturating_add(1)..=chain.height())
            .map_while(|index| chain.get_block_hash(index))
            .take_while(|hash| *hash != payload.hash_stop)
            .take(MAX_HASHES)
            .collect();
        if !hashes.is_empty() {
            self.peer.enqueue(Message::new(
                Command::Inv,
                &InvPayload::new(InventoryType::Block, hashes),
            ));
        }
        Ok(())
    }

    fn on_get_headers(&self, payload: GetBlocksPayload) -> NetworkResult<()> {
        let Some(start) = self.first_known(&payload.hash_start)? else {
            return Ok(());
        };
        let chain = self.local.chain();
        let mut headers = Vec::new();
        let mut index = start.saturating_add(1);
        while headers.len() < MAX_HEADERS && index <= chain.header_height() {
            let Some(header) = chain.get_header_by_height(index)? else {
                break;
            };
            if header.hash() == payload.hash_stop {
                break;
            }
            headers.push(header);
            index += 1;
        }
        if !headers.is_empty() {
            self.peer
                .enqueue(Message::new(Command::Headers, &HeadersPayload { headers }));
        }
        Ok(())
    }

    fn request_headers(&self) {
        self.peer.enqueue(Message::new(
            Command::GetHeaders,
            &GetBlocksPayload::new(self.local.chain().current_header_hash()),
        ));
    }

    fn on_headers(&self, payload: HeadersPayload) -> NetworkResult<()> {
        if payload.headers.is_empty() {
            return Ok(());
        }
        let chain = self.local.chain();
        let added = chain.add_headers(payload.headers)?;
        if added > 0 && chain.header_height() < self.peer.start_height() {
            self.request_headers();
        }
        Ok(())
    }

    fn on_inv(&self, payload: InvPayload) -> NetworkResult<()> {
        let now = Instant::now();
        let chain = self.local.chain();
        let mempool = self.local.mempool();
        let mut seen = HashSet::new();
        let mut wanted = Vec::new();
        for hash in payload.hashes {
            if !seen.insert(hash) || self.local.is_known(&hash, now) {
                continue;
            }
            let have = match payload.inventory_type {
                InventoryType::Transaction => {
                    mempool.contains(&hash) || chain.contains_transaction(&hash)?
                }
                InventoryType::Block => chain.contains_block(&hash)?,
                InventoryType::Consensus => false,
            };
            if !have {
                wanted.push(hash);
            }
        }
        let claimed = self.local.claim_missions(wanted);
        if claimed.is_empty() {
            return Ok(());
        }
        self.peer.add_missions(&claimed, now);
        for group in InvPayload::create_group(payload.inventory_type, &claimed) {
            self.peer.enqueue(Message::new(Command::GetData, &group));
        }
        Ok(())
    }

    fn on_get_data(&self, payload: InvPayload) -> NetworkResult<()> {
        let chain = self.local.chain();
        for hash in &payload.hashes {
            let cached = self.local.cached(hash);
            match payload.inventory_type {
                InventoryType::Transaction => {
                    let tx = match cached {
                        Some(InventoryItem::Transaction(tx)) => Some(tx),
                        _ => match self.local.mempool().get(hash) {
                            Some(tx) => Some(tx),
                            None => chain.get_transaction(hash)?,
                        },
                    };
                    if let Some(tx) = tx {
                        self.peer.enqueue(Message::new(Command::Tx, &tx));
                    }
                }
                InventoryType::Block => {
                    let block = match cached {
                        Some(InventoryItem::Block(block)) => Some(block),
                        _ => chain.get_block(hash)?,
                    };
                    let Some(block) = block else {
                        continue;
                    };
                    match self.peer.merkle_flags(&block) {
                        None => self.peer.enqueue(Message::new(Command::Block, &block)),
                        Some(flags) => self.peer.enqueue(Message::new(
                            Command::MerkleBlock,
                            &MerkleBlockPayload::create(&block, &flags),
                        )),
                    };
                }
                InventoryType::Consensus => {
                    if let Some(InventoryItem::Consensus(payload)) = cached {
                        self.peer.enqueue(Message::new(Command::Consensus, &payload));
                    }
                }
            }
        }
        Ok(())
    }

    fn on_mempool(&self) {
        let hashes = self
            .peer
            .filtered_hashes(&self.local.mempool().get_memory_pool());
        for group in InvPayload::create_group(InventoryType::Transaction, &hashes) {
            self.peer.enqueue(Message::new(Command::Inv, &group));
        }
    }
}
