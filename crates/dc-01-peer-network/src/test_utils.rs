//! Fixtures for the network tests: in-memory chains, nodes wired over
//! in-process duplex pipes and a scripted raw peer.

use crate::adapters::stream_connection;
use crate::config::NetworkConfig;
use crate::domain::{Command, Message, VersionPayload};
use crate::ports::Connection;
use crate::service::LocalNode;
use dc_02_ledger::{
    genesis, AcceptAllPolicy, Block, Blockchain, CoinReference, ContractExecutor, Header,
    ProtocolSettings, Snapshot, Transaction, TransactionOutput, Verifiable, Witness,
    WitnessVerifier,
};
use dc_03_state_cache::MemoryStore;
use dc_05_mempool::{MemoryPool, MempoolConfig};
use shared_crypto::{opcode, KeyPair, PublicKey};
use shared_types::{Fixed8, UInt160};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const COINS: u16 = 8;

pub struct AcceptAllVerifier;

impl WitnessVerifier for AcceptAllVerifier {
    fn verify_witnesses(&self, _verifiable: &dyn Verifiable, _snapshot: &Snapshot) -> bool {
        true
    }
}

pub struct HaltingExecutor;

impl ContractExecutor for HaltingExecutor {
    fn execute(&self, _tx: &Transaction, _snapshot: &mut Snapshot) -> bool {
        true
    }
}

pub fn standby() -> Vec<PublicKey> {
    (1..=4u8)
        .map(|i| KeyPair::from_bytes([i; 32]).unwrap().public_key())
        .collect()
}

/// Chain holding only the genesis block.
pub fn genesis_chain() -> Arc<Blockchain> {
    Arc::new(
        Blockchain::new(
            ProtocolSettings::for_testing(standby()),
            Arc::new(MemoryStore::new()),
            Arc::new(AcceptAllVerifier),
            Arc::new(HaltingExecutor),
        )
        .unwrap(),
    )
}

pub fn next_block(chain: &Blockchain, transactions: Vec<Transaction>) -> Block {
    let prev = chain.get_header_by_height(chain.height()).unwrap().unwrap();
    let index = prev.index + 1;
    let mut all = vec![Transaction::miner(index, Vec::new())];
    all.extend(transactions);
    let header = Header {
        version: 0,
        prev_hash: prev.hash(),
        merkle_root: Default::default(),
        timestamp: prev.timestamp + 15,
        index,
        consensus_data: u64::from(index),
        next_consensus: chain
            .get_consensus_address(&chain.settings().standby_validators)
            .unwrap(),
        witness: Witness::new(Vec::new(), vec![opcode::PUSHT]),
    };
    Block::new(header, all)
}

/// Chain at height 1 whose block 1 split the governing supply into
/// [`COINS`] outputs. Every call builds the same block 1.
pub fn test_chain() -> (Arc<Blockchain>, Transaction) {
    let chain = genesis_chain();
    let genesis_block = chain.get_block_by_height(0).unwrap().unwrap();
    let share = genesis::GOVERNING_TOKEN_TOTAL / i64::from(COINS);
    let split = Transaction::contract(
        vec![CoinReference::new(genesis_block.transactions[0].hash(), 0)],
        (0..COINS)
            .map(|i| {
                TransactionOutput::new(
                    genesis::governing_token_id(),
                    Fixed8::from_units(share).unwrap(),
                    UInt160::from([i as u8 + 1; 20]),
                )
            })
            .collect(),
    );
    chain
        .add_block(next_block(&chain, vec![split.clone()]))
        .unwrap();
    (chain, split)
}

pub fn spend(split: &Transaction, index: u16, salt: u8) -> Transaction {
    let value = split.outputs()[usize::from(index)].value;
    Transaction::contract(
        vec![CoinReference::new(split.hash(), index)],
        vec![TransactionOutput::new(
            genesis::governing_token_id(),
            value,
            UInt160::from([salt; 20]),
        )],
    )
}

pub fn node(chain: Arc<Blockchain>) -> Arc<LocalNode> {
    let mempool = Arc::new(MemoryPool::new(
        MempoolConfig::for_testing(),
        Arc::clone(&chain),
        Arc::new(AcceptAllPolicy),
    ));
    Arc::new(LocalNode::new(NetworkConfig::for_testing(), chain, mempool))
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Two ends of an in-process pipe, each seeing the other at the given
/// address.
pub fn pipe(magic: u32, a_sees: SocketAddr, b_sees: SocketAddr) -> (Connection, Connection) {
    let (a, b) = tokio::io::duplex(1 << 20);
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    (
        stream_connection(a_sees, a_read, a_write, magic),
        stream_connection(b_sees, b_read, b_write, magic),
    )
}

/// Connect `a` and `b`. `a` dialled `b` at `b_addr`; `b` sees `a` at
/// `a_addr`.
pub fn link(a: &Arc<LocalNode>, b: &Arc<LocalNode>, a_addr: SocketAddr, b_addr: SocketAddr) {
    let (a_end, b_end) = pipe(a.magic(), b_addr, a_addr);
    a.add_connection(a_end, Some(b_addr));
    b.add_connection(b_end, None);
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// A peer driven message by message from the test.
pub struct RawPeer {
    pub connection: Connection,
}

impl RawPeer {
    /// Attach to `node` and complete the handshake, announcing
    /// `start_height`.
    pub async fn handshake(node: &Arc<LocalNode>, start_height: u32) -> Self {
        let (ours, theirs) = pipe(node.magic(), addr(1), addr(40_000));
        node.add_connection(theirs, None);
        let mut peer = Self { connection: ours };
        let mut version = VersionPayload::new(20_333, 0xDEAD, "/raw/", start_height);
        version.relay = true;
        peer.send(Message::new(Command::Version, &version)).await;
        assert_eq!(peer.recv().await.command, Command::Version);
        peer.send(Message::empty(Command::Verack)).await;
        assert_eq!(peer.recv().await.command, Command::Verack);
        let node = Arc::clone(node);
        assert!(eventually(move || node.ready_peers().len() == 1).await);
        peer
    }

    pub async fn send(&mut self, message: Message) {
        self.connection.writer.write_message(&message).await.unwrap();
    }

    pub async fn recv(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(2), self.connection.reader.read_message())
            .await
            .unwrap()
            .unwrap()
    }

    /// Next message with `command`, skipping anything else.
    pub async fn expect(&mut self, command: Command) -> Message {
        loop {
            let message = self.recv().await;
            if message.command == command {
                return message;
            }
        }
    }
}
