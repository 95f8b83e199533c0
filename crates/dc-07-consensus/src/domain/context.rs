//! # Consensus Context
//!
//! Everything one validator knows about the round for the next block: who
//! is primary, the proposal, the signatures collected so far and the view
//! every validator asked for.
//!
//! The primary for block `h` at view `v` is validator `(h - v) mod n`.
//! A block needs `m = n - (n - 1) / 3` signatures.

use super::messages::{ConsensusMessage, PrepareRequest};
use super::state::ConsensusState;
use super::ConsensusResult;
use dc_02_ledger::validators::quorum;
use dc_02_ledger::{
    sign, Block, Blockchain, ConsensusPayload, Header, MerkleTree, Transaction, Witness,
};
use dc_04_script_verification::Contract;
use shared_crypto::{KeyPair, PublicKey, Signature};
use shared_types::{Serializable, UInt160, UInt256};
use std::collections::{BTreeMap, HashMap};

/// Version carried in every consensus payload.
pub const CONSENSUS_VERSION: u32 = 0;

/// Index of the primary for `block_index` at `view`, always in `[0, validators)`.
pub fn primary_index(block_index: u32, view: u8, validators: usize) -> usize {
    if validators == 0 {
        return 0;
    }
    let n = validators as i64;
    (i64::from(block_index) - i64::from(view)).rem_euclid(n) as usize
}

pub struct ConsensusContext {
    pub state: ConsensusState,
    pub prev_hash: UInt256,
    /// Timestamp of the block at `prev_hash`.
    pub prev_timestamp: u32,
    pub block_index: u32,
    pub view_number: u8,
    pub validators: Vec<PublicKey>,
    /// Our position in `validators`, if we are one.
    pub my_index: Option<usize>,
    pub primary_index: usize,
    pub timestamp: u32,
    pub nonce: u64,
    pub next_consensus: UInt160,
    /// Proposed transactions, miner first. `None` until a proposal exists.
    pub transaction_hashes: Option<Vec<UInt256>>,
    pub transactions: HashMap<UInt256, Transaction>,
    pub signatures: Vec<Option<Signature>>,
    /// Highest view each validator asked for.
    pub expected_view: Vec<u8>,
    key_pair: Option<KeyPair>,
}

impl ConsensusContext {
    pub fn new(key_pair: Option<KeyPair>) -> Self {
        Self {
            state: ConsensusState::INITIAL,
            prev_hash: UInt256::ZERO,
            prev_timestamp: 0,
            block_index: 0,
            view_number: 0,
            validators: Vec::new(),
            my_index: None,
            primary_index: 0,
            timestamp: 0,
            nonce: 0,
            next_consensus: UInt160::default(),
            transaction_hashes: None,
            transactions: HashMap::new(),
            signatures: Vec::new(),
            expected_view: Vec::new(),
            key_pair,
        }
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.key_pair.as_ref().map(KeyPair::public_key)
    }

    /// Start the round for the block after the current tip at view 0.
    pub fn reset(&mut self, chain: &Blockchain) -> ConsensusResult<()> {
        let prev_hash = chain.current_block_hash();
        let prev_timestamp = chain
            .get_header(&prev_hash)?
            .map_or(0, |header| header.timestamp);
        let validators = chain.get_validators()?;
        let n = validators.len();

        self.state = ConsensusState::INITIAL;
        self.prev_hash = prev_hash;
        self.prev_timestamp = prev_timestamp;
        self.block_index = chain.height() + 1;
        self.view_number = 0;
        self.my_index = self
            .public_key()
            .and_then(|key| validators.iter().position(|v| *v == key));
        self.validators = validators;
        self.primary_index = primary_index(self.block_index, 0, n);
        self.timestamp = 0;
        self.nonce = 0;
        self.next_consensus = UInt160::default();
        self.transaction_hashes = None;
        self.transactions.clear();
        self.signatures = vec![None; n];
        self.expected_view = vec![0; n];
        Ok(())
    }

    /// Move to `view`. A signature already given survives; anything else
    /// about the round is dropped.
    pub fn change_view(&mut self, view: u8) {
        self.state = self.state & ConsensusState::SIGNATURE_SENT;
        self.view_number = view;
        self.primary_index = primary_index(self.block_index, view, self.validators.len());
        if self.state == ConsensusState::INITIAL {
            self.transaction_hashes = None;
            self.signatures = vec![None; self.validators.len()];
        }
    }

    /// Signatures needed for a block.
    pub fn m(&self) -> usize {
        quorum(self.validators.len())
    }

    pub fn is_primary(&self) -> bool {
        self.my_index == Some(self.primary_index)
    }

    pub fn role(&self) -> &'static str {
        match self.my_index {
            None => "Observer",
            Some(_) if self.is_primary() => "Primary",
            Some(_) => "Backup",
        }
    }

    /// Set the primary's own proposal. `transactions[0]` is the miner
    /// transaction.
    pub fn propose(&mut self, nonce: u64, next_consensus: UInt160, transactions: Vec<Transaction>) {
        self.nonce = nonce;
        self.next_consensus = next_consensus;
        self.transaction_hashes = Some(transactions.iter().map(Transaction::hash).collect());
        self.transactions = transactions.into_iter().map(|tx| (tx.hash(), tx)).collect();
    }

    /// Header the proposal would produce, without a witness.
    pub fn proposal_header(
        &self,
        timestamp: u32,
        nonce: u64,
        next_consensus: UInt160,
        transaction_hashes: &[UInt256],
    ) -> Header {
        Header {
            version: 0,
            prev_hash: self.prev_hash,
            merkle_root: MerkleTree::compute_root(transaction_hashes),
            timestamp,
            index: self.block_index,
            consensus_data: nonce,
            next_consensus,
            witness: Witness::new(Vec::new(), Vec::new()),
        }
    }

    pub fn make_header(&self) -> Option<Header> {
        let hashes = self.transaction_hashes.as_ref()?;
        Some(self.proposal_header(self.timestamp, self.nonce, self.next_consensus, hashes))
    }

    /// Sign the current proposal and record it as our signature.
    pub fn sign_header(&mut self) -> Option<Signature> {
        let my_index = self.my_index?;
        let header = self.make_header()?;
        let signature = sign(&header, self.key_pair.as_ref()?);
        self.signatures[my_index] = Some(signature);
        Some(signature)
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.iter().flatten().count()
    }

    /// True when every proposed transaction is at hand.
    pub fn has_all_transactions(&self) -> bool {
        self.transaction_hashes.as_ref().is_some_and(|hashes| {
            hashes.len() == self.transactions.len()
                && hashes.iter().all(|hash| self.transactions.contains_key(hash))
        })
    }

    /// The proposed transactions in proposal order, as far as known.
    pub fn ordered_transactions(&self) -> Vec<Transaction> {
        self.transaction_hashes
            .iter()
            .flatten()
            .filter_map(|hash| self.transactions.get(hash).cloned())
            .collect()
    }

    /// Sign `message` into a payload from this validator.
    pub fn make_payload(&self, message: &ConsensusMessage) -> Option<ConsensusPayload> {
        let my_index = u16::try_from(self.my_index?).ok()?;
        let key = self.key_pair.as_ref()?;
        let mut payload = ConsensusPayload {
            version: CONSENSUS_VERSION,
            prev_hash: self.prev_hash,
            block_index: self.block_index,
            validator_index: my_index,
            timestamp: self.timestamp,
            data: message.to_array(),
            witness: Witness::new(Vec::new(), Vec::new()),
        };
        let signature = sign(&payload, key);
        let contract = Contract::create_signature_contract(&key.public_key());
        payload.witness = contract.create_witness(&BTreeMap::from([(key.public_key(), signature)]))?;
        Some(payload)
    }

    pub fn make_change_view(&self) -> Option<ConsensusPayload> {
        let new_view = *self.expected_view.get(self.my_index?)?;
        self.make_payload(&ConsensusMessage::change_view(self.view_number, new_view))
    }

    pub fn make_prepare_request(&self) -> Option<ConsensusPayload> {
        let hashes = self.transaction_hashes.as_ref()?;
        let miner_transaction = self.transactions.get(hashes.first()?)?.clone();
        let signature = (*self.signatures.get(self.my_index?)?)?;
        self.make_payload(&ConsensusMessage::prepare_request(
            self.view_number,
            PrepareRequest {
                nonce: self.nonce,
                next_consensus: self.next_consensus,
                transaction_hashes: hashes.clone(),
                miner_transaction,
                signature,
            },
        ))
    }

    pub fn make_prepare_response(&self, signature: Signature) -> Option<ConsensusPayload> {
        self.make_payload(&ConsensusMessage::prepare_response(
            self.view_number,
            signature,
        ))
    }

    /// The finished block: the proposal with an `m`-of-`n` witness built
    /// from the collected signatures. `None` while signatures or
    /// transactions are missing.
    pub fn create_block(&self) -> Option<Block> {
        if !self.has_all_transactions() {
            return None;
        }
        let mut header = self.make_header()?;
        let contract = Contract::create_multisig_contract(self.m(), &self.validators).ok()?;
        let signatures: BTreeMap<PublicKey, Signature> = self
            .validators
            .iter()
            .zip(&self.signatures)
            .filter_map(|(key, signature)| signature.map(|signature| (*key, signature)))
            .collect();
        header.witness = contract.create_witness(&signatures)?;
        Some(Block::new(header, self.ordered_transactions()))
    }
}
