//! # Blocks and Headers
//!
//! ```text
//! unsigned header: version u32 | prev_hash | merkle_root | timestamp u32
//!                  | index u32 | consensus_data u64 | next_consensus
//! header        = unsigned | 0x01 | witness | 0x00
//! block         = unsigned | 0x01 | witness | transactions[]
//! trimmed block = unsigned | 0x01 | witness | tx hashes[]
//! ```

use super::errors::{LedgerError, LedgerResult};
use super::inventory::{Inventory, InventoryType, Verifiable};
use super::merkle::MerkleTree;
use super::transaction::Transaction;
use super::witness::Witness;
use crate::ports::WitnessVerifier;
use crate::snapshot::Snapshot;
use shared_crypto::hash256;
use shared_types::{
    array_size, BinaryReader, BinaryWriter, FormatError, Serializable, UInt160, UInt256,
};

pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 0x10000;
const UNSIGNED_HEADER_SIZE: usize = 4 + 32 + 32 + 4 + 4 + 8 + 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub prev_hash: UInt256,
    pub merkle_root: UInt256,
    pub timestamp: u32,
    pub index: u32,
    pub consensus_data: u64,
    /// Script hash of the multisig contract that must sign the next block.
    pub next_consensus: UInt160,
    pub witness: Witness,
}

impl Header {
    pub fn hash(&self) -> UInt256 {
        hash256(&self.hash_data())
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.version);
        self.prev_hash.serialize(writer);
        self.merkle_root.serialize(writer);
        writer.write_u32(self.timestamp);
        writer.write_u32(self.index);
        writer.write_u64(self.consensus_data);
        self.next_consensus.serialize(writer);
    }

    /// Signed header fields without the trailing transaction count, the
    /// prefix shared by blocks, trimmed blocks and merkle blocks.
    pub fn serialize_signed(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        writer.write_u8(1);
        self.witness.serialize(writer);
    }

    pub fn signed_size(&self) -> usize {
        UNSIGNED_HEADER_SIZE + 1 + self.witness.size()
    }

    pub fn deserialize_signed(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let version = reader.read_u32()?;
        let prev_hash = reader.read_serializable()?;
        let merkle_root = reader.read_serializable()?;
        let timestamp = reader.read_u32()?;
        let index = reader.read_u32()?;
        let consensus_data = reader.read_u64()?;
        let next_consensus = reader.read_serializable()?;
        match reader.read_u8()? {
            1 => {}
            tag => {
                return Err(FormatError::InvalidTag {
                    kind: "witness count",
                    tag,
                })
            }
        }
        Ok(Self {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            index,
            consensus_data,
            next_consensus,
            witness: reader.read_serializable()?,
        })
    }

    /// Chains onto its stored predecessor and carries a valid witness.
    pub fn verify(&self, snapshot: &Snapshot, verifier: &dyn WitnessVerifier) -> bool {
        let prev = match snapshot.get_header(&self.prev_hash) {
            Ok(Some(prev)) => prev,
            _ => return false,
        };
        if prev.index.checked_add(1) != Some(self.index) || prev.timestamp >= self.timestamp {
            return false;
        }
        verifier.verify_witnesses(self, snapshot)
    }
}

impl Serializable for Header {
    fn size(&self) -> usize {
        self.signed_size() + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_signed(writer);
        writer.write_u8(0);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let header = Self::deserialize_signed(reader)?;
        match reader.read_u8()? {
            0 => Ok(header),
            tag => Err(FormatError::InvalidTag {
                kind: "header transaction count",
                tag,
            }),
        }
    }
}

impl Verifiable for Header {
    fn witnesses(&self) -> &[Witness] {
        std::slice::from_ref(&self.witness)
    }

    fn hash_data(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(UNSIGNED_HEADER_SIZE);
        self.serialize_unsigned(&mut writer);
        writer.into_bytes()
    }

    fn script_hashes_for_verifying(&self, snapshot: &Snapshot) -> LedgerResult<Vec<UInt160>> {
        if self.prev_hash.is_zero() {
            return Ok(vec![self.witness.script_hash()]);
        }
        let prev = snapshot
            .get_header(&self.prev_hash)?
            .ok_or(LedgerError::UnknownHeader(self.prev_hash))?;
        Ok(vec![prev.next_consensus])
    }
}

impl Inventory for Header {
    fn hash(&self) -> UInt256 {
        Header::hash(self)
    }

    fn inventory_type(&self) -> InventoryType {
        InventoryType::Block
    }
}

/// Header plus transactions. The first transaction is the only miner
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Block over `transactions` with the Merkle root filled in.
    pub fn new(mut header: Header, transactions: Vec<Transaction>) -> Self {
        header.merkle_root = MerkleTree::compute_root(&tx_hashes(&transactions));
        Self {
            header,
            transactions,
        }
    }

    pub fn hash(&self) -> UInt256 {
        self.header.hash()
    }

    pub fn index(&self) -> u32 {
        self.header.index
    }

    pub fn transaction_hashes(&self) -> Vec<UInt256> {
        tx_hashes(&self.transactions)
    }

    /// Stored form: the header with transaction hashes only.
    pub fn trim(&self) -> TrimmedBlock {
        TrimmedBlock {
            header: self.header.clone(),
            hashes: self.transaction_hashes(),
        }
    }

    pub fn verify(&self, snapshot: &Snapshot, verifier: &dyn WitnessVerifier) -> bool {
        self.header.verify(snapshot, verifier)
    }
}

fn tx_hashes(transactions: &[Transaction]) -> Vec<UInt256> {
    transactions.iter().map(Transaction::hash).collect()
}

impl Serializable for Block {
    fn size(&self) -> usize {
        self.header.signed_size() + array_size(&self.transactions)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.header.serialize_signed(writer);
        writer.write_serializable_array(&self.transactions);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let header = Header::deserialize_signed(reader)?;
        let transactions: Vec<Transaction> =
            reader.read_serializable_array(MAX_TRANSACTIONS_PER_BLOCK)?;
        match transactions.first() {
            None => return Err(FormatError::invalid("block without transactions")),
            Some(first) if !first.is_miner() => {
                return Err(FormatError::invalid("first transaction is not a miner transaction"))
            }
            Some(_) => {}
        }
        if transactions[1..].iter().any(Transaction::is_miner) {
            return Err(FormatError::invalid("more than one miner transaction"));
        }
        if MerkleTree::compute_root(&tx_hashes(&transactions)) != header.merkle_root {
            return Err(FormatError::invalid("merkle root mismatch"));
        }
        Ok(Self {
            header,
            transactions,
        })
    }
}

impl Verifiable for Block {
    fn witnesses(&self) -> &[Witness] {
        self.header.witnesses()
    }

    fn hash_data(&self) -> Vec<u8> {
        self.header.hash_data()
    }

    fn script_hashes_for_verifying(&self, snapshot: &Snapshot) -> LedgerResult<Vec<UInt160>> {
        self.header.script_hashes_for_verifying(snapshot)
    }
}

impl Inventory for Block {
    fn hash(&self) -> UInt256 {
        Block::hash(self)
    }

    fn inventory_type(&self) -> InventoryType {
        InventoryType::Block
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimmedBlock {
    pub header: Header,
    pub hashes: Vec<UInt256>,
}

impl TrimmedBlock {
    /// Stored header with no block yet.
    pub fn header_only(header: Header) -> Self {
        Self {
            header,
            hashes: Vec::new(),
        }
    }

    pub fn is_block(&self) -> bool {
        !self.hashes.is_empty()
    }
}

impl Serializable for TrimmedBlock {
    fn size(&self) -> usize {
        self.header.signed_size() + array_size(&self.hashes)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.header.serialize_signed(writer);
        writer.write_serializable_array(&self.hashes);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            header: Header::deserialize_signed(reader)?,
            hashes: reader.read_serializable_array(MAX_TRANSACTIONS_PER_BLOCK)?,
        })
    }
}
