//! Signed envelope carrying one consensus message between validators.

use super::errors::{LedgerError, LedgerResult};
use super::inventory::{Inventory, InventoryType, Verifiable};
use super::witness::Witness;
use crate::ports::WitnessVerifier;
use crate::snapshot::Snapshot;
use shared_crypto::{hash256, signature_contract_hash};
use shared_types::{
    var_bytes_size, BinaryReader, BinaryWriter, FormatError, Serializable, UInt160, UInt256,
};

const MAX_DATA: usize = 0x0200_0000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusPayload {
    pub version: u32,
    pub prev_hash: UInt256,
    pub block_index: u32,
    pub validator_index: u16,
    pub timestamp: u32,
    /// Encoded consensus message.
    pub data: Vec<u8>,
    pub witness: Witness,
}

impl ConsensusPayload {
    pub fn hash(&self) -> UInt256 {
        hash256(&self.hash_data())
    }

    fn unsigned_size(&self) -> usize {
        4 + UInt256::LEN + 4 + 2 + 4 + var_bytes_size(self.data.len())
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.version);
        self.prev_hash.serialize(writer);
        writer.write_u32(self.block_index);
        writer.write_u16(self.validator_index);
        writer.write_u32(self.timestamp);
        writer.write_var_bytes(&self.data);
    }

    /// Targets a height above the local chain and carries the sender's signature.
    pub fn verify(&self, snapshot: &Snapshot, verifier: &dyn WitnessVerifier) -> bool {
        match snapshot.height() {
            Some(height) if self.block_index <= height => false,
            _ => verifier.verify_witnesses(self, snapshot),
        }
    }
}

impl Serializable for ConsensusPayload {
    fn size(&self) -> usize {
        self.unsigned_size() + 1 + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        writer.write_u8(1);
        self.witness.serialize(writer);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let version = reader.read_u32()?;
        let prev_hash = reader.read_serializable()?;
        let block_index = reader.read_u32()?;
        let validator_index = reader.read_u16()?;
        let timestamp = reader.read_u32()?;
        let data = reader.read_var_bytes(MAX_DATA)?;
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
            block_index,
            validator_index,
            timestamp,
            data,
            witness: reader.read_serializable()?,
        })
    }
}

impl Verifiable for ConsensusPayload {
    fn witnesses(&self) -> &[Witness] {
        std::slice::from_ref(&self.witness)
    }

    fn hash_data(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.unsigned_size());
        self.serialize_unsigned(&mut writer);
        writer.into_bytes()
    }

    fn script_hashes_for_verifying(&self, snapshot: &Snapshot) -> LedgerResult<Vec<UInt160>> {
        let validators = snapshot.get_validators()?;
        let key = validators
            .get(usize::from(self.validator_index))
            .ok_or_else(|| {
                LedgerError::Format(FormatError::invalid(format!(
                    "validator index {} out of range",
                    self.validator_index
                )))
            })?;
        Ok(vec![signature_contract_hash(key)])
    }
}

impl Inventory for ConsensusPayload {
    fn hash(&self) -> UInt256 {
        ConsensusPayload::hash(self)
    }

    fn inventory_type(&self) -> InventoryType {
        InventoryType::Consensus
    }
}
